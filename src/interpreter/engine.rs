// Execution engine for the memory model simulator

use crate::config::SimConfig;
use crate::diagnostics::{DiagnosticKind, Diagnostics, Finding, Severity, SimulationReport, Violation};
use crate::interpreter::constants::ROOT_FUNCTION;
use crate::interpreter::errors::SetupError;
use crate::memory::address_space::AddressSpace;
use crate::memory::heap::{HeapAllocator, HeapBlock};
use crate::memory::stack::FrameStack;
use crate::memory::value::Value;
use crate::program::{Instruction, Program};
use crate::snapshot::{Snapshot, SnapshotManager};
use rustc_hash::FxHashMap;

/// Executes a program one instruction at a time against the memory model
pub struct Simulator {
    /// Validated program
    program: Program,

    config: SimConfig,

    /// Flat byte store with the heap and stack regions
    pub(crate) space: AddressSpace,

    /// Heap block registry
    pub(crate) heap: HeapAllocator,

    /// Call stack
    pub(crate) frames: FrameStack,

    /// Register file: handle name -> current value
    pub(crate) registers: FxHashMap<String, Value>,

    /// Findings recorded so far
    pub(crate) diagnostics: Diagnostics,

    /// Per-instruction history
    snapshot_manager: SnapshotManager,

    /// Cleared when the snapshot budget runs out
    recording: bool,

    /// Index of the next instruction to execute
    position: usize,

    instructions_executed: usize,

    /// Instruction that raised the halting finding
    halted_at: Option<usize>,

    /// Blocks still live at the end of the run
    leaks: Vec<HeapBlock>,

    /// Whether execution has finished
    finished: bool,
}

impl Simulator {
    /// Validate `program` and set up a fresh address space with the root frame
    pub fn new(program: Program, config: SimConfig) -> Result<Self, SetupError> {
        config.validate()?;
        program.validate()?;

        let space = AddressSpace::new(config.heap_capacity_bytes, config.stack_capacity_bytes);
        let mut frames = FrameStack::new();
        frames.push_frame(&space, ROOT_FUNCTION, None, None);

        let mut simulator = Simulator {
            snapshot_manager: SnapshotManager::new(config.snapshot_memory_limit),
            recording: config.record_history,
            program,
            config,
            space,
            heap: HeapAllocator::new(),
            frames,
            registers: FxHashMap::default(),
            diagnostics: Diagnostics::new(),
            position: 0,
            instructions_executed: 0,
            halted_at: None,
            leaks: Vec::new(),
            finished: false,
        };

        // Initial state, before the first instruction
        simulator.take_snapshot(None);
        Ok(simulator)
    }

    /// Run the program to completion or until a halting finding
    pub fn run(&mut self) -> SimulationReport {
        while self.step() {}
        self.report()
    }

    /// Execute the next instruction. Returns false once the run is over.
    pub fn step(&mut self) -> bool {
        if self.finished {
            return false;
        }
        let index = self.position;
        let Some(instruction) = self.program.instructions.get(index).cloned() else {
            self.finish();
            return false;
        };
        self.position += 1;
        self.instructions_executed += 1;
        log::trace!("[{}] {}", index, instruction);

        let halt = match self.execute(index, &instruction) {
            Ok(()) => false,
            Err(violation) => {
                let kind = violation.kind;
                let severity = self.severity_of(kind);
                self.diagnostics.record(index, violation, severity);
                severity == Severity::Fatal
                    && (self.config.halt_on_first_fatal || kind.always_halts())
            }
        };

        self.take_snapshot(Some(index));

        if halt {
            log::warn!("halted at instruction {} ({})", index, instruction.mnemonic());
            self.halted_at = Some(index);
            self.finished = true;
            return false;
        }
        true
    }

    /// Build the report for everything executed so far
    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            findings: self.diagnostics.findings().to_vec(),
            leaks: self.leaks.clone(),
            instructions_executed: self.instructions_executed,
            halted_at: self.halted_at,
        }
    }

    /// Dispatch one instruction
    fn execute(&mut self, index: usize, instruction: &Instruction) -> Result<(), Violation> {
        match instruction {
            Instruction::Declare { name, size, init } => self.declare(name, *size, init.as_ref()),
            Instruction::AddressOf {
                dest,
                slot,
                elem_size,
            } => self.address_of(dest, slot, *elem_size),
            Instruction::DereferenceRead { dest, ptr } => self.dereference_read(index, dest, ptr),
            Instruction::DereferenceWrite { ptr, value } => self.dereference_write(ptr, value),
            Instruction::PointerAdd { dest, src, offset } => self.pointer_add(dest, src, *offset),
            Instruction::FieldAccess {
                dest,
                src,
                offset,
                size,
            } => self.field_access(dest, src, *offset, *size),
            Instruction::Call {
                function,
                params,
                result,
            } => self.call(index, function, params, result.as_deref()),
            Instruction::Return { value } => self.ret(index, value.as_ref()),
            Instruction::Malloc {
                dest,
                size,
                elem_size,
            } => self.builtin_malloc(index, dest, *size, *elem_size),
            Instruction::Calloc { dest, count, size } => {
                self.builtin_calloc(index, dest, *count, *size)
            }
            Instruction::Free { ptr } => self.builtin_free(index, ptr),
        }
    }

    /// Severity for a finding of `kind` under the current configuration
    pub(crate) fn severity_of(&self, kind: DiagnosticKind) -> Severity {
        match kind {
            DiagnosticKind::UninitializedRead => self
                .config
                .uninitialized_read_severity()
                .unwrap_or(Severity::Warning),
            _ => kind.default_severity(),
        }
    }

    /// End of program: every live block is a leak
    fn finish(&mut self) {
        let at = self.program.len();
        self.leaks = self.heap.collect_leaks();
        for block in &self.leaks {
            let violation = Violation::new(
                DiagnosticKind::MemoryLeak,
                format!(
                    "heap block #{} ({} bytes at 0x{:x}) allocated at instruction {} was never freed",
                    block.id, block.size, block.base, block.allocated_at
                ),
            )
            .at(block.base);
            self.diagnostics.record(at, violation, Severity::Warning);
        }
        if !self.leaks.is_empty() {
            log::info!(
                "{} block(s) leaked, {} bytes",
                self.leaks.len(),
                self.heap.live_bytes()
            );
        }
        self.finished = true;
    }

    fn take_snapshot(&mut self, index: Option<usize>) {
        if !self.recording {
            return;
        }
        let snapshot = Snapshot::capture(
            index,
            &self.space,
            &self.heap,
            &self.frames,
            &self.registers,
            self.diagnostics.findings().len(),
        );
        if let Err(e) = self.snapshot_manager.push(snapshot) {
            log::warn!("{}; history stops here", e);
            self.recording = false;
        }
    }

    pub(crate) fn bind(&mut self, dest: &str, value: Value) {
        log::trace!("{} = {}", dest, value);
        self.registers.insert(dest.to_string(), value);
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn heap(&self) -> &HeapAllocator {
        &self.heap
    }

    pub fn frames(&self) -> &FrameStack {
        &self.frames
    }

    /// Current value of a handle
    pub fn register(&self, name: &str) -> Option<&Value> {
        self.registers.get(name)
    }

    pub fn findings(&self) -> &[Finding] {
        self.diagnostics.findings()
    }

    /// Get a snapshot from history; 0 is the state before the first instruction
    pub fn snapshot(&self, position: usize) -> Option<&Snapshot> {
        self.snapshot_manager.get(position)
    }

    pub fn total_snapshots(&self) -> usize {
        self.snapshot_manager.len()
    }

    /// Whether the history stopped early because of its memory budget
    pub fn history_truncated(&self) -> bool {
        self.config.record_history && !self.recording
    }

    /// Index of the next instruction to execute
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::parse_listing;

    fn simulator(source: &str) -> Simulator {
        let program = parse_listing(source).unwrap();
        Simulator::new(program, SimConfig::default()).unwrap()
    }

    #[test]
    fn test_clean_run_has_no_findings() {
        let mut sim = simulator(
            "declare x 4 = 5\n\
             addr p x\n\
             read v p\n",
        );
        let report = sim.run();
        assert!(report.findings.is_empty());
        assert_eq!(report.instructions_executed, 3);
        assert_eq!(sim.register("v"), Some(&Value::Int(5)));
        // Initial state plus one per instruction
        assert_eq!(sim.total_snapshots(), 4);
        assert!(sim.is_finished());
    }

    #[test]
    fn test_step_stops_after_halt() {
        let mut sim = simulator(
            "malloc p 4\n\
             free p\n\
             free p\n\
             declare never 4\n",
        );
        assert!(sim.step());
        assert!(sim.step());
        assert!(!sim.step());
        assert!(!sim.step());
        let report = sim.report();
        assert_eq!(report.halted_at, Some(2));
        assert_eq!(report.instructions_executed, 3);
        assert_eq!(report.terminal_finding().unwrap().kind, DiagnosticKind::DoubleFree);
    }

    #[test]
    fn test_invalid_program_rejected() {
        let program = parse_listing("read v p\n").unwrap();
        assert!(matches!(
            Simulator::new(program, SimConfig::default()),
            Err(SetupError::Program(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimConfig {
            heap_capacity_bytes: 0,
            ..SimConfig::default()
        };
        assert!(matches!(
            Simulator::new(Program::default(), config),
            Err(SetupError::Config(_))
        ));
    }

    #[test]
    fn test_history_disabled() {
        let program = parse_listing("declare x 4\n").unwrap();
        let config = SimConfig {
            record_history: false,
            ..SimConfig::default()
        };
        let mut sim = Simulator::new(program, config).unwrap();
        sim.run();
        assert_eq!(sim.total_snapshots(), 0);
        assert!(!sim.history_truncated());
    }

    #[test]
    fn test_history_budget_truncates() {
        let program = parse_listing("declare x 4\ndeclare y 4\ndeclare z 4\n").unwrap();
        let config = SimConfig {
            snapshot_memory_limit: 1,
            ..SimConfig::default()
        };
        let mut sim = Simulator::new(program, config).unwrap();
        let report = sim.run();
        assert!(report.findings.is_empty());
        assert!(sim.history_truncated());
        assert_eq!(sim.total_snapshots(), 0);
    }
}
