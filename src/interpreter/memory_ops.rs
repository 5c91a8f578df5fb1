//! Memory operation instructions
//!
//! Slot declaration, address-of, dereference reads and writes, and the two
//! pointer derivations (`add`, `field`). Every dereference goes through
//! [`Diagnostics::check_access`] before any byte is touched, so a rejected
//! access leaves memory exactly as it was.
//!
//! # Storing Values
//!
//! Integers are stored little-endian, truncated to the access width.
//! Pointers need a full [`POINTER_SIZE`]-byte access; the pointer's
//! provenance is kept alongside the bytes so a later read of the same
//! location gets the pointer back, not just its address.

use crate::diagnostics::{DiagnosticKind, Diagnostics, Severity, Violation};
use crate::interpreter::constants::POINTER_SIZE;
use crate::interpreter::engine::Simulator;
use crate::memory::pointer::PointerValue;
use crate::memory::value::{decode_int, encode_int, Address, Value};
use crate::program::Operand;

impl Simulator {
    pub(crate) fn declare(
        &mut self,
        name: &str,
        size: usize,
        init: Option<&Operand>,
    ) -> Result<(), Violation> {
        // Resolve the initializer before the slot exists
        let value = init.map(|op| self.value_operand(op)).transpose()?;
        self.declare_slot(name, size, value)
    }

    /// Declare a slot in the current frame, optionally storing a value in it
    pub(crate) fn declare_slot(
        &mut self,
        name: &str,
        size: usize,
        value: Option<Value>,
    ) -> Result<(), Violation> {
        // Reject the initializer before the slot takes any stack
        if let Some(value) = &value {
            check_storable(name, size, value)?;
        }
        let address = self.frames.declare(&mut self.space, name, size)?;
        if let Some(value) = value {
            self.store_value(name, address, size, &value)?;
        }
        Ok(())
    }

    pub(crate) fn address_of(
        &mut self,
        dest: &str,
        slot: &str,
        elem_size: Option<usize>,
    ) -> Result<(), Violation> {
        let frame = self.frames.current().ok_or_else(|| {
            Violation::new(DiagnosticKind::InvalidOperand, "no active frame")
        })?;
        let cell = frame.slot(slot).ok_or_else(|| {
            Violation::new(
                DiagnosticKind::InvalidOperand,
                format!("no slot named '{}' in {}()", slot, frame.function),
            )
        })?;
        let ptr = PointerValue::to_slot(
            cell.address,
            elem_size.unwrap_or(cell.size),
            frame.id,
            slot,
        );
        self.bind(dest, Value::Pointer(ptr));
        Ok(())
    }

    pub(crate) fn dereference_read(
        &mut self,
        index: usize,
        dest: &str,
        ptr_name: &str,
    ) -> Result<(), Violation> {
        let ptr = self.pointer_operand(ptr_name)?;
        let len = ptr.elem_size;
        Diagnostics::check_access(ptr_name, &ptr, len, &self.heap, &self.frames)?;

        if self.config().uninitialized_read_severity().is_some() {
            if let Err(violation) = Diagnostics::check_initialized(ptr_name, &ptr, len, &self.space)
            {
                let severity = self.severity_of(violation.kind);
                if severity == Severity::Fatal {
                    return Err(violation);
                }
                // Warnings do not stop the read; the garbage bytes are loaded
                self.diagnostics.record(index, violation, severity);
            }
        }

        let value = self.load_value(ptr.target, len)?;
        self.bind(dest, value);
        Ok(())
    }

    pub(crate) fn dereference_write(
        &mut self,
        ptr_name: &str,
        operand: &Operand,
    ) -> Result<(), Violation> {
        let ptr = self.pointer_operand(ptr_name)?;
        Diagnostics::check_access(ptr_name, &ptr, ptr.elem_size, &self.heap, &self.frames)?;
        let value = self.value_operand(operand)?;
        self.store_value(ptr_name, ptr.target, ptr.elem_size, &value)
    }

    /// `dest = src + offset`; never diagnosed, only dereferences are
    pub(crate) fn pointer_add(&mut self, dest: &str, src: &str, offset: i64) -> Result<(), Violation> {
        let ptr = self.pointer_operand(src)?;
        self.bind(dest, Value::Pointer(ptr.add(offset)));
        Ok(())
    }

    pub(crate) fn field_access(
        &mut self,
        dest: &str,
        src: &str,
        offset: u64,
        size: usize,
    ) -> Result<(), Violation> {
        let ptr = self.pointer_operand(src)?;
        self.bind(dest, Value::Pointer(ptr.field(offset, size)));
        Ok(())
    }

    /// The pointer currently bound to `name`
    pub(crate) fn pointer_operand(&self, name: &str) -> Result<PointerValue, Violation> {
        match self.registers.get(name) {
            Some(Value::Pointer(ptr)) => Ok(ptr.clone()),
            Some(Value::Int(n)) => Err(Violation::new(
                DiagnosticKind::InvalidOperand,
                format!("'{}' holds the integer {}, not a pointer", name, n),
            )),
            None => Err(unbound(name)),
        }
    }

    pub(crate) fn value_operand(&self, operand: &Operand) -> Result<Value, Violation> {
        match operand {
            Operand::Const(n) => Ok(Value::Int(*n)),
            Operand::Null => Ok(Value::Pointer(PointerValue::null(1))),
            Operand::Handle(name) => self.registers.get(name).cloned().ok_or_else(|| unbound(name)),
        }
    }

    /// Write `value` into `width` bytes at `addr`
    fn store_value(
        &mut self,
        subject: &str,
        addr: Address,
        width: usize,
        value: &Value,
    ) -> Result<(), Violation> {
        check_storable(subject, width, value).map_err(|violation| violation.at(addr))?;
        match value {
            Value::Int(n) => {
                // Width already checked
                if let Some(bytes) = encode_int(*n, width) {
                    self.space.write(addr, &bytes)?;
                }
            }
            Value::Pointer(ptr) => self.space.store_pointer(addr, ptr)?,
        }
        Ok(())
    }

    /// Read `width` bytes at `addr`, recovering a stored pointer if there is one
    fn load_value(&self, addr: Address, width: usize) -> Result<Value, Violation> {
        if width == POINTER_SIZE {
            if let Some(ptr) = self.space.load_pointer(addr) {
                return Ok(Value::Pointer(ptr.clone()));
            }
        }
        let bytes = self.space.read(addr, width)?;
        decode_int(bytes).map(Value::Int).ok_or_else(|| {
            Violation::new(
                DiagnosticKind::InvalidOperand,
                format!("cannot read {} bytes as a scalar", width),
            )
            .at(addr)
        })
    }
}

/// Whether `value` fits a `width`-byte location named `subject`
pub(crate) fn check_storable(subject: &str, width: usize, value: &Value) -> Result<(), Violation> {
    match value {
        Value::Int(_) if encode_int(0, width).is_none() => Err(Violation::new(
            DiagnosticKind::InvalidOperand,
            format!(
                "cannot store an integer through '{}' into {} bytes",
                subject, width
            ),
        )),
        Value::Pointer(_) if width != POINTER_SIZE => Err(Violation::new(
            DiagnosticKind::InvalidOperand,
            format!(
                "a pointer needs {} bytes but '{}' is {} bytes wide",
                POINTER_SIZE, subject, width
            ),
        )),
        _ => Ok(()),
    }
}

fn unbound(name: &str) -> Violation {
    Violation::new(
        DiagnosticKind::InvalidOperand,
        format!("'{}' has no value; the instruction that defines it did not complete", name),
    )
}

#[cfg(test)]
mod tests {
    use crate::config::SimConfig;
    use crate::diagnostics::{DiagnosticKind, Severity};
    use crate::interpreter::engine::Simulator;
    use crate::memory::pointer::Provenance;
    use crate::memory::value::Value;
    use crate::program::parse_listing;

    fn run(source: &str) -> (Simulator, crate::diagnostics::SimulationReport) {
        run_with(source, SimConfig::default())
    }

    fn run_with(source: &str, config: SimConfig) -> (Simulator, crate::diagnostics::SimulationReport) {
        let mut sim = Simulator::new(parse_listing(source).unwrap(), config).unwrap();
        let report = sim.run();
        (sim, report)
    }

    #[test]
    fn test_write_then_read_through_slot_pointer() {
        let (sim, report) = run(
            "declare x 4\n\
             addr p x\n\
             write p -7\n\
             read v p\n",
        );
        assert!(report.findings.is_empty());
        assert_eq!(sim.register("v"), Some(&Value::Int(-7)));
    }

    #[test]
    fn test_narrow_write_truncates() {
        let (sim, report) = run(
            "declare c 1\n\
             addr p c\n\
             write p 0x1ff\n\
             read v p\n",
        );
        assert!(report.findings.is_empty());
        assert_eq!(sim.register("v"), Some(&Value::Int(-1)));
    }

    #[test]
    fn test_pointer_round_trips_through_memory() {
        let (sim, report) = run(
            "malloc q 4 elem 4\n\
             declare slot 8\n\
             addr pp slot\n\
             write pp q\n\
             read back pp\n\
             write back 9\n\
             read v q\n\
             free q\n",
        );
        assert!(report.findings.is_empty(), "{}", report);
        let Some(Value::Pointer(back)) = sim.register("back") else {
            panic!("expected a pointer");
        };
        assert!(matches!(back.provenance, Provenance::Heap { block: 0, .. }));
        assert_eq!(sim.register("v"), Some(&Value::Int(9)));
    }

    #[test]
    fn test_pointer_into_narrow_slot_rejected() {
        let (_, report) = run(
            "malloc q 4\n\
             declare small 4\n\
             addr p small\n\
             write p q\n",
        );
        assert_eq!(report.terminal_finding().unwrap().kind, DiagnosticKind::InvalidOperand);
    }

    #[test]
    fn test_uninitialized_slot_read_warns() {
        let (sim, report) = run(
            "declare x 4\n\
             addr p x\n\
             read v p\n",
        );
        assert_eq!(report.count(DiagnosticKind::UninitializedRead), 1);
        assert_eq!(report.findings[0].severity, Severity::Warning);
        assert_eq!(report.findings[0].index, 2);
        assert!(report.halted_at.is_none());
        assert!(sim.register("v").is_some());
    }

    #[test]
    fn test_uninitialized_read_can_be_fatal_or_silent() {
        let source = "declare x 4\naddr p x\nread v p\n";

        let strict = SimConfig {
            uninitialized_reads_fatal: true,
            ..SimConfig::default()
        };
        let (sim, report) = run_with(source, strict);
        assert_eq!(report.halted_at, Some(2));
        assert!(sim.register("v").is_none());

        let quiet = SimConfig {
            report_uninitialized_reads: false,
            ..SimConfig::default()
        };
        let (_, report) = run_with(source, quiet);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_field_access_bounds() {
        let (_, report) = run(
            "malloc s 8\n\
             field a s 0 4\n\
             field b s 4 4\n\
             write a 1\n\
             write b 2\n\
             field c s 6 4\n\
             write c 3\n",
        );
        assert_eq!(report.findings.len(), 1);
        let finding = &report.findings[0];
        assert_eq!(finding.kind, DiagnosticKind::OutOfBounds);
        assert_eq!(finding.index, 6);
    }

    #[test]
    fn test_dereference_integer_handle() {
        let (_, report) = run(
            "declare x 4 = 3\n\
             addr p x\n\
             read v p\n\
             read w v\n",
        );
        let finding = report.terminal_finding().unwrap();
        assert_eq!(finding.kind, DiagnosticKind::InvalidOperand);
        assert!(finding.message.contains("not a pointer"));
    }

    #[test]
    fn test_null_dereference() {
        let (_, report) = run(
            "declare slot 8 = NULL\n\
             addr pp slot\n\
             read p pp\n\
             write p 1\n",
        );
        assert_eq!(report.terminal_finding().unwrap().kind, DiagnosticKind::NullPointerDeref);
        assert_eq!(report.halted_at, Some(3));
    }

    #[test]
    fn test_rejected_write_leaves_memory_untouched() {
        let config = SimConfig {
            halt_on_first_fatal: false,
            ..SimConfig::default()
        };
        let (sim, report) = run_with(
            "declare x 4 = 1\n\
             addr p x\n\
             add q p 1\n\
             write q 5\n\
             read v p\n",
            config,
        );
        assert_eq!(report.count(DiagnosticKind::OutOfBounds), 1);
        assert_eq!(sim.register("v"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_faulting_declare_takes_no_stack() {
        let config = SimConfig {
            halt_on_first_fatal: false,
            ..SimConfig::default()
        };
        let (sim, report) = run_with(
            "malloc q 4\n\
             declare s 4 = q\n\
             addr p s\n\
             free q\n",
            config,
        );
        let first = &report.findings[0];
        assert_eq!(first.kind, DiagnosticKind::InvalidOperand);
        assert_eq!(first.index, 1);
        // The slot was never created, so taking its address fails too
        assert_eq!(report.findings_at(2).count(), 1);
        assert!(sim.register("p").is_none());
        assert!(sim.frames().current().unwrap().slot("s").is_none());
        assert_eq!(sim.space().stack_in_use(), 0);
    }
}
