// Integration tests for the memory model simulator

use memsim::config::{ConfigError, SimConfig};
use memsim::diagnostics::{DiagnosticKind, Severity, SimulationReport};
use memsim::interpreter::{SetupError, Simulator};
use memsim::memory::value::Value;
use memsim::program::{parse_listing, Program, ProgramError};
use std::fs;
use std::path::PathBuf;

fn run_with(source: &str, config: SimConfig) -> (Simulator, SimulationReport) {
    let program = parse_listing(source).expect("Parsing failed");
    let mut simulator = Simulator::new(program, config).expect("Setup failed");
    let report = simulator.run();
    (simulator, report)
}

fn run(source: &str) -> (Simulator, SimulationReport) {
    run_with(source, SimConfig::default())
}

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn run_demo(name: &str) -> (Simulator, SimulationReport) {
    let source = fs::read_to_string(demo(name)).expect("demo missing");
    run(&source)
}

#[test]
fn test_use_after_free_at_final_instruction() {
    let (_, report) = run_demo("use_after_free.mem");

    assert_eq!(report.findings.len(), 1, "{}", report);
    let finding = &report.findings[0];
    assert_eq!(finding.kind, DiagnosticKind::UseAfterFree);
    assert_eq!(finding.severity, Severity::Fatal);
    assert_eq!(finding.index, 3);
    assert_eq!(report.halted_at, Some(3));
}

#[test]
fn test_dangling_pointer_after_return() {
    let (_, report) = run_demo("dangling.mem");

    assert_eq!(report.count(DiagnosticKind::DanglingPointerDeref), 1);
    assert_eq!(report.findings.len(), 1, "{}", report);
    let finding = report.terminal_finding().unwrap();
    assert_eq!(finding.index, 4);
    assert!(finding.message.contains("f()"));
}

#[test]
fn test_stack_pointer_valid_until_frame_pops() {
    let (sim, report) = run(
        "call f -> r\n\
         declare x 4 = 7\n\
         addr p x\n\
         read inside p\n\
         ret p\n",
    );
    assert!(report.findings.is_empty(), "{}", report);
    assert_eq!(sim.register("inside"), Some(&Value::Int(7)));
}

#[test]
fn test_array_indexing() {
    let (sim, report) = run_demo("array.mem");

    assert!(report.findings.is_empty(), "{}", report);
    assert_eq!(sim.register("second"), Some(&Value::Int(20)));
    assert_eq!(sim.register("third"), Some(&Value::Int(30)));
    assert_eq!(sim.register("first"), Some(&Value::Int(10)));
}

#[test]
fn test_leaks_reported_at_end() {
    let (_, report) = run_demo("leak.mem");

    assert_eq!(report.count(DiagnosticKind::MemoryLeak), 2);
    assert_eq!(report.leaks.len(), 2);
    assert_eq!(report.leaked_bytes(), 24);
    assert!(!report.has_fatal());
    assert!(report
        .of_kind(DiagnosticKind::MemoryLeak)
        .all(|finding| finding.index == 4 && finding.severity == Severity::Warning));
}

#[test]
fn test_double_free_through_copy() {
    let (_, report) = run_demo("double_free.mem");

    assert_eq!(report.count(DiagnosticKind::DoubleFree), 1);
    assert_eq!(report.findings.len(), 1, "{}", report);
    assert_eq!(report.halted_at, Some(5));
}

#[test]
fn test_linked_list_pointers_survive_memory() {
    let (sim, report) = run_demo("linked_list.mem");

    assert!(report.findings.is_empty(), "{}", report);
    assert_eq!(sim.register("v"), Some(&Value::Int(2)));
}

#[test]
fn test_overflow_into_neighbour_is_out_of_bounds() {
    let (_, report) = run_demo("overflow.mem");

    let finding = report.terminal_finding().unwrap();
    assert_eq!(finding.kind, DiagnosticKind::OutOfBounds);
    assert!(finding.message.contains("heap block #1"), "{}", finding.message);
}

#[test]
fn test_json_program() {
    let source = fs::read_to_string(demo("nested_calls.json")).unwrap();
    let program = Program::from_json(&source).unwrap();
    let mut sim = Simulator::new(program, SimConfig::default()).unwrap();
    let report = sim.run();

    assert!(report.findings.is_empty(), "{}", report);
    assert_eq!(sim.register("result"), Some(&Value::Int(5)));
    assert_eq!(sim.register("status"), Some(&Value::Int(0)));
}

#[test]
fn test_keep_going_records_every_fatal() {
    let config = SimConfig {
        halt_on_first_fatal: false,
        ..SimConfig::default()
    };
    let (_, report) = run_with(
        "malloc p 4 elem 4\n\
         free p\n\
         write p 1\n\
         free p\n\
         malloc q 4\n",
        config,
    );
    assert_eq!(report.count(DiagnosticKind::UseAfterFree), 1);
    assert_eq!(report.count(DiagnosticKind::DoubleFree), 1);
    assert_eq!(report.count(DiagnosticKind::MemoryLeak), 1);
    assert_eq!(report.instructions_executed, 5);
    assert!(report.halted_at.is_none());
}

#[test]
fn test_no_leak_scan_after_halt() {
    let (_, report) = run(
        "malloc p 4\n\
         malloc q 4\n\
         free p\n\
         free p\n",
    );
    assert_eq!(report.count(DiagnosticKind::MemoryLeak), 0);
    assert!(report.leaks.is_empty());
    assert_eq!(report.terminal_finding().unwrap().kind, DiagnosticKind::DoubleFree);
}

#[test]
fn test_static_errors_rejected_before_running() {
    let program = parse_listing("declare x 4\ndeclare x 4\n").unwrap();
    assert!(matches!(
        Simulator::new(program, SimConfig::default()),
        Err(SetupError::Program(ProgramError::DuplicateSlot { index: 1, .. }))
    ));

    let program = parse_listing("ret\n").unwrap();
    assert!(matches!(
        Simulator::new(program, SimConfig::default()),
        Err(SetupError::Program(ProgramError::UnbalancedReturn { index: 0 }))
    ));
}

#[test]
fn test_snapshot_per_instruction() {
    let program = parse_listing("malloc p 4\nwrite p 1\nfree p\n").unwrap();
    let mut sim = Simulator::new(program, SimConfig::default()).unwrap();
    sim.run();

    assert_eq!(sim.total_snapshots(), 4);
    let initial = sim.snapshot(0).unwrap();
    assert_eq!(initial.index, None);
    assert!(initial.blocks.is_empty());

    let after_write = sim.snapshot(2).unwrap();
    assert_eq!(after_write.index, Some(1));
    assert_eq!(after_write.blocks[0].contents, vec![Some(1), None, None, None]);

    let after_free = sim.snapshot(3).unwrap();
    assert!(!after_free.blocks[0].block.is_live());
    assert_eq!(after_free.heap_in_use, 0);
}

#[test]
fn test_report_text_and_json() {
    let (_, report) = run_demo("use_after_free.mem");

    let text = report.to_string();
    assert!(text.contains("instruction 3: fatal use after free"));
    assert!(text.contains("halted at instruction 3"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["findings"][0]["kind"], "UseAfterFree");
    assert_eq!(json["halted_at"], 3);
}

#[test]
fn test_config_file_overrides() {
    let config = SimConfig::from_json(r#"{ "heapCapacityBytes": 16 }"#).unwrap();
    assert_eq!(config.heap_capacity_bytes, 16);
    assert!(config.halt_on_first_fatal);

    let (_, report) = run_with("malloc p 32\n", config);
    assert_eq!(report.terminal_finding().unwrap().kind, DiagnosticKind::InvalidSize);
}

#[test]
fn test_oversized_capacities_rejected_before_setup() {
    let config = SimConfig {
        heap_capacity_bytes: usize::MAX,
        ..SimConfig::default()
    };
    assert!(matches!(
        Simulator::new(Program::default(), config),
        Err(SetupError::Config(ConfigError::CapacityTooLarge { .. }))
    ));

    let config = SimConfig {
        stack_capacity_bytes: 1 << 40,
        ..SimConfig::default()
    };
    assert!(Simulator::new(Program::default(), config).is_err());
}
