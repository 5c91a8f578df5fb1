// Property tests for pointer arithmetic, bounds and heap bookkeeping

use memsim::config::SimConfig;
use memsim::diagnostics::{DiagnosticKind, SimulationReport};
use memsim::interpreter::Simulator;
use memsim::memory::value::Value;
use memsim::program::parse_listing;
use proptest::prelude::*;

fn execute(source: &str) -> (Simulator, SimulationReport) {
    let program = parse_listing(source).expect("generated listing must parse");
    let mut simulator = Simulator::new(program, SimConfig::default()).expect("setup");
    let report = simulator.run();
    (simulator, report)
}

fn elem_size() -> impl Strategy<Value = usize> {
    prop_oneof![Just(1usize), Just(2), Just(4), Just(8)]
}

proptest! {
    #[test]
    fn pointer_add_is_reversible(elem in elem_size(), count in 1usize..32, n in -4096i64..4096) {
        let source = format!(
            "malloc p {size} elem {elem}\n\
             write p 7\n\
             add q p {n}\n\
             add r q {back}\n\
             read v r\n\
             free p\n",
            size = elem * count,
            elem = elem,
            n = n,
            back = -n,
        );
        let (sim, report) = execute(&source);
        prop_assert!(report.findings.is_empty(), "{}", report);
        prop_assert_eq!(sim.register("v"), Some(&Value::Int(7)));
    }

    #[test]
    fn access_past_either_end_is_out_of_bounds(size in 1usize..256, below in any::<bool>()) {
        let step = if below { -1 } else { size as i64 };
        let source = format!(
            "malloc p {size}\n\
             add q p {step}\n\
             write q 1\n",
            size = size,
            step = step,
        );
        let (_, report) = execute(&source);
        let finding = report.terminal_finding().unwrap();
        prop_assert_eq!(finding.kind, DiagnosticKind::OutOfBounds);
        prop_assert_eq!(finding.index, 2);
    }

    #[test]
    fn last_byte_is_in_bounds(size in 1usize..256) {
        let source = format!(
            "malloc p {size}\n\
             add q p {last}\n\
             write q 1\n\
             read v q\n\
             free p\n",
            size = size,
            last = size - 1,
        );
        let (_, report) = execute(&source);
        prop_assert!(report.findings.is_empty(), "{}", report);
    }

    #[test]
    fn unfreed_blocks_are_leaks(sizes in prop::collection::vec(1usize..64, 1..12), freed in 0usize..12) {
        let freed = freed.min(sizes.len());
        let mut source = String::new();
        for (i, size) in sizes.iter().enumerate() {
            source.push_str(&format!("malloc b{} {}\n", i, size));
        }
        for i in 0..freed {
            source.push_str(&format!("free b{}\n", i));
        }
        let (_, report) = execute(&source);

        prop_assert_eq!(report.count(DiagnosticKind::MemoryLeak), sizes.len() - freed);
        prop_assert_eq!(report.leaked_bytes(), sizes[freed..].iter().sum::<usize>());
        prop_assert!(!report.has_fatal());
    }

    #[test]
    fn second_free_is_one_double_free(size in 1usize..128, extra in 0usize..4) {
        // Unrelated allocations in between must not hide the stale pointer
        let mut source = format!("malloc p {}\ndeclare keep 8 = p\nfree p\n", size);
        for i in 0..extra {
            source.push_str(&format!("malloc filler{} {}\n", i, size));
        }
        source.push_str("addr slot keep\nread q slot\nfree q\n");
        let (_, report) = execute(&source);

        prop_assert_eq!(report.count(DiagnosticKind::DoubleFree), 1);
        prop_assert_eq!(report.findings.len(), 1);
        prop_assert_eq!(report.halted_at, Some(5 + extra));
    }

    #[test]
    fn stack_pointer_dangles_only_after_return(value in any::<i32>(), use_inside in any::<bool>()) {
        let source = if use_inside {
            format!("call f -> r\ndeclare x 4 = {}\naddr p x\nread v p\nret p\n", value)
        } else {
            format!("call f -> r\ndeclare x 4 = {}\naddr p x\nret p\nread v r\n", value)
        };
        let (sim, report) = execute(&source);

        if use_inside {
            prop_assert!(report.findings.is_empty(), "{}", report);
            prop_assert_eq!(sim.register("v"), Some(&Value::Int(value as i64)));
        } else {
            prop_assert_eq!(report.count(DiagnosticKind::DanglingPointerDeref), 1);
            prop_assert_eq!(report.halted_at, Some(4));
        }
    }
}
