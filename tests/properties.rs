//! Invariants that must hold for any input, checked over a set of shapes.

use cymbol_backend::analysis::DominatorAnalysis;
use cymbol_backend::cfg::{Cfg, CfgBuilder};
use cymbol_backend::tir::parse_ir;
use cymbol_backend::vm16::frame::{calculate_frame_size, STACK_ALIGNMENT};
use cymbol_backend::vm16::{AllocatorConfig, LinearScanAllocator, Location};
use std::collections::BTreeMap;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const SHAPES: &[&str] = &[
    // straight line
    "func line() {\na:\n    x = 1\nb:\n    y = x\nc:\n    ret y\n}\n",
    // diamond
    "func diamond(c) {\ne:\n    condbr c, ^t, ^f\nt:\n    br ^m\nf:\n    br ^m\nm:\n    ret\n}\n",
    // while loop
    "func loop(n) {\ne:\n    i = 0\n    br ^h\nh:\n    c = lt i, n\n    condbr c, ^b, ^x\nb:\n    i = add i, 1\n    br ^h\nx:\n    ret i\n}\n",
    // nested loops with an early exit
    r#"func nested(n) {
e:
    i = 0
    br ^oh
oh:
    c = lt i, n
    condbr c, ^ih, ^out
ih:
    j = 0
    d = lt j, i
    condbr d, ^ib, ^ol
ib:
    j = add j, 1
    q = eq j, 7
    condbr q, ^out, ^ih
ol:
    i = add i, 1
    br ^oh
out:
    ret i
}
"#,
    // self loop and an unreachable block
    "func odd() {\ne:\n    br ^s\ns:\n    condbr z, ^s, ^done\ndead:\n    ret 1\ndone:\n    ret 0\n}\n",
];

fn cfgs() -> Vec<Cfg> {
    SHAPES
        .iter()
        .map(|text| {
            let funcs = parse_ir(text).unwrap();
            CfgBuilder::build(&funcs[0]).unwrap()
        })
        .collect()
}

fn reachable(cfg: &Cfg) -> Vec<usize> {
    let mut ids = cfg.reverse_post_order();
    ids.sort_unstable();
    ids
}

#[test]
fn test_dominance_is_reflexive() {
    init();
    for cfg in cfgs() {
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();
        for id in 0..cfg.len() {
            assert!(dom.dominates(id, id), "L{} does not dominate itself", id);
        }
    }
}

#[test]
fn test_entry_has_no_idom_and_dominates_reachable_blocks() {
    init();
    for cfg in cfgs() {
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();
        assert_eq!(dom.immediate_dominator(0), None);
        for id in reachable(&cfg) {
            assert!(dom.dominates(0, id));
            if id != 0 {
                assert!(dom.immediate_dominator(id).is_some());
            }
        }
    }
}

#[test]
fn test_dominance_is_transitive() {
    init();
    for cfg in cfgs() {
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();
        let ids = reachable(&cfg);
        for &a in &ids {
            for &b in &ids {
                for &c in &ids {
                    if dom.dominates(a, b) && dom.dominates(b, c) {
                        assert!(dom.dominates(a, c), "L{} dom L{} dom L{}", a, b, c);
                    }
                }
            }
        }
    }
}

#[test]
fn test_idom_strictly_dominates() {
    init();
    for cfg in cfgs() {
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();
        for id in reachable(&cfg) {
            if let Some(parent) = dom.immediate_dominator(id) {
                assert!(dom.strictly_dominates(parent, id));
            }
        }
    }
}

#[test]
fn test_entry_frontier_is_empty() {
    init();
    for cfg in cfgs() {
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();
        assert!(dom.dominance_frontier(0).unwrap().is_empty());
    }
}

/// Every tracked variable has a register in 1..=15 or a stack slot, never both.
fn assert_three_states(alloc: &LinearScanAllocator, vars: &[String]) {
    for var in vars {
        let reg = alloc.register(var);
        let slot = alloc.spill_slot(var);
        assert!(!(reg.is_some() && slot.is_some()), "{} is both bound and spilled", var);
        if let Some(reg) = reg {
            assert!((1..=15).contains(&reg.id()));
            assert_ne!(reg.id(), 13);
            assert_ne!(reg.id(), 14);
        }
        assert_eq!(alloc.is_spilled(var), slot.is_some());
    }
}

#[test]
fn test_register_range_xor_spilled() {
    init();
    for prefer_callee_saved in [true, false] {
        let mut alloc = LinearScanAllocator::new(AllocatorConfig {
            prefer_callee_saved,
            max_spill_slots: None,
        });
        let vars: Vec<String> = (0..40).map(|i| format!("t{}", i)).collect();
        for (i, var) in vars.iter().enumerate() {
            alloc.allocate(var).unwrap();
            if i % 7 == 3 {
                alloc.free(&vars[i / 2]);
            }
            if i % 11 == 5 {
                alloc.spill_to_stack(&vars[i - 1]).unwrap();
            }
            assert_three_states(&alloc, &vars);
        }
    }
}

#[test]
fn test_free_then_allocate_may_change_register() {
    init();
    let mut alloc = LinearScanAllocator::default();
    let a = alloc.allocate("a").unwrap();
    alloc.allocate("b").unwrap();
    alloc.free("a");
    alloc.allocate("c").unwrap();
    let again = alloc.allocate("a").unwrap();
    // "c" took a's old register
    assert_ne!(a, again);
    assert!(matches!(again, Location::Register(_)));
}

#[test]
fn test_allocate_is_idempotent() {
    init();
    let mut alloc = LinearScanAllocator::default();
    let first = alloc.allocate("x").unwrap();
    assert_eq!(alloc.allocate("x").unwrap(), first);
    assert_eq!(alloc.allocated_register_count(), 1);
}

#[test]
fn test_spill_offsets_step_by_four() {
    init();
    let mut alloc = LinearScanAllocator::default();
    let offsets: Vec<i32> = (0..6)
        .map(|i| alloc.spill_to_stack(&format!("s{}", i)).unwrap())
        .collect();
    assert_eq!(offsets, vec![-16, -20, -24, -28, -32, -36]);

    // freed slots are not reused before reset
    alloc.free("s0");
    assert_eq!(alloc.spill_to_stack("late").unwrap(), -40);

    alloc.reset();
    assert_eq!(alloc.spill_to_stack("fresh").unwrap(), -16);
}

#[test]
fn test_frame_size_is_aligned() {
    init();
    let mut seen = BTreeMap::new();
    for nargs in 0..8 {
        for nlocals in 0..300 {
            let size = calculate_frame_size(nargs, nlocals);
            assert_eq!(size % STACK_ALIGNMENT, 0);
            assert!(size >= 8 + 8 * u64::from(nlocals) + 64);
            seen.insert(nlocals, size);
        }
    }
    // monotone in the number of locals
    let sizes: Vec<u64> = seen.values().copied().collect();
    assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_frame_size_is_aligned_for_large_counts() {
    init();
    let mut previous = 0;
    let counts = [
        u32::MAX / 16,
        u32::MAX / 8 - 1,
        u32::MAX / 8,
        u32::MAX / 4,
        u32::MAX - 1,
        u32::MAX,
    ];
    for nlocals in counts {
        let size = calculate_frame_size(3, nlocals);
        assert_eq!(size % STACK_ALIGNMENT, 0);
        assert!(size >= 8 + 12 * u64::from(nlocals));
        assert!(size >= previous);
        previous = size;
    }
}
