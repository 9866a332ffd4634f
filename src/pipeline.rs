// This module drives one function through the whole backend: the linked IR blocks are
// turned into a CFG, the CFG is checked for integrity, dominators are computed, the CFG
// is rewritten into SSA form and validated, every SSA variable is mapped onto the
// 16-register VM and the stack frame is laid out with room for the allocator's spill
// slots. Register parameters are pinned to their ABI argument registers before any other
// variable is allocated, so the allocator never hands an argument register to someone
// else while the argument is live. Stack parameters stay in their caller-pushed slots.
// Integrity and SSA validation problems are reported, not fatal, unless they were
// already fatal in the CFG builder. Frame layout violations are reported too, and only turn into an error when
// the options ask for a strict layout. Every stage records its counts in the session.

//! End-to-end compilation of one IR function.

use crate::analysis::{
    DominatorAnalysis, SsaGraphBuilder, SsaReport, SsaValidationReport, SsaValidator,
};
use crate::cfg::{Cfg, CfgBuilder, IntegrityChecker, IntegrityReport};
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::ir::IrFunction;
use crate::vm16::abi::{self, ArgLocation, CCAssigner, Vm16Assigner};
use crate::vm16::{
    AllocatorConfig, FrameLayout, FunctionFrame, LinearScanAllocator, Location, Reg,
};
use log::{debug, info, warn};
use std::collections::HashSet;

/// Pipeline configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub allocator: AllocatorConfig,
    /// Fail with [`CompileError::Layout`](crate::core::error::CompileError::Layout)
    /// instead of reporting layout violations.
    pub strict_layout: bool,
}

/// Everything the backend computed for one function.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: String,
    /// CFG in SSA form.
    pub cfg: Cfg,
    pub integrity: IntegrityReport,
    pub dominators: DominatorAnalysis,
    pub ssa: SsaReport,
    pub ssa_validation: SsaValidationReport,
    pub allocator: LinearScanAllocator,
    /// SSA variables in allocation order with their final location.
    pub locations: Vec<(String, Location)>,
    /// Incoming location of each parameter.
    pub params: Vec<(String, ArgLocation)>,
    /// Callee-saved registers to preserve, with their fp-relative save slot.
    pub saved_registers: Vec<(Reg, i32)>,
    pub frame: FrameLayout,
}

impl CompiledFunction {
    pub fn location(&self, var: &str) -> Option<Location> {
        self.allocator.location(var)
    }
}

/// Compile a single function.
pub fn compile_function(
    session: &CompilationSession,
    func: &IrFunction,
    options: &PipelineOptions,
) -> CompileResult<CompiledFunction> {
    session.set_current_function(func.name());
    info!("compiling function {}", func.name());

    let mut cfg = CfgBuilder::build(func)?;
    session.record_cfg_built(cfg.len(), cfg.edges().len());

    let integrity = IntegrityChecker::check(&cfg);
    for issue in integrity.errors() {
        warn!("{}: {}", func.name(), issue);
    }

    let (dominators, ssa) = SsaGraphBuilder::construct(&mut cfg)?;
    session.record_phis_inserted(ssa.phi_count());
    let ssa_validation = SsaValidator::validate(&cfg, &dominators);
    if !ssa_validation.is_valid() {
        warn!(
            "{}: SSA form has {} issue(s)",
            func.name(),
            ssa_validation.len()
        );
    }

    let mut allocator = LinearScanAllocator::new(options.allocator);
    let params = pin_parameters(session, func, &mut allocator)?;
    let stack_params: HashSet<&str> = params
        .iter()
        .filter(|(_, location)| matches!(location, ArgLocation::Stack { .. }))
        .map(|(name, _)| name.as_str())
        .collect();
    let locations = allocate_variables(session, &cfg, &stack_params, &mut allocator)?;

    let saved_registers = allocator
        .used_callee_saved()
        .into_iter()
        .filter_map(|reg| abi::saved_register_offset(reg).map(|offset| (reg, offset)))
        .collect();

    let spill_slots = allocator.spill_slots_used();
    let nlocals = func
        .nlocals()
        .checked_add(spill_slots)
        .ok_or(CompileError::OutOfBounds {
            what: "spill slot",
            index: spill_slots,
            limit: u32::MAX - func.nlocals(),
        })?;
    let frame = FunctionFrame::new(func.name(), func.nargs(), nlocals).layout();
    if !frame.is_valid() {
        session.record_layout_violations(frame.violations.len());
        for violation in &frame.violations {
            warn!("{}: {}", func.name(), violation);
        }
    }
    let frame = if options.strict_layout {
        frame.into_result()?
    } else {
        frame
    };

    debug!(
        "{}: {} blocks, {} phis, {} registers, {} spill slots, frame {} bytes",
        func.name(),
        cfg.len(),
        ssa.phi_count(),
        allocator.allocated_register_count(),
        allocator.spill_slots_used(),
        frame.frame_size
    );
    session.record_function_compiled(func.name(), cfg.len());
    session.clear_function_state();

    Ok(CompiledFunction {
        name: func.name().to_string(),
        cfg,
        integrity,
        dominators,
        ssa,
        ssa_validation,
        allocator,
        locations,
        params,
        saved_registers,
        frame,
    })
}

/// Compile every function, stopping at the first error.
pub fn compile_all(
    session: &CompilationSession,
    funcs: &[IrFunction],
    options: &PipelineOptions,
) -> CompileResult<Vec<CompiledFunction>> {
    funcs
        .iter()
        .map(|func| compile_function(session, func, options))
        .collect()
}

/// Bind register parameters to their argument registers.
fn pin_parameters(
    session: &CompilationSession,
    func: &IrFunction,
    allocator: &mut LinearScanAllocator,
) -> CompileResult<Vec<(String, ArgLocation)>> {
    let mut cc = Vm16Assigner::new();
    let mut params = Vec::with_capacity(func.params().len());
    for name in func.params() {
        let location = cc.assign_arg();
        if let ArgLocation::Register(reg) = location {
            allocator.force_allocate(name, reg)?;
            session.record_register_allocated();
        }
        params.push((name.clone(), location));
    }
    Ok(params)
}

/// Allocate each SSA variable once, walking blocks in reverse post-order.
/// Incoming stack parameters are read from their slots and get no location.
fn allocate_variables(
    session: &CompilationSession,
    cfg: &Cfg,
    stack_params: &HashSet<&str>,
    allocator: &mut LinearScanAllocator,
) -> CompileResult<Vec<(String, Location)>> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for id in cfg.reverse_post_order() {
        let Some(block) = cfg.block(id) else {
            continue;
        };
        for inst in block.instructions() {
            for var in inst.uses().into_iter().chain(inst.def()) {
                if !var.is_versioned() && stack_params.contains(var.name.as_str()) {
                    continue;
                }
                let name = var.to_string();
                if seen.insert(name.clone()) {
                    order.push(name);
                }
            }
        }
    }

    let mut locations = Vec::with_capacity(order.len());
    for name in order {
        let fresh = allocator.location(&name).is_none();
        let location = allocator.allocate(&name)?;
        if fresh && !location.is_spilled() {
            session.record_register_allocated();
        }
        locations.push((name, location));
    }

    session.record_spills_generated(allocator.spill_slots_used() as usize);

    // evictions move earlier variables to the stack
    for (name, location) in &mut locations {
        if let Some(current) = allocator.location(name) {
            *location = current;
        }
    }
    Ok(locations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tir::parse_ir;

    fn compile(text: &str, options: PipelineOptions) -> CompileResult<CompiledFunction> {
        let _ = env_logger::builder().is_test(true).try_init();
        let funcs = parse_ir(text)?;
        let session = CompilationSession::new();
        compile_function(&session, &funcs[0], &options)
    }

    #[test]
    fn test_compile_diamond() {
        let text = r#"
func max(a, b) {
entry:
    c = gt a, b
    condbr c, ^then, ^else
then:
    r = a
    br ^merge
else:
    r = b
    br ^merge
merge:
    ret r
}
"#;
        let compiled = compile(text, PipelineOptions::default()).unwrap();
        assert_eq!(compiled.ssa.phi_count(), 1);
        assert_eq!(
            compiled.params,
            vec![
                ("a".to_string(), ArgLocation::Register(Reg::new(2))),
                ("b".to_string(), ArgLocation::Register(Reg::new(3))),
            ]
        );
        assert_eq!(compiled.location("a"), Some(Location::Register(Reg::new(2))));
        // first non-parameter variable takes s0
        assert_eq!(compiled.locations[2].0, "c@1");
        assert_eq!(compiled.locations[2].1, Location::Register(Reg::new(8)));
        assert!(compiled.location("r@3").is_some());
        assert!(compiled.integrity.is_valid());
        assert!(compiled.frame.is_valid());
        assert_eq!(compiled.frame.frame_size, 96);
        assert!(compiled.saved_registers.contains(&(Reg::new(8), -12)));
    }

    #[test]
    fn test_spills_grow_the_frame() {
        let mut text = String::from("func big() {\n");
        for i in 0..16 {
            text.push_str(&format!("    v{} = {}\n", i, i));
        }
        text.push_str("    ret v0\n}\n");

        let compiled = compile(&text, PipelineOptions::default()).unwrap();
        assert_eq!(compiled.allocator.spill_slots_used(), 3);
        assert_eq!(compiled.frame.locals.len(), 16 + 3);
        let spilled = compiled
            .locations
            .iter()
            .filter(|(_, loc)| loc.is_spilled())
            .count();
        assert_eq!(spilled, 3);
    }

    #[test]
    fn test_spill_limit_exhausts() {
        let mut text = String::from("func big() {\n");
        for i in 0..14 {
            text.push_str(&format!("    v{} = 1\n", i));
        }
        text.push_str("    ret\n}\n");

        let options = PipelineOptions {
            allocator: AllocatorConfig {
                prefer_callee_saved: true,
                max_spill_slots: Some(0),
            },
            strict_layout: false,
        };
        let err = compile(&text, options).unwrap_err();
        assert!(matches!(err, CompileError::AllocationExhausted { .. }));
    }

    #[test]
    fn test_stack_parameters_are_not_allocated() {
        let text = "func many(a, b, c, d, e, f, g) {\n    x = add f, g\n    ret x\n}\n";
        let compiled = compile(text, PipelineOptions::default()).unwrap();
        assert_eq!(compiled.params[6].1, ArgLocation::Stack { index: 6 });
        assert_eq!(compiled.location("f"), Some(Location::Register(Reg::new(7))));
        assert_eq!(compiled.location("g"), None);
        assert!(compiled.locations.iter().all(|(name, _)| name != "g"));
        // g did not consume s0
        assert_eq!(compiled.location("x@1"), Some(Location::Register(Reg::new(8))));
    }

    #[test]
    fn test_spill_slots_past_local_limit_fail() {
        let mut text = String::from("func big() locals 4294967295 {\n");
        for i in 0..16 {
            text.push_str(&format!("    v{} = {}\n", i, i));
        }
        text.push_str("    ret v0\n}\n");

        let err = compile(&text, PipelineOptions::default()).unwrap_err();
        assert_eq!(
            err,
            CompileError::OutOfBounds {
                what: "spill slot",
                index: 3,
                limit: 0
            }
        );
    }

    #[test]
    fn test_ssa_is_validated() {
        let text = "func loop(n) {\ne:\n    i = 0\n    br ^h\nh:\n    c = lt i, n\n    condbr c, ^b, ^x\nb:\n    i = add i, 1\n    br ^h\nx:\n    ret i\n}\n";
        let compiled = compile(text, PipelineOptions::default()).unwrap();
        assert!(compiled.ssa_validation.is_valid(), "{}", compiled.ssa_validation);
    }

    #[test]
    fn test_session_statistics() {
        let _ = env_logger::builder().is_test(true).try_init();
        let funcs = parse_ir("func a() {\n    x = 1\n    ret x\n}\nfunc b(p) {\n    ret p\n}\n").unwrap();
        let session = CompilationSession::new();
        let compiled = compile_all(&session, &funcs, &PipelineOptions::default()).unwrap();
        assert_eq!(compiled.len(), 2);

        let stats = session.stats();
        assert_eq!(stats.functions_compiled, 2);
        assert_eq!(stats.blocks_built, 2);
        // x@1 and the pinned parameter p
        assert_eq!(stats.registers_allocated, 2);
        assert_eq!(session.current_function(), None);
    }
}
