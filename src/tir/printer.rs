//! Text rendering of IR functions and pipeline results.
//!
//! Output is organised in named sections (`CFG for max` ... `End CFG`) so
//! that FileCheck directives can anchor on a section with `CHECK-LABEL`.

use crate::cfg::CfgBuilder;
use crate::core::error::CompileResult;
use crate::ir::IrFunction;
use crate::pipeline::CompiledFunction;
use crate::vm16::abi::{self, ArgLocation};
use std::fmt::Write as _;

/// Which sections [`render`] emits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrintOptions {
    pub ir: bool,
    pub cfg: bool,
    pub integrity: bool,
    pub rpo: bool,
    pub dom: bool,
    pub ssa: bool,
    pub alloc: bool,
    pub frame: bool,
    pub dot: bool,
}

impl PrintOptions {
    /// Enable the section named by a `--print-*` flag. Returns false for an
    /// unknown flag.
    pub fn enable(&mut self, flag: &str) -> bool {
        let slot = match flag {
            "--print-ir" => &mut self.ir,
            "--print-cfg" => &mut self.cfg,
            "--print-integrity" => &mut self.integrity,
            "--print-rpo" => &mut self.rpo,
            "--print-dom" => &mut self.dom,
            "--print-ssa" => &mut self.ssa,
            "--print-alloc" => &mut self.alloc,
            "--print-frame" => &mut self.frame,
            "--dot" => &mut self.dot,
            _ => return false,
        };
        *slot = true;
        true
    }
}

/// Linked IR of `func`, before CFG construction.
pub fn print_function(func: &IrFunction) -> String {
    let mut out = String::new();
    let _ = write!(out, "func {}({})", func.name(), func.params().join(", "));
    let _ = write!(out, " locals {}", func.nlocals());
    if func.entry() != 0 {
        let _ = write!(out, " entry L{}", func.entry());
    }
    out.push_str(" {\n");

    for block in func.blocks() {
        let _ = write!(out, "L{}:", block.id());
        if let Some(label) = block.label() {
            let _ = write!(out, " ; {}", label);
        }
        out.push('\n');
        for inst in block.instructions() {
            let _ = writeln!(out, "    {}", inst);
        }
        if !block.successors().is_empty() {
            let succs: Vec<String> = block.successors().iter().map(|s| format!("L{}", s)).collect();
            let _ = writeln!(out, "    ; succs = {}", succs.join(" "));
        }
    }
    out.push_str("}\n");
    out
}

/// Render the requested sections for one compiled function.
pub fn render(
    func: &IrFunction,
    compiled: &CompiledFunction,
    options: &PrintOptions,
) -> CompileResult<String> {
    let name = func.name();
    let mut out = String::new();

    if options.ir {
        let _ = writeln!(out, "IR for {}", name);
        out.push_str(&print_function(func));
        let _ = writeln!(out, "End IR");
    }

    if options.cfg || (options.dot && !options.ssa) {
        // the compiled CFG is already in SSA form
        let cfg = CfgBuilder::build(func)?;
        if options.cfg {
            let _ = writeln!(out, "CFG for {}", name);
            let _ = write!(out, "{}", cfg);
            let _ = writeln!(out, "End CFG");
        }
        if options.dot && !options.ssa {
            out.push_str(&cfg.to_dot(name));
        }
    }

    if options.integrity {
        let _ = writeln!(out, "Integrity for {}", name);
        let _ = write!(out, "{}", compiled.integrity);
    }

    if options.rpo {
        let _ = writeln!(out, "RPO for {}", name);
        for (idx, id) in compiled.cfg.reverse_post_order().iter().enumerate() {
            let label = compiled
                .cfg
                .block(*id)
                .and_then(|b| b.label())
                .map(|l| format!(" ({})", l))
                .unwrap_or_default();
            let _ = writeln!(out, "{}: L{}{}", idx, id, label);
        }
        let _ = writeln!(out, "End RPO");
    }

    if options.dom {
        let _ = writeln!(out, "Dominators for {}", name);
        let _ = write!(out, "{}", compiled.dominators);
        let _ = writeln!(out, "End Dominators");
        if options.dot {
            out.push_str(&compiled.dominators.to_dot());
        }
    }

    if options.ssa {
        let _ = writeln!(out, "SSA for {}", name);
        let _ = write!(out, "{}", compiled.cfg);
        let _ = writeln!(out, "End SSA");
        if options.dot {
            out.push_str(&compiled.cfg.to_dot(name));
        }
    }

    if options.alloc {
        let _ = writeln!(out, "Allocation for {}", name);
        for (param, location) in &compiled.params {
            match location {
                ArgLocation::Register(reg) => {
                    let _ = writeln!(out, "param {}: {} ({})", param, reg, abi::abi_name(*reg));
                }
                ArgLocation::Stack { index } => {
                    let _ = writeln!(out, "param {}: stack {}", param, index);
                }
            }
        }
        for (var, location) in &compiled.locations {
            let _ = writeln!(out, "{}: {}", var, location);
        }
        for (reg, offset) in &compiled.saved_registers {
            let _ = writeln!(out, "save {} at fp{:+}", abi::abi_name(*reg), offset);
        }
        let _ = writeln!(out, "End Allocation");
    }

    if options.frame {
        let _ = write!(out, "{}", compiled.frame);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::CompilationSession;
    use crate::pipeline::{compile_function, PipelineOptions};
    use crate::tir::parse_ir;

    const LOOP: &str = r#"
func count(n) {
entry:
    i = 0
    br ^head
head:
    c = lt i, n
    condbr c, ^body, ^exit
body:
    i = add i, 1
    br ^head
exit:
    ret i
}
"#;

    #[test]
    fn test_print_function() {
        let funcs = parse_ir(LOOP).unwrap();
        let text = print_function(&funcs[0]);
        assert!(text.starts_with("func count(n) locals 2 {\n"));
        assert!(text.contains("L1: ; head\n    c = lt i, n\n    condbr c, L2, L3\n    ; succs = L2 L3\n"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_render_sections() {
        let funcs = parse_ir(LOOP).unwrap();
        let session = CompilationSession::new();
        let compiled = compile_function(&session, &funcs[0], &PipelineOptions::default()).unwrap();

        let mut options = PrintOptions::default();
        assert!(options.enable("--print-ssa"));
        assert!(options.enable("--print-alloc"));
        assert!(!options.enable("--print-everything"));

        let text = render(&funcs[0], &compiled, &options).unwrap();
        assert!(text.contains("SSA for count\n"));
        assert!(text.contains("i@2 = phi [L0: i@1], [L2: i@3]"));
        assert!(text.contains("param n: r2 (a0)\n"));
        assert!(text.contains("End Allocation\n"));
        assert!(!text.contains("CFG for count"));
    }
}
