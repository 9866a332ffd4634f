// This module defines the intermediate representation consumed by the backend. The
// instruction set is a closed sum type: labels, unconditional and conditional jumps,
// assignments, returns, calls, binary and unary operations, and phi pseudo-instructions
// inserted by SSA construction. Operands are either variables or integer constants;
// variables carry an SSA version, where version 0 is the unrenamed incoming value and
// every renamed definition gets a positive version. Blocks refer to each other by dense
// integer ids rather than pointers, so a block can be cloned or printed on its own.
// Every analysis pass matches exhaustively on `Instruction`, which keeps block-kind
// derivation and def/use extraction total over the instruction set.

//! Intermediate representation: instructions, operands and SSA variables.

use std::fmt;

pub mod block;
pub mod function;

pub use block::{BasicBlock, BlockKind};
pub use function::IrFunction;

/// Dense block index, assigned once in creation order.
pub type BlockId = usize;

/// A (possibly versioned) variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var {
    pub name: String,
    pub version: u32,
}

impl Var {
    /// Unversioned variable as produced by the IR builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 0,
        }
    }

    pub fn versioned(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    pub fn is_versioned(&self) -> bool {
        self.version != 0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.version)
        }
    }
}

/// Instruction operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Var(Var),
    Const(i64),
}

impl Operand {
    pub fn var(name: impl Into<String>) -> Self {
        Operand::Var(Var::new(name))
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Operand::Var(v) => Some(v),
            Operand::Const(_) => None,
        }
    }

    fn as_var_mut(&mut self) -> Option<&mut Var> {
        match self {
            Operand::Var(v) => Some(v),
            Operand::Const(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(v) => write!(f, "{}", v),
            Operand::Const(c) => write!(f, "{}", c),
        }
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Const(value)
    }
}

impl From<Var> for Operand {
    fn from(value: Var) -> Self {
        Operand::Var(value)
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
            BinOp::Lt => "lt",
            BinOp::Le => "le",
            BinOp::Gt => "gt",
            BinOp::Ge => "ge",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Some(match s {
            "add" => BinOp::Add,
            "sub" => BinOp::Sub,
            "mul" => BinOp::Mul,
            "div" => BinOp::Div,
            "mod" => BinOp::Mod,
            "lt" => BinOp::Lt,
            "le" => BinOp::Le,
            "gt" => BinOp::Gt,
            "ge" => BinOp::Ge,
            "eq" => BinOp::Eq,
            "ne" => BinOp::Ne,
            "and" => BinOp::And,
            "or" => BinOp::Or,
            _ => return None,
        })
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Not,
}

impl UnOp {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            UnOp::Neg => "neg",
            UnOp::Not => "not",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        match s {
            "neg" => Some(UnOp::Neg),
            "not" => Some(UnOp::Not),
            _ => None,
        }
    }
}

/// One incoming value of a phi.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiOperand {
    pub pred: BlockId,
    pub value: Var,
}

/// Phi pseudo-instruction at the head of a merge block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phi {
    pub result: Var,
    /// One entry per predecessor, in predecessor order.
    pub operands: Vec<PhiOperand>,
}

impl Phi {
    pub fn new(result: Var) -> Self {
        Self {
            result,
            operands: Vec::new(),
        }
    }
}

/// IR instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Label(String),
    Jump(BlockId),
    CondJump {
        cond: Operand,
        then_target: BlockId,
        else_target: BlockId,
    },
    Assign {
        dest: Var,
        src: Operand,
    },
    Return(Option<Operand>),
    Call {
        dest: Option<Var>,
        func: String,
        args: Vec<Operand>,
    },
    Binary {
        dest: Var,
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
    },
    Unary {
        dest: Var,
        op: UnOp,
        operand: Operand,
    },
    Phi(Phi),
}

impl Instruction {
    pub fn assign(dest: &str, src: impl Into<Operand>) -> Self {
        Instruction::Assign {
            dest: Var::new(dest),
            src: src.into(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Jump(_) | Instruction::CondJump { .. } | Instruction::Return(_)
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Instruction::Phi(_))
    }

    /// Variable defined by this instruction, if any.
    pub fn def(&self) -> Option<&Var> {
        match self {
            Instruction::Assign { dest, .. }
            | Instruction::Binary { dest, .. }
            | Instruction::Unary { dest, .. } => Some(dest),
            Instruction::Call { dest, .. } => dest.as_ref(),
            Instruction::Phi(phi) => Some(&phi.result),
            Instruction::Label(_)
            | Instruction::Jump(_)
            | Instruction::CondJump { .. }
            | Instruction::Return(_) => None,
        }
    }

    pub fn def_mut(&mut self) -> Option<&mut Var> {
        match self {
            Instruction::Assign { dest, .. }
            | Instruction::Binary { dest, .. }
            | Instruction::Unary { dest, .. } => Some(dest),
            Instruction::Call { dest, .. } => dest.as_mut(),
            Instruction::Phi(phi) => Some(&mut phi.result),
            Instruction::Label(_)
            | Instruction::Jump(_)
            | Instruction::CondJump { .. }
            | Instruction::Return(_) => None,
        }
    }

    /// Variables read by this instruction, in operand order.
    pub fn uses(&self) -> Vec<&Var> {
        match self {
            Instruction::Label(_) | Instruction::Jump(_) | Instruction::Return(None) => Vec::new(),
            Instruction::CondJump { cond, .. } => cond.as_var().into_iter().collect(),
            Instruction::Assign { src, .. } => src.as_var().into_iter().collect(),
            Instruction::Return(Some(value)) => value.as_var().into_iter().collect(),
            Instruction::Call { args, .. } => args.iter().filter_map(Operand::as_var).collect(),
            Instruction::Binary { lhs, rhs, .. } => {
                lhs.as_var().into_iter().chain(rhs.as_var()).collect()
            }
            Instruction::Unary { operand, .. } => operand.as_var().into_iter().collect(),
            Instruction::Phi(phi) => phi.operands.iter().map(|op| &op.value).collect(),
        }
    }

    /// Visit every non-phi use mutably. Phi operands are filled by SSA
    /// construction and are not rewritten here.
    pub fn for_each_use_mut(&mut self, mut f: impl FnMut(&mut Var)) {
        match self {
            Instruction::Label(_)
            | Instruction::Jump(_)
            | Instruction::Return(None)
            | Instruction::Phi(_) => {}
            Instruction::CondJump { cond, .. } => cond.as_var_mut().into_iter().for_each(f),
            Instruction::Assign { src, .. } => src.as_var_mut().into_iter().for_each(f),
            Instruction::Return(Some(value)) => value.as_var_mut().into_iter().for_each(f),
            Instruction::Call { args, .. } => {
                args.iter_mut().filter_map(Operand::as_var_mut).for_each(f)
            }
            Instruction::Binary { lhs, rhs, .. } => {
                if let Some(v) = lhs.as_var_mut() {
                    f(v);
                }
                if let Some(v) = rhs.as_var_mut() {
                    f(v);
                }
            }
            Instruction::Unary { operand, .. } => operand.as_var_mut().into_iter().for_each(f),
        }
    }

    /// Rewrite block references through `map`.
    pub(crate) fn remap_targets(&mut self, map: impl Fn(BlockId) -> BlockId) {
        match self {
            Instruction::Jump(target) => *target = map(*target),
            Instruction::CondJump {
                then_target,
                else_target,
                ..
            } => {
                *then_target = map(*then_target);
                *else_target = map(*else_target);
            }
            Instruction::Phi(phi) => {
                for op in &mut phi.operands {
                    op.pred = map(op.pred);
                }
            }
            _ => {}
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Operand]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Label(name) => write!(f, "label {}", name),
            Instruction::Jump(target) => write!(f, "br L{}", target),
            Instruction::CondJump {
                cond,
                then_target,
                else_target,
            } => write!(f, "condbr {}, L{}, L{}", cond, then_target, else_target),
            Instruction::Assign { dest, src } => write!(f, "{} = {}", dest, src),
            Instruction::Return(None) => write!(f, "ret"),
            Instruction::Return(Some(value)) => write!(f, "ret {}", value),
            Instruction::Call { dest, func, args } => {
                if let Some(dest) = dest {
                    write!(f, "{} = ", dest)?;
                }
                write!(f, "call {}(", func)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Instruction::Binary { dest, op, lhs, rhs } => {
                write!(f, "{} = {} {}, {}", dest, op.mnemonic(), lhs, rhs)
            }
            Instruction::Unary { dest, op, operand } => {
                write!(f, "{} = {} {}", dest, op.mnemonic(), operand)
            }
            Instruction::Phi(phi) => {
                write!(f, "{} = phi", phi.result)?;
                for (i, op) in phi.operands.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{}[L{}: {}]", sep, op.pred, op.value)?;
                }
                Ok(())
            }
        }
    }
}
