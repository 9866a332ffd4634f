// This module describes the calling convention of the 16-register VM. Register roles are
// fixed: r0 is hardwired zero, r1 holds the return address (and serves as a temporary),
// r2..r7 are the argument registers a0..a5 with r2 doubling as the single return-value
// register, r8..r12 are the callee-saved s0..s4, r13 and r14 are the stack and frame
// pointers, and r15 is the link register. r0, r13 and r14 are never handed to the
// allocator. Arguments beyond the sixth are read from the caller-pushed parameter area
// of the stack frame. The module also fixes the frame-pointer-relative save slots of the
// callee-saved registers and the first local/spill offset shared with the allocator.
// These numbers are a binary contract with the VM interpreter and must not change.

//! Register roles and argument passing for the 16-register VM.

use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::{Reg, RegSet, NUM_REGISTERS};

pub const ZERO: Reg = Reg::new(0);
pub const RA: Reg = Reg::new(1);
pub const A0: Reg = Reg::new(2);
pub const S0: Reg = Reg::new(8);
pub const SP: Reg = Reg::new(13);
pub const FP: Reg = Reg::new(14);
pub const LR: Reg = Reg::new(15);

/// Number of arguments passed in registers.
pub const NUM_ARG_REGISTERS: u32 = 6;

/// Frame-pointer-relative offset of the first local / spill slot.
pub const FIRST_LOCAL_OFFSET: i32 = -16;

/// Size of one spill slot in bytes.
pub const SPILL_SLOT_SIZE: i32 = 4;

/// Frame-pointer-relative offset of the saved frame pointer.
pub const FP_SAVE_OFFSET: i32 = 8;

/// Registers that are never allocated.
pub const RESERVED: [Reg; 3] = [ZERO, SP, FP];

/// s0..s4.
pub const CALLEE_SAVED: [Reg; 5] = [
    Reg::new(8),
    Reg::new(9),
    Reg::new(10),
    Reg::new(11),
    Reg::new(12),
];

/// ra, a0..a5, lr.
pub const CALLER_SAVED: [Reg; 8] = [
    Reg::new(1),
    Reg::new(2),
    Reg::new(3),
    Reg::new(4),
    Reg::new(5),
    Reg::new(6),
    Reg::new(7),
    Reg::new(15),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegRole {
    Zero,
    /// Return address, usable as a temporary.
    ReturnAddress,
    /// Argument register `a<n>`; a0 also carries the return value.
    Argument(u8),
    /// Callee-saved register `s<n>`.
    CalleeSaved(u8),
    StackPointer,
    FramePointer,
    Link,
}

pub fn role(reg: Reg) -> RegRole {
    match reg.id() {
        0 => RegRole::Zero,
        1 => RegRole::ReturnAddress,
        id @ 2..=7 => RegRole::Argument(id - 2),
        id @ 8..=12 => RegRole::CalleeSaved(id - 8),
        13 => RegRole::StackPointer,
        14 => RegRole::FramePointer,
        _ => RegRole::Link,
    }
}

const ABI_NAMES: [&str; NUM_REGISTERS] = [
    "zero", "ra", "a0", "a1", "a2", "a3", "a4", "a5", "s0", "s1", "s2", "s3", "s4", "sp", "fp",
    "lr",
];

pub fn abi_name(reg: Reg) -> &'static str {
    ABI_NAMES[reg.index()]
}

/// Parse `r<N>` or an ABI name such as `a3`.
pub fn parse_register(name: &str) -> Option<Reg> {
    if let Some(pos) = ABI_NAMES.iter().position(|n| *n == name) {
        return Some(Reg::new(pos as u8));
    }
    let id: u8 = name.strip_prefix('r')?.parse().ok()?;
    Reg::try_new(id).ok()
}

pub fn is_reserved(reg: Reg) -> bool {
    RESERVED.contains(&reg)
}

pub fn is_callee_saved(reg: Reg) -> bool {
    CALLEE_SAVED.contains(&reg)
}

pub fn is_caller_saved(reg: Reg) -> bool {
    CALLER_SAVED.contains(&reg)
}

pub fn is_argument_register(reg: Reg) -> bool {
    matches!(role(reg), RegRole::Argument(_))
}

/// Register carrying argument `index`; only the first six travel in registers.
pub fn arg_register(index: u32) -> CompileResult<Reg> {
    if index >= NUM_ARG_REGISTERS {
        return Err(CompileError::OutOfBounds {
            what: "argument register",
            index,
            limit: NUM_ARG_REGISTERS,
        });
    }
    Ok(Reg::new(A0.id() + index as u8))
}

/// Argument index of an argument register.
pub fn arg_index(reg: Reg) -> CompileResult<u32> {
    match role(reg) {
        RegRole::Argument(index) => Ok(index as u32),
        _ => Err(CompileError::InvalidRegister {
            reg: reg.id(),
            reason: "not an argument register".to_string(),
        }),
    }
}

pub fn return_value_register() -> Reg {
    A0
}

/// Frame-pointer-relative save slot of a callee-saved register.
pub fn saved_register_offset(reg: Reg) -> Option<i32> {
    match role(reg) {
        // s0 at fp-12 up to s4 at fp+4
        RegRole::CalleeSaved(n) => Some(-12 + 4 * n as i32),
        _ => None,
    }
}

/// Register sets of the convention.
#[derive(Debug, Clone, Copy)]
pub struct AbiInfo {
    pub allocatable: RegSet,
    pub callee_saved: RegSet,
    pub caller_saved: RegSet,
    pub arg_regs: RegSet,
}

impl Default for AbiInfo {
    fn default() -> Self {
        let mut allocatable = RegSet::all();
        for reg in RESERVED {
            allocatable.clear(reg);
        }
        let mut arg_regs = RegSet::new();
        for i in 0..NUM_ARG_REGISTERS {
            arg_regs.set(Reg::new(A0.id() + i as u8));
        }
        Self {
            allocatable,
            callee_saved: RegSet::from_regs(&CALLEE_SAVED),
            caller_saved: RegSet::from_regs(&CALLER_SAVED),
            arg_regs,
        }
    }
}

/// Where an incoming argument lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLocation {
    Register(Reg),
    /// Parameter slot `index` of the caller-pushed area.
    Stack { index: u32 },
}

/// Trait for calling convention argument assignment.
pub trait CCAssigner {
    fn info(&self) -> &AbiInfo;

    /// Assign the next argument.
    fn assign_arg(&mut self) -> ArgLocation;

    /// Register carrying the return value.
    fn assign_ret(&self) -> Reg;

    /// Reset state for a new call or function.
    fn reset(&mut self);

    /// Number of arguments assigned to the stack so far.
    fn stack_args(&self) -> u32;
}

/// Argument assignment for the VM convention.
#[derive(Debug, Clone, Default)]
pub struct Vm16Assigner {
    info: AbiInfo,
    next: u32,
}

impl Vm16Assigner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CCAssigner for Vm16Assigner {
    fn info(&self) -> &AbiInfo {
        &self.info
    }

    fn assign_arg(&mut self) -> ArgLocation {
        let index = self.next;
        self.next += 1;
        match arg_register(index) {
            Ok(reg) => ArgLocation::Register(reg),
            Err(_) => ArgLocation::Stack { index },
        }
    }

    fn assign_ret(&self) -> Reg {
        return_value_register()
    }

    fn reset(&mut self) {
        self.next = 0;
    }

    fn stack_args(&self) -> u32 {
        self.next.saturating_sub(NUM_ARG_REGISTERS)
    }
}
