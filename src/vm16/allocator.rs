// This module implements the linear-scan register allocator for the 16-register VM. Each
// variable is in exactly one of three states: unbound, bound to a physical register, or
// spilled to a stack slot. Allocation is idempotent and scans free registers in
// preference order (callee-saved s0..s4 first, then caller-saved ra, a0..a5, lr, unless
// the configuration asks for plain ascending order). When every allocatable register is
// taken, the owner of the first register in preference order is evicted to the stack and
// its register handed to the requester; there is no next-use heuristic. Spill slots are
// numbered by a counter that only grows until reset(), giving offsets
// FIRST_LOCAL_OFFSET - 4 * slot. An optional spill slot limit makes exhaustion explicit.
// One allocator serves one function at a time; reset() between functions.

//! Linear-scan register allocation.

use super::abi::{self, FIRST_LOCAL_OFFSET, SPILL_SLOT_SIZE};
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::{Reg, RegisterFile, NUM_REGISTERS};
use log::{debug, trace, warn};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

/// Allocator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Scan callee-saved registers before caller-saved ones.
    pub prefer_callee_saved: bool,
    /// Upper bound on spill slots handed out between resets.
    pub max_spill_slots: Option<u32>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            prefer_callee_saved: true,
            max_spill_slots: None,
        }
    }
}

/// Where a variable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Register(Reg),
    /// Frame-pointer-relative spill slot offset.
    Spilled(i32),
}

impl Location {
    pub fn register(self) -> Option<Reg> {
        match self {
            Location::Register(reg) => Some(reg),
            Location::Spilled(_) => None,
        }
    }

    pub fn is_spilled(self) -> bool {
        matches!(self, Location::Spilled(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Register(reg) => write!(f, "{} ({})", reg, abi::abi_name(*reg)),
            Location::Spilled(offset) => write!(f, "fp{:+}", offset),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinearScanAllocator {
    config: AllocatorConfig,
    /// Allocatable registers in scan order.
    order: Vec<Reg>,
    regs: RegisterFile,
    var_to_reg: BTreeMap<String, Reg>,
    spill_slots: BTreeMap<String, i32>,
    next_spill_slot: u32,
    evictions: usize,
}

impl Default for LinearScanAllocator {
    fn default() -> Self {
        Self::new(AllocatorConfig::default())
    }
}

impl LinearScanAllocator {
    pub fn new(config: AllocatorConfig) -> Self {
        let order: Vec<Reg> = if config.prefer_callee_saved {
            abi::CALLEE_SAVED
                .iter()
                .chain(abi::CALLER_SAVED.iter())
                .copied()
                .collect()
        } else {
            (1..NUM_REGISTERS as u8)
                .map(Reg::new)
                .filter(|reg| !abi::is_reserved(*reg))
                .collect()
        };

        Self {
            config,
            order,
            regs: RegisterFile::new(abi::AbiInfo::default().allocatable),
            var_to_reg: BTreeMap::new(),
            spill_slots: BTreeMap::new(),
            next_spill_slot: 0,
            evictions: 0,
        }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Give `var` a register, evicting or spilling if none is free.
    ///
    /// Already-bound and already-spilled variables keep their location.
    pub fn allocate(&mut self, var: &str) -> CompileResult<Location> {
        if let Some(&reg) = self.var_to_reg.get(var) {
            return Ok(Location::Register(reg));
        }
        if let Some(&offset) = self.spill_slots.get(var) {
            return Ok(Location::Spilled(offset));
        }

        let mut reg = self.regs.find_first_free(&self.order);
        if reg.is_none() {
            // bound variables are never spilled, so the first owner is evictable
            let victim = self
                .order
                .iter()
                .find_map(|r| self.regs.owner(*r))
                .map(str::to_string);
            if let Some(victim) = victim {
                let offset = self
                    .spill_to_stack(&victim)
                    .map_err(|_| CompileError::AllocationExhausted {
                        var: var.to_string(),
                    })?;
                warn!("evicted {} to fp{:+} to make room for {}", victim, offset, var);
                self.evictions += 1;
                reg = self.regs.find_first_free(&self.order);
            }
        }

        match reg {
            Some(reg) => {
                self.bind(var, reg)?;
                trace!("{} -> {}", var, reg);
                Ok(Location::Register(reg))
            }
            None => self.spill_to_stack(var).map(Location::Spilled),
        }
    }

    fn bind(&mut self, var: &str, reg: Reg) -> CompileResult<()> {
        self.regs
            .assign(reg, var)
            .map_err(|e| CompileError::InvalidRegister {
                reg: reg.id(),
                reason: e.to_string(),
            })?;
        self.var_to_reg.insert(var.to_string(), reg);
        Ok(())
    }

    /// Release whatever `var` holds. Unknown variables are ignored.
    pub fn free(&mut self, var: &str) {
        if let Some(reg) = self.var_to_reg.remove(var) {
            let _ = self.regs.release(reg);
            trace!("freed {} from {}", var, reg);
        }
        self.spill_slots.remove(var);
    }

    /// Move `var` to a stack slot and return the slot offset.
    ///
    /// An already-spilled variable keeps its slot. Slot numbers are never
    /// reused before [`reset`](Self::reset).
    pub fn spill_to_stack(&mut self, var: &str) -> CompileResult<i32> {
        if let Some(&offset) = self.spill_slots.get(var) {
            return Ok(offset);
        }
        if self
            .config
            .max_spill_slots
            .is_some_and(|max| self.next_spill_slot >= max)
        {
            return Err(CompileError::AllocationExhausted {
                var: var.to_string(),
            });
        }

        if let Some(reg) = self.var_to_reg.remove(var) {
            let _ = self.regs.release(reg);
        }

        let offset = FIRST_LOCAL_OFFSET - SPILL_SLOT_SIZE * self.next_spill_slot as i32;
        self.next_spill_slot += 1;
        self.spill_slots.insert(var.to_string(), offset);
        debug!("spilled {} to fp{:+}", var, offset);
        Ok(offset)
    }

    /// Bind `var` to a specific register, releasing its previous location.
    pub fn force_allocate(&mut self, var: &str, reg: Reg) -> CompileResult<()> {
        if abi::is_reserved(reg) {
            return Err(CompileError::InvalidRegister {
                reg: reg.id(),
                reason: "reserved register".to_string(),
            });
        }
        match self.regs.owner(reg) {
            Some(owner) if owner == var => return Ok(()),
            Some(owner) => {
                return Err(CompileError::InvalidRegister {
                    reg: reg.id(),
                    reason: format!("already allocated to {}", owner),
                })
            }
            None => {}
        }

        self.free(var);
        self.bind(var, reg)
    }

    /// Clear all bindings, spill slots and the slot counter.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.var_to_reg.clear();
        self.spill_slots.clear();
        self.next_spill_slot = 0;
        self.evictions = 0;
    }

    pub fn register(&self, var: &str) -> Option<Reg> {
        self.var_to_reg.get(var).copied()
    }

    pub fn register_abi_name(&self, var: &str) -> Option<&'static str> {
        self.register(var).map(abi::abi_name)
    }

    pub fn spill_slot(&self, var: &str) -> Option<i32> {
        self.spill_slots.get(var).copied()
    }

    pub fn is_spilled(&self, var: &str) -> bool {
        self.spill_slots.contains_key(var)
    }

    pub fn location(&self, var: &str) -> Option<Location> {
        self.register(var)
            .map(Location::Register)
            .or_else(|| self.spill_slot(var).map(Location::Spilled))
    }

    /// Register bindings, ordered by variable name.
    pub fn allocation(&self) -> &BTreeMap<String, Reg> {
        &self.var_to_reg
    }

    pub fn allocated_vars(&self) -> Vec<&str> {
        self.var_to_reg.keys().map(String::as_str).collect()
    }

    pub fn spilled_vars(&self) -> Vec<&str> {
        self.spill_slots.keys().map(String::as_str).collect()
    }

    pub fn available_register_count(&self) -> u32 {
        self.regs.free_count()
    }

    pub fn allocated_register_count(&self) -> usize {
        self.var_to_reg.len()
    }

    /// Variables currently spilled.
    pub fn spill_slot_count(&self) -> usize {
        self.spill_slots.len()
    }

    /// Spill slots handed out since the last reset, freed ones included.
    pub fn spill_slots_used(&self) -> u32 {
        self.next_spill_slot
    }

    pub fn evictions(&self) -> usize {
        self.evictions
    }

    /// Free registers of one class, in ascending order.
    pub fn available_registers(&self, caller_saved: bool) -> Vec<Reg> {
        let class: &[Reg] = if caller_saved {
            &abi::CALLER_SAVED
        } else {
            &abi::CALLEE_SAVED
        };
        class
            .iter()
            .copied()
            .filter(|reg| self.regs.is_free(*reg))
            .collect()
    }

    /// Callee-saved registers written since the last reset.
    pub fn used_callee_saved(&self) -> Vec<Reg> {
        self.regs
            .clobbered()
            .iter()
            .filter(|reg| abi::is_callee_saved(*reg))
            .collect()
    }

    /// Human-readable allocation summary.
    pub fn allocation_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Register Allocation Report ===");
        let _ = writeln!(out, "Allocated variables: {}", self.var_to_reg.len());
        let _ = writeln!(out, "Spilled variables: {}", self.spill_slots.len());
        let _ = writeln!(out, "Available registers: {}", self.available_register_count());

        if !self.var_to_reg.is_empty() {
            let _ = writeln!(out, "\nVariable to Register Mapping:");
            for (var, reg) in &self.var_to_reg {
                let class = if abi::is_callee_saved(*reg) {
                    "callee-saved"
                } else {
                    "caller-saved"
                };
                let _ = writeln!(
                    out,
                    "  {:<20} -> {:>2} ({:<5}, {})",
                    var,
                    reg.id(),
                    abi::abi_name(*reg),
                    class
                );
            }
        }

        if !self.spill_slots.is_empty() {
            let _ = writeln!(out, "\nSpilled Variables:");
            for (var, offset) in &self.spill_slots {
                let _ = writeln!(out, "  {:<20} -> fp{:+}", var, offset);
            }
        }

        let _ = writeln!(out, "\nRegister Status:");
        for id in 0..NUM_REGISTERS as u8 {
            let reg = Reg::new(id);
            let (status, owner) = if abi::is_reserved(reg) {
                ("RESERVED", "")
            } else {
                match self.regs.owner(reg) {
                    Some(owner) => ("USED", owner),
                    None => ("FREE", ""),
                }
            };
            let name = format!("r{}", id);
            let _ = writeln!(
                out,
                "  {:<3} ({:<5}) [{:<8}] {}",
                name,
                abi::abi_name(reg),
                status,
                owner
            );
        }
        out
    }
}

impl fmt::Display for LinearScanAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.allocation_report())
    }
}
