//! Register tracking.
//!
//! This module implements the RegisterFile that records which physical
//! registers are in use, who owns them, and which registers were ever
//! written during the current function (needed to decide which callee-saved
//! registers the prologue must preserve). Allocation policy lives in the
//! allocator; the register file only answers "free?" and "owned by whom?".

use thiserror::Error;

/// Number of registers in the VM register file.
pub const NUM_REGISTERS: usize = 16;

/// Physical register identifier, `r0`..=`r15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(u8);

impl Reg {
    /// Create a register; `id` must be below [`NUM_REGISTERS`].
    pub const fn new(id: u8) -> Self {
        assert!((id as usize) < NUM_REGISTERS, "register id out of range");
        Self(id)
    }

    pub fn try_new(id: u8) -> Result<Self, RegAllocError> {
        if (id as usize) < NUM_REGISTERS {
            Ok(Self(id))
        } else {
            Err(RegAllocError::InvalidRegister(id))
        }
    }

    pub const fn id(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Bit set over the 16 registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegSet(u16);

impl RegSet {
    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(u16::MAX)
    }

    pub fn from_regs(regs: &[Reg]) -> Self {
        let mut set = Self::new();
        for &reg in regs {
            set.set(reg);
        }
        set
    }

    pub fn contains(&self, reg: Reg) -> bool {
        self.0 & (1 << reg.0) != 0
    }

    pub fn set(&mut self, reg: Reg) {
        self.0 |= 1 << reg.0;
    }

    pub fn clear(&mut self, reg: Reg) {
        self.0 &= !(1 << reg.0);
    }

    pub fn union(&mut self, other: RegSet) {
        self.0 |= other.0;
    }

    pub fn intersect(&mut self, other: RegSet) {
        self.0 &= other.0;
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn clear_all(&mut self) {
        self.0 = 0;
    }

    /// Registers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Reg> + '_ {
        (0..NUM_REGISTERS as u8)
            .map(Reg)
            .filter(move |reg| self.contains(*reg))
    }
}

/// Error types for register tracking.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegAllocError {
    #[error("register r{0} does not exist")]
    InvalidRegister(u8),

    #[error("register {0} is not allocatable")]
    NotAllocatable(Reg),

    #[error("register {reg} is already owned by {owner}")]
    AlreadyAllocated { reg: Reg, owner: String },

    #[error("register {0} is not allocated")]
    RegisterNotAllocated(Reg),
}

/// Register ownership for a single function.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    /// Registers available for allocation.
    allocatable: RegSet,
    /// Currently allocated registers.
    used: RegSet,
    /// Registers written at some point since the last reset.
    clobbered: RegSet,
    /// Which variable owns each register.
    owners: [Option<String>; NUM_REGISTERS],
}

impl RegisterFile {
    pub fn new(allocatable: RegSet) -> Self {
        Self {
            allocatable,
            used: RegSet::new(),
            clobbered: RegSet::new(),
            owners: Default::default(),
        }
    }

    pub fn is_allocatable(&self, reg: Reg) -> bool {
        self.allocatable.contains(reg)
    }

    pub fn is_allocated(&self, reg: Reg) -> bool {
        self.used.contains(reg)
    }

    pub fn is_free(&self, reg: Reg) -> bool {
        self.is_allocatable(reg) && !self.is_allocated(reg)
    }

    /// First free register in `order`.
    pub fn find_first_free(&self, order: &[Reg]) -> Option<Reg> {
        order.iter().copied().find(|&reg| self.is_free(reg))
    }

    /// Give `reg` to `owner`.
    pub fn assign(&mut self, reg: Reg, owner: &str) -> Result<(), RegAllocError> {
        if !self.is_allocatable(reg) {
            return Err(RegAllocError::NotAllocatable(reg));
        }
        if let Some(current) = &self.owners[reg.index()] {
            return Err(RegAllocError::AlreadyAllocated {
                reg,
                owner: current.clone(),
            });
        }

        self.used.set(reg);
        self.clobbered.set(reg);
        self.owners[reg.index()] = Some(owner.to_string());
        Ok(())
    }

    /// Release `reg`, returning its previous owner.
    pub fn release(&mut self, reg: Reg) -> Result<String, RegAllocError> {
        match self.owners[reg.index()].take() {
            Some(owner) => {
                self.used.clear(reg);
                Ok(owner)
            }
            None => Err(RegAllocError::RegisterNotAllocated(reg)),
        }
    }

    pub fn owner(&self, reg: Reg) -> Option<&str> {
        self.owners[reg.index()].as_deref()
    }

    pub fn used(&self) -> RegSet {
        self.used
    }

    pub fn clobbered(&self) -> RegSet {
        self.clobbered
    }

    /// Allocatable registers that are currently free.
    pub fn free_count(&self) -> u32 {
        self.allocatable.count() - self.used.count()
    }

    pub fn reset(&mut self) {
        self.used.clear_all();
        self.clobbered.clear_all();
        self.owners = Default::default();
    }
}
