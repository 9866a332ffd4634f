//! Target support for the 16-register VM: calling convention, register
//! allocation and stack frame layout.

pub mod abi;
pub mod allocator;
pub mod frame;

pub use crate::core::register_file::Reg;
pub use abi::{ArgLocation, CCAssigner, RegRole, Vm16Assigner};
pub use allocator::{AllocatorConfig, LinearScanAllocator, Location};
pub use frame::{FrameLayout, FunctionFrame};
