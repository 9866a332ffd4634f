//! Stack frame layout.
//!
//! Frame sizes and slot offsets are pure functions of a function's argument
//! and local counts:
//!
//! ```text
//! size          = align16(8 + nlocals * 8 + max(64, nlocals * 4))
//! local i       = align16(8) + i * 8
//! parameter i   = 8 + i * 8
//! return addr   = 0
//! saved fp      = 8
//! ```
//!
//! Sizes and offsets are computed in `u64`, so they stay exact for every
//! `u32` argument and local count.
//!
//! [`FunctionFrame::validate_layout`] checks every offset against a frame size
//! and collects all violations instead of stopping at the first.

use crate::core::error::{CompileError, CompileResult, LayoutViolation};
use std::fmt;

pub const RETURN_ADDRESS_SIZE: u64 = 8;
pub const SAVED_FRAME_POINTER_SIZE: u64 = 8;
pub const STACK_ALIGNMENT: u64 = 16;

const SLOT_SIZE: u64 = 8;
const TEMP_SLOT_SIZE: u64 = 4;
const MIN_TEMP_AREA: u64 = 64;

/// Align a value up to the specified power-of-two alignment.
pub fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// Frame size for a function with `nlocals` locals. The argument count does
/// not contribute: arguments live in the caller-pushed area.
pub fn calculate_frame_size(_nargs: u32, nlocals: u32) -> u64 {
    let nlocals = u64::from(nlocals);
    let locals = nlocals * SLOT_SIZE;
    let temps = MIN_TEMP_AREA.max(nlocals * TEMP_SLOT_SIZE);
    align_up(RETURN_ADDRESS_SIZE + locals + temps, STACK_ALIGNMENT)
}

pub fn return_address_offset() -> u64 {
    0
}

pub fn saved_frame_pointer_offset() -> u64 {
    RETURN_ADDRESS_SIZE
}

/// The stack grows down, so the stack pointer starts at the frame bottom.
pub fn initial_stack_pointer(frame_size: u64) -> u64 {
    frame_size
}

pub fn initial_frame_pointer(frame_size: u64) -> u64 {
    frame_size.saturating_sub(RETURN_ADDRESS_SIZE)
}

fn local_offset(index: u32) -> u64 {
    align_up(RETURN_ADDRESS_SIZE, STACK_ALIGNMENT) + u64::from(index) * SLOT_SIZE
}

fn param_offset(index: u32) -> u64 {
    RETURN_ADDRESS_SIZE + u64::from(index) * SLOT_SIZE
}

/// Argument and local counts of one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionFrame {
    name: String,
    nargs: u32,
    nlocals: u32,
}

impl FunctionFrame {
    pub fn new(name: impl Into<String>, nargs: u32, nlocals: u32) -> Self {
        Self {
            name: name.into(),
            nargs,
            nlocals,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nargs(&self) -> u32 {
        self.nargs
    }

    pub fn nlocals(&self) -> u32 {
        self.nlocals
    }

    pub fn frame_size(&self) -> u64 {
        calculate_frame_size(self.nargs, self.nlocals)
    }

    pub fn local_variable_offset(&self, index: u32) -> CompileResult<u64> {
        if index >= self.nlocals {
            return Err(CompileError::OutOfBounds {
                what: "local variable",
                index,
                limit: self.nlocals,
            });
        }
        Ok(local_offset(index))
    }

    pub fn parameter_offset(&self, index: u32) -> CompileResult<u64> {
        if index >= self.nargs {
            return Err(CompileError::OutOfBounds {
                what: "parameter",
                index,
                limit: self.nargs,
            });
        }
        Ok(param_offset(index))
    }

    /// Layout at the computed frame size.
    pub fn layout(&self) -> FrameLayout {
        self.validate_layout(self.frame_size())
    }

    /// Check every slot offset and the alignment of `frame_size`.
    pub fn validate_layout(&self, frame_size: u64) -> FrameLayout {
        let mut violations = Vec::new();

        if frame_size % STACK_ALIGNMENT != 0 {
            violations.push(LayoutViolation::Misaligned {
                frame_size,
                alignment: STACK_ALIGNMENT,
            });
        }

        let mut locals = Vec::with_capacity(self.nlocals as usize);
        for index in 0..self.nlocals {
            let offset = local_offset(index);
            if offset >= frame_size {
                violations.push(LayoutViolation::LocalOutOfFrame { index, offset });
            }
            locals.push(offset);
        }

        let mut params = Vec::with_capacity(self.nargs as usize);
        for index in 0..self.nargs {
            let offset = param_offset(index);
            if offset >= frame_size {
                violations.push(LayoutViolation::ParameterOutOfFrame { index, offset });
            }
            params.push(offset);
        }

        FrameLayout {
            function: self.name.clone(),
            frame_size,
            locals,
            params,
            violations,
        }
    }
}

/// A checked stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub function: String,
    pub frame_size: u64,
    /// Offset of each local variable.
    pub locals: Vec<u64>,
    /// Offset of each parameter.
    pub params: Vec<u64>,
    pub violations: Vec<LayoutViolation>,
}

impl FrameLayout {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Turn a layout with violations into a [`CompileError::Layout`].
    pub fn into_result(self) -> CompileResult<FrameLayout> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(CompileError::Layout {
                function: self.function,
                violations: self.violations,
            })
        }
    }
}

impl fmt::Display for FrameLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "StackFrameLayout for {}:", self.function)?;
        writeln!(f, "  Frame Size: {} bytes", self.frame_size)?;
        writeln!(f, "  Return Address Offset: {}", return_address_offset())?;
        writeln!(f, "  Saved Frame Pointer Offset: {}", saved_frame_pointer_offset())?;
        for (i, offset) in self.params.iter().enumerate() {
            writeln!(f, "  Parameter {}: {}", i, offset)?;
        }
        for (i, offset) in self.locals.iter().enumerate() {
            writeln!(f, "  Local {}: {}", i, offset)?;
        }
        if !self.violations.is_empty() {
            writeln!(f, "  Errors:")?;
            for violation in &self.violations {
                writeln!(f, "    - {}", violation)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        assert_eq!(calculate_frame_size(1, 2), 96);
        assert_eq!(calculate_frame_size(0, 0), 80);
        // temps grow past 64 bytes once nlocals > 16
        assert_eq!(calculate_frame_size(0, 20), align_up(8 + 160 + 80, 16));
    }

    #[test]
    fn test_frame_size_always_aligned() {
        for nargs in 0..10 {
            for nlocals in 0..200 {
                assert_eq!(calculate_frame_size(nargs, nlocals) % STACK_ALIGNMENT, 0);
            }
        }
    }

    #[test]
    fn test_frame_size_for_huge_local_counts() {
        // 8 + 8n + 4n rounded up to 16
        assert_eq!(calculate_frame_size(0, 400_000_000), 4_800_000_016);
        let max = calculate_frame_size(0, u32::MAX);
        assert_eq!(max % STACK_ALIGNMENT, 0);
        assert!(max >= 8 + 12 * u64::from(u32::MAX));
        assert!(calculate_frame_size(0, u32::MAX / 8) <= max);
    }

    #[test]
    fn test_offsets_for_huge_indices() {
        let frame = FunctionFrame::new("f", u32::MAX, 600_000_000);
        assert_eq!(frame.local_variable_offset(599_999_999).unwrap(), 16 + 8 * 599_999_999);
        assert_eq!(
            frame.parameter_offset(u32::MAX - 1).unwrap(),
            8 + 8 * u64::from(u32::MAX - 1)
        );
        assert!(frame.frame_size() > frame.local_variable_offset(599_999_999).unwrap());
    }

    #[test]
    fn test_offsets() {
        let frame = FunctionFrame::new("f", 2, 3);
        assert_eq!(frame.local_variable_offset(0).unwrap(), 16);
        assert_eq!(frame.local_variable_offset(2).unwrap(), 32);
        assert_eq!(frame.parameter_offset(0).unwrap(), 8);
        assert_eq!(frame.parameter_offset(1).unwrap(), 16);
        assert_eq!(return_address_offset(), 0);
        assert_eq!(saved_frame_pointer_offset(), 8);
    }

    #[test]
    fn test_offset_bounds() {
        let frame = FunctionFrame::new("f", 1, 1);
        assert_eq!(
            frame.local_variable_offset(1),
            Err(CompileError::OutOfBounds {
                what: "local variable",
                index: 1,
                limit: 1
            })
        );
        assert!(frame.parameter_offset(1).is_err());
    }

    #[test]
    fn test_initial_pointers() {
        assert_eq!(initial_stack_pointer(96), 96);
        assert_eq!(initial_frame_pointer(96), 88);
    }

    #[test]
    fn test_validate_aggregates_violations() {
        let frame = FunctionFrame::new("wide", 3, 4);
        let layout = frame.validate_layout(20);
        assert!(layout.violations.contains(&LayoutViolation::Misaligned {
            frame_size: 20,
            alignment: 16
        }));
        // locals at 16, 24, 32, 40; all but the first are outside 20 bytes
        let locals = layout
            .violations
            .iter()
            .filter(|v| matches!(v, LayoutViolation::LocalOutOfFrame { .. }))
            .count();
        assert_eq!(locals, 3);
        assert!(layout
            .violations
            .contains(&LayoutViolation::ParameterOutOfFrame { index: 2, offset: 24 }));
        assert!(!layout.is_valid());

        let err = layout.into_result().unwrap_err();
        assert!(matches!(err, CompileError::Layout { ref violations, .. } if violations.len() == 5));
    }

    #[test]
    fn test_computed_layout_is_valid() {
        let layout = FunctionFrame::new("main", 1, 2).layout();
        assert!(layout.is_valid());
        assert_eq!(layout.frame_size, 96);
        assert_eq!(layout.locals, vec![16, 24]);
        assert_eq!(layout.params, vec![8]);
        assert!(layout.to_string().contains("Frame Size: 96 bytes"));
    }

    #[test]
    fn test_many_parameters_overflow_frame() {
        let layout = FunctionFrame::new("many", 12, 0).layout();
        assert_eq!(layout.frame_size, 80);
        assert_eq!(
            layout.violations,
            vec![
                LayoutViolation::ParameterOutOfFrame { index: 9, offset: 80 },
                LayoutViolation::ParameterOutOfFrame { index: 10, offset: 88 },
                LayoutViolation::ParameterOutOfFrame { index: 11, offset: 96 },
            ]
        );
    }
}
