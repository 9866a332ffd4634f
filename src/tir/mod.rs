//! Textual IR (TIR) for tests and the `cymbolc` driver.
//!
//! TIR is a small line-oriented format that lowers directly to
//! [`IrFunction`](crate::ir::IrFunction)s, so the backend can be exercised
//! without a front end.
//!
//! # TIR Format
//!
//! ```text
//! ; Comments start with semicolon
//! func max(a, b) locals 2 {
//! entry:
//!     c = gt a, b
//!     condbr c, ^then, ^else
//! then:
//!     r = a
//!     br ^merge
//! else:
//!     r = b
//!     br ^merge
//! merge:
//!     ret r
//! }
//! ```
//!
//! Instructions are `x = y`, `x = <binop> y, z`, `x = <unop> y`,
//! `x = call f(args)`, `call f(args)`, `br ^b`, `condbr c, ^t, ^e`,
//! `ret [v]` and `label name`. A block's successors follow from its
//! terminator, or from the next block when it has none. `succ ^b` lines
//! replace that derived list, which lets a test build a successor list that
//! disagrees with the branch. `locals N` defaults to the number of distinct
//! non-parameter names defined, and `entry ^b` picks a non-first entry block.

pub mod check;
pub mod parser;
pub mod printer;

pub use check::{CheckDirective, TestRunner, TestSpec};
pub use parser::parse_ir;
pub use printer::{print_function, render, PrintOptions};
