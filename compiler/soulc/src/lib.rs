//! The compiler façade.
//!
//! Feed one or more source units with [`Compiler::add_code`], then call
//! [`Compiler::link`] to run resolution and lowering and produce a
//! [`Program`]. [`Compiler::build`] does both for a single unit. Linking
//! resets the compiler.

mod compiler;
pub mod tracing_setup;

pub use compiler::{Compiler, LinkOptions};
pub use soul_heart::Program;
