//! HEART: the typed, block-structured intermediate representation.
//!
//! This crate owns everything after resolution: the IR data model, the
//! AST→HEART generator, the block-reachability pass backing the
//! termination check, the deterministic text printer and its parser
//! (round-trippable), and the [`Program`] container with its stable
//! hash.

pub mod generator;
pub mod ir;
pub mod optimiser;
pub mod parser;
pub mod printer;
pub mod program;

mod builder;
mod lower;

pub use generator::{generate_module, resolve_pending_calls, UnresolvedCall};
pub use parser::parse_heart;
pub use printer::print_program;
pub use program::Program;

#[cfg(test)]
mod tests;
