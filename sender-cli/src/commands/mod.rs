//! CLI command implementations.

pub mod frame;
pub mod simulate;
