//! CLI command implementations.

pub mod leaf;
pub mod origin;
