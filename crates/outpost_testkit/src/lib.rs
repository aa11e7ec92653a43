//! # Outpost Testkit
//!
//! Test utilities shared by the Outpost crates.
//!
//! This crate provides:
//! - Entity fixtures with deterministic identifiers
//! - A seeded world of users, spaces, templates and roles
//! - Property-based test generators using proptest
//! - [`SlowRepository`] for exercising storage latency
//!
//! ## Usage
//!
//! ```rust
//! use outpost_testkit::prelude::*;
//! use outpost_core::Repository;
//!
//! let world = World::seed();
//! assert_eq!(world.repo.get_spaces().unwrap().len(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
mod slow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::slow::SlowRepository;
}

pub use fixtures::*;
pub use generators::*;
pub use slow::SlowRepository;
