//! # Outpost Core
//!
//! Shared building blocks for the Outpost origin/leaf synchronization
//! engine.
//!
//! This crate provides:
//! - The replicated entity model (users, spaces, templates, template
//!   variables, tokens, roles, volumes)
//! - The [`Repository`] trait through which all persisted state is reached
//! - [`MemoryRepository`] for tests and ephemeral deployments
//! - [`RoleCache`] for storage-free permission checks
//! - The [`Replicator`] trait application code calls after a mutation
//!
//! ## Example
//!
//! ```rust
//! use outpost_core::{MemoryRepository, Repository, RoleCache, Role};
//! use uuid::Uuid;
//!
//! let repo = MemoryRepository::new();
//! let role = Role { id: Uuid::new_v4(), name: "admin".into(), permissions: vec![1], updated_at: 0 };
//! repo.save_role(&role, &[]).unwrap();
//!
//! let roles = RoleCache::load(&repo).unwrap();
//! assert_eq!(roles.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod memory;
mod model;
mod replicate;
mod repository;
mod role_cache;

pub use error::{ReplicateError, ReplicateResult, RepositoryError, RepositoryResult};
pub use memory::{FailingRepository, MemoryRepository};
pub use model::{
    Entity, Role, RoleField, Space, SpaceField, Template, TemplateField, TemplateVar, Token, User,
    Volume,
};
pub use replicate::Replicator;
pub use repository::{purge_user, Repository};
pub use role_cache::RoleCache;

/// Crate version, also the protocol version advertised during registration.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
