//! In-memory role cache.
//!
//! Permission checks resolve against this cache without touching storage.
//! It is rebuilt from the repository at startup and then kept current by
//! role replication commands.

use crate::error::RepositoryResult;
use crate::model::{Role, RoleField, User};
use crate::repository::Repository;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Process-wide role cache, owned by the application context.
#[derive(Debug, Default)]
pub struct RoleCache {
    roles: RwLock<HashMap<Uuid, Role>>,
}

impl RoleCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache populated from the repository.
    pub fn load(repo: &dyn Repository) -> RepositoryResult<Self> {
        let cache = Self::new();
        cache.reload(repo)?;
        Ok(cache)
    }

    /// Replaces the cache contents with the repository's roles.
    pub fn reload(&self, repo: &dyn Repository) -> RepositoryResult<()> {
        let roles = repo
            .get_roles()?
            .into_iter()
            .map(|role| (role.id, role))
            .collect();
        *self.roles.write() = roles;
        Ok(())
    }

    /// Inserts, replaces or partially updates a role.
    pub fn upsert(&self, role: &Role, fields: &[RoleField]) {
        let mut roles = self.roles.write();
        match roles.get_mut(&role.id) {
            Some(stored) if !fields.is_empty() => stored.apply_fields(role, fields),
            _ => {
                roles.insert(role.id, role.clone());
            }
        }
    }

    /// Removes a role.
    pub fn remove(&self, id: Uuid) {
        self.roles.write().remove(&id);
    }

    /// Looks up a role.
    pub fn get(&self, id: Uuid) -> Option<Role> {
        self.roles.read().get(&id).cloned()
    }

    /// Returns the ids of every cached role.
    pub fn ids(&self) -> Vec<Uuid> {
        self.roles.read().keys().copied().collect()
    }

    /// Returns the number of cached roles.
    pub fn len(&self) -> usize {
        self.roles.read().len()
    }

    /// Returns true if no roles are cached.
    pub fn is_empty(&self) -> bool {
        self.roles.read().is_empty()
    }

    /// Returns true if any of the user's roles grants `permission`.
    pub fn user_has_permission(&self, user: &User, permission: u16) -> bool {
        let roles = self.roles.read();
        user.roles
            .iter()
            .filter_map(|id| roles.get(id))
            .any(|role| role.permissions.contains(&permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;

    fn role(id: u128, permissions: Vec<u16>) -> Role {
        Role {
            id: Uuid::from_u128(id),
            name: format!("role{id}"),
            permissions,
            updated_at: 1,
        }
    }

    fn user_with_roles(roles: Vec<Uuid>) -> User {
        User {
            id: Uuid::from_u128(1),
            username: "alice".into(),
            email: "alice@example.com".into(),
            active: true,
            roles,
            ssh_public_key: String::new(),
            timezone: "UTC".into(),
            updated_at: 1,
        }
    }

    #[test]
    fn load_from_repository() {
        let repo = MemoryRepository::new();
        repo.save_role(&role(1, vec![1]), &[]).unwrap();
        repo.save_role(&role(2, vec![2]), &[]).unwrap();

        let cache = RoleCache::load(&repo).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get(Uuid::from_u128(2)).is_some());
    }

    #[test]
    fn permission_resolution() {
        let cache = RoleCache::new();
        cache.upsert(&role(1, vec![10, 11]), &[]);
        cache.upsert(&role(2, vec![20]), &[]);

        let user = user_with_roles(vec![Uuid::from_u128(1)]);
        assert!(cache.user_has_permission(&user, 11));
        assert!(!cache.user_has_permission(&user, 20));

        cache.remove(Uuid::from_u128(1));
        assert!(!cache.user_has_permission(&user, 11));
    }

    #[test]
    fn partial_upsert_keeps_name() {
        let cache = RoleCache::new();
        cache.upsert(&role(1, vec![1]), &[]);

        let mut update = role(1, vec![1, 2]);
        update.name = "renamed".into();
        cache.upsert(&update, &[RoleField::Permissions]);

        let stored = cache.get(Uuid::from_u128(1)).unwrap();
        assert_eq!(stored.name, "role1");
        assert_eq!(stored.permissions, vec![1, 2]);
    }
}
