//! In-memory repository for testing.

use crate::error::{RepositoryError, RepositoryResult};
use crate::model::{
    Role, RoleField, Space, SpaceField, Template, TemplateField, TemplateVar, Token, User, Volume,
};
use crate::repository::Repository;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use uuid::Uuid;

/// An in-memory repository.
///
/// Records are kept in ordered maps so listings come back sorted by id,
/// which keeps test expectations deterministic.
///
/// This repository is suitable for:
/// - Unit and integration tests
/// - The demonstration binary, where persistence is not required
///
/// # Example
///
/// ```rust
/// use outpost_core::{MemoryRepository, Repository, Token};
/// use uuid::Uuid;
///
/// let repo = MemoryRepository::new();
/// let token = Token { id: Uuid::new_v4(), user_id: Uuid::new_v4(), name: "ci".into(), expires_at: 0 };
/// repo.save_token(&token).unwrap();
/// assert_eq!(repo.get_token(token.id).unwrap(), Some(token));
/// ```
#[derive(Debug, Default)]
pub struct MemoryRepository {
    users: RwLock<BTreeMap<Uuid, User>>,
    spaces: RwLock<BTreeMap<Uuid, Space>>,
    templates: RwLock<BTreeMap<Uuid, Template>>,
    template_vars: RwLock<BTreeMap<Uuid, TemplateVar>>,
    volumes: RwLock<BTreeMap<Uuid, Volume>>,
    tokens: RwLock<BTreeMap<Uuid, Token>>,
    roles: RwLock<BTreeMap<Uuid, Role>>,
}

impl MemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records of every kind.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.read().len()
            + self.spaces.read().len()
            + self.templates.read().len()
            + self.template_vars.read().len()
            + self.volumes.read().len()
            + self.tokens.read().len()
            + self.roles.read().len()
    }

    /// Returns true if the repository holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Repository for MemoryRepository {
    fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }

    fn get_users(&self) -> RepositoryResult<Vec<User>> {
        Ok(self.users.read().values().cloned().collect())
    }

    fn save_user(&self, user: &User) -> RepositoryResult<()> {
        self.users.write().insert(user.id, user.clone());
        Ok(())
    }

    fn delete_user(&self, id: Uuid) -> RepositoryResult<()> {
        self.users.write().remove(&id);
        Ok(())
    }

    fn get_space(&self, id: Uuid) -> RepositoryResult<Option<Space>> {
        Ok(self.spaces.read().get(&id).cloned())
    }

    fn get_spaces(&self) -> RepositoryResult<Vec<Space>> {
        Ok(self.spaces.read().values().cloned().collect())
    }

    fn get_spaces_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Space>> {
        Ok(self
            .spaces
            .read()
            .values()
            .filter(|space| space.user_id == user_id)
            .cloned()
            .collect())
    }

    fn save_space(&self, space: &Space, fields: &[SpaceField]) -> RepositoryResult<()> {
        let mut spaces = self.spaces.write();
        match spaces.get_mut(&space.id) {
            Some(stored) if !fields.is_empty() => stored.apply_fields(space, fields),
            _ => {
                spaces.insert(space.id, space.clone());
            }
        }
        Ok(())
    }

    fn delete_space(&self, id: Uuid) -> RepositoryResult<()> {
        self.spaces.write().remove(&id);
        Ok(())
    }

    fn get_template(&self, id: Uuid) -> RepositoryResult<Option<Template>> {
        Ok(self.templates.read().get(&id).cloned())
    }

    fn get_templates(&self) -> RepositoryResult<Vec<Template>> {
        Ok(self.templates.read().values().cloned().collect())
    }

    fn save_template(
        &self,
        template: &Template,
        fields: &[TemplateField],
    ) -> RepositoryResult<()> {
        let mut templates = self.templates.write();
        match templates.get_mut(&template.id) {
            Some(stored) if !fields.is_empty() => stored.apply_fields(template, fields),
            _ => {
                templates.insert(template.id, template.clone());
            }
        }
        Ok(())
    }

    fn delete_template(&self, id: Uuid) -> RepositoryResult<()> {
        self.templates.write().remove(&id);
        Ok(())
    }

    fn get_template_var(&self, id: Uuid) -> RepositoryResult<Option<TemplateVar>> {
        Ok(self.template_vars.read().get(&id).cloned())
    }

    fn get_template_vars(&self) -> RepositoryResult<Vec<TemplateVar>> {
        Ok(self.template_vars.read().values().cloned().collect())
    }

    fn save_template_var(&self, var: &TemplateVar) -> RepositoryResult<()> {
        self.template_vars.write().insert(var.id, var.clone());
        Ok(())
    }

    fn delete_template_var(&self, id: Uuid) -> RepositoryResult<()> {
        self.template_vars.write().remove(&id);
        Ok(())
    }

    fn get_volume(&self, id: Uuid) -> RepositoryResult<Option<Volume>> {
        Ok(self.volumes.read().get(&id).cloned())
    }

    fn get_volumes(&self) -> RepositoryResult<Vec<Volume>> {
        Ok(self.volumes.read().values().cloned().collect())
    }

    fn save_volume(&self, volume: &Volume) -> RepositoryResult<()> {
        self.volumes.write().insert(volume.id, volume.clone());
        Ok(())
    }

    fn get_token(&self, id: Uuid) -> RepositoryResult<Option<Token>> {
        Ok(self.tokens.read().get(&id).cloned())
    }

    fn get_tokens_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Token>> {
        Ok(self
            .tokens
            .read()
            .values()
            .filter(|token| token.user_id == user_id)
            .cloned()
            .collect())
    }

    fn save_token(&self, token: &Token) -> RepositoryResult<()> {
        self.tokens.write().insert(token.id, token.clone());
        Ok(())
    }

    fn delete_token(&self, id: Uuid) -> RepositoryResult<()> {
        self.tokens.write().remove(&id);
        Ok(())
    }

    fn get_role(&self, id: Uuid) -> RepositoryResult<Option<Role>> {
        Ok(self.roles.read().get(&id).cloned())
    }

    fn get_roles(&self) -> RepositoryResult<Vec<Role>> {
        Ok(self.roles.read().values().cloned().collect())
    }

    fn save_role(&self, role: &Role, fields: &[RoleField]) -> RepositoryResult<()> {
        let mut roles = self.roles.write();
        match roles.get_mut(&role.id) {
            Some(stored) if !fields.is_empty() => stored.apply_fields(role, fields),
            _ => {
                roles.insert(role.id, role.clone());
            }
        }
        Ok(())
    }

    fn delete_role(&self, id: Uuid) -> RepositoryResult<()> {
        self.roles.write().remove(&id);
        Ok(())
    }
}

/// A repository whose every call fails; used to exercise error paths.
#[derive(Debug, Default)]
pub struct FailingRepository;

macro_rules! fail {
    () => {
        Err(RepositoryError::Storage("backend unavailable".into()))
    };
}

impl Repository for FailingRepository {
    fn get_user(&self, _id: Uuid) -> RepositoryResult<Option<User>> {
        fail!()
    }
    fn get_users(&self) -> RepositoryResult<Vec<User>> {
        fail!()
    }
    fn save_user(&self, _user: &User) -> RepositoryResult<()> {
        fail!()
    }
    fn delete_user(&self, _id: Uuid) -> RepositoryResult<()> {
        fail!()
    }
    fn get_space(&self, _id: Uuid) -> RepositoryResult<Option<Space>> {
        fail!()
    }
    fn get_spaces(&self) -> RepositoryResult<Vec<Space>> {
        fail!()
    }
    fn get_spaces_for_user(&self, _user_id: Uuid) -> RepositoryResult<Vec<Space>> {
        fail!()
    }
    fn save_space(&self, _space: &Space, _fields: &[SpaceField]) -> RepositoryResult<()> {
        fail!()
    }
    fn delete_space(&self, _id: Uuid) -> RepositoryResult<()> {
        fail!()
    }
    fn get_template(&self, _id: Uuid) -> RepositoryResult<Option<Template>> {
        fail!()
    }
    fn get_templates(&self) -> RepositoryResult<Vec<Template>> {
        fail!()
    }
    fn save_template(&self, _t: &Template, _fields: &[TemplateField]) -> RepositoryResult<()> {
        fail!()
    }
    fn delete_template(&self, _id: Uuid) -> RepositoryResult<()> {
        fail!()
    }
    fn get_template_var(&self, _id: Uuid) -> RepositoryResult<Option<TemplateVar>> {
        fail!()
    }
    fn get_template_vars(&self) -> RepositoryResult<Vec<TemplateVar>> {
        fail!()
    }
    fn save_template_var(&self, _var: &TemplateVar) -> RepositoryResult<()> {
        fail!()
    }
    fn delete_template_var(&self, _id: Uuid) -> RepositoryResult<()> {
        fail!()
    }
    fn get_volume(&self, _id: Uuid) -> RepositoryResult<Option<Volume>> {
        fail!()
    }
    fn get_volumes(&self) -> RepositoryResult<Vec<Volume>> {
        fail!()
    }
    fn save_volume(&self, _volume: &Volume) -> RepositoryResult<()> {
        fail!()
    }
    fn get_token(&self, _id: Uuid) -> RepositoryResult<Option<Token>> {
        fail!()
    }
    fn get_tokens_for_user(&self, _user_id: Uuid) -> RepositoryResult<Vec<Token>> {
        fail!()
    }
    fn save_token(&self, _token: &Token) -> RepositoryResult<()> {
        fail!()
    }
    fn delete_token(&self, _id: Uuid) -> RepositoryResult<()> {
        fail!()
    }
    fn get_role(&self, _id: Uuid) -> RepositoryResult<Option<Role>> {
        fail!()
    }
    fn get_roles(&self) -> RepositoryResult<Vec<Role>> {
        fail!()
    }
    fn save_role(&self, _role: &Role, _fields: &[RoleField]) -> RepositoryResult<()> {
        fail!()
    }
    fn delete_role(&self, _id: Uuid) -> RepositoryResult<()> {
        fail!()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::purge_user;

    fn space(id: u128, user_id: u128, name: &str) -> Space {
        Space {
            id: Uuid::from_u128(id),
            user_id: Uuid::from_u128(user_id),
            template_id: Uuid::nil(),
            name: name.into(),
            description: String::new(),
            shell: "bash".into(),
            location: "eu".into(),
            is_deployed: false,
            is_pending: false,
            is_deleting: false,
            started_at: 0,
            updated_at: 1,
        }
    }

    fn user(id: u128) -> User {
        User {
            id: Uuid::from_u128(id),
            username: format!("user{id}"),
            email: format!("user{id}@example.com"),
            active: true,
            roles: vec![],
            ssh_public_key: String::new(),
            timezone: "UTC".into(),
            updated_at: 1,
        }
    }

    #[test]
    fn memory_new_is_empty() {
        let repo = MemoryRepository::new();
        assert!(repo.is_empty());
        assert!(repo.get_users().unwrap().is_empty());
    }

    #[test]
    fn save_space_full_then_partial() {
        let repo = MemoryRepository::new();
        repo.save_space(&space(1, 10, "dev"), &[]).unwrap();

        let mut update = space(1, 10, "ignored");
        update.is_deployed = true;
        update.updated_at = 7;
        repo.save_space(&update, &[SpaceField::IsDeployed]).unwrap();

        let stored = repo.get_space(Uuid::from_u128(1)).unwrap().unwrap();
        assert_eq!(stored.name, "dev");
        assert!(stored.is_deployed);
        assert_eq!(stored.updated_at, 7);
    }

    #[test]
    fn partial_update_of_missing_record_inserts_it() {
        let repo = MemoryRepository::new();
        repo.save_space(&space(2, 10, "new"), &[SpaceField::Name])
            .unwrap();
        assert!(repo.get_space(Uuid::from_u128(2)).unwrap().is_some());
    }

    #[test]
    fn listings_are_sorted_by_id() {
        let repo = MemoryRepository::new();
        repo.save_space(&space(3, 10, "c"), &[]).unwrap();
        repo.save_space(&space(1, 10, "a"), &[]).unwrap();
        repo.save_space(&space(2, 11, "b"), &[]).unwrap();

        let ids: Vec<_> = repo.get_spaces().unwrap().iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec![Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3)]
        );
        assert_eq!(repo.get_spaces_for_user(Uuid::from_u128(10)).unwrap().len(), 2);
    }

    #[test]
    fn delete_missing_is_not_an_error() {
        let repo = MemoryRepository::new();
        assert!(repo.delete_space(Uuid::from_u128(99)).is_ok());
    }

    #[test]
    fn purge_user_cascades() {
        let repo = MemoryRepository::new();
        repo.save_user(&user(10)).unwrap();
        repo.save_user(&user(11)).unwrap();
        repo.save_space(&space(1, 10, "a"), &[]).unwrap();
        repo.save_space(&space(2, 11, "b"), &[]).unwrap();
        repo.save_token(&Token {
            id: Uuid::from_u128(50),
            user_id: Uuid::from_u128(10),
            name: "ci".into(),
            expires_at: 0,
        })
        .unwrap();

        purge_user(&repo, Uuid::from_u128(10)).unwrap();

        assert!(repo.get_user(Uuid::from_u128(10)).unwrap().is_none());
        assert!(repo.get_space(Uuid::from_u128(1)).unwrap().is_none());
        assert!(repo.get_token(Uuid::from_u128(50)).unwrap().is_none());
        assert!(repo.get_space(Uuid::from_u128(2)).unwrap().is_some());
    }

    #[test]
    fn failing_repository_fails() {
        let repo = FailingRepository;
        assert!(matches!(
            repo.get_templates(),
            Err(RepositoryError::Storage(_))
        ));
    }
}
