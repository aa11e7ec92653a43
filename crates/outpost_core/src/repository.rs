//! Repository interface of the storage collaborator.

use crate::error::RepositoryResult;
use crate::model::{
    Role, RoleField, Space, SpaceField, Template, TemplateField, TemplateVar, Token, User, Volume,
};
use tracing::debug;
use uuid::Uuid;

/// Uniform access to the replicated entities.
///
/// The synchronization engine never owns persisted state; it reads and
/// writes exclusively through this trait. Backends may be key-value,
/// relational or in-memory.
///
/// # Invariants
///
/// - Concurrent reads are allowed
/// - Writes are serializable per entity id; no multi-entity transactions
/// - Deleting an absent record is not an error
/// - `save_*` with an empty field list writes the whole record; with a
///   non-empty list it merges those fields into the stored record, and
///   falls back to a full write when no record exists yet
pub trait Repository: Send + Sync {
    /// Looks up a user.
    fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>>;
    /// Returns every user.
    fn get_users(&self) -> RepositoryResult<Vec<User>>;
    /// Inserts or replaces a user.
    fn save_user(&self, user: &User) -> RepositoryResult<()>;
    /// Removes a user record (no cascade, see [`purge_user`]).
    fn delete_user(&self, id: Uuid) -> RepositoryResult<()>;

    /// Looks up a space.
    fn get_space(&self, id: Uuid) -> RepositoryResult<Option<Space>>;
    /// Returns every space.
    fn get_spaces(&self) -> RepositoryResult<Vec<Space>>;
    /// Returns the spaces owned by a user.
    fn get_spaces_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Space>>;
    /// Inserts, replaces or partially updates a space.
    fn save_space(&self, space: &Space, fields: &[SpaceField]) -> RepositoryResult<()>;
    /// Removes a space.
    fn delete_space(&self, id: Uuid) -> RepositoryResult<()>;

    /// Looks up a template.
    fn get_template(&self, id: Uuid) -> RepositoryResult<Option<Template>>;
    /// Returns every template.
    fn get_templates(&self) -> RepositoryResult<Vec<Template>>;
    /// Inserts, replaces or partially updates a template.
    fn save_template(&self, template: &Template, fields: &[TemplateField])
        -> RepositoryResult<()>;
    /// Removes a template.
    fn delete_template(&self, id: Uuid) -> RepositoryResult<()>;

    /// Looks up a template variable.
    fn get_template_var(&self, id: Uuid) -> RepositoryResult<Option<TemplateVar>>;
    /// Returns every template variable.
    fn get_template_vars(&self) -> RepositoryResult<Vec<TemplateVar>>;
    /// Inserts or replaces a template variable.
    fn save_template_var(&self, var: &TemplateVar) -> RepositoryResult<()>;
    /// Removes a template variable.
    fn delete_template_var(&self, id: Uuid) -> RepositoryResult<()>;

    /// Looks up a volume.
    fn get_volume(&self, id: Uuid) -> RepositoryResult<Option<Volume>>;
    /// Returns every volume.
    fn get_volumes(&self) -> RepositoryResult<Vec<Volume>>;
    /// Inserts or replaces a volume.
    fn save_volume(&self, volume: &Volume) -> RepositoryResult<()>;

    /// Looks up a token.
    fn get_token(&self, id: Uuid) -> RepositoryResult<Option<Token>>;
    /// Returns the tokens owned by a user.
    fn get_tokens_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Token>>;
    /// Inserts or replaces a token.
    fn save_token(&self, token: &Token) -> RepositoryResult<()>;
    /// Removes a token.
    fn delete_token(&self, id: Uuid) -> RepositoryResult<()>;

    /// Looks up a role.
    fn get_role(&self, id: Uuid) -> RepositoryResult<Option<Role>>;
    /// Returns every role.
    fn get_roles(&self) -> RepositoryResult<Vec<Role>>;
    /// Inserts, replaces or partially updates a role.
    fn save_role(&self, role: &Role, fields: &[RoleField]) -> RepositoryResult<()>;
    /// Removes a role.
    fn delete_role(&self, id: Uuid) -> RepositoryResult<()>;
}

/// Deletes a user together with the spaces and tokens it owns.
pub fn purge_user(repo: &dyn Repository, user_id: Uuid) -> RepositoryResult<()> {
    for space in repo.get_spaces_for_user(user_id)? {
        repo.delete_space(space.id)?;
    }
    for token in repo.get_tokens_for_user(user_id)? {
        repo.delete_token(token.id)?;
    }
    repo.delete_user(user_id)?;
    debug!(%user_id, "purged user with spaces and tokens");
    Ok(())
}
