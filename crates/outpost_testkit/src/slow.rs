//! A repository wrapper with slow writes.

use outpost_core::{
    Repository, RepositoryResult, Role, RoleField, Space, SpaceField, Template, TemplateField,
    TemplateVar, Token, User, Volume,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Delegates to an inner repository, blocking the calling thread for a
/// fixed delay on every write.
///
/// Reads are passed straight through so assertions stay fast.
pub struct SlowRepository {
    inner: Arc<dyn Repository>,
    delay: Duration,
}

impl SlowRepository {
    /// Wraps `inner`, delaying each write by `delay`.
    pub fn new(inner: Arc<dyn Repository>, delay: Duration) -> Self {
        Self { inner, delay }
    }

    fn stall(&self) {
        std::thread::sleep(self.delay);
    }
}

impl Repository for SlowRepository {
    fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        self.inner.get_user(id)
    }
    fn get_users(&self) -> RepositoryResult<Vec<User>> {
        self.inner.get_users()
    }
    fn save_user(&self, user: &User) -> RepositoryResult<()> {
        self.stall();
        self.inner.save_user(user)
    }
    fn delete_user(&self, id: Uuid) -> RepositoryResult<()> {
        self.stall();
        self.inner.delete_user(id)
    }

    fn get_space(&self, id: Uuid) -> RepositoryResult<Option<Space>> {
        self.inner.get_space(id)
    }
    fn get_spaces(&self) -> RepositoryResult<Vec<Space>> {
        self.inner.get_spaces()
    }
    fn get_spaces_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Space>> {
        self.inner.get_spaces_for_user(user_id)
    }
    fn save_space(&self, space: &Space, fields: &[SpaceField]) -> RepositoryResult<()> {
        self.stall();
        self.inner.save_space(space, fields)
    }
    fn delete_space(&self, id: Uuid) -> RepositoryResult<()> {
        self.stall();
        self.inner.delete_space(id)
    }

    fn get_template(&self, id: Uuid) -> RepositoryResult<Option<Template>> {
        self.inner.get_template(id)
    }
    fn get_templates(&self) -> RepositoryResult<Vec<Template>> {
        self.inner.get_templates()
    }
    fn save_template(&self, template: &Template, fields: &[TemplateField]) -> RepositoryResult<()> {
        self.stall();
        self.inner.save_template(template, fields)
    }
    fn delete_template(&self, id: Uuid) -> RepositoryResult<()> {
        self.stall();
        self.inner.delete_template(id)
    }

    fn get_template_var(&self, id: Uuid) -> RepositoryResult<Option<TemplateVar>> {
        self.inner.get_template_var(id)
    }
    fn get_template_vars(&self) -> RepositoryResult<Vec<TemplateVar>> {
        self.inner.get_template_vars()
    }
    fn save_template_var(&self, var: &TemplateVar) -> RepositoryResult<()> {
        self.stall();
        self.inner.save_template_var(var)
    }
    fn delete_template_var(&self, id: Uuid) -> RepositoryResult<()> {
        self.stall();
        self.inner.delete_template_var(id)
    }

    fn get_volume(&self, id: Uuid) -> RepositoryResult<Option<Volume>> {
        self.inner.get_volume(id)
    }
    fn get_volumes(&self) -> RepositoryResult<Vec<Volume>> {
        self.inner.get_volumes()
    }
    fn save_volume(&self, volume: &Volume) -> RepositoryResult<()> {
        self.stall();
        self.inner.save_volume(volume)
    }

    fn get_token(&self, id: Uuid) -> RepositoryResult<Option<Token>> {
        self.inner.get_token(id)
    }
    fn get_tokens_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Token>> {
        self.inner.get_tokens_for_user(user_id)
    }
    fn save_token(&self, token: &Token) -> RepositoryResult<()> {
        self.stall();
        self.inner.save_token(token)
    }
    fn delete_token(&self, id: Uuid) -> RepositoryResult<()> {
        self.stall();
        self.inner.delete_token(id)
    }

    fn get_role(&self, id: Uuid) -> RepositoryResult<Option<Role>> {
        self.inner.get_role(id)
    }
    fn get_roles(&self) -> RepositoryResult<Vec<Role>> {
        self.inner.get_roles()
    }
    fn save_role(&self, role: &Role, fields: &[RoleField]) -> RepositoryResult<()> {
        self.stall();
        self.inner.save_role(role, fields)
    }
    fn delete_role(&self, id: Uuid) -> RepositoryResult<()> {
        self.stall();
        self.inner.delete_role(id)
    }
}
