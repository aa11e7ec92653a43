//! Propagation interface used by application code.
//!
//! Code that mutates a replicated entity calls the matching method after
//! the local write. On a leaf the change is queued for the origin; on the
//! origin it is fanned out to every connected leaf entitled to see it.

use crate::error::ReplicateResult;
use crate::model::{
    Role, RoleField, Space, SpaceField, Template, TemplateField, TemplateVar, Token, User, Volume,
};
use futures::future::BoxFuture;
use uuid::Uuid;

/// Mirrors local entity mutations to the other side of the sync link.
///
/// Every method may wait while the outbound queue is full; this is the
/// only backpressure the engine applies to callers.
pub trait Replicator: Send + Sync {
    /// Propagates a created or updated user.
    fn update_user<'a>(&'a self, user: &'a User) -> BoxFuture<'a, ReplicateResult<()>>;
    /// Propagates a user deletion.
    fn delete_user(&self, id: Uuid) -> BoxFuture<'_, ReplicateResult<()>>;

    /// Propagates a space change; `fields` empty means the whole record.
    fn update_space<'a>(
        &'a self,
        space: &'a Space,
        fields: &'a [SpaceField],
    ) -> BoxFuture<'a, ReplicateResult<()>>;
    /// Propagates a space deletion.
    fn delete_space<'a>(&'a self, space: &'a Space) -> BoxFuture<'a, ReplicateResult<()>>;

    /// Propagates a template change; `fields` empty means the whole record.
    fn update_template<'a>(
        &'a self,
        template: &'a Template,
        fields: &'a [TemplateField],
    ) -> BoxFuture<'a, ReplicateResult<()>>;
    /// Propagates a template deletion.
    fn delete_template(&self, id: Uuid) -> BoxFuture<'_, ReplicateResult<()>>;

    /// Propagates a template variable change.
    fn update_template_var<'a>(
        &'a self,
        var: &'a TemplateVar,
    ) -> BoxFuture<'a, ReplicateResult<()>>;
    /// Propagates a template variable deletion.
    fn delete_template_var<'a>(
        &'a self,
        var: &'a TemplateVar,
    ) -> BoxFuture<'a, ReplicateResult<()>>;

    /// Propagates a volume change.
    fn update_volume<'a>(&'a self, volume: &'a Volume) -> BoxFuture<'a, ReplicateResult<()>>;

    /// Propagates a created token.
    fn mirror_token<'a>(&'a self, token: &'a Token) -> BoxFuture<'a, ReplicateResult<()>>;
    /// Propagates a token deletion.
    fn delete_token<'a>(&'a self, token: &'a Token) -> BoxFuture<'a, ReplicateResult<()>>;

    /// Propagates a role change; `fields` empty means the whole record.
    fn update_role<'a>(
        &'a self,
        role: &'a Role,
        fields: &'a [RoleField],
    ) -> BoxFuture<'a, ReplicateResult<()>>;
    /// Propagates a role deletion.
    fn delete_role(&self, id: Uuid) -> BoxFuture<'_, ReplicateResult<()>>;
}
