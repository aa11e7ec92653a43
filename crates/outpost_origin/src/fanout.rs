//! Origin to leaves propagation.

use crate::auth::AccessScope;
use crate::registry::SessionRegistry;
use futures::future::BoxFuture;
use outpost_core::{
    ReplicateError, ReplicateResult, Replicator, Role, RoleField, Space, SpaceField, Template,
    TemplateField, TemplateVar, Token, User, Volume,
};
use outpost_protocol::{
    Message, MirrorToken, Tombstone, UpdateRole, UpdateSpace, UpdateTemplate, UpdateTemplateVar,
    UpdateUser, UpdateVolume,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Returns true if a session with `scope` may see `var`.
pub(crate) fn var_visible(scope: AccessScope, var: &TemplateVar) -> bool {
    !var.local && !(var.restricted && scope.is_restricted())
}

/// Sends a change to every live session that may see it.
///
/// A fan-out created with [`Fanout::skipping`] never reaches the session the
/// change came from, which keeps leaf mutations from echoing back.
#[derive(Clone)]
pub struct Fanout {
    registry: Arc<SessionRegistry>,
    skip: Option<String>,
}

impl Fanout {
    /// Fans out to every session.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            skip: None,
        }
    }

    /// Fans out to every session except `session_id`.
    pub fn skipping(registry: Arc<SessionRegistry>, session_id: &str) -> Self {
        Self {
            registry,
            skip: Some(session_id.to_string()),
        }
    }

    async fn broadcast(
        &self,
        message: Message,
        visible: impl Fn(AccessScope) -> bool + Send,
    ) -> ReplicateResult<()> {
        let command = message.command();
        let bytes = message
            .encode()
            .map_err(|err| ReplicateError::Encode(err.to_string()))?;

        let mut recipients = Vec::new();
        self.registry.for_each_except(self.skip.as_deref(), |session| {
            if visible(session.scope()) {
                recipients.push(Arc::clone(session));
            }
        });

        let count = recipients.len();
        for session in recipients {
            if !session.enqueue(bytes.clone()).await {
                debug!(session_id = %session.id(), %command, "session closed during fan-out");
            }
        }
        debug!(%command, recipients = count, skip = ?self.skip, "fanned out");
        Ok(())
    }
}

fn everyone(_: AccessScope) -> bool {
    true
}

fn unrestricted(scope: AccessScope) -> bool {
    !scope.is_restricted()
}

impl Replicator for Fanout {
    fn update_user<'a>(&'a self, user: &'a User) -> BoxFuture<'a, ReplicateResult<()>> {
        let owner = user.id;
        let message = Message::UpdateUser(UpdateUser { user: user.clone() });
        Box::pin(self.broadcast(message, move |scope| scope.covers(owner)))
    }

    fn delete_user(&self, id: Uuid) -> BoxFuture<'_, ReplicateResult<()>> {
        let message = Message::DeleteUser(Tombstone::new(id));
        Box::pin(self.broadcast(message, move |scope| scope.covers(id)))
    }

    fn update_space<'a>(
        &'a self,
        space: &'a Space,
        fields: &'a [SpaceField],
    ) -> BoxFuture<'a, ReplicateResult<()>> {
        let owner = space.user_id;
        let message = Message::UpdateSpace(UpdateSpace {
            space: space.clone(),
            update_fields: fields.to_vec(),
        });
        Box::pin(self.broadcast(message, move |scope| scope.covers(owner)))
    }

    fn delete_space<'a>(&'a self, space: &'a Space) -> BoxFuture<'a, ReplicateResult<()>> {
        let owner = space.user_id;
        let message = Message::DeleteSpace(Tombstone::new(space.id));
        Box::pin(self.broadcast(message, move |scope| scope.covers(owner)))
    }

    fn update_template<'a>(
        &'a self,
        template: &'a Template,
        fields: &'a [TemplateField],
    ) -> BoxFuture<'a, ReplicateResult<()>> {
        let message = Message::UpdateTemplate(UpdateTemplate {
            template: template.clone(),
            update_fields: fields.to_vec(),
        });
        Box::pin(self.broadcast(message, everyone))
    }

    fn delete_template(&self, id: Uuid) -> BoxFuture<'_, ReplicateResult<()>> {
        Box::pin(self.broadcast(Message::DeleteTemplate(Tombstone::new(id)), everyone))
    }

    fn update_template_var<'a>(
        &'a self,
        var: &'a TemplateVar,
    ) -> BoxFuture<'a, ReplicateResult<()>> {
        let message = Message::UpdateTemplateVar(UpdateTemplateVar { var: var.clone() });
        Box::pin(self.broadcast(message, move |scope| var_visible(scope, var)))
    }

    fn delete_template_var<'a>(
        &'a self,
        var: &'a TemplateVar,
    ) -> BoxFuture<'a, ReplicateResult<()>> {
        let message = Message::DeleteTemplateVar(Tombstone::new(var.id));
        Box::pin(self.broadcast(message, move |scope| var_visible(scope, var)))
    }

    fn update_volume<'a>(&'a self, volume: &'a Volume) -> BoxFuture<'a, ReplicateResult<()>> {
        let message = Message::UpdateVolume(UpdateVolume {
            volume: volume.clone(),
        });
        Box::pin(self.broadcast(message, unrestricted))
    }

    fn mirror_token<'a>(&'a self, token: &'a Token) -> BoxFuture<'a, ReplicateResult<()>> {
        let owner = token.user_id;
        let message = Message::MirrorToken(MirrorToken {
            token: token.clone(),
        });
        Box::pin(self.broadcast(message, move |scope| scope.covers(owner)))
    }

    fn delete_token<'a>(&'a self, token: &'a Token) -> BoxFuture<'a, ReplicateResult<()>> {
        let owner = token.user_id;
        let message = Message::DeleteToken(Tombstone::new(token.id));
        Box::pin(self.broadcast(message, move |scope| scope.covers(owner)))
    }

    fn update_role<'a>(
        &'a self,
        role: &'a Role,
        fields: &'a [RoleField],
    ) -> BoxFuture<'a, ReplicateResult<()>> {
        let message = Message::UpdateRole(UpdateRole {
            role: role.clone(),
            update_fields: fields.to_vec(),
        });
        Box::pin(self.broadcast(message, everyone))
    }

    fn delete_role(&self, id: Uuid) -> BoxFuture<'_, ReplicateResult<()>> {
        Box::pin(self.broadcast(Message::DeleteRole(Tombstone::new(id)), everyone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use outpost_protocol::{duplex, Frame, FrameStream, RegisterResponse};
    use outpost_testkit::{id, space, template_var, World};
    use std::time::Duration;

    async fn join(registry: &Arc<SessionRegistry>, scope: AccessScope) -> (String, FrameStream) {
        let (origin, leaf) = duplex(32);
        let (sink, _) = origin.split();
        let (_, mut stream) = leaf.split();
        let registration = registry
            .register("", sink, "eu".into(), scope, RegisterResponse::default())
            .await
            .unwrap();
        // registration reply
        let _ = stream.next().await;
        (registration.session.id().to_string(), stream)
    }

    async fn received(stream: &mut FrameStream) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(Some(Ok(Frame::Binary(bytes)))) =
            tokio::time::timeout(Duration::from_millis(50), stream.next()).await
        {
            messages.push(Message::decode(bytes).unwrap());
        }
        messages
    }

    fn alice_scope() -> AccessScope {
        AccessScope::Restricted {
            token_id: id(World::ALICE_TOKEN),
            user_id: id(World::ALICE),
        }
    }

    #[tokio::test]
    async fn skips_the_originating_session() {
        let registry = Arc::new(SessionRegistry::new(8));
        let (origin_id, mut from) = join(&registry, AccessScope::Unrestricted).await;
        let (_, mut other) = join(&registry, AccessScope::Unrestricted).await;

        Fanout::skipping(Arc::clone(&registry), &origin_id)
            .delete_role(id(World::ROLE))
            .await
            .unwrap();

        assert!(received(&mut from).await.is_empty());
        assert_eq!(
            received(&mut other).await,
            vec![Message::DeleteRole(Tombstone::new(id(World::ROLE)))]
        );
    }

    #[tokio::test]
    async fn restricted_sessions_see_only_their_owner() {
        let registry = Arc::new(SessionRegistry::new(8));
        let (_, mut alice) = join(&registry, alice_scope()).await;
        let (_, mut full) = join(&registry, AccessScope::Unrestricted).await;
        let fanout = Fanout::new(Arc::clone(&registry));

        let bobs = space(World::BOB_SPACE, id(World::BOB), "bob");
        let alices = space(World::ALICE_SPACE, id(World::ALICE), "alice");
        fanout.update_space(&bobs, &[]).await.unwrap();
        fanout.update_space(&alices, &[]).await.unwrap();

        assert_eq!(
            received(&mut alice).await,
            vec![Message::UpdateSpace(UpdateSpace {
                space: alices,
                update_fields: Vec::new(),
            })]
        );
        assert_eq!(received(&mut full).await.len(), 2);
    }

    #[tokio::test]
    async fn restricted_and_local_vars_are_withheld() {
        let registry = Arc::new(SessionRegistry::new(8));
        let (_, mut alice) = join(&registry, alice_scope()).await;
        let (_, mut full) = join(&registry, AccessScope::Unrestricted).await;
        let fanout = Fanout::new(Arc::clone(&registry));

        let mut secret = template_var(World::RESTRICTED_VAR, "password", "hunter2");
        secret.restricted = true;
        let mut local = template_var(World::LOCAL_VAR, "origin_only", "x");
        local.local = true;
        fanout.update_template_var(&secret).await.unwrap();
        fanout.update_template_var(&local).await.unwrap();

        assert!(received(&mut alice).await.is_empty());
        assert_eq!(
            received(&mut full).await,
            vec![Message::UpdateTemplateVar(UpdateTemplateVar { var: secret })]
        );
    }
}
