//! Origin-side envelope handlers.

use crate::auth::{AccessScope, Authenticator};
use crate::config::OriginConfig;
use crate::error::OriginResult;
use crate::fanout::{var_visible, Fanout};
use crate::registry::SessionRegistry;
use crate::session::Session;
use crate::sync::{reconcile, Reconciliation};
use outpost_core::{
    purge_user, Entity, Replicator, Repository, RepositoryResult, Role, RoleCache, RoleField,
    Space, SpaceField, Template, TemplateField, TemplateVar, Token, User, Volume,
};
use outpost_protocol::{
    Message, MirrorToken, ProtocolError, Tombstone, UpdateRole, UpdateSpace, UpdateTemplate,
    UpdateTemplateVar, UpdateUser,
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Shared state for serving leaves.
pub struct OriginContext {
    config: OriginConfig,
    repo: Arc<dyn Repository>,
    roles: Arc<RoleCache>,
    registry: Arc<SessionRegistry>,
    authenticator: Authenticator,
}

impl OriginContext {
    /// Creates a new context.
    pub fn new(config: OriginConfig, repo: Arc<dyn Repository>, roles: Arc<RoleCache>) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.mailbox_capacity));
        let authenticator = Authenticator::new(config.leaf_secret.clone(), Arc::clone(&repo));
        Self {
            config,
            repo,
            roles,
            registry,
            authenticator,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OriginConfig {
        &self.config
    }

    /// Returns the repository.
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Returns the role cache.
    pub fn roles(&self) -> &Arc<RoleCache> {
        &self.roles
    }

    /// Returns the session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Authenticates a leaf's `Authorization` header.
    pub fn authenticate(&self, header: Option<&str>) -> OriginResult<AccessScope> {
        self.authenticator.authenticate(header)
    }

    /// Returns a replicator for mutations made on the origin itself.
    pub fn replicator(&self) -> Fanout {
        Fanout::new(Arc::clone(&self.registry))
    }
}

/// Handles envelopes received from one session.
///
/// Replies go through the session's mailbox, so they are delivered in
/// order with fan-out from other sessions.
pub struct SessionHandler<'a> {
    ctx: &'a OriginContext,
    session: &'a Session,
    fanout: Fanout,
}

impl<'a> SessionHandler<'a> {
    /// Creates a handler for `session`.
    pub fn new(ctx: &'a OriginContext, session: &'a Session) -> Self {
        let fanout = Fanout::skipping(Arc::clone(&ctx.registry), session.id());
        Self {
            ctx,
            session,
            fanout,
        }
    }

    /// Runs repository work on the blocking pool.
    ///
    /// The connection task only awaits the result, so a slow backend
    /// delays this session's envelopes without starving the runtime.
    async fn storage<T, F>(&self, op: F) -> OriginResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Repository) -> RepositoryResult<T> + Send + 'static,
    {
        let repo = Arc::clone(&self.ctx.repo);
        let result = tokio::task::spawn_blocking(move || op(repo.as_ref())).await?;
        Ok(result?)
    }

    fn scope(&self) -> AccessScope {
        self.session.scope()
    }

    async fn reply(&self, message: Message) {
        if !self.session.send(&message).await {
            debug!(
                session_id = %self.session.id(),
                command = %message.command(),
                "session closed, reply dropped"
            );
        }
    }

    async fn answer<T: Entity>(
        &self,
        plan: Reconciliation<T>,
        update: impl Fn(T) -> Message,
        delete: impl Fn(Uuid) -> Message,
    ) {
        for record in plan.updates {
            self.reply(update(record)).await;
        }
        for id in plan.deletes {
            self.reply(delete(id)).await;
        }
    }

    /// Handles one envelope.
    ///
    /// Client errors end the connection; anything else is logged by the
    /// caller and the connection stays up.
    pub async fn handle(&self, message: Message) -> OriginResult<()> {
        let command = message.command();
        debug!(session_id = %self.session.id(), %command, "handling envelope");

        match message {
            Message::None => Ok(()),
            Message::Bootstrap => {
                self.reply(Message::Bootstrap).await;
                Ok(())
            }
            Message::Register(_) => Err(ProtocolError::UnexpectedCommand(command).into()),
            Message::SyncTemplates(request) => self.sync_templates(&request.existing).await,
            Message::SyncTemplateVars(request) => self.sync_template_vars(&request.existing).await,
            Message::SyncRoles(request) => self.sync_roles(&request.existing).await,
            Message::SyncUser(request) => self.sync_user(request.user_id).await,
            Message::SyncSpace(request) => self.sync_space(request.space_id).await,
            Message::SyncUserSpaces(request) => {
                self.sync_user_spaces(request.user_id, &request.existing).await
            }
            Message::UpdateUser(update) => self.update_user(update.user).await,
            Message::DeleteUser(tombstone) => self.delete_user(tombstone.id).await,
            Message::UpdateSpace(update) => {
                self.update_space(update.space, update.update_fields).await
            }
            Message::DeleteSpace(tombstone) => self.delete_space(tombstone.id).await,
            Message::MirrorToken(mirror) => self.mirror_token(mirror.token).await,
            Message::DeleteToken(tombstone) => self.delete_token(tombstone.id).await,
            Message::UpdateTemplate(update) => {
                self.update_template(update.template, update.update_fields).await
            }
            Message::DeleteTemplate(tombstone) => self.delete_template(tombstone.id).await,
            Message::UpdateTemplateVar(update) => self.update_template_var(update.var).await,
            Message::DeleteTemplateVar(tombstone) => self.delete_template_var(tombstone.id).await,
            Message::UpdateRole(update) => {
                self.update_role(update.role, update.update_fields).await
            }
            Message::DeleteRole(tombstone) => self.delete_role(tombstone.id).await,
            Message::UpdateVolume(update) => self.update_volume(update.volume).await,
        }
    }

    async fn sync_templates(&self, existing: &[Uuid]) -> OriginResult<()> {
        let templates = self.storage(|repo| repo.get_templates()).await?;
        self.answer(reconcile(templates, existing), template_update, |id| {
            Message::DeleteTemplate(Tombstone::new(id))
        })
        .await;
        Ok(())
    }

    async fn sync_template_vars(&self, existing: &[Uuid]) -> OriginResult<()> {
        let scope = self.scope();
        let vars: Vec<TemplateVar> = self
            .storage(|repo| repo.get_template_vars())
            .await?
            .into_iter()
            .filter(|var| var_visible(scope, var))
            .collect();
        self.answer(reconcile(vars, existing), var_update, |id| {
            Message::DeleteTemplateVar(Tombstone::new(id))
        })
        .await;
        Ok(())
    }

    async fn sync_roles(&self, existing: &[Uuid]) -> OriginResult<()> {
        let roles = self.storage(|repo| repo.get_roles()).await?;
        self.answer(reconcile(roles, existing), role_update, |id| {
            Message::DeleteRole(Tombstone::new(id))
        })
        .await;
        Ok(())
    }

    async fn sync_user(&self, user_id: Uuid) -> OriginResult<()> {
        let scope = self.scope();
        let found = self
            .storage(move |repo| {
                let Some(user) = repo.get_user(user_id)?.filter(|u| scope.covers(u.id)) else {
                    return Ok(None);
                };
                let tokens = repo.get_tokens_for_user(user.id)?;
                Ok(Some((user, tokens)))
            })
            .await?;

        let Some((user, tokens)) = found else {
            self.reply(Message::DeleteUser(Tombstone::new(user_id))).await;
            return Ok(());
        };

        self.reply(Message::UpdateUser(UpdateUser { user })).await;
        for token in tokens {
            self.reply(Message::MirrorToken(MirrorToken { token })).await;
        }
        Ok(())
    }

    async fn sync_space(&self, space_id: Uuid) -> OriginResult<()> {
        let scope = self.scope();
        let space = self
            .storage(move |repo| repo.get_space(space_id))
            .await?
            .filter(|space| scope.covers(space.user_id));

        match space {
            Some(space) => self.reply(space_update(space)).await,
            None => {
                self.reply(Message::DeleteSpace(Tombstone::new(space_id))).await
            }
        }
        Ok(())
    }

    async fn sync_user_spaces(&self, user_id: Uuid, existing: &[Uuid]) -> OriginResult<()> {
        let visible = self.scope().covers(user_id);
        let spaces = self
            .storage(move |repo| {
                if visible && repo.get_user(user_id)?.is_some() {
                    repo.get_spaces_for_user(user_id)
                } else {
                    Ok(Vec::new())
                }
            })
            .await?;
        self.answer(reconcile(spaces, existing), space_update, |id| {
            Message::DeleteSpace(Tombstone::new(id))
        })
        .await;
        Ok(())
    }

    async fn update_user(&self, mut user: User) -> OriginResult<()> {
        let scope = self.scope();
        if !scope.covers(user.id) {
            warn!(session_id = %self.session.id(), user_id = %user.id, "user outside leaf scope");
            self.reply(Message::DeleteUser(Tombstone::new(user.id))).await;
            return Ok(());
        }

        let user_id = user.id;
        let stored = self.storage(move |repo| repo.get_user(user_id)).await?;
        let mut corrected = false;
        if let Some(stored) = stored.filter(|_| scope.is_restricted()) {
            corrected = stored.roles != user.roles;
            user.roles = stored.roles;
        }

        let user = self
            .storage(move |repo| repo.save_user(&user).map(|()| user))
            .await?;
        self.fanout.update_user(&user).await?;
        if corrected {
            self.reply(Message::UpdateUser(UpdateUser { user })).await;
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> OriginResult<()> {
        if !self.scope().covers(user_id) {
            warn!(session_id = %self.session.id(), %user_id, "user outside leaf scope");
            self.reply(Message::DeleteUser(Tombstone::new(user_id))).await;
            return Ok(());
        }

        self.storage(move |repo| purge_user(repo, user_id)).await?;
        self.fanout.delete_user(user_id).await?;
        Ok(())
    }

    fn owns(&self, incoming: Uuid, stored: Option<Uuid>) -> bool {
        let scope = self.scope();
        scope.covers(incoming) && stored.map_or(true, |owner| scope.covers(owner))
    }

    async fn update_space(&self, space: Space, fields: Vec<SpaceField>) -> OriginResult<()> {
        let space_id = space.id;
        let stored = self.storage(move |repo| repo.get_space(space_id)).await?;
        if !self.owns(space.user_id, stored.map(|s| s.user_id)) {
            warn!(
                session_id = %self.session.id(),
                %space_id,
                "space outside leaf scope"
            );
            self.reply(Message::DeleteSpace(Tombstone::new(space_id))).await;
            return Ok(());
        }

        let (space, fields) = self
            .storage(move |repo| repo.save_space(&space, &fields).map(|()| (space, fields)))
            .await?;
        self.fanout.update_space(&space, &fields).await?;
        Ok(())
    }

    async fn delete_space(&self, space_id: Uuid) -> OriginResult<()> {
        let Some(stored) = self.storage(move |repo| repo.get_space(space_id)).await? else {
            debug!(%space_id, "space already absent");
            return Ok(());
        };
        if !self.scope().covers(stored.user_id) {
            warn!(session_id = %self.session.id(), %space_id, "space outside leaf scope");
            self.reply(Message::DeleteSpace(Tombstone::new(space_id))).await;
            return Ok(());
        }

        self.storage(move |repo| repo.delete_space(space_id)).await?;
        self.fanout.delete_space(&stored).await?;
        Ok(())
    }

    async fn mirror_token(&self, token: Token) -> OriginResult<()> {
        let token_id = token.id;
        let stored = self.storage(move |repo| repo.get_token(token_id)).await?;
        if !self.owns(token.user_id, stored.map(|t| t.user_id)) {
            warn!(
                session_id = %self.session.id(),
                %token_id,
                "token outside leaf scope"
            );
            self.reply(Message::DeleteToken(Tombstone::new(token_id))).await;
            return Ok(());
        }

        let token = self
            .storage(move |repo| repo.save_token(&token).map(|()| token))
            .await?;
        self.fanout.mirror_token(&token).await?;
        Ok(())
    }

    async fn delete_token(&self, token_id: Uuid) -> OriginResult<()> {
        let Some(stored) = self.storage(move |repo| repo.get_token(token_id)).await? else {
            debug!(%token_id, "token already absent");
            return Ok(());
        };
        if !self.scope().covers(stored.user_id) {
            warn!(session_id = %self.session.id(), %token_id, "token outside leaf scope");
            self.reply(Message::DeleteToken(Tombstone::new(token_id))).await;
            return Ok(());
        }

        self.storage(move |repo| repo.delete_token(token_id)).await?;
        self.fanout.delete_token(&stored).await?;
        Ok(())
    }

    async fn restore_template(&self, id: Uuid) -> OriginResult<()> {
        warn!(
            session_id = %self.session.id(),
            template_id = %id,
            "restricted leaf changed a template"
        );
        let message = match self.storage(move |repo| repo.get_template(id)).await? {
            Some(template) => template_update(template),
            None => Message::DeleteTemplate(Tombstone::new(id)),
        };
        self.reply(message).await;
        Ok(())
    }

    async fn update_template(
        &self,
        template: Template,
        fields: Vec<TemplateField>,
    ) -> OriginResult<()> {
        if self.scope().is_restricted() {
            return self.restore_template(template.id).await;
        }
        let (template, fields) = self
            .storage(move |repo| {
                repo.save_template(&template, &fields)
                    .map(|()| (template, fields))
            })
            .await?;
        self.fanout.update_template(&template, &fields).await?;
        Ok(())
    }

    async fn delete_template(&self, id: Uuid) -> OriginResult<()> {
        if self.scope().is_restricted() {
            return self.restore_template(id).await;
        }
        self.storage(move |repo| repo.delete_template(id)).await?;
        self.fanout.delete_template(id).await?;
        Ok(())
    }

    async fn restore_template_var(&self, id: Uuid, stored: Option<TemplateVar>) {
        warn!(
            session_id = %self.session.id(),
            var_id = %id,
            "restricted leaf changed a template variable"
        );
        let message = match stored.filter(|var| var_visible(self.scope(), var)) {
            Some(var) => var_update(var),
            None => Message::DeleteTemplateVar(Tombstone::new(id)),
        };
        self.reply(message).await;
    }

    async fn update_template_var(&self, var: TemplateVar) -> OriginResult<()> {
        let var_id = var.id;
        let stored = self.storage(move |repo| repo.get_template_var(var_id)).await?;
        if var.local || stored.as_ref().is_some_and(|stored| stored.local) {
            debug!(%var_id, "ignoring local template variable");
            return Ok(());
        }
        if self.scope().is_restricted() {
            self.restore_template_var(var_id, stored).await;
            return Ok(());
        }
        let var = self
            .storage(move |repo| repo.save_template_var(&var).map(|()| var))
            .await?;
        self.fanout.update_template_var(&var).await?;
        Ok(())
    }

    async fn delete_template_var(&self, id: Uuid) -> OriginResult<()> {
        let stored = self.storage(move |repo| repo.get_template_var(id)).await?;
        if self.scope().is_restricted() {
            self.restore_template_var(id, stored).await;
            return Ok(());
        }
        let Some(stored) = stored else {
            return Ok(());
        };
        if stored.local {
            debug!(var_id = %id, "ignoring local template variable");
            return Ok(());
        }
        self.storage(move |repo| repo.delete_template_var(id)).await?;
        self.fanout.delete_template_var(&stored).await?;
        Ok(())
    }

    async fn restore_role(&self, id: Uuid) -> OriginResult<()> {
        warn!(session_id = %self.session.id(), role_id = %id, "restricted leaf changed a role");
        let message = match self.storage(move |repo| repo.get_role(id)).await? {
            Some(role) => role_update(role),
            None => Message::DeleteRole(Tombstone::new(id)),
        };
        self.reply(message).await;
        Ok(())
    }

    async fn update_role(&self, role: Role, fields: Vec<RoleField>) -> OriginResult<()> {
        if self.scope().is_restricted() {
            return self.restore_role(role.id).await;
        }
        let (role, fields) = self
            .storage(move |repo| repo.save_role(&role, &fields).map(|()| (role, fields)))
            .await?;
        self.ctx.roles.upsert(&role, &fields);
        self.fanout.update_role(&role, &fields).await?;
        Ok(())
    }

    async fn delete_role(&self, id: Uuid) -> OriginResult<()> {
        if self.scope().is_restricted() {
            return self.restore_role(id).await;
        }
        self.storage(move |repo| repo.delete_role(id)).await?;
        self.ctx.roles.remove(id);
        self.fanout.delete_role(id).await?;
        Ok(())
    }

    async fn update_volume(&self, volume: Volume) -> OriginResult<()> {
        if self.scope().is_restricted() {
            warn!(
                session_id = %self.session.id(),
                volume_id = %volume.id,
                "dropping volume update from restricted leaf"
            );
            return Ok(());
        }
        let volume = self
            .storage(move |repo| repo.save_volume(&volume).map(|()| volume))
            .await?;
        self.fanout.update_volume(&volume).await?;
        Ok(())
    }
}

fn template_update(template: Template) -> Message {
    Message::UpdateTemplate(UpdateTemplate {
        template,
        update_fields: Vec::new(),
    })
}

fn var_update(var: TemplateVar) -> Message {
    Message::UpdateTemplateVar(UpdateTemplateVar { var })
}

fn role_update(role: Role) -> Message {
    Message::UpdateRole(UpdateRole {
        role,
        update_fields: Vec::new(),
    })
}

fn space_update(space: Space) -> Message {
    Message::UpdateSpace(UpdateSpace {
        space,
        update_fields: Vec::new(),
    })
}
