//! Applies origin messages to local state.
//!
//! The reader hands decoded messages to one long-lived applier task over an
//! unbounded channel so storage latency never stalls the connection and
//! changes land in arrival order.

use crate::bootstrap::BootstrapGate;
use crate::state::SharedStats;
use outpost_core::{purge_user, Repository, RepositoryResult, RoleCache};
use outpost_protocol::Message;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Returns true if a leaf may receive `message` from the origin.
///
/// Registration happens only during the handshake and reconciliation
/// requests flow leaf to origin; anything else is applied.
pub(crate) fn accepted_from_origin(message: &Message) -> bool {
    !(matches!(message, Message::Register(_)) || message.command().is_sync_request())
}

/// Per-command handling on the leaf.
pub(crate) struct LeafHandlers {
    repo: Arc<dyn Repository>,
    roles: Arc<RoleCache>,
    gate: Arc<BootstrapGate>,
    stats: SharedStats,
}

impl LeafHandlers {
    pub(crate) fn new(
        repo: Arc<dyn Repository>,
        roles: Arc<RoleCache>,
        gate: Arc<BootstrapGate>,
        stats: SharedStats,
    ) -> Self {
        Self {
            repo,
            roles,
            gate,
            stats,
        }
    }

    /// Applies messages until every sender is gone.
    ///
    /// Each message is applied on the blocking pool and awaited before the
    /// next one is taken, so storage calls never occupy a runtime worker
    /// and changes still land in arrival order.
    pub(crate) async fn run(self, mut rx: mpsc::UnboundedReceiver<Message>) {
        let handlers = Arc::new(self);
        while let Some(message) = rx.recv().await {
            let command = message.command();
            let applier = Arc::clone(&handlers);
            match tokio::task::spawn_blocking(move || applier.apply(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(%command, error = %err, "failed to apply change from origin"),
                Err(err) => warn!(%command, error = %err, "applier task failed"),
            }
        }
        debug!("applier stopped");
    }

    /// Applies one message.
    pub(crate) fn apply(&self, message: Message) -> RepositoryResult<()> {
        let repo = self.repo.as_ref();
        let command = message.command();
        match message {
            Message::None => {}
            Message::Bootstrap => {
                self.stats.write().full_syncs += 1;
                self.gate.complete();
                info!("full sync complete");
            }
            Message::UpdateTemplate(p) => repo.save_template(&p.template, &p.update_fields)?,
            Message::DeleteTemplate(t) => repo.delete_template(t.id)?,
            Message::UpdateUser(p) => {
                if p.user.active {
                    repo.save_user(&p.user)?;
                } else {
                    debug!(user_id = %p.user.id, "user deactivated, removing locally");
                    purge_user(repo, p.user.id)?;
                }
            }
            Message::DeleteUser(t) => purge_user(repo, t.id)?,
            Message::UpdateTemplateVar(p) => {
                if !self.is_local_var(p.var.id)? && !p.var.local {
                    repo.save_template_var(&p.var)?;
                }
            }
            Message::DeleteTemplateVar(t) => {
                if !self.is_local_var(t.id)? {
                    repo.delete_template_var(t.id)?;
                }
            }
            Message::UpdateSpace(p) => repo.save_space(&p.space, &p.update_fields)?,
            Message::DeleteSpace(t) => repo.delete_space(t.id)?,
            Message::UpdateVolume(p) => repo.save_volume(&p.volume)?,
            Message::MirrorToken(p) => repo.save_token(&p.token)?,
            Message::DeleteToken(t) => repo.delete_token(t.id)?,
            Message::UpdateRole(p) => {
                self.roles.upsert(&p.role, &p.update_fields);
                repo.save_role(&p.role, &p.update_fields)?;
            }
            Message::DeleteRole(t) => {
                self.roles.remove(t.id);
                repo.delete_role(t.id)?;
            }
            Message::Register(_)
            | Message::SyncTemplates(_)
            | Message::SyncUser(_)
            | Message::SyncTemplateVars(_)
            | Message::SyncSpace(_)
            | Message::SyncUserSpaces(_)
            | Message::SyncRoles(_) => {
                warn!(%command, "ignoring leaf-bound request");
            }
        }
        Ok(())
    }

    fn is_local_var(&self, id: uuid::Uuid) -> RepositoryResult<bool> {
        Ok(self
            .repo
            .get_template_var(id)?
            .map(|v| v.local)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LeafStats;
    use outpost_core::{RoleField, SpaceField};
    use outpost_protocol::{
        SyncExisting, Tombstone, UpdateRole, UpdateSpace, UpdateTemplateVar, UpdateUser,
    };
    use outpost_testkit::{id, role, template_var, SlowRepository, World};
    use parking_lot::RwLock;
    use std::time::{Duration, Instant};

    const WRITE_DELAY: Duration = Duration::from_millis(100);
    const TICK: Duration = Duration::from_millis(10);

    fn handlers(world: &World) -> (LeafHandlers, Arc<RoleCache>, Arc<BootstrapGate>) {
        let roles = Arc::new(RoleCache::load(world.repo.as_ref()).unwrap());
        let gate = Arc::new(BootstrapGate::new());
        let stats = Arc::new(RwLock::new(LeafStats::default()));
        (
            LeafHandlers::new(world.repository(), roles.clone(), gate.clone(), stats),
            roles,
            gate,
        )
    }

    #[test]
    fn inactive_user_is_purged() {
        let world = World::seed();
        let (handlers, _, _) = handlers(&world);
        let mut alice = world.alice.clone();
        alice.active = false;

        handlers
            .apply(Message::UpdateUser(UpdateUser { user: alice }))
            .unwrap();

        assert!(world.repo.get_user(world.alice.id).unwrap().is_none());
        assert!(world.repo.get_spaces_for_user(world.alice.id).unwrap().is_empty());
        assert!(world.repo.get_token(id(World::ALICE_TOKEN)).unwrap().is_none());
        assert!(world.repo.get_user(world.bob.id).unwrap().is_some());
    }

    #[test]
    fn local_vars_are_untouched() {
        let world = World::seed();
        let (handlers, _, _) = handlers(&world);
        let mut incoming = template_var(World::LOCAL_VAR, "origin_only", "overwritten");
        incoming.local = false;

        handlers
            .apply(Message::UpdateTemplateVar(UpdateTemplateVar { var: incoming }))
            .unwrap();
        handlers
            .apply(Message::DeleteTemplateVar(Tombstone::new(id(World::LOCAL_VAR))))
            .unwrap();

        let stored = world.repo.get_template_var(id(World::LOCAL_VAR)).unwrap().unwrap();
        assert_eq!(stored.value, "x");
    }

    #[test]
    fn plain_var_delete_applies() {
        let world = World::seed();
        let (handlers, _, _) = handlers(&world);
        handlers
            .apply(Message::DeleteTemplateVar(Tombstone::new(id(World::VAR))))
            .unwrap();
        assert!(world.repo.get_template_var(id(World::VAR)).unwrap().is_none());
    }

    #[test]
    fn roles_update_cache_and_repository() {
        let world = World::seed();
        let (handlers, roles, _) = handlers(&world);
        let incoming = role(World::ROLE, "ignored", &[9]);

        handlers
            .apply(Message::UpdateRole(UpdateRole {
                role: incoming,
                update_fields: vec![RoleField::Permissions],
            }))
            .unwrap();

        assert_eq!(roles.get(id(World::ROLE)).unwrap().permissions, vec![9]);
        let stored = world.repo.get_role(id(World::ROLE)).unwrap().unwrap();
        assert_eq!(stored.name, "admin");
        assert_eq!(stored.permissions, vec![9]);

        handlers
            .apply(Message::DeleteRole(Tombstone::new(id(World::ROLE))))
            .unwrap();
        assert!(roles.get(id(World::ROLE)).is_none());
        assert!(world.repo.get_role(id(World::ROLE)).unwrap().is_none());
    }

    #[test]
    fn partial_space_update() {
        let world = World::seed();
        let (handlers, _, _) = handlers(&world);
        let mut space = world.repo.get_space(id(World::BOB_SPACE)).unwrap().unwrap();
        space.is_deployed = true;
        space.name = "not-applied".into();

        handlers
            .apply(Message::UpdateSpace(UpdateSpace {
                space,
                update_fields: vec![SpaceField::IsDeployed],
            }))
            .unwrap();

        let stored = world.repo.get_space(id(World::BOB_SPACE)).unwrap().unwrap();
        assert!(stored.is_deployed);
        assert_eq!(stored.name, "bob-dev");
    }

    #[test]
    fn bootstrap_releases_gate() {
        let world = World::seed();
        let (handlers, _, gate) = handlers(&world);
        handlers.apply(Message::Bootstrap).unwrap();
        assert!(gate.is_released());
        assert_eq!(handlers.stats.read().full_syncs, 1);
    }

    #[test]
    fn origin_may_not_send_requests() {
        assert!(!accepted_from_origin(&Message::SyncRoles(SyncExisting::default())));
        assert!(!accepted_from_origin(&Message::Register(Default::default())));
        assert!(accepted_from_origin(&Message::Bootstrap));
        assert!(accepted_from_origin(&Message::DeleteUser(Tombstone::new(id(1)))));
    }

    #[tokio::test]
    async fn applier_preserves_order() {
        let world = World::seed();
        let (handlers, _, _) = handlers(&world);
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(handlers.run(rx));

        let mut space = world.repo.get_space(id(World::BOB_SPACE)).unwrap().unwrap();
        for n in 0..10 {
            space.name = format!("rename-{n}");
            tx.send(Message::UpdateSpace(UpdateSpace {
                space: space.clone(),
                update_fields: vec![SpaceField::Name],
            }))
            .unwrap();
        }
        drop(tx);
        task.await.unwrap();

        let stored = world.repo.get_space(id(World::BOB_SPACE)).unwrap().unwrap();
        assert_eq!(stored.name, "rename-9");
    }

    #[tokio::test]
    async fn slow_storage_does_not_stall_the_runtime() {
        let world = World::seed();
        let slow = Arc::new(SlowRepository::new(world.repository(), WRITE_DELAY));
        let handlers = LeafHandlers::new(
            slow,
            Arc::new(RoleCache::new()),
            Arc::new(BootstrapGate::new()),
            Arc::new(RwLock::new(LeafStats::default())),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let mut applier = tokio::spawn(handlers.run(rx));

        let mut space = world.repo.get_space(id(World::BOB_SPACE)).unwrap().unwrap();
        for n in 0..5 {
            space.name = format!("slow-{n}");
            tx.send(Message::UpdateSpace(UpdateSpace {
                space: space.clone(),
                update_fields: vec![SpaceField::Name],
            }))
            .unwrap();
        }
        drop(tx);

        let mut worst = Duration::ZERO;
        loop {
            let started = Instant::now();
            tokio::select! {
                done = &mut applier => {
                    done.unwrap();
                    break;
                }
                _ = tokio::time::sleep(TICK) => {
                    worst = worst.max(started.elapsed().saturating_sub(TICK));
                }
            }
        }

        assert!(worst < WRITE_DELAY / 2, "timer stalled for {worst:?}");
        let stored = world.repo.get_space(id(World::BOB_SPACE)).unwrap().unwrap();
        assert_eq!(stored.name, "slow-4");
    }
}
