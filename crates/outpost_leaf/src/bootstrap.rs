//! Full sync: the requests a leaf sends to rebuild its state, and the gate
//! that releases startup waiters once the origin has answered them all.

use crate::error::LeafResult;
use outpost_core::Repository;
use outpost_protocol::{Message, SyncExisting, SyncSpace, SyncUser, SyncUserSpaces};
use tokio::sync::watch;

/// Builds the ordered list of full-sync requests from local state.
///
/// Templates, template variables and roles come first, then per user a
/// SYNC_USER, a SYNC_SPACE per local space and a SYNC_USER_SPACES carrying
/// the space ids just requested. The BOOTSTRAP marker closes the list.
pub fn full_sync_plan(repo: &dyn Repository) -> LeafResult<Vec<Message>> {
    let mut plan = Vec::new();

    let templates = repo.get_templates()?.into_iter().map(|t| t.id).collect();
    plan.push(Message::SyncTemplates(SyncExisting {
        existing: templates,
    }));

    let vars = repo
        .get_template_vars()?
        .into_iter()
        .filter(|v| !v.local)
        .map(|v| v.id)
        .collect();
    plan.push(Message::SyncTemplateVars(SyncExisting { existing: vars }));

    let roles = repo.get_roles()?.into_iter().map(|r| r.id).collect();
    plan.push(Message::SyncRoles(SyncExisting { existing: roles }));

    for user in repo.get_users()? {
        plan.push(Message::SyncUser(SyncUser { user_id: user.id }));

        let spaces = repo.get_spaces_for_user(user.id)?;
        let mut existing = Vec::with_capacity(spaces.len());
        for space in spaces {
            plan.push(Message::SyncSpace(SyncSpace { space_id: space.id }));
            existing.push(space.id);
        }
        plan.push(Message::SyncUserSpaces(SyncUserSpaces {
            user_id: user.id,
            existing,
        }));
    }

    plan.push(Message::Bootstrap);
    Ok(plan)
}

#[derive(Debug, Clone, Copy, Default)]
struct GateState {
    released: bool,
    pending: bool,
}

/// Tracks full-sync progress.
///
/// The gate is released by the first completed full sync and stays
/// released; later full syncs only toggle the pending flag.
#[derive(Debug)]
pub struct BootstrapGate {
    state: watch::Sender<GateState>,
}

impl BootstrapGate {
    /// Creates a closed gate.
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::default());
        Self { state }
    }

    /// Waits until the first full sync has completed.
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| s.released).await;
    }

    /// Waits until no full sync is in progress.
    pub(crate) async fn wait_settled(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| !s.pending).await;
    }

    /// Returns true once a full sync has completed.
    pub fn is_released(&self) -> bool {
        self.state.borrow().released
    }

    /// Returns true if the last full sync never completed.
    pub fn needs_full_sync(&self) -> bool {
        let state = *self.state.borrow();
        state.pending || !state.released
    }

    pub(crate) fn begin(&self) {
        self.state.send_modify(|s| s.pending = true);
    }

    pub(crate) fn complete(&self) {
        self.state.send_modify(|s| {
            s.pending = false;
            s.released = true;
        });
    }
}

impl Default for BootstrapGate {
    fn default() -> Self {
        Self::new()
    }
}
