//! [`Replicator`] for leaf application code.

use crate::queue::QueueProducer;
use futures::future::BoxFuture;
use outpost_core::{
    ReplicateResult, Replicator, Role, RoleField, Space, SpaceField, Template, TemplateField,
    TemplateVar, Token, User, Volume,
};
use outpost_protocol::{
    Message, MirrorToken, Tombstone, UpdateRole, UpdateSpace, UpdateTemplate, UpdateTemplateVar,
    UpdateUser, UpdateVolume,
};
use uuid::Uuid;

/// Queues local mutations for the origin.
///
/// Messages are encoded immediately and written by the connection's sender
/// in enqueue order; while the origin is unreachable they wait in the
/// queue. Variables flagged `local` are never queued.
#[derive(Clone)]
pub struct LeafLink {
    producer: QueueProducer,
}

impl LeafLink {
    pub(crate) fn new(producer: QueueProducer) -> Self {
        Self { producer }
    }

    fn send(&self, message: Message) -> BoxFuture<'_, ReplicateResult<()>> {
        Box::pin(async move { self.producer.push(&message).await })
    }
}

impl Replicator for LeafLink {
    fn update_user<'a>(&'a self, user: &'a User) -> BoxFuture<'a, ReplicateResult<()>> {
        self.send(Message::UpdateUser(UpdateUser { user: user.clone() }))
    }

    fn delete_user(&self, id: Uuid) -> BoxFuture<'_, ReplicateResult<()>> {
        self.send(Message::DeleteUser(Tombstone::new(id)))
    }

    fn update_space<'a>(
        &'a self,
        space: &'a Space,
        fields: &'a [SpaceField],
    ) -> BoxFuture<'a, ReplicateResult<()>> {
        self.send(Message::UpdateSpace(UpdateSpace {
            space: space.clone(),
            update_fields: fields.to_vec(),
        }))
    }

    fn delete_space<'a>(&'a self, space: &'a Space) -> BoxFuture<'a, ReplicateResult<()>> {
        self.send(Message::DeleteSpace(Tombstone::new(space.id)))
    }

    fn update_template<'a>(
        &'a self,
        template: &'a Template,
        fields: &'a [TemplateField],
    ) -> BoxFuture<'a, ReplicateResult<()>> {
        self.send(Message::UpdateTemplate(UpdateTemplate {
            template: template.clone(),
            update_fields: fields.to_vec(),
        }))
    }

    fn delete_template(&self, id: Uuid) -> BoxFuture<'_, ReplicateResult<()>> {
        self.send(Message::DeleteTemplate(Tombstone::new(id)))
    }

    fn update_template_var<'a>(
        &'a self,
        var: &'a TemplateVar,
    ) -> BoxFuture<'a, ReplicateResult<()>> {
        if var.local {
            return Box::pin(async { Ok(()) });
        }
        self.send(Message::UpdateTemplateVar(UpdateTemplateVar { var: var.clone() }))
    }

    fn delete_template_var<'a>(
        &'a self,
        var: &'a TemplateVar,
    ) -> BoxFuture<'a, ReplicateResult<()>> {
        if var.local {
            return Box::pin(async { Ok(()) });
        }
        self.send(Message::DeleteTemplateVar(Tombstone::new(var.id)))
    }

    fn update_volume<'a>(&'a self, volume: &'a Volume) -> BoxFuture<'a, ReplicateResult<()>> {
        self.send(Message::UpdateVolume(UpdateVolume {
            volume: volume.clone(),
        }))
    }

    fn mirror_token<'a>(&'a self, token: &'a Token) -> BoxFuture<'a, ReplicateResult<()>> {
        self.send(Message::MirrorToken(MirrorToken {
            token: token.clone(),
        }))
    }

    fn delete_token<'a>(&'a self, token: &'a Token) -> BoxFuture<'a, ReplicateResult<()>> {
        self.send(Message::DeleteToken(Tombstone::new(token.id)))
    }

    fn update_role<'a>(
        &'a self,
        role: &'a Role,
        fields: &'a [RoleField],
    ) -> BoxFuture<'a, ReplicateResult<()>> {
        self.send(Message::UpdateRole(UpdateRole {
            role: role.clone(),
            update_fields: fields.to_vec(),
        }))
    }

    fn delete_role(&self, id: Uuid) -> BoxFuture<'_, ReplicateResult<()>> {
        self.send(Message::DeleteRole(Tombstone::new(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{OutboundQueue, SharedSink};
    use crate::state::LeafStats;
    use futures::StreamExt;
    use outpost_protocol::{duplex, Frame};
    use outpost_testkit::{space, template_var, World};
    use parking_lot::RwLock;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    async fn sent(queue: &OutboundQueue) -> Vec<Message> {
        let (leaf, origin) = duplex(16);
        let (sink, _stream) = leaf.split();
        let sink: SharedSink = Arc::new(Mutex::new(sink));
        let stats = Arc::new(RwLock::new(LeafStats::default()));
        let _ = tokio::time::timeout(Duration::from_millis(50), queue.drain(&sink, &stats)).await;
        drop(sink);

        let (_sink, stream) = origin.split();
        stream
            .filter_map(|frame| async move {
                match frame {
                    Ok(Frame::Binary(bytes)) => Message::decode(bytes).ok(),
                    _ => None,
                }
            })
            .collect()
            .await
    }

    #[tokio::test]
    async fn local_vars_are_not_queued() {
        let queue = OutboundQueue::new(8, 2);
        let link = LeafLink::new(queue.producer());
        let mut local = template_var(World::LOCAL_VAR, "private", "v");
        local.local = true;
        let shared = template_var(World::VAR, "domain", "example.com");

        link.update_template_var(&local).await.unwrap();
        link.delete_template_var(&local).await.unwrap();
        link.update_template_var(&shared).await.unwrap();

        let messages = sent(&queue).await;
        assert_eq!(
            messages,
            vec![Message::UpdateTemplateVar(UpdateTemplateVar { var: shared })]
        );
    }

    #[tokio::test]
    async fn space_deletion_is_a_tombstone() {
        let queue = OutboundQueue::new(8, 2);
        let link = LeafLink::new(queue.producer());
        let doomed = space(World::ALICE_SPACE, Uuid::nil(), "dev");

        link.delete_space(&doomed).await.unwrap();

        assert_eq!(
            sent(&queue).await,
            vec![Message::DeleteSpace(Tombstone::new(doomed.id))]
        );
    }
}
