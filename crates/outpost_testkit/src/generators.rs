//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random entities and identifier sets.

use outpost_core::{
    Role, RoleField, Space, SpaceField, Template, TemplateField, TemplateVar, Token, User, Volume,
};
use proptest::prelude::*;
use uuid::Uuid;

/// Strategy for generating identifiers.
pub fn uuid_strategy() -> impl Strategy<Value = Uuid> {
    any::<u128>().prop_map(Uuid::from_u128)
}

/// Strategy for generating identifiers drawn from a small pool.
///
/// Collisions are likely, which is what set-difference tests want.
pub fn pooled_uuid_strategy(pool: u128) -> impl Strategy<Value = Uuid> {
    (0..pool).prop_map(|n| Uuid::from_u128(n + 1))
}

/// Strategy for generating short display names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}"
}

/// Strategy for generating free-form text, including non-ASCII.
pub fn text_strategy() -> impl Strategy<Value = String> {
    ".{0,64}"
}

/// Strategy for generating users.
pub fn user_strategy() -> impl Strategy<Value = User> {
    (
        uuid_strategy(),
        name_strategy(),
        any::<bool>(),
        prop::collection::vec(uuid_strategy(), 0..4),
        text_strategy(),
        any::<u64>(),
    )
        .prop_map(|(id, username, active, roles, ssh_public_key, updated_at)| User {
            id,
            email: format!("{username}@example.com"),
            username,
            active,
            roles,
            ssh_public_key,
            timezone: "UTC".to_string(),
            updated_at,
        })
}

/// Strategy for generating spaces.
pub fn space_strategy() -> impl Strategy<Value = Space> {
    (
        (uuid_strategy(), uuid_strategy(), uuid_strategy()),
        (name_strategy(), text_strategy(), name_strategy()),
        (any::<bool>(), any::<bool>(), any::<bool>()),
        (any::<u64>(), any::<u64>()),
    )
        .prop_map(
            |(
                (id, user_id, template_id),
                (name, description, location),
                (is_deployed, is_pending, is_deleting),
                (started_at, updated_at),
            )| Space {
                id,
                user_id,
                template_id,
                name,
                description,
                shell: "bash".to_string(),
                location,
                is_deployed,
                is_pending,
                is_deleting,
                started_at,
                updated_at,
            },
        )
}

/// Strategy for generating space field lists.
pub fn space_fields_strategy() -> impl Strategy<Value = Vec<SpaceField>> {
    prop::collection::vec(
        prop::sample::select(vec![
            SpaceField::TemplateId,
            SpaceField::Name,
            SpaceField::Description,
            SpaceField::Shell,
            SpaceField::Location,
            SpaceField::IsDeployed,
            SpaceField::IsPending,
            SpaceField::IsDeleting,
            SpaceField::StartedAt,
        ]),
        0..4,
    )
}

/// Strategy for generating templates.
pub fn template_strategy() -> impl Strategy<Value = Template> {
    (
        uuid_strategy(),
        name_strategy(),
        text_strategy(),
        text_strategy(),
        prop::collection::vec(name_strategy(), 0..3),
        any::<bool>(),
        any::<u64>(),
    )
        .prop_map(
            |(id, name, description, job, locations, active, updated_at)| Template {
                id,
                hash: format!("{:x}", id.as_u128()),
                name,
                description,
                job,
                volumes: String::new(),
                locations,
                active,
                updated_at,
            },
        )
}

/// Strategy for generating template field lists.
pub fn template_fields_strategy() -> impl Strategy<Value = Vec<TemplateField>> {
    prop::collection::vec(
        prop::sample::select(vec![
            TemplateField::Name,
            TemplateField::Description,
            TemplateField::Job,
            TemplateField::Volumes,
            TemplateField::Hash,
            TemplateField::Locations,
            TemplateField::Active,
        ]),
        0..3,
    )
}

/// Strategy for generating template variables.
pub fn template_var_strategy() -> impl Strategy<Value = TemplateVar> {
    (
        uuid_strategy(),
        name_strategy(),
        text_strategy(),
        any::<bool>(),
        any::<bool>(),
        any::<u64>(),
    )
        .prop_map(
            |(id, name, value, local, restricted, updated_at)| TemplateVar {
                id,
                name,
                value,
                location: String::new(),
                local,
                restricted,
                updated_at,
            },
        )
}

/// Strategy for generating roles.
pub fn role_strategy() -> impl Strategy<Value = Role> {
    (
        uuid_strategy(),
        name_strategy(),
        prop::collection::vec(any::<u16>(), 0..8),
        any::<u64>(),
    )
        .prop_map(|(id, name, permissions, updated_at)| Role {
            id,
            name,
            permissions,
            updated_at,
        })
}

/// Strategy for generating role field lists.
pub fn role_fields_strategy() -> impl Strategy<Value = Vec<RoleField>> {
    prop::collection::vec(
        prop::sample::select(vec![RoleField::Name, RoleField::Permissions]),
        0..2,
    )
}

/// Strategy for generating volumes.
pub fn volume_strategy() -> impl Strategy<Value = Volume> {
    (
        uuid_strategy(),
        name_strategy(),
        text_strategy(),
        name_strategy(),
        any::<bool>(),
        any::<u64>(),
    )
        .prop_map(
            |(id, name, definition, location, active, updated_at)| Volume {
                id,
                name,
                definition,
                location,
                active,
                updated_at,
            },
        )
}

/// Strategy for generating tokens.
pub fn token_strategy() -> impl Strategy<Value = Token> {
    (uuid_strategy(), uuid_strategy(), name_strategy(), any::<u64>()).prop_map(
        |(id, user_id, name, expires_at)| Token {
            id,
            user_id,
            name,
            expires_at,
        },
    )
}

/// Strategy for generating identifier lists from a shared pool.
pub fn id_list_strategy(pool: u128, max_len: usize) -> impl Strategy<Value = Vec<Uuid>> {
    prop::collection::vec(pooled_uuid_strategy(pool), 0..max_len)
}
