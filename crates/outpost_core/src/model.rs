//! Replicated entities.
//!
//! Every entity is identified by a UUID. `Space`, `Template` and `Role`
//! additionally expose a field enum so that an update can name the subset
//! of fields it carries instead of rewriting the whole record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Anything with a stable identifier.
pub trait Entity {
    /// Returns the entity identifier.
    fn id(&self) -> Uuid;
}

/// A platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    /// User identifier.
    pub id: Uuid,
    /// Login name.
    pub username: String,
    /// Contact address.
    pub email: String,
    /// Inactive users are treated as absent by leaves.
    pub active: bool,
    /// Role identifiers granted to the user.
    pub roles: Vec<Uuid>,
    /// Public key installed into the user's spaces.
    pub ssh_public_key: String,
    /// Preferred timezone.
    pub timezone: String,
    /// Last modification time (Unix millis).
    pub updated_at: u64,
}

/// A workspace owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Space {
    /// Space identifier.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Template the space was created from.
    pub template_id: Uuid,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Shell started by the agent.
    pub shell: String,
    /// Location (region) the space runs in.
    pub location: String,
    /// Whether the space is running.
    pub is_deployed: bool,
    /// Whether a state transition is in progress.
    pub is_pending: bool,
    /// Whether the space is being torn down.
    pub is_deleting: bool,
    /// Start time of the current deployment (Unix millis).
    pub started_at: u64,
    /// Last modification time (Unix millis).
    pub updated_at: u64,
}

/// Fields of a [`Space`] that can be updated individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpaceField {
    /// `template_id`
    TemplateId,
    /// `name`
    Name,
    /// `description`
    Description,
    /// `shell`
    Shell,
    /// `location`
    Location,
    /// `is_deployed`
    IsDeployed,
    /// `is_pending`
    IsPending,
    /// `is_deleting`
    IsDeleting,
    /// `started_at`
    StartedAt,
}

impl Space {
    /// Copies the listed fields from `from` into `self`.
    ///
    /// `updated_at` is always copied; the owner and identifier never are.
    pub fn apply_fields(&mut self, from: &Space, fields: &[SpaceField]) {
        for field in fields {
            match field {
                SpaceField::TemplateId => self.template_id = from.template_id,
                SpaceField::Name => self.name.clone_from(&from.name),
                SpaceField::Description => self.description.clone_from(&from.description),
                SpaceField::Shell => self.shell.clone_from(&from.shell),
                SpaceField::Location => self.location.clone_from(&from.location),
                SpaceField::IsDeployed => self.is_deployed = from.is_deployed,
                SpaceField::IsPending => self.is_pending = from.is_pending,
                SpaceField::IsDeleting => self.is_deleting = from.is_deleting,
                SpaceField::StartedAt => self.started_at = from.started_at,
            }
        }
        self.updated_at = from.updated_at;
    }
}

/// A workspace template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    /// Template identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Job specification handed to the orchestrator.
    pub job: String,
    /// Volume specification.
    pub volumes: String,
    /// Content hash of job and volumes.
    pub hash: String,
    /// Locations the template may be deployed to (empty means any).
    pub locations: Vec<String>,
    /// Whether new spaces may use the template.
    pub active: bool,
    /// Last modification time (Unix millis).
    pub updated_at: u64,
}

/// Fields of a [`Template`] that can be updated individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateField {
    /// `name`
    Name,
    /// `description`
    Description,
    /// `job`
    Job,
    /// `volumes`
    Volumes,
    /// `hash`
    Hash,
    /// `locations`
    Locations,
    /// `active`
    Active,
}

impl Template {
    /// Copies the listed fields from `from` into `self`.
    pub fn apply_fields(&mut self, from: &Template, fields: &[TemplateField]) {
        for field in fields {
            match field {
                TemplateField::Name => self.name.clone_from(&from.name),
                TemplateField::Description => self.description.clone_from(&from.description),
                TemplateField::Job => self.job.clone_from(&from.job),
                TemplateField::Volumes => self.volumes.clone_from(&from.volumes),
                TemplateField::Hash => self.hash.clone_from(&from.hash),
                TemplateField::Locations => self.locations.clone_from(&from.locations),
                TemplateField::Active => self.active = from.active,
            }
        }
        self.updated_at = from.updated_at;
    }
}

/// A variable substituted into template jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateVar {
    /// Variable identifier.
    pub id: Uuid,
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
    /// Location the variable applies to (empty means all).
    pub location: String,
    /// Private to the server that owns it, never replicated.
    pub local: bool,
    /// Withheld from restricted leaves.
    pub restricted: bool,
    /// Last modification time (Unix millis).
    pub updated_at: u64,
}

/// An API token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Token {
    /// Token identifier, also the bearer credential.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Display name.
    pub name: String,
    /// Expiry time (Unix millis).
    pub expires_at: u64,
}

/// A named permission set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    /// Role identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Permission codes granted by the role.
    pub permissions: Vec<u16>,
    /// Last modification time (Unix millis).
    pub updated_at: u64,
}

/// Fields of a [`Role`] that can be updated individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleField {
    /// `name`
    Name,
    /// `permissions`
    Permissions,
}

impl Role {
    /// Copies the listed fields from `from` into `self`.
    pub fn apply_fields(&mut self, from: &Role, fields: &[RoleField]) {
        for field in fields {
            match field {
                RoleField::Name => self.name.clone_from(&from.name),
                RoleField::Permissions => self.permissions.clone_from(&from.permissions),
            }
        }
        self.updated_at = from.updated_at;
    }
}

/// A persistent volume definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Volume {
    /// Volume identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Volume specification handed to the orchestrator.
    pub definition: String,
    /// Location the volume lives in.
    pub location: String,
    /// Whether the volume is provisioned.
    pub active: bool,
    /// Last modification time (Unix millis).
    pub updated_at: u64,
}

macro_rules! impl_entity {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Entity for $ty {
                fn id(&self) -> Uuid {
                    self.id
                }
            }
        )*
    };
}

impl_entity!(User, Space, Template, TemplateVar, Token, Role, Volume);

#[cfg(test)]
mod tests {
    use super::*;

    fn space(name: &str, deployed: bool, updated_at: u64) -> Space {
        Space {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            template_id: Uuid::nil(),
            name: name.into(),
            description: String::new(),
            shell: "bash".into(),
            location: "eu".into(),
            is_deployed: deployed,
            is_pending: false,
            is_deleting: false,
            started_at: 0,
            updated_at,
        }
    }

    #[test]
    fn space_partial_update_touches_only_listed_fields() {
        let mut stored = space("dev", false, 1);
        let incoming = space("renamed", true, 2);

        stored.apply_fields(&incoming, &[SpaceField::IsDeployed]);

        assert!(stored.is_deployed);
        assert_eq!(stored.name, "dev");
        assert_eq!(stored.updated_at, 2);
    }

    #[test]
    fn role_partial_update() {
        let mut stored = Role {
            id: Uuid::nil(),
            name: "admin".into(),
            permissions: vec![1],
            updated_at: 1,
        };
        let incoming = Role {
            id: Uuid::nil(),
            name: "ignored".into(),
            permissions: vec![1, 2, 3],
            updated_at: 5,
        };

        stored.apply_fields(&incoming, &[RoleField::Permissions]);

        assert_eq!(stored.name, "admin");
        assert_eq!(stored.permissions, vec![1, 2, 3]);
    }
}
