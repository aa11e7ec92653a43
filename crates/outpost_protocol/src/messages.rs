//! Typed payloads and the [`Message`] sum type.
//!
//! Field names are PascalCase on the wire, for the payload wrappers and the
//! entities nested in them, so that every implementation of the protocol
//! agrees on map keys regardless of its own naming rules.

use crate::command::Command;
use crate::envelope::Envelope;
use crate::error::{ProtocolError, ProtocolResult};
use outpost_core::{
    Role, RoleField, Space, SpaceField, Template, TemplateField, TemplateVar, Token, User, Volume,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Leaf to origin half of the REGISTER handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterRequest {
    /// Leaf software version.
    pub version: String,
    /// Location label the leaf serves.
    pub location: String,
    /// Session to resume, empty for a new one.
    pub session_id: String,
}

/// Origin to leaf half of the REGISTER handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterResponse {
    /// Whether the leaf was accepted.
    pub success: bool,
    /// Whether the leaf authenticated with a user token.
    pub restricted_node: bool,
    /// Origin software version.
    pub version: String,
    /// Effective location of the leaf.
    pub location: String,
    /// Origin timezone.
    pub timezone: String,
    /// Session identifier assigned by the origin.
    pub session_id: String,
}

/// Reconciliation request carrying the ids the leaf already holds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncExisting {
    /// Identifiers present on the leaf.
    pub existing: Vec<Uuid>,
}

/// Request for one user's current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncUser {
    /// User to refresh.
    pub user_id: Uuid,
}

/// Request for one space's current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncSpace {
    /// Space to refresh.
    pub space_id: Uuid,
}

/// Reconciliation of the spaces owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncUserSpaces {
    /// Owner whose spaces are reconciled.
    pub user_id: Uuid,
    /// Space identifiers present on the leaf.
    pub existing: Vec<Uuid>,
}

/// Template created or changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateTemplate {
    /// The template.
    pub template: Template,
    /// Fields carried; empty means the whole record.
    pub update_fields: Vec<TemplateField>,
}

/// User created or changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateUser {
    /// The user.
    pub user: User,
}

/// Template variable created or changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateTemplateVar {
    /// The variable.
    pub var: TemplateVar,
}

/// Space created or changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateSpace {
    /// The space.
    pub space: Space,
    /// Fields carried; empty means the whole record.
    pub update_fields: Vec<SpaceField>,
}

/// Volume created or changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateVolume {
    /// The volume.
    pub volume: Volume,
}

/// Token created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MirrorToken {
    /// The token.
    pub token: Token,
}

/// Role created or changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateRole {
    /// The role.
    pub role: Role,
    /// Fields carried; empty means the whole record.
    pub update_fields: Vec<RoleField>,
}

/// Deletion marker carrying only the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tombstone {
    /// Identifier of the removed entity.
    pub id: Uuid,
}

impl Tombstone {
    /// Creates a tombstone for `id`.
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }
}

/// A decoded envelope.
///
/// REGISTER decodes as [`RegisterRequest`], the only shape that may arrive
/// outside the handshake. The handshake reply is read with
/// [`Envelope::payload`] as a [`RegisterResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// No-op.
    None,
    /// Full-sync completion marker.
    Bootstrap,
    /// Registration request.
    Register(RegisterRequest),
    /// Template reconciliation request.
    SyncTemplates(SyncExisting),
    /// Template upsert.
    UpdateTemplate(UpdateTemplate),
    /// Template removal.
    DeleteTemplate(Tombstone),
    /// User refresh request.
    SyncUser(SyncUser),
    /// User upsert.
    UpdateUser(UpdateUser),
    /// User removal.
    DeleteUser(Tombstone),
    /// Template variable reconciliation request.
    SyncTemplateVars(SyncExisting),
    /// Template variable upsert.
    UpdateTemplateVar(UpdateTemplateVar),
    /// Template variable removal.
    DeleteTemplateVar(Tombstone),
    /// Space refresh request.
    SyncSpace(SyncSpace),
    /// Space upsert.
    UpdateSpace(UpdateSpace),
    /// Space removal.
    DeleteSpace(Tombstone),
    /// Per-user space reconciliation request.
    SyncUserSpaces(SyncUserSpaces),
    /// Volume upsert.
    UpdateVolume(UpdateVolume),
    /// Token creation.
    MirrorToken(MirrorToken),
    /// Token removal.
    DeleteToken(Tombstone),
    /// Role reconciliation request.
    SyncRoles(SyncExisting),
    /// Role upsert.
    UpdateRole(UpdateRole),
    /// Role removal.
    DeleteRole(Tombstone),
}

impl Message {
    /// Returns the command code of this message.
    pub fn command(&self) -> Command {
        match self {
            Message::None => Command::None,
            Message::Bootstrap => Command::Bootstrap,
            Message::Register(_) => Command::Register,
            Message::SyncTemplates(_) => Command::SyncTemplates,
            Message::UpdateTemplate(_) => Command::UpdateTemplate,
            Message::DeleteTemplate(_) => Command::DeleteTemplate,
            Message::SyncUser(_) => Command::SyncUser,
            Message::UpdateUser(_) => Command::UpdateUser,
            Message::DeleteUser(_) => Command::DeleteUser,
            Message::SyncTemplateVars(_) => Command::SyncTemplateVars,
            Message::UpdateTemplateVar(_) => Command::UpdateTemplateVar,
            Message::DeleteTemplateVar(_) => Command::DeleteTemplateVar,
            Message::SyncSpace(_) => Command::SyncSpace,
            Message::UpdateSpace(_) => Command::UpdateSpace,
            Message::DeleteSpace(_) => Command::DeleteSpace,
            Message::SyncUserSpaces(_) => Command::SyncUserSpaces,
            Message::UpdateVolume(_) => Command::UpdateVolume,
            Message::MirrorToken(_) => Command::MirrorToken,
            Message::DeleteToken(_) => Command::DeleteToken,
            Message::SyncRoles(_) => Command::SyncRoles,
            Message::UpdateRole(_) => Command::UpdateRole,
            Message::DeleteRole(_) => Command::DeleteRole,
        }
    }

    /// Encodes the message into a frame.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let command = self.command();
        match self {
            Message::None | Message::Bootstrap => Envelope::encode(command, &()),
            Message::Register(p) => Envelope::encode(command, p),
            Message::SyncTemplates(p) | Message::SyncTemplateVars(p) | Message::SyncRoles(p) => {
                Envelope::encode(command, p)
            }
            Message::UpdateTemplate(p) => Envelope::encode(command, p),
            Message::SyncUser(p) => Envelope::encode(command, p),
            Message::UpdateUser(p) => Envelope::encode(command, p),
            Message::UpdateTemplateVar(p) => Envelope::encode(command, p),
            Message::SyncSpace(p) => Envelope::encode(command, p),
            Message::UpdateSpace(p) => Envelope::encode(command, p),
            Message::SyncUserSpaces(p) => Envelope::encode(command, p),
            Message::UpdateVolume(p) => Envelope::encode(command, p),
            Message::MirrorToken(p) => Envelope::encode(command, p),
            Message::UpdateRole(p) => Envelope::encode(command, p),
            Message::DeleteTemplate(p)
            | Message::DeleteUser(p)
            | Message::DeleteTemplateVar(p)
            | Message::DeleteSpace(p)
            | Message::DeleteToken(p)
            | Message::DeleteRole(p) => Envelope::encode(command, p),
        }
    }

    /// Decodes a frame into a typed message.
    pub fn decode(bytes: Vec<u8>) -> ProtocolResult<Self> {
        Self::from_envelope(&Envelope::decode(bytes)?)
    }

    /// Decodes the payload of an already split envelope.
    pub fn from_envelope(envelope: &Envelope) -> ProtocolResult<Self> {
        let message = match envelope.command() {
            Command::None => Message::None,
            Command::Bootstrap => Message::Bootstrap,
            Command::Register => Message::Register(envelope.payload()?),
            Command::SyncTemplates => Message::SyncTemplates(envelope.payload()?),
            Command::UpdateTemplate => Message::UpdateTemplate(envelope.payload()?),
            Command::DeleteTemplate => Message::DeleteTemplate(envelope.payload()?),
            Command::SyncUser => Message::SyncUser(envelope.payload()?),
            Command::UpdateUser => Message::UpdateUser(envelope.payload()?),
            Command::DeleteUser => Message::DeleteUser(envelope.payload()?),
            Command::SyncTemplateVars => Message::SyncTemplateVars(envelope.payload()?),
            Command::UpdateTemplateVar => Message::UpdateTemplateVar(envelope.payload()?),
            Command::DeleteTemplateVar => Message::DeleteTemplateVar(envelope.payload()?),
            Command::SyncSpace => Message::SyncSpace(envelope.payload()?),
            Command::UpdateSpace => Message::UpdateSpace(envelope.payload()?),
            Command::DeleteSpace => Message::DeleteSpace(envelope.payload()?),
            Command::SyncUserSpaces => Message::SyncUserSpaces(envelope.payload()?),
            Command::UpdateVolume => Message::UpdateVolume(envelope.payload()?),
            Command::MirrorToken => Message::MirrorToken(envelope.payload()?),
            Command::DeleteToken => Message::DeleteToken(envelope.payload()?),
            Command::SyncRoles => Message::SyncRoles(envelope.payload()?),
            Command::UpdateRole => Message::UpdateRole(envelope.payload()?),
            Command::DeleteRole => Message::DeleteRole(envelope.payload()?),
        };
        Ok(message)
    }

    /// Builds the REGISTER reply frame.
    pub fn encode_register_response(response: &RegisterResponse) -> ProtocolResult<Vec<u8>> {
        Envelope::encode(Command::Register, response)
    }

    /// Reads the REGISTER reply from a handshake frame.
    pub fn decode_register_response(bytes: Vec<u8>) -> ProtocolResult<RegisterResponse> {
        let envelope = Envelope::decode(bytes)?;
        match envelope.command() {
            Command::Register => envelope.payload(),
            other => Err(ProtocolError::UnexpectedCommand(other)),
        }
    }
}
