//! The closed set of command codes.

use crate::error::ProtocolError;
use std::fmt;

/// A command code, carried as the last byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// No-op.
    None = 0,
    /// Full-sync completion marker, echoed by the origin.
    Bootstrap = 1,
    /// Registration handshake.
    Register = 2,
    /// Request reconciliation of all templates.
    SyncTemplates = 3,
    /// Template created or changed.
    UpdateTemplate = 4,
    /// Template removed.
    DeleteTemplate = 5,
    /// Request the current state of one user.
    SyncUser = 6,
    /// User created or changed.
    UpdateUser = 7,
    /// User removed.
    DeleteUser = 8,
    /// Request reconciliation of all template variables.
    SyncTemplateVars = 9,
    /// Template variable created or changed.
    UpdateTemplateVar = 10,
    /// Template variable removed.
    DeleteTemplateVar = 11,
    /// Request the current state of one space.
    SyncSpace = 12,
    /// Space created or changed.
    UpdateSpace = 13,
    /// Space removed.
    DeleteSpace = 14,
    /// Request reconciliation of one user's spaces.
    SyncUserSpaces = 15,
    /// Volume created or changed.
    UpdateVolume = 16,
    /// Token created.
    MirrorToken = 17,
    /// Token removed.
    DeleteToken = 18,
    /// Request reconciliation of all roles.
    SyncRoles = 19,
    /// Role created or changed.
    UpdateRole = 20,
    /// Role removed.
    DeleteRole = 21,
}

impl Command {
    /// Every command, in wire-code order.
    pub const ALL: [Command; 22] = [
        Command::None,
        Command::Bootstrap,
        Command::Register,
        Command::SyncTemplates,
        Command::UpdateTemplate,
        Command::DeleteTemplate,
        Command::SyncUser,
        Command::UpdateUser,
        Command::DeleteUser,
        Command::SyncTemplateVars,
        Command::UpdateTemplateVar,
        Command::DeleteTemplateVar,
        Command::SyncSpace,
        Command::UpdateSpace,
        Command::DeleteSpace,
        Command::SyncUserSpaces,
        Command::UpdateVolume,
        Command::MirrorToken,
        Command::DeleteToken,
        Command::SyncRoles,
        Command::UpdateRole,
        Command::DeleteRole,
    ];

    /// Returns the wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns the protocol name of the command.
    pub fn name(self) -> &'static str {
        match self {
            Command::None => "NONE",
            Command::Bootstrap => "BOOTSTRAP",
            Command::Register => "REGISTER",
            Command::SyncTemplates => "SYNC_TEMPLATES",
            Command::UpdateTemplate => "UPDATE_TEMPLATE",
            Command::DeleteTemplate => "DELETE_TEMPLATE",
            Command::SyncUser => "SYNC_USER",
            Command::UpdateUser => "UPDATE_USER",
            Command::DeleteUser => "DELETE_USER",
            Command::SyncTemplateVars => "SYNC_TEMPLATEVARS",
            Command::UpdateTemplateVar => "UPDATE_TEMPLATEVAR",
            Command::DeleteTemplateVar => "DELETE_TEMPLATEVAR",
            Command::SyncSpace => "SYNC_SPACE",
            Command::UpdateSpace => "UPDATE_SPACE",
            Command::DeleteSpace => "DELETE_SPACE",
            Command::SyncUserSpaces => "SYNC_USER_SPACES",
            Command::UpdateVolume => "UPDATE_VOLUME",
            Command::MirrorToken => "MIRROR_TOKEN",
            Command::DeleteToken => "DELETE_TOKEN",
            Command::SyncRoles => "SYNC_ROLES",
            Command::UpdateRole => "UPDATE_ROLE",
            Command::DeleteRole => "DELETE_ROLE",
        }
    }

    /// Returns true for the leaf-initiated reconciliation requests.
    pub fn is_sync_request(self) -> bool {
        matches!(
            self,
            Command::SyncTemplates
                | Command::SyncUser
                | Command::SyncTemplateVars
                | Command::SyncSpace
                | Command::SyncUserSpaces
                | Command::SyncRoles
        )
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Command::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(ProtocolError::UnknownCommand(code))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
