//! Leaf authentication.
//!
//! A leaf presents `Authorization: Bearer <credential>` when upgrading.
//! The credential is either the shared leaf secret, which grants an
//! unrestricted node, or the id of an API token, which restricts the node
//! to the data owned by the token's user.

use crate::error::{OriginError, OriginResult};
use outpost_core::Repository;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// What an authenticated leaf may see and mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    /// Authenticated with the shared secret.
    Unrestricted,
    /// Authenticated with an API token.
    Restricted {
        /// The token used.
        token_id: Uuid,
        /// The token's owner.
        user_id: Uuid,
    },
}

impl AccessScope {
    /// Returns true for token-authenticated leaves.
    pub fn is_restricted(&self) -> bool {
        matches!(self, AccessScope::Restricted { .. })
    }

    /// Returns the owning user of a restricted scope.
    pub fn owner(&self) -> Option<Uuid> {
        match self {
            AccessScope::Unrestricted => None,
            AccessScope::Restricted { user_id, .. } => Some(*user_id),
        }
    }

    /// Returns true if data owned by `owner` is within this scope.
    pub fn covers(&self, owner: Uuid) -> bool {
        match self {
            AccessScope::Unrestricted => true,
            AccessScope::Restricted { user_id, .. } => *user_id == owner,
        }
    }
}

/// Validates leaf credentials.
pub struct Authenticator {
    secret: String,
    repo: Arc<dyn Repository>,
}

impl Authenticator {
    /// Creates a new authenticator.
    pub fn new(secret: impl Into<String>, repo: Arc<dyn Repository>) -> Self {
        Self {
            secret: secret.into(),
            repo,
        }
    }

    /// Authenticates the value of an `Authorization` header.
    pub fn authenticate(&self, header: Option<&str>) -> OriginResult<AccessScope> {
        let header = header.ok_or_else(|| unauthorized("missing authorization header"))?;
        let credential = bearer(header).ok_or_else(|| unauthorized("expected bearer credential"))?;

        let secret_matches = bool::from(credential.as_bytes().ct_eq(self.secret.as_bytes()));
        if !self.secret.is_empty() && secret_matches {
            return Ok(AccessScope::Unrestricted);
        }

        let token_id =
            Uuid::parse_str(credential).map_err(|_| unauthorized("invalid credential"))?;
        let token = self
            .repo
            .get_token(token_id)?
            .ok_or_else(|| unauthorized("unknown token"))?;

        if token.expires_at != 0 && token.expires_at <= now_millis() {
            return Err(unauthorized("token expired"));
        }

        match self.repo.get_user(token.user_id)? {
            Some(user) if user.active => Ok(AccessScope::Restricted {
                token_id: token.id,
                user_id: user.id,
            }),
            _ => Err(unauthorized("token owner is not active")),
        }
    }
}

fn unauthorized(reason: &str) -> OriginError {
    OriginError::Unauthorized(reason.to_string())
}

fn bearer(header: &str) -> Option<&str> {
    let (scheme, credential) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let credential = credential.trim();
    (!credential.is_empty()).then_some(credential)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_testkit::{id, token, World};

    fn authenticator() -> (World, Authenticator) {
        let world = World::seed();
        let auth = Authenticator::new("s3cret", world.repository());
        (world, auth)
    }

    #[test]
    fn shared_secret_is_unrestricted() {
        let (_world, auth) = authenticator();
        let scope = auth.authenticate(Some("Bearer s3cret")).unwrap();
        assert_eq!(scope, AccessScope::Unrestricted);
        assert!(scope.covers(id(World::BOB)));
    }

    #[test]
    fn token_is_restricted_to_owner() {
        let (_world, auth) = authenticator();
        let header = format!("bearer {}", id(World::ALICE_TOKEN));

        let scope = auth.authenticate(Some(&header)).unwrap();

        assert!(scope.is_restricted());
        assert_eq!(scope.owner(), Some(id(World::ALICE)));
        assert!(scope.covers(id(World::ALICE)));
        assert!(!scope.covers(id(World::BOB)));
    }

    #[test]
    fn bad_credentials_are_rejected() {
        let (_world, auth) = authenticator();

        for header in [None, Some("s3cret"), Some("Bearer wrong"), Some("Basic s3cret")] {
            let err = auth.authenticate(header).unwrap_err();
            assert!(matches!(err, OriginError::Unauthorized(_)), "{header:?}");
        }

        let unknown = format!("Bearer {}", id(0xdead));
        assert!(auth.authenticate(Some(&unknown)).is_err());
    }

    #[test]
    fn near_miss_secrets_are_rejected() {
        let (_world, auth) = authenticator();

        for header in ["Bearer s3creT", "Bearer s3cre", "Bearer s3crets", "Bearer S3CRET"] {
            let err = auth.authenticate(Some(header)).unwrap_err();
            assert!(matches!(err, OriginError::Unauthorized(_)), "{header}");
        }
        assert!(auth.authenticate(Some("Bearer s3cret")).is_ok());
    }

    #[test]
    fn expired_token_is_rejected() {
        let (world, auth) = authenticator();
        let mut expired = token(0x7ff, id(World::ALICE));
        expired.expires_at = 1;
        world.repo.save_token(&expired).unwrap();

        let header = format!("Bearer {}", expired.id);
        assert!(auth.authenticate(Some(&header)).is_err());
    }

    #[test]
    fn empty_secret_disables_shared_access() {
        let world = World::seed();
        let auth = Authenticator::new("", world.repository());
        assert!(auth.authenticate(Some("Bearer ")).is_err());
    }
}
