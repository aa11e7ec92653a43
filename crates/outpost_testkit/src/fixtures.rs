//! Entity fixtures and a seeded repository.
//!
//! Identifiers are deterministic so that assertions can name entities
//! directly instead of threading generated ids through a test.

use outpost_core::{
    MemoryRepository, Repository, Role, Space, Template, TemplateVar, Token, User, Volume,
};
use std::sync::Arc;
use uuid::Uuid;

/// Returns a deterministic identifier.
pub fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

/// Creates an active user.
pub fn user(n: u128, username: &str) -> User {
    User {
        id: id(n),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        active: true,
        roles: Vec::new(),
        ssh_public_key: String::new(),
        timezone: "UTC".to_string(),
        updated_at: 1,
    }
}

/// Creates a space owned by `owner`.
pub fn space(n: u128, owner: Uuid, name: &str) -> Space {
    Space {
        id: id(n),
        user_id: owner,
        template_id: Uuid::nil(),
        name: name.to_string(),
        description: String::new(),
        shell: "bash".to_string(),
        location: "eu".to_string(),
        is_deployed: false,
        is_pending: false,
        is_deleting: false,
        started_at: 0,
        updated_at: 1,
    }
}

/// Creates an active template deployable anywhere.
pub fn template(n: u128, name: &str) -> Template {
    Template {
        id: id(n),
        name: name.to_string(),
        description: String::new(),
        job: format!("job \"{name}\" {{}}"),
        volumes: String::new(),
        hash: format!("{n:x}"),
        locations: Vec::new(),
        active: true,
        updated_at: 1,
    }
}

/// Creates a replicated, unrestricted template variable.
pub fn template_var(n: u128, name: &str, value: &str) -> TemplateVar {
    TemplateVar {
        id: id(n),
        name: name.to_string(),
        value: value.to_string(),
        location: String::new(),
        local: false,
        restricted: false,
        updated_at: 1,
    }
}

/// Creates a role.
pub fn role(n: u128, name: &str, permissions: &[u16]) -> Role {
    Role {
        id: id(n),
        name: name.to_string(),
        permissions: permissions.to_vec(),
        updated_at: 1,
    }
}

/// Creates an active volume in `location`.
pub fn volume(n: u128, name: &str, location: &str) -> Volume {
    Volume {
        id: id(n),
        name: name.to_string(),
        definition: format!("volume \"{name}\" {{}}"),
        location: location.to_string(),
        active: true,
        updated_at: 1,
    }
}

/// Creates a token that never expires in practice.
pub fn token(n: u128, owner: Uuid) -> Token {
    Token {
        id: id(n),
        user_id: owner,
        name: format!("token-{n:x}"),
        expires_at: u64::MAX,
    }
}

/// A populated repository with two users.
///
/// Alice owns two spaces and a token, Bob owns one space and a token.
/// One template variable is `restricted` and one is `local`.
pub struct World {
    /// The seeded repository.
    pub repo: Arc<MemoryRepository>,
    /// First user.
    pub alice: User,
    /// Second user.
    pub bob: User,
}

impl World {
    /// Alice's identifier.
    pub const ALICE: u128 = 0x100;
    /// Bob's identifier.
    pub const BOB: u128 = 0x101;
    /// Alice's first space.
    pub const ALICE_SPACE: u128 = 0x200;
    /// Alice's second space.
    pub const ALICE_SPACE_2: u128 = 0x201;
    /// Bob's space.
    pub const BOB_SPACE: u128 = 0x202;
    /// First template.
    pub const TEMPLATE: u128 = 0x300;
    /// Second template.
    pub const TEMPLATE_2: u128 = 0x301;
    /// Plain template variable.
    pub const VAR: u128 = 0x400;
    /// Variable withheld from restricted leaves.
    pub const RESTRICTED_VAR: u128 = 0x401;
    /// Variable private to the origin.
    pub const LOCAL_VAR: u128 = 0x402;
    /// Role.
    pub const ROLE: u128 = 0x500;
    /// Volume.
    pub const VOLUME: u128 = 0x600;
    /// Alice's token.
    pub const ALICE_TOKEN: u128 = 0x700;
    /// Bob's token.
    pub const BOB_TOKEN: u128 = 0x701;

    /// Builds and populates the repository.
    pub fn seed() -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let mut alice = user(Self::ALICE, "alice");
        alice.roles.push(id(Self::ROLE));
        let bob = user(Self::BOB, "bob");

        repo.save_user(&alice).expect("seed alice");
        repo.save_user(&bob).expect("seed bob");

        for space in [
            space(Self::ALICE_SPACE, alice.id, "alice-dev"),
            space(Self::ALICE_SPACE_2, alice.id, "alice-ml"),
            space(Self::BOB_SPACE, bob.id, "bob-dev"),
        ] {
            repo.save_space(&space, &[]).expect("seed space");
        }

        repo.save_template(&template(Self::TEMPLATE, "ubuntu"), &[])
            .expect("seed template");
        repo.save_template(&template(Self::TEMPLATE_2, "python"), &[])
            .expect("seed template");

        let mut restricted = template_var(Self::RESTRICTED_VAR, "registry_password", "hunter2");
        restricted.restricted = true;
        let mut local = template_var(Self::LOCAL_VAR, "origin_only", "x");
        local.local = true;
        for var in [template_var(Self::VAR, "domain", "example.com"), restricted, local] {
            repo.save_template_var(&var).expect("seed var");
        }

        repo.save_role(&role(Self::ROLE, "admin", &[1, 2, 3]), &[])
            .expect("seed role");
        repo.save_volume(&volume(Self::VOLUME, "shared", "eu"))
            .expect("seed volume");
        repo.save_token(&token(Self::ALICE_TOKEN, alice.id))
            .expect("seed token");
        repo.save_token(&token(Self::BOB_TOKEN, bob.id))
            .expect("seed token");

        Self { repo, alice, bob }
    }

    /// Returns the repository as a trait object.
    pub fn repository(&self) -> Arc<dyn Repository> {
        self.repo.clone()
    }
}
