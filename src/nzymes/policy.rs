//! Capability policy
//!
//!     Every gate the engine applies is one call to [authorize], which combines the
//!     capabilities of two authors: the requester (who wrote the content being processed)
//!     and the addressed author (who owns the item an enzyme refers to).
//!
//!         Operation        allowed when
//!         Inject           requester: inject
//!         TranscludeField  addressed: create_static_custom_fields, and
//!                          owns, or addressed: share_static_custom_fields
//!                                and requester: use_others_custom_fields
//!         ExecuteField     same, with the dynamic capabilities
//!         UseAttribute     owns and addressed: use_own_attributes, or
//!                          not owns and requester: use_others_attributes
//!         ResolveMissing   requester: create_dynamic_custom_fields
//!
//!     Roles bundle capabilities; each role has all the capabilities of the previous one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::host::{AuthorId, Authorization};

/// Prefix of capability and role names in the host.
pub const PREFIX: &str = "__nzymes__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Inject enzymes into one's own content
    Inject,
    UseOwnAttributes,
    UseOthersAttributes,
    UseOwnCustomFields,
    UseOthersCustomFields,
    /// Own fields can be transcluded
    CreateStaticCustomFields,
    /// Own fields can be executed
    CreateDynamicCustomFields,
    /// Own transcludable fields can be used by others
    ShareStaticCustomFields,
    /// Own executable fields can be used by others
    ShareDynamicCustomFields,
}

impl Capability {
    pub const ALL: [Capability; 9] = [
        Capability::Inject,
        Capability::UseOwnAttributes,
        Capability::UseOthersAttributes,
        Capability::UseOwnCustomFields,
        Capability::UseOthersCustomFields,
        Capability::CreateStaticCustomFields,
        Capability::CreateDynamicCustomFields,
        Capability::ShareStaticCustomFields,
        Capability::ShareDynamicCustomFields,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Inject => "inject",
            Capability::UseOwnAttributes => "use_own_attributes",
            Capability::UseOthersAttributes => "use_others_attributes",
            Capability::UseOwnCustomFields => "use_own_custom_fields",
            Capability::UseOthersCustomFields => "use_others_custom_fields",
            Capability::CreateStaticCustomFields => "create_static_custom_fields",
            Capability::CreateDynamicCustomFields => "create_dynamic_custom_fields",
            Capability::ShareStaticCustomFields => "share_static_custom_fields",
            Capability::ShareDynamicCustomFields => "share_dynamic_custom_fields",
        }
    }

    /// The name the host knows the capability by, e.g. `__nzymes__inject`.
    pub fn host_name(&self) -> String {
        format!("{}{}", PREFIX, self.name())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = String;

    /// Accepts both the short and the host name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix(PREFIX).unwrap_or(s);
        Capability::ALL
            .into_iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| format!("unknown capability '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    User,
    PrivilegedUser,
    TrustedUser,
    Coder,
    TrustedCoder,
    /// Holds every capability
    Administrator,
}

impl Role {
    pub const NZYMES: [Role; 5] = [
        Role::User,
        Role::PrivilegedUser,
        Role::TrustedUser,
        Role::Coder,
        Role::TrustedCoder,
    ];

    pub fn capabilities(&self) -> Vec<Capability> {
        use Capability::*;
        let added: &[Capability] = match self {
            Role::User => &[
                Inject,
                UseOwnAttributes,
                UseOwnCustomFields,
                CreateStaticCustomFields,
            ],
            Role::PrivilegedUser => &[UseOthersCustomFields],
            Role::TrustedUser => &[ShareStaticCustomFields],
            Role::Coder => &[CreateDynamicCustomFields],
            Role::TrustedCoder => &[ShareDynamicCustomFields],
            Role::Administrator => return Capability::ALL.to_vec(),
        };
        let mut result = match self.previous() {
            Some(previous) => previous.capabilities(),
            None => Vec::new(),
        };
        result.extend_from_slice(added);
        result
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn previous(&self) -> Option<Role> {
        match self {
            Role::User | Role::Administrator => None,
            Role::PrivilegedUser => Some(Role::User),
            Role::TrustedUser => Some(Role::PrivilegedUser),
            Role::Coder => Some(Role::TrustedUser),
            Role::TrustedCoder => Some(Role::Coder),
        }
    }

    /// The name the host knows the role by, e.g. `__nzymes__Coder`.
    pub fn host_name(&self) -> String {
        format!("{}{:?}", PREFIX, self)
    }
}

/// What the engine is about to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Inject,
    TranscludeField,
    ExecuteField,
    UseAttribute,
    ResolveMissing,
}

/// Who is involved in an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub requester: AuthorId,
    /// Author of the addressed item; the requester when nothing is addressed
    pub addressed: AuthorId,
    /// The requester is the addressed author
    pub owns: bool,
}

impl Access {
    pub fn own(requester: AuthorId) -> Self {
        Access {
            requester,
            addressed: requester,
            owns: true,
        }
    }

    pub fn between(requester: AuthorId, addressed: AuthorId) -> Self {
        Access {
            requester,
            addressed,
            owns: requester == addressed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Granted,
    /// The requester lacks a capability
    Requester(Capability),
    /// The addressed author lacks a capability
    Addressed(Capability),
    /// The addressed author does not share, or the requester cannot use what others share
    NotShared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: Reason,
}

impl Decision {
    fn allow() -> Self {
        Decision {
            allowed: true,
            reason: Reason::Granted,
        }
    }

    fn deny(reason: Reason) -> Self {
        Decision {
            allowed: false,
            reason,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            Reason::Granted => write!(f, "granted"),
            Reason::Requester(c) => write!(f, "requester cannot {}", c),
            Reason::Addressed(c) => write!(f, "addressed author cannot {}", c),
            Reason::NotShared => write!(f, "not shared with the requester"),
        }
    }
}

/// Decide whether an operation is allowed.
pub fn authorize(
    operation: Operation,
    access: Access,
    authorization: &dyn Authorization,
) -> Decision {
    let requester_can = |c| authorization.author_can(access.requester, c);
    let addressed_can = |c| authorization.author_can(access.addressed, c);

    let require = |holds: bool, reason: Reason| {
        if holds {
            Decision::allow()
        } else {
            Decision::deny(reason)
        }
    };

    let field = |create: Capability, share: Capability| {
        if !addressed_can(create) {
            return Decision::deny(Reason::Addressed(create));
        }
        if access.owns {
            return Decision::allow();
        }
        require(
            addressed_can(share) && requester_can(Capability::UseOthersCustomFields),
            Reason::NotShared,
        )
    };

    match operation {
        Operation::Inject => require(
            requester_can(Capability::Inject),
            Reason::Requester(Capability::Inject),
        ),
        Operation::TranscludeField => field(
            Capability::CreateStaticCustomFields,
            Capability::ShareStaticCustomFields,
        ),
        Operation::ExecuteField => field(
            Capability::CreateDynamicCustomFields,
            Capability::ShareDynamicCustomFields,
        ),
        Operation::UseAttribute if access.owns => require(
            addressed_can(Capability::UseOwnAttributes),
            Reason::Addressed(Capability::UseOwnAttributes),
        ),
        Operation::UseAttribute => require(
            requester_can(Capability::UseOthersAttributes),
            Reason::Requester(Capability::UseOthersAttributes),
        ),
        Operation::ResolveMissing => require(
            requester_can(Capability::CreateDynamicCustomFields),
            Reason::Requester(Capability::CreateDynamicCustomFields),
        ),
    }
}
