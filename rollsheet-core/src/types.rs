//! Domain types for roster mirroring.
//!
//! Identifiers are string newtypes: the roster store hands out structured ids,
//! but the mirror's identity column is string-typed, so the string form is the
//! canonical one everywhere in this workspace.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Identifier of a roster list.
    ListId
);
string_newtype!(
    /// Identifier of an external spreadsheet (the mirror).
    MirrorId
);
string_newtype!(
    /// Canonical member id, exactly as written to the identity column.
    MemberId
);
string_newtype!(
    /// Identifier of a binding record.
    BindingId
);
string_newtype!(
    /// Opaque reference to the credential that owns a mirror. Resolving it to
    /// a token is the tabular collaborator's job.
    CredentialRef
);

impl BindingId {
    /// Fresh random binding id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Unique key of a binding: one mirror per list at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingKey {
    pub list: ListId,
    pub mirror: MirrorId,
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.list, self.mirror)
    }
}

/// Durable association between a roster list and an external mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBinding {
    pub id: BindingId,
    pub list: ListId,
    pub mirror: MirrorId,
    /// Tab id targeted by structural edits; `0` is the first tab of a new sheet.
    #[serde(default)]
    pub sheet_tab: i64,
    pub owner: CredentialRef,
    pub created_at: DateTime<Utc>,
}

impl SyncBinding {
    pub fn key(&self) -> BindingKey {
        BindingKey {
            list: self.list.clone(),
            mirror: self.mirror.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Roster members
// ---------------------------------------------------------------------------

/// A messaging handle attached to a member (e.g. kind `Skype`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactHandle {
    pub kind: String,
    pub username: String,
}

/// Read view of a roster member, owned by the roster store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterMember {
    pub id: MemberId,
    /// Display name; the roster's sort key.
    pub name: String,
    pub given_name: String,
    pub family_name: String,
    pub job_title: String,
    pub organization: Option<String>,
    pub bundles: Vec<String>,
    pub functional_roles: Vec<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub phone_number: String,
    pub contact_handles: Vec<ContactHandle>,
    pub email: String,
    pub status: String,
}

impl RosterMember {
    /// Mirror ordering key. The id breaks ties between equal names.
    pub fn sort_key(&self) -> (&str, &str) {
        (self.name.as_str(), self.id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Access criteria
// ---------------------------------------------------------------------------

/// Member attribute a criteria clause can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberField {
    Status,
    Organization,
    Country,
    Region,
    Bundle,
    FunctionalRole,
}

impl MemberField {
    fn values<'a>(&self, member: &'a RosterMember) -> Vec<&'a str> {
        match self {
            MemberField::Status => vec![member.status.as_str()],
            MemberField::Organization => member.organization.as_deref().into_iter().collect(),
            MemberField::Country => member.country.as_deref().into_iter().collect(),
            MemberField::Region => member.region.as_deref().into_iter().collect(),
            MemberField::Bundle => member.bundles.iter().map(String::as_str).collect(),
            MemberField::FunctionalRole => {
                member.functional_roles.iter().map(String::as_str).collect()
            }
        }
    }
}

/// One conjunct of a binding's visibility filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Clause {
    /// Every member of the list is visible.
    Everyone,
    /// The member's field must carry at least one of `values`.
    FieldIn {
        field: MemberField,
        values: Vec<String>,
    },
}

/// Visibility filter resolved for a binding's owner.
///
/// A filter without clauses is not "match everything": it means the owner's
/// visibility could not be determined, and every operation fails closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCriteria {
    #[serde(default)]
    pub clauses: Vec<Clause>,
}

impl AccessCriteria {
    pub fn everyone() -> Self {
        Self {
            clauses: vec![Clause::Everyone],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// `true` when `member` satisfies every clause. Empty criteria permit nobody.
    pub fn permits(&self, member: &RosterMember) -> bool {
        if self.is_empty() {
            return false;
        }
        self.clauses.iter().all(|clause| match clause {
            Clause::Everyone => true,
            Clause::FieldIn { field, values } => field
                .values(member)
                .iter()
                .any(|v| values.iter().any(|allowed| allowed == v)),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
