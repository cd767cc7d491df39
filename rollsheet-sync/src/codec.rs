//! Member → mirror row encoding.
//!
//! | Column | Field                                   |
//! |--------|-----------------------------------------|
//! | A      | member id (identity column)             |
//! | B, C   | given name, family name                 |
//! | D      | job title                               |
//! | E      | organization name or empty              |
//! | F      | bundle names, each followed by `;`      |
//! | G      | functional role names, each with `;`    |
//! | H, I   | country name, region name (or empty)    |
//! | J      | phone number                            |
//! | K      | first handle of the preferred kind      |
//! | L, M   | email, status                           |
//!
//! Encoding only: rows are never decoded back into members.

use rollsheet_core::{config::MIRROR_WIDTH, RosterMember, SyncConfig};

/// One encoded mirror row.
pub type MirrorRow = [String; MIRROR_WIDTH];

/// Column holding member ids.
pub const IDENTITY_COLUMN: &str = "A";

/// Last column of the mirror layout.
pub const LAST_COLUMN: char = (b'A' + MIRROR_WIDTH as u8 - 1) as char;

/// Encodes members with a fixed header and preferred contact handle kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCodec {
    header: MirrorRow,
    preferred_handle: String,
}

impl RowCodec {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            header: config.header.clone(),
            preferred_handle: config.preferred_handle.clone(),
        }
    }

    pub fn header(&self) -> &MirrorRow {
        &self.header
    }

    pub fn encode(&self, member: &RosterMember) -> MirrorRow {
        let handle = member
            .contact_handles
            .iter()
            .find(|h| h.kind == self.preferred_handle)
            .map(|h| h.username.clone())
            .unwrap_or_default();

        [
            member.id.0.clone(),
            member.given_name.clone(),
            member.family_name.clone(),
            member.job_title.clone(),
            member.organization.clone().unwrap_or_default(),
            join_with_trailing(&member.bundles),
            join_with_trailing(&member.functional_roles),
            member.country.clone().unwrap_or_default(),
            member.region.clone().unwrap_or_default(),
            member.phone_number.clone(),
            handle,
            member.email.clone(),
            member.status.clone(),
        ]
    }
}

impl Default for RowCodec {
    fn default() -> Self {
        Self::new(&SyncConfig::default())
    }
}

/// `["a", "b"]` → `"a;b;"`. The trailing separator is part of the format.
fn join_with_trailing(names: &[String]) -> String {
    names.iter().fold(String::new(), |mut acc, name| {
        acc.push_str(name);
        acc.push(';');
        acc
    })
}
