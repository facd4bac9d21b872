//! Mapping between (identity, logical name) pairs and backend secret ids.
//!
//! A physical key is `owner_prefix(identity) + "_" + name`. Two prefix
//! encodings exist:
//!
//! * [`KeyEncoding::Escaped`] keeps ASCII alphanumerics and writes every
//!   other byte as `-` plus two lowercase hex digits. The encoding is
//!   injective and never produces `_`, so the separator cannot be confused
//!   with prefix content and no prefix is a prefix of another owner's keys.
//! * [`KeyEncoding::Legacy`] replaces `@` and `.` with `_`. It matches keys
//!   written by earlier deployments but distinct emails can collide
//!   (`a.b@x.com` and `a_b@x_com`), and one owner's prefix can be a prefix
//!   of another's (`a@b.co` and `a@b.co.uk`).

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use nubem_secrets_spec::{Caller, Identity, LogicalName, PhysicalKey};

pub const SEPARATOR: char = '_';

/// Longest value the backend accepts for a label.
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum KeyEncoding {
    Legacy,
    #[default]
    Escaped,
}

impl KeyEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyEncoding::Legacy => "legacy",
            KeyEncoding::Escaped => "escaped",
        }
    }
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyEncoding {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "legacy" | "substitution" => Ok(KeyEncoding::Legacy),
            "" | "escaped" => Ok(KeyEncoding::Escaped),
            other => Err(format!(
                "unknown key encoding `{other}` (expected `escaped` or `legacy`)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceMapper {
    encoding: KeyEncoding,
}

impl NamespaceMapper {
    pub fn new(encoding: KeyEncoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> KeyEncoding {
        self.encoding
    }

    /// Encoded identity that starts every key the identity owns.
    pub fn owner_prefix(&self, identity: &Identity) -> String {
        match self.encoding {
            KeyEncoding::Legacy => legacy_prefix(identity.email()),
            KeyEncoding::Escaped => escaped_prefix(identity.email()),
        }
    }

    pub fn encode(&self, caller: &Caller, name: &LogicalName) -> PhysicalKey {
        match caller {
            Caller::System => PhysicalKey::new(name.as_str()),
            Caller::User(identity) => {
                let mut key = self.owner_prefix(identity);
                key.push(SEPARATOR);
                key.push_str(name.as_str());
                PhysicalKey::new(key)
            }
        }
    }

    /// Logical name for `physical_key` if the caller owns it.
    ///
    /// `None` means "not owned by this caller" and must be handled exactly
    /// like a missing secret.
    pub fn decode<'k>(&self, physical_key: &'k str, caller: &Caller) -> Option<&'k str> {
        match caller {
            Caller::System => Some(physical_key),
            Caller::User(identity) => {
                let prefix = self.owner_prefix(identity);
                physical_key
                    .strip_prefix(prefix.as_str())
                    .and_then(|rest| rest.strip_prefix(SEPARATOR))
                    .filter(|name| !name.is_empty())
            }
        }
    }

    /// Value stored under the `owner` label.
    ///
    /// Labels only admit lowercase letters, digits, `_` and `-`, so this is
    /// always the lowercased substitution form, truncated to the label limit.
    pub fn owner_label(&self, identity: &Identity) -> String {
        let mut label: String = identity
            .email()
            .chars()
            .map(|c| match c {
                'a'..='z' | '0'..='9' | '-' | '_' => c,
                'A'..='Z' => c.to_ascii_lowercase(),
                _ => '_',
            })
            .collect();
        label.truncate(MAX_LABEL_LEN);
        label
    }
}

fn legacy_prefix(email: &str) -> String {
    email.replace(['@', '.'], "_")
}

fn escaped_prefix(email: &str) -> String {
    let mut prefix = String::with_capacity(email.len());
    for byte in email.bytes() {
        if byte.is_ascii_alphanumeric() {
            prefix.push(char::from(byte));
        } else {
            let _ = write!(prefix, "-{byte:02x}");
        }
    }
    prefix
}
