use std::fmt;

/// Verified user identity as supplied by the authentication layer.
///
/// Only the email string is kept; it is the tenancy key. The value is taken
/// as-is and may be malformed, nothing downstream relies on it containing an
/// `@`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    email: String,
}

impl Identity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.email).finish()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.email)
    }
}

/// Who an operation runs on behalf of.
///
/// `System` addresses physical keys directly and is only meant for internal
/// tooling; tenant-facing surfaces always construct [`Caller::User`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Caller {
    System,
    User(Identity),
}

impl Caller {
    pub fn user(email: impl Into<String>) -> Self {
        Caller::User(Identity::new(email))
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Caller::System => None,
            Caller::User(identity) => Some(identity),
        }
    }

    /// Label used in log lines and audit records.
    pub fn describe(&self) -> &str {
        match self {
            Caller::System => "system",
            Caller::User(identity) => identity.email(),
        }
    }
}

impl From<Identity> for Caller {
    fn from(value: Identity) -> Self {
        Caller::User(value)
    }
}
