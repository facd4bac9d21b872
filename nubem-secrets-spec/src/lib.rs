//! Shared vocabulary for the nubem-secrets workspace.
//!
//! The crate carries the caller identity types, the logical/physical naming
//! model, the stable error taxonomy handed to transports, and the
//! [`SecretStore`] contract that storage providers implement.

pub mod error;
pub mod identity;
pub mod store;
pub mod types;

pub use error::{Error, ErrorKind, Operation, Result, StoreError, StoreResult};
pub use identity::{Caller, Identity};
pub use store::{DynSecretStore, SecretStore, StoredSecret, StoredVersion, VersionSelector};
pub use types::{
    LogicalName, OWNER_LABEL, PhysicalKey, SecretLabels, SecretMetadata, SecretValue,
    SecretVersion, VersionState,
};

pub mod prelude {
    pub use crate::{
        Caller, DynSecretStore, Error, ErrorKind, Identity, LogicalName, PhysicalKey, Result,
        SecretMetadata, SecretStore, SecretValue, SecretVersion, StoreError, StoreResult,
    };
}
