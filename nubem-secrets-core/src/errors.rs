use nubem_secrets_spec::{Caller, Error, Operation, StoreError};
use tracing::warn;

/// Translate a store failure into the tenancy error vocabulary.
///
/// The raw error is logged here with the caller and operation; only its text
/// survives in the returned error.
pub(crate) fn store_failure(
    operation: Operation,
    caller: &Caller,
    name: Option<&str>,
    err: StoreError,
) -> Error {
    warn!(
        operation = operation.as_str(),
        identity = caller.describe(),
        name = name.unwrap_or("-"),
        error = %err,
        "secret store call failed"
    );

    match (err, name) {
        (StoreError::NotFound { .. }, Some(name)) => Error::not_found(name),
        (StoreError::AlreadyExists { .. }, Some(name)) => Error::AlreadyExists {
            name: name.to_string(),
        },
        (other, name) => Error::BackendUnavailable {
            operation,
            name: name.map(str::to_string),
            message: other.to_string(),
        },
    }
}
