use crate::devices::registry::DeviceRegistryError;
use crate::devices::resolver::ResolveError;
use crate::staging::StagingError;
use crate::tasks::TaskError;
use thiserror::Error;

/// Errors surfaced to the caller at request time. Failures of the spawned
/// installation pipeline are not represented here, they end up as an `ERROR`
/// record in the in-flight registry instead.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("target {0} is not a trusted device")]
    UntrustedTarget(String),

    #[error("a download URL must be defined to install a package")]
    MissingSourceUrl,

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("extension {rpm_file} is already being processed on target {target} (state {state})")]
    DuplicateOperation {
        rpm_file: String,
        target: String,
        state: String,
    },

    #[error("extension {rpm_file} is already installed on target {target}")]
    AlreadyInstalled { rpm_file: String, target: String },

    #[error("package in {rpm_file} not installed on target {target}")]
    NotInstalled { rpm_file: String, target: String },

    #[error("no extension with name {0} found")]
    ExtensionNotFound(String),

    #[error("package in {rpm_file} could not be uninstalled on target {target}: {source}")]
    Uninstall {
        rpm_file: String,
        target: String,
        source: TaskError,
    },

    #[error(transparent)]
    DeviceRegistry(#[from] DeviceRegistryError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl From<ResolveError> for OperationError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Untrusted(target) => OperationError::UntrustedTarget(target),
            ResolveError::Registry(err) => OperationError::DeviceRegistry(err),
        }
    }
}
