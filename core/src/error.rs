//! Error taxonomy. Each kind maps to a fatal/rollback/warning
//! disposition that the lifecycle engine and event stream (C13/C14)
//! interpret; callers should match on these variants rather than on
//! the `Display` string.

use thiserror::Error;

/// Precondition violations: fatal for the current operation, no
/// rollback of already-applied state is necessary since nothing was
/// mutated yet.
#[derive(Error, Debug)]
pub enum PreconditionError {
    #[error("jail '{0}' is already running")]
    JailAlreadyRunning(String),
    #[error("jail '{0}' is not running")]
    JailNotRunning(String),
    #[error("jail '{0}' is a template and cannot be started")]
    JailIsTemplate(String),
    #[error("jail '{0}' does not exist")]
    JailDoesNotExist(String),
    #[error("jail '{0}' already exists")]
    JailAlreadyExists(String),
    #[error("release '{0}' has not been fetched")]
    ReleaseNotFetched(String),
    #[error("jail depends on '{0}', which is not running")]
    DependencyNotRunning(String),
}

/// Validation failures on user-supplied input. Fatal unless the caller
/// passes `skip_on_error`, in which case the value is dropped and a
/// warning is logged instead (see [`crate::config::model::SetOutcome`]).
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("invalid jail name: {0}")]
    InvalidJailName(String),
    #[error("invalid value for config property '{0}': {1}")]
    InvalidJailConfigValue(String, String),
    #[error("invalid IP address: {0}")]
    InvalidIpAddress(String),
    #[error("invalid MAC address: {0}")]
    InvalidMacAddress(String),
    #[error("unknown resource limit name: {0}")]
    ResourceLimitUnknown(String),
    #[error("unknown jail config property: {0}")]
    UnknownJailConfigProperty(String),
    #[error("invalid resource limit syntax: {0}")]
    ResourceLimitSyntax(String),
}

/// External command invocations that failed; the owning event must run
/// its full rollback stack.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("command failed: {0}")]
    CommandFailure(String),
    #[error("jail launch failed: {0}")]
    JailLaunchFailed(String),
    #[error("mount failed: {0}")]
    MountFailed(String),
    #[error("unmount failed: {0}")]
    UnmountFailed(String),
    #[error("jail execution aborted")]
    JailExecutionAborted,
}

/// ZFS/dataset layer failures. Fatal.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("zfs error: {0}")]
    ZfsException(String),
    #[error("dataset '{0}' is not mounted")]
    DatasetNotMounted(String),
    #[error("dataset '{0}' is not jailed")]
    DatasetNotJailed(String),
    #[error("dataset '{0}' is not available")]
    DatasetNotAvailable(String),
    #[error("ZFS pool '{0}' is unavailable")]
    ZfsPoolUnavailable(String),
    #[error("iocage root is not activated on any pool")]
    IocageNotActivated,
}

/// Security violations. Fatal, non-recoverable; partial writes made
/// before detection are not automatically rolled back — the caller must
/// inspect and clean up manually.
#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("path '{0}' escapes the owning dataset's mountpoint")]
    SecurityViolationConfigJailEscape(String),
    #[error("insecure jail path: {0}")]
    InsecureJailPath(String),
    #[error("release asset '{0}' failed signature verification")]
    InvalidReleaseAssetSignature(String),
    #[error("archive entry '{0}' is not permitted (absolute path, parent escape, unsafe symlink, or device node)")]
    IllegalArchiveContent(String),
}

/// Programming errors in the event stream itself.
#[derive(Error, Debug)]
pub enum EventStreamError {
    #[error("event '{0}' ({1}) already finished")]
    EventAlreadyFinished(String, String),
}

/// Top-level error, used at module boundaries (lifecycle engine, CLI).
#[derive(Error, Debug)]
pub enum JailError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error(transparent)]
    EventStream(#[from] EventStreamError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JailError {
    /// Whether this error class requires the owning event's rollback
    /// stack to run.
    pub fn requires_rollback(&self) -> bool {
        matches!(self, JailError::Command(_) | JailError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, JailError>;
