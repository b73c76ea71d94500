//! Compatibility Engine Error Types
//!
//! Faults raised by the host, normalized invocation failures, and the reasons a
//! capability can be unavailable on the running host.

use thiserror::Error;
use super::version::HostVersion;

/// Result type for engine configuration and manifest operations
pub type CompatResult<T> = Result<T, CompatError>;

/// A fault raised by host code while constructing, resolving or invoking a member
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostFault {
    /// The host raised a typed fault
    #[error("{type_name}: {message}")]
    Raised { type_name: String, message: String },

    /// Invocation wrapper around the real cause
    #[error("Exception has been thrown by the target of an invocation: {inner}")]
    TargetInvocation { inner: Box<HostFault> },

    /// The host honoured a cancellation request
    #[error("The operation was canceled")]
    Cancelled,

    /// Host code panicked and the panic was caught at the engine boundary
    #[error("Host code panicked: {message}")]
    Panicked { message: String },
}

impl HostFault {
    /// Create a raised fault
    pub fn raised<T: Into<String>, M: Into<String>>(type_name: T, message: M) -> Self {
        Self::Raised { type_name: type_name.into(), message: message.into() }
    }

    /// Wrap a fault the way the host's invoke path does
    pub fn target_invocation(inner: HostFault) -> Self {
        Self::TargetInvocation { inner: Box::new(inner) }
    }

    /// Strip every invocation wrapper and return the real cause
    pub fn root_cause(&self) -> &HostFault {
        let mut current = self;
        while let HostFault::TargetInvocation { inner } = current {
            current = inner;
        }
        current
    }

    /// Owned variant of [`HostFault::root_cause`]
    pub fn into_root_cause(self) -> HostFault {
        match self {
            HostFault::TargetInvocation { inner } => inner.into_root_cause(),
            other => other,
        }
    }

    /// Whether this fault came from a wrapped invocation
    pub fn is_wrapped(&self) -> bool {
        matches!(self, HostFault::TargetInvocation { .. })
    }

    /// Whether the root cause is a cancellation
    pub fn is_cancellation(&self) -> bool {
        matches!(self.root_cause(), HostFault::Cancelled)
    }
}

/// Which invocation strategy produced an [`InvocationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    Reflective,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Direct => write!(f, "direct"),
            Strategy::Reflective => write!(f, "reflective"),
        }
    }
}

/// Normalized failure of an attempted invocation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvocationError {
    /// The underlying member raised; `cause` is already unwrapped
    #[error("{strategy} call to {member} failed: {cause}")]
    Faulted { member: String, strategy: Strategy, cause: HostFault },

    /// A parameter of the matched variant had no corresponding argument
    #[error("Missing argument '{parameter}' for {member}")]
    MissingArgument { member: String, parameter: String },

    /// The member was asked to do something its kind does not support
    #[error("Member {member} does not support {operation}")]
    UnsupportedOperation { member: String, operation: String },

    /// A deferred result handed back by the host completed with a fault
    #[error("Deferred result failed: {cause}")]
    DeferredFailed { cause: HostFault },
}

impl InvocationError {
    /// Build a fault error, unwrapping invocation wrappers first
    pub fn faulted<S: Into<String>>(member: S, strategy: Strategy, fault: HostFault) -> Self {
        Self::Faulted { member: member.into(), strategy, cause: fault.into_root_cause() }
    }

    /// The host fault behind this error, if any
    pub fn cause(&self) -> Option<&HostFault> {
        match self {
            InvocationError::Faulted { cause, .. } => Some(cause),
            InvocationError::DeferredFailed { cause } => Some(cause),
            _ => None,
        }
    }

    /// Whether the failure was a cancellation honoured by the host
    pub fn is_cancelled(&self) -> bool {
        self.cause().map(HostFault::is_cancellation).unwrap_or(false)
    }
}

/// Why a capability could not be bound on the running host
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnavailableReason {
    #[error("module not loaded: {module}")]
    ModuleNotLoaded { module: String },

    #[error("type {type_name} not found in module {module}")]
    TypeNotFound { module: String, type_name: String },

    #[error("no constructor of {type_name} accepts ({signature})")]
    ConstructorNotFound { type_name: String, signature: String },

    #[error("service {service} required by {type_name} was not supplied")]
    ServiceMissing { type_name: String, service: String },

    #[error("constructing {type_name} failed: {cause}")]
    ConstructionFailed { type_name: String, cause: HostFault },

    #[error("no variant of {type_name}.{member} matched on host {host_version}")]
    MemberNotFound { type_name: String, member: String, host_version: HostVersion },

    #[error("{member} resolved to a property, not a method")]
    NotAMethod { member: String },
}

impl UnavailableReason {
    /// Short machine-friendly label used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            UnavailableReason::ModuleNotLoaded { .. } => "module-not-loaded",
            UnavailableReason::TypeNotFound { .. } => "type-not-found",
            UnavailableReason::ConstructorNotFound { .. } => "constructor-not-found",
            UnavailableReason::ServiceMissing { .. } => "service-missing",
            UnavailableReason::ConstructionFailed { .. } => "construction-failed",
            UnavailableReason::MemberNotFound { .. } => "member-not-found",
            UnavailableReason::NotAMethod { .. } => "not-a-method",
        }
    }
}

/// Errors raised while configuring the engine or reading manifests
#[derive(Error, Debug, Clone)]
pub enum CompatError {
    /// A host version string could not be parsed
    #[error("Invalid host version '{input}': {message}")]
    InvalidVersion { input: String, message: String },

    /// A host or capability manifest was malformed
    #[error("Manifest error: {message}")]
    ManifestError { message: String },

    /// Engine configuration error
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// The host could not report its version
    #[error("Host version unavailable: {message}")]
    VersionUnavailable { message: String },
}

impl CompatError {
    /// Create an invalid version error
    pub fn invalid_version<I: Into<String>, M: Into<String>>(input: I, message: M) -> Self {
        Self::InvalidVersion { input: input.into(), message: message.into() }
    }

    /// Create a manifest error
    pub fn manifest_error<S: Into<String>>(message: S) -> Self {
        Self::ManifestError { message: message.into() }
    }

    /// Create a configuration error
    pub fn configuration_error<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Create a version unavailable error
    pub fn version_unavailable<S: Into<String>>(message: S) -> Self {
        Self::VersionUnavailable { message: message.into() }
    }

    /// Check if error is a configuration issue
    pub fn is_configuration_error(&self) -> bool {
        matches!(self,
            CompatError::ConfigurationError { .. } |
            CompatError::ManifestError { .. } |
            CompatError::InvalidVersion { .. }
        )
    }
}

impl From<serde_yaml::Error> for CompatError {
    fn from(err: serde_yaml::Error) -> Self {
        CompatError::manifest_error(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for CompatError {
    fn from(err: toml::de::Error) -> Self {
        CompatError::manifest_error(format!("TOML error: {}", err))
    }
}

impl From<std::io::Error> for CompatError {
    fn from(err: std::io::Error) -> Self {
        CompatError::manifest_error(format!("IO error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_nested_wrappers() {
        let real = HostFault::raised("System.IO.IOException", "disk full");
        let wrapped = HostFault::target_invocation(HostFault::target_invocation(real.clone()));

        assert!(wrapped.is_wrapped());
        assert_eq!(wrapped.root_cause(), &real);
        assert_eq!(wrapped.into_root_cause(), real);
    }

    #[test]
    fn test_faulted_error_stores_root_cause() {
        let wrapped = HostFault::target_invocation(HostFault::Cancelled);
        let error = InvocationError::faulted("EncodingManager.RefreshChapterImages", Strategy::Reflective, wrapped);

        assert_eq!(error.cause(), Some(&HostFault::Cancelled));
        assert!(error.is_cancelled());
        assert!(error.to_string().contains("reflective call"));
    }

    #[test]
    fn test_unavailable_reason_kind() {
        let reason = UnavailableReason::ModuleNotLoaded { module: "Emby.Server".to_string() };
        assert_eq!(reason.kind(), "module-not-loaded");
        assert_eq!(reason.to_string(), "module not loaded: Emby.Server");
    }

    #[test]
    fn test_error_classification() {
        assert!(CompatError::manifest_error("bad").is_configuration_error());
        assert!(CompatError::invalid_version("x", "bad").is_configuration_error());
        assert!(!CompatError::version_unavailable("no host").is_configuration_error());
    }
}
