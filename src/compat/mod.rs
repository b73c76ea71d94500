//! Host Compatibility Engine
//!
//! Finds, binds and safely invokes operations inside a host application whose
//! internal API changes between versions and cannot be linked at build time.
//!
//! # Example Usage
//!
//! ```no_run
//! use hostcompat::compat::{bind_capability, catalog, BindingEnvironment, InvocationArgs};
//! use hostcompat::compat::memory_host::InMemoryHost;
//! use hostcompat::compat::version::HostVersion;
//! use tokio_util::sync::CancellationToken;
//!
//! let host = InMemoryHost::builder().build();
//! let env = BindingEnvironment::new(host, HostVersion::new(4, 9, 0, 36));
//! let refresh = bind_capability(&env, catalog::chapter_image_refresh());
//!
//! let outcome = refresh.invoke(&InvocationArgs::new(), &CancellationToken::new());
//! assert!(outcome.is_incompatible());
//! ```

pub mod error;
pub mod version;
pub mod host;
pub mod signature;
pub mod resolver;
pub mod wrapper;
pub mod acquisition;
pub mod diagnostics;
pub mod fast_path;
pub mod binding;
pub mod policy;
pub mod registry;
pub mod catalog;
pub mod manifest;
pub mod memory_host;

#[cfg(test)]
pub mod tests;

pub use error::{CompatError, CompatResult, HostFault, InvocationError, Strategy, UnavailableReason};
pub use version::{FixedVersion, HostVersion, MemoizedVersion, VersionReader};
pub use host::{
    BindingScope, Deferred, HostIntrospection, HostMember, HostType, HostValue, ObjectRef, ReturnShape,
    TypeDescriptor,
};
pub use signature::{InvocationArgs, ParamSpec, SignatureVariant};
pub use resolver::{resolve, ResolvedMember};
pub use diagnostics::{CompatibilityLog, DiagnosticEvent, DiagnosticRecord, DiagnosticsSink};
pub use fast_path::{DirectThunk, FastPathInstaller, MemberEntryInstaller};
pub use binding::{
    bind_capability, BindingEnvironment, BindingState, CapabilityBinding, CapabilityHandle, CapabilitySpec,
    ServiceCollection,
};
pub use policy::{invoke, InvocationOutcome, PatchApproach};
pub use registry::{CapabilityRegistry, CapabilityStatus};
