//! Direct Strategy Installation
//!
//! The direct strategy calls a pre-bound entry point instead of going through
//! the host's generic invoke path. Whether an entry point can be installed is
//! up to the embedding environment.

use std::fmt;
use std::sync::Arc;
use log::debug;
use tokio_util::sync::CancellationToken;
use super::error::HostFault;
use super::host::{HostValue, ObjectRef};
use super::resolver::ResolvedMember;

/// A compiled entry point for one resolved member. Faults come back unwrapped.
pub type DirectEntry =
    Arc<dyn Fn(Option<&ObjectRef>, &[HostValue], &CancellationToken) -> Result<HostValue, HostFault> + Send + Sync>;

/// An installed direct entry point, tagged with the member it calls
#[derive(Clone)]
pub struct DirectThunk {
    label: String,
    entry: DirectEntry,
}

impl DirectThunk {
    pub fn new<S: Into<String>>(label: S, entry: DirectEntry) -> Self {
        Self { label: label.into(), entry }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn call(
        &self,
        target: Option<&ObjectRef>,
        args: &[HostValue],
        cancellation: &CancellationToken,
    ) -> Result<HostValue, HostFault> {
        (self.entry)(target, args, cancellation)
    }
}

impl fmt::Debug for DirectThunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirectThunk({})", self.label)
    }
}

/// Installs direct entry points for resolved members
pub trait FastPathInstaller: Send + Sync {
    /// `Ok(None)` when the member cannot be called directly in this
    /// environment. An `Err` means installation was attempted and failed.
    fn install(&self, member: &ResolvedMember) -> Result<Option<DirectThunk>, HostFault>;
}

/// Uses the entry point the host member itself exposes
#[derive(Debug, Default, Clone, Copy)]
pub struct MemberEntryInstaller;

impl FastPathInstaller for MemberEntryInstaller {
    fn install(&self, member: &ResolvedMember) -> Result<Option<DirectThunk>, HostFault> {
        let label = member.qualified_name();
        match member.member.direct_entry() {
            Some(entry) => {
                debug!("Installed direct entry for {}", label);
                Ok(Some(DirectThunk::new(label, entry)))
            }
            None => {
                debug!("{} has no direct entry point", label);
                Ok(None)
            }
        }
    }
}
