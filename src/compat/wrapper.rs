//! Safe Invocation Wrappers
//!
//! Callables built around a resolved member that never let a host fault or a
//! panic escape. Faults are unwrapped to their real cause, logged with the
//! member they came from, and returned as an [`InvocationError`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use log::error;
use tokio_util::sync::CancellationToken;
use super::error::{HostFault, InvocationError, Strategy};
use super::host::{HostMember, HostValue, MemberKind, ObjectRef};
use super::resolver::ResolvedMember;

/// Run `call`, converting faults and panics into an [`InvocationError`]
pub(crate) fn guarded<T, F>(label: &str, strategy: Strategy, call: F) -> Result<T, InvocationError>
where
    F: FnOnce() -> Result<T, HostFault>,
{
    let fault = match catch_host_panic(call) {
        Ok(value) => return Ok(value),
        Err(fault) => fault,
    };

    let error = InvocationError::faulted(label, strategy, fault);
    if let InvocationError::Faulted { cause, .. } = &error {
        error!("{} call to {} failed: {}", strategy, label, cause);
    }
    Err(error)
}

/// Run host code, turning a panic into [`HostFault::Panicked`]
pub(crate) fn catch_host_panic<T, F>(call: F) -> Result<T, HostFault>
where
    F: FnOnce() -> Result<T, HostFault>,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(HostFault::Panicked { message: panic_message(payload.as_ref()) }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Invokes a method through the host's generic invoke path
#[derive(Clone)]
pub struct SafeMethodInvoker {
    label: String,
    member: Arc<dyn HostMember>,
}

impl SafeMethodInvoker {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn invoke(
        &self,
        target: Option<&ObjectRef>,
        args: &[HostValue],
        cancellation: &CancellationToken,
    ) -> Result<HostValue, InvocationError> {
        guarded(&self.label, Strategy::Reflective, || {
            self.member.invoke(target, args, cancellation)
        })
    }
}

/// Reads and writes a property through the host's generic path
#[derive(Clone)]
pub struct SafePropertyAccessor {
    label: String,
    member: Arc<dyn HostMember>,
}

impl SafePropertyAccessor {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn get(&self, target: Option<&ObjectRef>) -> Result<HostValue, InvocationError> {
        guarded(&self.label, Strategy::Reflective, || self.member.get_value(target))
    }

    pub fn set(&self, target: Option<&ObjectRef>, value: HostValue) -> Result<(), InvocationError> {
        guarded(&self.label, Strategy::Reflective, || self.member.set_value(target, value))
    }
}

/// Build a method invoker. Fails if the resolved member is a property.
pub fn method_invoker(resolved: &ResolvedMember) -> Result<SafeMethodInvoker, InvocationError> {
    let label = resolved.qualified_name();
    if resolved.member.kind() != MemberKind::Method {
        return Err(InvocationError::UnsupportedOperation { member: label, operation: "invoke".to_string() });
    }
    Ok(SafeMethodInvoker { label, member: Arc::clone(&resolved.member) })
}

/// Build a property accessor. Fails if the resolved member is a method.
pub fn property_accessor(resolved: &ResolvedMember) -> Result<SafePropertyAccessor, InvocationError> {
    let label = resolved.qualified_name();
    if resolved.member.kind() != MemberKind::Property {
        return Err(InvocationError::UnsupportedOperation { member: label, operation: "get/set".to_string() });
    }
    Ok(SafePropertyAccessor { label, member: Arc::clone(&resolved.member) })
}
