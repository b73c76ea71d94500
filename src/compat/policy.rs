//! Tiered Invocation Policy
//!
//! Every call on a bound capability goes through the direct strategy while it
//! is healthy and through the reflective strategy after the first direct
//! fault. The switch is one-way and lock-free; the hot path is a single
//! atomic load.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use log::warn;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use super::binding::{BindingState, BoundTarget, CapabilityBinding, CapabilityHandle};
use super::diagnostics::DiagnosticEvent;
use super::error::{InvocationError, Strategy, UnavailableReason};
use super::host::{Deferred, HostValue, ReturnShape};
use super::signature::InvocationArgs;
use super::wrapper::guarded;

/// Invocation strategy active for a capability.
///
/// Ordered by preference. A binding only ever moves down this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PatchApproach {
    None = 0,
    Reflection = 1,
    Harmony = 2,
}

impl PatchApproach {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => PatchApproach::Harmony,
            1 => PatchApproach::Reflection,
            _ => PatchApproach::None,
        }
    }
}

impl fmt::Display for PatchApproach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchApproach::None => write!(f, "none"),
            PatchApproach::Reflection => write!(f, "reflection"),
            PatchApproach::Harmony => write!(f, "harmony"),
        }
    }
}

/// Atomic holder for a bound target's [`PatchApproach`]. It only moves
/// downward and never reaches `None`, which is reserved for unbound targets.
#[derive(Debug)]
pub(crate) struct ApproachCell {
    value: AtomicU8,
}

impl ApproachCell {
    pub fn new(approach: PatchApproach) -> Self {
        Self { value: AtomicU8::new(approach as u8) }
    }

    pub fn load(&self) -> PatchApproach {
        PatchApproach::from_u8(self.value.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`. Returns true only for the caller whose
    /// compare-and-set performed the transition; upward moves are refused.
    pub fn demote(&self, from: PatchApproach, to: PatchApproach) -> bool {
        if to >= from || to == PatchApproach::None {
            return false;
        }
        self.value
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Result of every call through a capability
#[derive(Debug, Clone)]
pub enum InvocationOutcome {
    /// The call ran. Deferred results are returned unresolved.
    Success(HostValue),
    /// The capability is not available on this host
    HostIncompatible(UnavailableReason),
    /// The call was attempted and failed
    InvocationFailed(InvocationError),
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationOutcome::Success(_))
    }

    pub fn is_incompatible(&self) -> bool {
        matches!(self, InvocationOutcome::HostIncompatible(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, InvocationOutcome::InvocationFailed(_))
    }

    pub fn value(&self) -> Option<&HostValue> {
        match self {
            InvocationOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<HostValue> {
        match self {
            InvocationOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&InvocationError> {
        match self {
            InvocationOutcome::InvocationFailed(error) => Some(error),
            _ => None,
        }
    }

    /// Await a deferred success value. Faults it completes with, including
    /// host cancellation, become [`InvocationOutcome::InvocationFailed`].
    pub async fn settle(self) -> InvocationOutcome {
        match self {
            InvocationOutcome::Success(HostValue::Deferred(deferred)) => match deferred.await {
                Ok(value) => InvocationOutcome::Success(value),
                Err(fault) => InvocationOutcome::InvocationFailed(InvocationError::DeferredFailed {
                    cause: fault.into_root_cause(),
                }),
            },
            other => other,
        }
    }

    /// Short label for reports
    pub fn kind(&self) -> &'static str {
        match self {
            InvocationOutcome::Success(_) => "success",
            InvocationOutcome::HostIncompatible(_) => "host-incompatible",
            InvocationOutcome::InvocationFailed(_) => "invocation-failed",
        }
    }
}

/// Invoke a capability through its handle
pub fn invoke(handle: &CapabilityHandle, args: &InvocationArgs, cancellation: &CancellationToken) -> InvocationOutcome {
    handle.invoke(args, cancellation)
}

impl CapabilityBinding {
    /// Call the capability. Binds on first use and never raises.
    pub fn invoke(&self, args: &InvocationArgs, cancellation: &CancellationToken) -> InvocationOutcome {
        let target = match self.state() {
            BindingState::Bound(target) => target,
            BindingState::Unavailable(reason) => {
                warn!("Skipping {}: not available on host {} ({})", self.name(), self.env.version(), reason);
                return InvocationOutcome::HostIncompatible(reason.clone());
            }
        };

        let values = match args.project(&target.member.variant) {
            Ok(values) => values,
            Err(parameter) => {
                return InvocationOutcome::InvocationFailed(InvocationError::MissingArgument {
                    member: target.member.qualified_name(),
                    parameter,
                });
            }
        };

        self.dispatch(target, &values, cancellation)
    }

    fn dispatch(&self, target: &BoundTarget, values: &[HostValue], cancellation: &CancellationToken) -> InvocationOutcome {
        match target.approach.load() {
            PatchApproach::Harmony => match self.call_direct(target, values, cancellation) {
                Ok(value) => InvocationOutcome::Success(value),
                Err(error) => {
                    self.demote(target, &error);
                    // approach is Reflection from here on, so this recurses once
                    self.dispatch(target, values, cancellation)
                }
            },
            PatchApproach::Reflection | PatchApproach::None => self.call_reflective(target, values, cancellation),
        }
    }

    fn call_direct(
        &self,
        target: &BoundTarget,
        values: &[HostValue],
        cancellation: &CancellationToken,
    ) -> Result<HostValue, InvocationError> {
        let label = target.member.qualified_name();
        let thunk = target.thunk.as_ref().ok_or_else(|| InvocationError::UnsupportedOperation {
            member: label.clone(),
            operation: "direct invoke".to_string(),
        })?;
        guarded(&label, Strategy::Direct, || thunk.call(target.instance.as_ref(), values, cancellation))
    }

    fn call_reflective(&self, target: &BoundTarget, values: &[HostValue], cancellation: &CancellationToken) -> InvocationOutcome {
        match target.invoker.invoke(target.instance.as_ref(), values, cancellation) {
            Ok(value) => InvocationOutcome::Success(self.adapt_result(target, value)),
            Err(error) => InvocationOutcome::InvocationFailed(error),
        }
    }

    /// Replace a non-deferred result with a completed `false` when the
    /// capability promises a deferred value
    fn adapt_result(&self, target: &BoundTarget, value: HostValue) -> HostValue {
        if self.spec.return_shape != ReturnShape::Deferred || value.is_deferred() {
            return value;
        }
        warn!(
            "{} returned {} where a deferred value was expected, substituting false",
            target.member.qualified_name(),
            value.kind_name()
        );
        HostValue::Deferred(Deferred::completed(HostValue::Bool(false)))
    }

    fn demote(&self, target: &BoundTarget, error: &InvocationError) {
        if target.approach.demote(PatchApproach::Harmony, PatchApproach::Reflection) {
            warn!(
                "Direct strategy for {} failed, switching to reflection for the rest of the process: {}",
                self.name(),
                error
            );
            self.env.record(
                self.name(),
                true,
                DiagnosticEvent::Demoted,
                format!("harmony -> reflection after: {}", error),
            );
        }
    }
}
