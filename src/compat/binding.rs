//! Capability Binding
//!
//! A capability is one named host operation. Binding it means finding the
//! module, type, constructor and member that implement it on the running host,
//! exactly once, on first use. The outcome is either a bound target with an
//! active invocation strategy or a recorded reason why the host lacks it.
//!
//! Nothing in here raises to the caller. A capability that cannot be bound
//! still produces a handle; every call through it reports the host as
//! incompatible.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use super::acquisition::{acquire_type, find_loaded_type, load_module};
use super::diagnostics::{CompatibilityLog, DiagnosticEvent, DiagnosticRecord, DiagnosticsSink};
use super::error::{HostFault, UnavailableReason};
use super::fast_path::{DirectThunk, FastPathInstaller, MemberEntryInstaller};
use super::host::{
    format_signature, BindingScope, HostIntrospection, HostType, HostValue, MemberKind, ObjectRef,
    ReturnShape, TypeDescriptor,
};
use super::policy::{ApproachCell, PatchApproach};
use super::resolver::{resolve, ResolvedMember};
use super::signature::{matches, order_for, SignatureVariant};
use super::version::HostVersion;
use super::wrapper::{catch_host_panic, method_invoker, SafeMethodInvoker};

/// Declaration of one capability and every call shape it accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CapabilitySpec {
    pub name: String,

    /// Host module expected to contain the implementing type
    pub module: String,

    /// Fully qualified name of the implementing type
    #[serde(rename = "type")]
    pub type_name: String,

    pub member: String,

    #[serde(default)]
    pub scope: BindingScope,

    #[serde(default)]
    pub return_shape: ReturnShape,

    /// Service types the implementing type's constructor takes, in order
    #[serde(default)]
    pub constructor_dependencies: Vec<TypeDescriptor>,

    /// Accepted call shapes, newest first
    pub variants: Vec<SignatureVariant>,
}

impl CapabilitySpec {
    pub fn new<N, M, T, B>(name: N, module: M, type_name: T, member: B) -> Self
    where
        N: Into<String>,
        M: Into<String>,
        T: Into<String>,
        B: Into<String>,
    {
        Self {
            name: name.into(),
            module: module.into(),
            type_name: type_name.into(),
            member: member.into(),
            scope: BindingScope::default(),
            return_shape: ReturnShape::default(),
            constructor_dependencies: Vec::new(),
            variants: Vec::new(),
        }
    }

    pub fn scope(mut self, scope: BindingScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn returns(mut self, shape: ReturnShape) -> Self {
        self.return_shape = shape;
        self
    }

    pub fn dependencies(mut self, dependencies: Vec<TypeDescriptor>) -> Self {
        self.constructor_dependencies = dependencies;
        self
    }

    pub fn variant(mut self, variant: SignatureVariant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Instance members need a constructed target; static-only scopes do not
    pub fn needs_instance(&self) -> bool {
        self.scope.contains(BindingScope::INSTANCE)
    }
}

/// Host service objects handed to constructors, keyed by the type they satisfy
#[derive(Debug, Clone, Default)]
pub struct ServiceCollection {
    services: HashMap<TypeDescriptor, HostValue>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Into<TypeDescriptor>, V: Into<HostValue>>(mut self, service_type: T, value: V) -> Self {
        self.insert(service_type, value);
        self
    }

    pub fn insert<T: Into<TypeDescriptor>, V: Into<HostValue>>(&mut self, service_type: T, value: V) {
        self.services.insert(service_type.into(), value.into());
    }

    pub fn get(&self, service_type: &TypeDescriptor) -> Option<&HostValue> {
        self.services.get(service_type)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Collect services in `types` order, or return the first missing type
    fn resolve_all(&self, types: &[TypeDescriptor]) -> Result<Vec<HostValue>, TypeDescriptor> {
        types
            .iter()
            .map(|ty| self.services.get(ty).cloned().ok_or_else(|| ty.clone()))
            .collect()
    }
}

/// Everything a binding needs from the embedding process
#[derive(Clone)]
pub struct BindingEnvironment {
    host: Arc<dyn HostIntrospection>,
    version: HostVersion,
    services: ServiceCollection,
    fast_path: Option<Arc<dyn FastPathInstaller>>,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl BindingEnvironment {
    /// Environment with the default direct-strategy installer and the global
    /// compatibility log
    pub fn new(host: Arc<dyn HostIntrospection>, version: HostVersion) -> Self {
        Self {
            host,
            version,
            services: ServiceCollection::default(),
            fast_path: Some(Arc::new(MemberEntryInstaller)),
            diagnostics: CompatibilityLog::global(),
        }
    }

    pub fn with_services(mut self, services: ServiceCollection) -> Self {
        self.services = services;
        self
    }

    pub fn with_fast_path(mut self, installer: Arc<dyn FastPathInstaller>) -> Self {
        self.fast_path = Some(installer);
        self
    }

    /// Bind every capability with the reflective strategy only
    pub fn without_fast_path(mut self) -> Self {
        self.fast_path = None;
        self
    }

    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn version(&self) -> HostVersion {
        self.version
    }

    pub fn supports_fast_path(&self) -> bool {
        self.fast_path.is_some()
    }

    pub(crate) fn record(&self, capability: &str, compatible: bool, event: DiagnosticEvent, details: String) {
        self.diagnostics.record(DiagnosticRecord::new(capability, self.version, compatible, event, details));
    }
}

impl fmt::Debug for BindingEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingEnvironment")
            .field("version", &self.version)
            .field("services", &self.services.len())
            .field("fast_path", &self.fast_path.is_some())
            .finish()
    }
}

/// A fully bound capability target
pub struct BoundTarget {
    pub(crate) instance: Option<ObjectRef>,
    pub(crate) member: ResolvedMember,
    pub(crate) invoker: SafeMethodInvoker,
    pub(crate) thunk: Option<DirectThunk>,
    pub(crate) approach: ApproachCell,
}

impl BoundTarget {
    pub fn member(&self) -> &ResolvedMember {
        &self.member
    }

    pub fn instance(&self) -> Option<&ObjectRef> {
        self.instance.as_ref()
    }

    pub fn approach(&self) -> PatchApproach {
        self.approach.load()
    }
}

/// Terminal state of a binding
pub enum BindingState {
    Bound(BoundTarget),
    Unavailable(UnavailableReason),
}

/// One capability on one host process
pub struct CapabilityBinding {
    pub(crate) spec: CapabilitySpec,
    pub(crate) env: BindingEnvironment,
    state: OnceLock<BindingState>,
}

/// Shared handle callers keep for a capability
pub type CapabilityHandle = Arc<CapabilityBinding>;

/// Create a handle for `spec`. Nothing touches the host until first use.
pub fn bind_capability(env: &BindingEnvironment, spec: CapabilitySpec) -> CapabilityHandle {
    Arc::new(CapabilityBinding::new(env.clone(), spec))
}

impl CapabilityBinding {
    pub fn new(env: BindingEnvironment, spec: CapabilitySpec) -> Self {
        Self { spec, env, state: OnceLock::new() }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &CapabilitySpec {
        &self.spec
    }

    /// Whether the one-time binding has already run
    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    /// Bind on first call; later and concurrent callers share the result
    pub fn state(&self) -> &BindingState {
        self.state.get_or_init(|| self.initialize())
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state(), BindingState::Bound(_))
    }

    /// Active strategy. Always `None` when no target was bound.
    pub fn approach(&self) -> PatchApproach {
        match self.state() {
            BindingState::Bound(target) => target.approach(),
            BindingState::Unavailable(_) => PatchApproach::None,
        }
    }

    pub fn matched_variant(&self) -> Option<&SignatureVariant> {
        match self.state() {
            BindingState::Bound(target) => Some(&target.member.variant),
            BindingState::Unavailable(_) => None,
        }
    }

    pub fn unavailable_reason(&self) -> Option<&UnavailableReason> {
        match self.state() {
            BindingState::Bound(_) => None,
            BindingState::Unavailable(reason) => Some(reason),
        }
    }

    fn initialize(&self) -> BindingState {
        debug!("Binding capability {} on host {}", self.spec.name, self.env.version);

        match self.bind_target() {
            Ok((target, install_fault)) => {
                let approach = target.approach();
                info!(
                    "Capability {} bound to {} using variant '{}' ({})",
                    self.spec.name,
                    target.member.qualified_name(),
                    target.member.variant.label,
                    approach
                );
                let mut details = format!(
                    "{} bound with variant '{}' using {}",
                    target.member.qualified_name(),
                    target.member.variant.label,
                    approach
                );
                if let Some(fault) = install_fault {
                    details.push_str(&format!(" (direct strategy install failed: {})", fault));
                }
                self.env.record(&self.spec.name, true, DiagnosticEvent::Bound, details);
                BindingState::Bound(target)
            }
            Err(reason) => {
                warn!("Capability {} is unavailable on host {}: {}", self.spec.name, self.env.version, reason);
                self.env.record(&self.spec.name, false, DiagnosticEvent::Unavailable, reason.to_string());
                BindingState::Unavailable(reason)
            }
        }
    }

    /// Bind the target. The second value is the fault that kept the direct
    /// strategy from being installed, if installation was attempted and failed.
    fn bind_target(&self) -> Result<(BoundTarget, Option<HostFault>), UnavailableReason> {
        let host_type = self.acquire_target_type()?;

        let instance = if self.spec.needs_instance() {
            Some(self.construct(host_type.as_ref())?)
        } else {
            None
        };

        let not_found = || UnavailableReason::MemberNotFound {
            type_name: self.spec.type_name.clone(),
            member: self.spec.member.clone(),
            host_version: self.env.version,
        };
        let ordered = order_for(&self.spec.variants, &self.env.version);
        let member = catch_host_panic(|| Ok(resolve(host_type.as_ref(), &self.spec.member, self.spec.scope, ordered)))
            .unwrap_or_else(|fault| {
                warn!("Resolving {}.{} failed: {}", self.spec.type_name, self.spec.member, fault);
                None
            })
            .ok_or_else(not_found)?;

        if member.member.kind() != MemberKind::Method {
            return Err(UnavailableReason::NotAMethod { member: member.qualified_name() });
        }
        let invoker = method_invoker(&member)
            .map_err(|_| UnavailableReason::NotAMethod { member: member.qualified_name() })?;

        let (thunk, install_fault) = match self.install_fast_path(&member) {
            Ok(thunk) => (thunk, None),
            Err(fault) => (None, Some(fault)),
        };
        let approach = if thunk.is_some() { PatchApproach::Harmony } else { PatchApproach::Reflection };

        let target = BoundTarget {
            instance,
            member,
            invoker,
            thunk,
            approach: ApproachCell::new(approach),
        };
        Ok((target, install_fault))
    }

    /// The declared module's type, or the same type found in any loaded module
    fn acquire_target_type(&self) -> Result<Arc<dyn HostType>, UnavailableReason> {
        let host = self.env.host.as_ref();
        let reason = match load_module(host, &self.spec.module).and_then(|m| acquire_type(m.as_ref(), &self.spec.type_name)) {
            Ok(host_type) => return Ok(host_type),
            Err(reason) => reason,
        };

        if let UnavailableReason::TypeNotFound { .. } = reason {
            if let Some((module, host_type)) = find_loaded_type(host, &self.spec.type_name) {
                info!("Type {} found in module {} instead of {}", self.spec.type_name, module.name(), self.spec.module);
                return Ok(host_type);
            }
        }
        Err(reason)
    }

    fn construct(&self, host_type: &dyn HostType) -> Result<ObjectRef, UnavailableReason> {
        let dependencies = &self.spec.constructor_dependencies;
        let not_found = || UnavailableReason::ConstructorNotFound {
            type_name: self.spec.type_name.clone(),
            signature: format_signature(dependencies),
        };
        let constructor = catch_host_panic(|| Ok(host_type.constructors()))
            .unwrap_or_else(|fault| {
                warn!("Listing constructors of {} failed: {}", self.spec.type_name, fault);
                Vec::new()
            })
            .into_iter()
            .find(|ctor| matches(ctor.parameters(), dependencies))
            .ok_or_else(not_found)?;

        let args = self.env.services.resolve_all(dependencies).map_err(|missing| {
            UnavailableReason::ServiceMissing {
                type_name: self.spec.type_name.clone(),
                service: missing.to_string(),
            }
        })?;

        catch_host_panic(|| constructor.construct(&args)).map_err(|fault| {
            let cause = fault.into_root_cause();
            warn!("Constructing {} failed: {}", self.spec.type_name, cause);
            UnavailableReason::ConstructionFailed { type_name: self.spec.type_name.clone(), cause }
        })
    }

    fn install_fast_path(&self, member: &ResolvedMember) -> Result<Option<DirectThunk>, HostFault> {
        let Some(installer) = self.env.fast_path.as_ref() else {
            return Ok(None);
        };
        catch_host_panic(|| installer.install(member)).map_err(|fault| {
            let cause = fault.into_root_cause();
            warn!(
                "Direct strategy unavailable for {}, using reflection: {}",
                member.qualified_name(),
                cause
            );
            cause
        })
    }
}

impl fmt::Debug for CapabilityBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.get() {
            None => "uninitialized".to_string(),
            Some(BindingState::Bound(target)) => format!("bound ({})", target.approach()),
            Some(BindingState::Unavailable(reason)) => format!("unavailable ({})", reason.kind()),
        };
        f.debug_struct("CapabilityBinding")
            .field("name", &self.spec.name)
            .field("state", &state)
            .finish()
    }
}
