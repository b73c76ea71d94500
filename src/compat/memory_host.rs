//! In-Memory Host
//!
//! A host assembled from builders. Used for dry-run probing from manifests,
//! and as the host double in tests and benchmarks. Lookups follow the same
//! rules a real host applies: exact parameter matching, binding scope
//! filtering, and wrapped faults on the generic invoke path.

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use super::error::HostFault;
use super::fast_path::DirectEntry;
use super::host::{
    BindingScope, Deferred, HostConstructor, HostIntrospection, HostMember, HostModule, HostType,
    HostValue, MemberKind, MemberLookup, ObjectRef, ReturnShape, TypeDescriptor,
};
use super::signature::matches;

/// Body of an in-memory member
pub type MemberHandler =
    Arc<dyn Fn(Option<&ObjectRef>, &[HostValue], &CancellationToken) -> Result<HostValue, HostFault> + Send + Sync>;

/// Body of an in-memory constructor
pub type ConstructorHandler = Arc<dyn Fn(&[HostValue]) -> Result<ObjectRef, HostFault> + Send + Sync>;

fn member_handler<F>(body: F) -> MemberHandler
where
    F: Fn(Option<&ObjectRef>, &[HostValue], &CancellationToken) -> Result<HostValue, HostFault> + Send + Sync + 'static,
{
    Arc::new(body)
}

/// How a member behaves under the direct strategy
#[derive(Clone)]
enum DirectMode {
    Unsupported,
    Available,
    Faulty(HostFault),
}

/// A host assembled in memory
pub struct InMemoryHost {
    modules: Vec<Arc<InMemoryModule>>,
    load_faults: HashMap<String, HostFault>,
}

impl InMemoryHost {
    pub fn builder() -> HostBuilder {
        HostBuilder::default()
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name.clone()).collect()
    }
}

impl HostIntrospection for InMemoryHost {
    fn load_module(&self, name: &str) -> Result<Option<Arc<dyn HostModule>>, HostFault> {
        if let Some(fault) = self.load_faults.get(name) {
            return Err(fault.clone());
        }
        Ok(self
            .modules
            .iter()
            .find(|m| m.name == name)
            .map(|m| Arc::clone(m) as Arc<dyn HostModule>))
    }

    fn loaded_modules(&self) -> Vec<Arc<dyn HostModule>> {
        self.modules
            .iter()
            .filter(|m| m.preloaded)
            .map(|m| Arc::clone(m) as Arc<dyn HostModule>)
            .collect()
    }
}

/// Builder for [`InMemoryHost`]
#[derive(Default)]
pub struct HostBuilder {
    modules: Vec<Arc<InMemoryModule>>,
    load_faults: HashMap<String, HostFault>,
}

impl HostBuilder {
    pub fn module(mut self, module: ModuleBuilder) -> Self {
        self.modules.push(module.build());
        self
    }

    /// Make loading `name` raise instead of returning a module
    pub fn module_load_fault<S: Into<String>>(mut self, name: S, fault: HostFault) -> Self {
        self.load_faults.insert(name.into(), fault);
        self
    }

    pub fn build(self) -> Arc<InMemoryHost> {
        Arc::new(InMemoryHost {
            modules: self.modules,
            load_faults: self.load_faults,
        })
    }
}

pub struct InMemoryModule {
    name: String,
    preloaded: bool,
    types: Vec<Arc<InMemoryType>>,
    type_faults: HashMap<String, HostFault>,
}

impl HostModule for InMemoryModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_type(&self, full_name: &str) -> Result<Option<Arc<dyn HostType>>, HostFault> {
        if let Some(fault) = self.type_faults.get(full_name) {
            return Err(fault.clone());
        }
        Ok(self
            .types
            .iter()
            .find(|t| t.name == full_name)
            .map(|t| Arc::clone(t) as Arc<dyn HostType>))
    }
}

/// Builder for a host module
pub struct ModuleBuilder {
    name: String,
    preloaded: bool,
    types: Vec<Arc<InMemoryType>>,
    type_faults: HashMap<String, HostFault>,
}

impl ModuleBuilder {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            preloaded: true,
            types: Vec::new(),
            type_faults: HashMap::new(),
        }
    }

    /// The module exists but is only available through an explicit load
    pub fn lazy(mut self) -> Self {
        self.preloaded = false;
        self
    }

    pub fn with_type(mut self, host_type: TypeBuilder) -> Self {
        self.types.push(host_type.build());
        self
    }

    /// Make looking up `type_name` raise
    pub fn type_fault<S: Into<String>>(mut self, type_name: S, fault: HostFault) -> Self {
        self.type_faults.insert(type_name.into(), fault);
        self
    }

    fn build(self) -> Arc<InMemoryModule> {
        Arc::new(InMemoryModule {
            name: self.name,
            preloaded: self.preloaded,
            types: self.types,
            type_faults: self.type_faults,
        })
    }
}

pub struct InMemoryType {
    name: String,
    members: Vec<Arc<InMemoryMember>>,
    constructors: Vec<Arc<InMemoryConstructor>>,
    ambiguous_lookup: bool,
    lookup_faults: Vec<(Vec<TypeDescriptor>, HostFault)>,
}

impl InMemoryType {
    fn visible(&self, name: &str, scope: BindingScope) -> impl Iterator<Item = &Arc<InMemoryMember>> {
        let name = name.to_string();
        self.members
            .iter()
            .filter(move |m| m.name == name && scope.admits(m.is_static, m.is_public))
    }
}

impl HostType for InMemoryType {
    fn full_name(&self) -> &str {
        &self.name
    }

    fn lookup_member(&self, name: &str, scope: BindingScope, params: &[TypeDescriptor]) -> MemberLookup {
        if let Some((_, fault)) = self.lookup_faults.iter().find(|(p, _)| matches(p, params)) {
            return MemberLookup::Fault(fault.clone());
        }

        let candidates: Vec<&Arc<InMemoryMember>> = self.visible(name, scope).collect();
        if self.ambiguous_lookup && candidates.len() > 1 {
            return MemberLookup::Ambiguous;
        }

        let exact: Vec<&Arc<InMemoryMember>> = candidates
            .into_iter()
            .filter(|m| matches(&m.params, params))
            .collect();

        match exact.as_slice() {
            [] => MemberLookup::NotFound,
            [member] => MemberLookup::Found(Arc::clone(*member) as Arc<dyn HostMember>),
            _ => MemberLookup::Ambiguous,
        }
    }

    fn members_named(&self, name: &str, scope: BindingScope) -> Vec<Arc<dyn HostMember>> {
        self.visible(name, scope)
            .map(|m| Arc::clone(m) as Arc<dyn HostMember>)
            .collect()
    }

    fn constructors(&self) -> Vec<Arc<dyn HostConstructor>> {
        self.constructors
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn HostConstructor>)
            .collect()
    }
}

/// Builder for a host type
pub struct TypeBuilder {
    name: String,
    members: Vec<Arc<InMemoryMember>>,
    constructors: Vec<Arc<InMemoryConstructor>>,
    ambiguous_lookup: bool,
    lookup_faults: Vec<(Vec<TypeDescriptor>, HostFault)>,
}

impl TypeBuilder {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            constructors: Vec::new(),
            ambiguous_lookup: false,
            lookup_faults: Vec::new(),
        }
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.members.push(Arc::new(method.finish(&self.name)));
        self
    }

    pub fn property(mut self, property: PropertyBuilder) -> Self {
        self.members.push(Arc::new(property.finish(&self.name)));
        self
    }

    /// Add a constructor taking `params` and producing objects via `factory`
    pub fn constructor<F>(mut self, params: Vec<TypeDescriptor>, factory: F) -> Self
    where
        F: Fn(&[HostValue]) -> Result<ObjectRef, HostFault> + Send + Sync + 'static,
    {
        self.constructors.push(Arc::new(InMemoryConstructor {
            params,
            factory: Arc::new(factory),
        }));
        self
    }

    /// Add a constructor taking `params` that yields an empty instance of this type
    pub fn opaque_constructor(self, params: Vec<TypeDescriptor>) -> Self {
        let type_name = TypeDescriptor::new(self.name.clone());
        self.constructor(params, move |_| Ok(ObjectRef::opaque(type_name.clone())))
    }

    /// Add a constructor taking `params` that always raises `fault`
    pub fn failing_constructor(self, params: Vec<TypeDescriptor>, fault: HostFault) -> Self {
        self.constructor(params, move |_| Err(fault.clone()))
    }

    /// Report every lookup over an overloaded name as ambiguous, the way a
    /// name-only lookup behaves on real hosts
    pub fn ambiguous_lookup(mut self) -> Self {
        self.ambiguous_lookup = true;
        self
    }

    /// Make exact lookups for `params` raise `fault`
    pub fn lookup_fault_for(mut self, params: Vec<TypeDescriptor>, fault: HostFault) -> Self {
        self.lookup_faults.push((params, fault));
        self
    }

    pub fn build(self) -> Arc<InMemoryType> {
        Arc::new(InMemoryType {
            name: self.name,
            members: self.members,
            constructors: self.constructors,
            ambiguous_lookup: self.ambiguous_lookup,
            lookup_faults: self.lookup_faults,
        })
    }
}

pub struct InMemoryConstructor {
    params: Vec<TypeDescriptor>,
    factory: ConstructorHandler,
}

impl HostConstructor for InMemoryConstructor {
    fn parameters(&self) -> &[TypeDescriptor] {
        &self.params
    }

    fn construct(&self, args: &[HostValue]) -> Result<ObjectRef, HostFault> {
        if args.len() != self.params.len() {
            return Err(parameter_count_mismatch(self.params.len(), args.len()));
        }
        (self.factory)(args).map_err(HostFault::target_invocation)
    }
}

pub struct InMemoryMember {
    name: String,
    declaring_type: String,
    kind: MemberKind,
    params: Vec<TypeDescriptor>,
    returns: ReturnShape,
    is_static: bool,
    is_public: bool,
    handler: MemberHandler,
    direct: DirectMode,
    value: Mutex<HostValue>,
}

impl HostMember for InMemoryMember {
    fn name(&self) -> &str {
        &self.name
    }

    fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    fn kind(&self) -> MemberKind {
        self.kind
    }

    fn parameters(&self) -> &[TypeDescriptor] {
        &self.params
    }

    fn return_shape(&self) -> ReturnShape {
        self.returns
    }

    fn invoke(
        &self,
        target: Option<&ObjectRef>,
        args: &[HostValue],
        cancellation: &CancellationToken,
    ) -> Result<HostValue, HostFault> {
        if self.kind != MemberKind::Method {
            return Err(HostFault::raised(
                "System.Reflection.TargetException",
                format!("{}.{} is not a method", self.declaring_type, self.name),
            ));
        }
        if args.len() != self.params.len() {
            return Err(parameter_count_mismatch(self.params.len(), args.len()));
        }
        (self.handler)(target, args, cancellation).map_err(HostFault::target_invocation)
    }

    fn get_value(&self, _target: Option<&ObjectRef>) -> Result<HostValue, HostFault> {
        match self.kind {
            MemberKind::Property => Ok(self.value.lock().clone()),
            MemberKind::Method => Err(HostFault::raised(
                "System.ArgumentException",
                format!("{}.{} is not a property", self.declaring_type, self.name),
            )),
        }
    }

    fn set_value(&self, _target: Option<&ObjectRef>, value: HostValue) -> Result<(), HostFault> {
        match self.kind {
            MemberKind::Property => {
                *self.value.lock() = value;
                Ok(())
            }
            MemberKind::Method => Err(HostFault::raised(
                "System.ArgumentException",
                format!("{}.{} is not a property", self.declaring_type, self.name),
            )),
        }
    }

    fn direct_entry(&self) -> Option<DirectEntry> {
        match &self.direct {
            DirectMode::Unsupported => None,
            DirectMode::Available => {
                let handler = Arc::clone(&self.handler);
                Some(member_handler(move |target, args, token| handler(target, args, token)))
            }
            DirectMode::Faulty(fault) => {
                let fault = fault.clone();
                Some(member_handler(move |_, _, _| Err(fault.clone())))
            }
        }
    }
}

/// Builder for an in-memory method
pub struct MethodBuilder {
    name: String,
    params: Vec<TypeDescriptor>,
    returns: ReturnShape,
    is_static: bool,
    is_public: bool,
    handler: MemberHandler,
    direct: DirectMode,
}

impl MethodBuilder {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: ReturnShape::Void,
            is_static: false,
            is_public: true,
            handler: member_handler(|_, _, _| Ok(HostValue::Null)),
            direct: DirectMode::Unsupported,
        }
    }

    pub fn params(mut self, params: Vec<TypeDescriptor>) -> Self {
        self.params = params;
        self
    }

    pub fn returns(mut self, shape: ReturnShape) -> Self {
        self.returns = shape;
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Option<&ObjectRef>, &[HostValue], &CancellationToken) -> Result<HostValue, HostFault>
            + Send
            + Sync
            + 'static,
    {
        self.handler = member_handler(handler);
        self
    }

    /// Return `value` synchronously
    pub fn returns_value(self, value: HostValue) -> Self {
        self.returns(ReturnShape::Value)
            .handler(move |_, _, _| Ok(value.clone()))
    }

    /// Return a deferred that completes with `value`, or with a cancellation
    /// fault when the caller's token has already been cancelled
    pub fn returns_deferred(self, value: HostValue) -> Self {
        self.returns(ReturnShape::Deferred).handler(move |_, _, token| {
            if token.is_cancelled() {
                return Ok(HostValue::Deferred(Deferred::failed(HostFault::Cancelled)));
            }
            Ok(HostValue::Deferred(Deferred::completed(value.clone())))
        })
    }

    /// Raise `fault` on every call
    pub fn fails_with(self, fault: HostFault) -> Self {
        self.handler(move |_, _, _| Err(fault.clone()))
    }

    /// Expose a direct entry point that runs the same body
    pub fn direct(mut self) -> Self {
        self.direct = DirectMode::Available;
        self
    }

    /// Expose a direct entry point that raises `fault` whenever it is called
    pub fn direct_fault(mut self, fault: HostFault) -> Self {
        self.direct = DirectMode::Faulty(fault);
        self
    }

    pub fn non_public(mut self) -> Self {
        self.is_public = false;
        self
    }

    pub fn static_member(mut self) -> Self {
        self.is_static = true;
        self
    }

    fn finish(self, declaring_type: &str) -> InMemoryMember {
        InMemoryMember {
            name: self.name,
            declaring_type: declaring_type.to_string(),
            kind: MemberKind::Method,
            params: self.params,
            returns: self.returns,
            is_static: self.is_static,
            is_public: self.is_public,
            handler: self.handler,
            direct: self.direct,
            value: Mutex::new(HostValue::Null),
        }
    }
}

/// Builder for an in-memory property
pub struct PropertyBuilder {
    name: String,
    initial: HostValue,
    is_static: bool,
    is_public: bool,
}

impl PropertyBuilder {
    pub fn new<S: Into<String>>(name: S, initial: HostValue) -> Self {
        Self {
            name: name.into(),
            initial,
            is_static: false,
            is_public: true,
        }
    }

    pub fn non_public(mut self) -> Self {
        self.is_public = false;
        self
    }

    pub fn static_member(mut self) -> Self {
        self.is_static = true;
        self
    }

    fn finish(self, declaring_type: &str) -> InMemoryMember {
        InMemoryMember {
            name: self.name,
            declaring_type: declaring_type.to_string(),
            kind: MemberKind::Property,
            params: Vec::new(),
            returns: ReturnShape::Value,
            is_static: self.is_static,
            is_public: self.is_public,
            handler: member_handler(|_, _, _| Ok(HostValue::Null)),
            direct: DirectMode::Unsupported,
            value: Mutex::new(self.initial),
        }
    }
}

fn parameter_count_mismatch(expected: usize, actual: usize) -> HostFault {
    HostFault::raised(
        "System.Reflection.TargetParameterCountException",
        format!("Parameter count mismatch: expected {}, got {}", expected, actual),
    )
}
