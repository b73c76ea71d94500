//! Host Introspection Model
//!
//! The engine never links against the host. Everything it knows about the host
//! arrives through the traits in this module: modules are loaded by name, types
//! are looked up by fully qualified name, and members are matched by their
//! parameter types. Values crossing the boundary are dynamic [`HostValue`]s.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use bitflags::bitflags;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use super::error::HostFault;
use super::fast_path::DirectEntry;

/// Nominal type name as the host spells it, e.g. `System.Boolean`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeDescriptor(String);

impl TypeDescriptor {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn boolean() -> Self {
        Self::new("System.Boolean")
    }

    pub fn string() -> Self {
        Self::new("System.String")
    }

    pub fn int32() -> Self {
        Self::new("System.Int32")
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeDescriptor {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Render a parameter list as `A, B, C`
pub fn format_signature(types: &[TypeDescriptor]) -> String {
    types.iter().map(TypeDescriptor::name).collect::<Vec<_>>().join(", ")
}

bitflags! {
    /// Restricts which members a lookup may return
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct BindingScope: u32 {
        /// Members bound to an instance
        const INSTANCE = 0x01;
        /// Members bound to the type itself
        const STATIC = 0x02;
        /// Publicly visible members
        const PUBLIC = 0x04;
        /// Internal and private members
        const NON_PUBLIC = 0x08;
    }
}

impl BindingScope {
    /// Public and non-public instance members, the usual scope for bound services
    pub fn any_instance() -> Self {
        BindingScope::INSTANCE | BindingScope::PUBLIC | BindingScope::NON_PUBLIC
    }

    /// Whether a member with the given shape is visible through this scope
    pub fn admits(&self, is_static: bool, is_public: bool) -> bool {
        let binding = if is_static { BindingScope::STATIC } else { BindingScope::INSTANCE };
        let visibility = if is_public { BindingScope::PUBLIC } else { BindingScope::NON_PUBLIC };
        self.contains(binding) && self.contains(visibility)
    }
}

impl Default for BindingScope {
    fn default() -> Self {
        Self::any_instance()
    }
}

/// Kind of member a lookup returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Method,
    Property,
}

/// What a member hands back when called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReturnShape {
    Void,
    #[default]
    Value,
    /// A task-like value the caller awaits
    Deferred,
}

/// Opaque handle to a host-side object
#[derive(Clone)]
pub struct ObjectRef {
    type_name: TypeDescriptor,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ObjectRef {
    pub fn new<T: Any + Send + Sync>(type_name: TypeDescriptor, value: T) -> Self {
        Self { type_name, inner: Arc::new(value) }
    }

    /// An object with no payload, used for services the engine only passes along
    pub fn opaque(type_name: TypeDescriptor) -> Self {
        Self::new(type_name, ())
    }

    pub fn type_name(&self) -> &TypeDescriptor {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn same_object(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({})", self.type_name)
    }
}

type SharedResult = Shared<BoxFuture<'static, Result<HostValue, HostFault>>>;

/// Task-like result of an asynchronous host member.
///
/// Cloning shares the same underlying computation. The engine passes these
/// through untouched; only the caller polls them.
#[derive(Clone)]
pub struct Deferred {
    inner: SharedResult,
}

impl Deferred {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<HostValue, HostFault>> + Send + 'static,
    {
        Self { inner: future.boxed().shared() }
    }

    /// An already finished deferred value
    pub fn completed(value: HostValue) -> Self {
        Self::new(futures::future::ready(Ok(value)))
    }

    /// An already failed deferred value
    pub fn failed(fault: HostFault) -> Self {
        Self::new(futures::future::ready(Err(fault)))
    }

    /// The result, if the computation has already finished
    pub fn peek(&self) -> Option<&Result<HostValue, HostFault>> {
        self.inner.peek()
    }
}

impl Future for Deferred {
    type Output = Result<HostValue, HostFault>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peek() {
            Some(Ok(value)) => write!(f, "Deferred(completed: {:?})", value),
            Some(Err(fault)) => write!(f, "Deferred(failed: {})", fault),
            None => write!(f, "Deferred(pending)"),
        }
    }
}

/// Dynamic value exchanged with the host
#[derive(Debug, Clone, Default)]
pub enum HostValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<HostValue>),
    Object(ObjectRef),
    Deferred(Deferred),
}

impl HostValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            HostValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn into_deferred(self) -> Option<Deferred> {
        match self {
            HostValue::Deferred(deferred) => Some(deferred),
            _ => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, HostValue::Deferred(_))
    }

    /// Short name of the variant, used when logging drift
    pub fn kind_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Float(_) => "float",
            HostValue::Str(_) => "string",
            HostValue::List(_) => "list",
            HostValue::Object(_) => "object",
            HostValue::Deferred(_) => "deferred",
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a == b,
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::List(a), HostValue::List(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => a.same_object(b),
            // Deferred values have no meaningful identity
            _ => false,
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Int(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Str(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::Str(value)
    }
}

impl From<ObjectRef> for HostValue {
    fn from(value: ObjectRef) -> Self {
        HostValue::Object(value)
    }
}

impl From<Deferred> for HostValue {
    fn from(value: Deferred) -> Self {
        HostValue::Deferred(value)
    }
}

/// Outcome of an exact-shape member lookup
#[derive(Clone)]
pub enum MemberLookup {
    Found(Arc<dyn HostMember>),
    NotFound,
    /// The host's own lookup matched more than one member
    Ambiguous,
    Fault(HostFault),
}

impl fmt::Debug for MemberLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberLookup::Found(member) => write!(f, "Found({}.{})", member.declaring_type(), member.name()),
            MemberLookup::NotFound => write!(f, "NotFound"),
            MemberLookup::Ambiguous => write!(f, "Ambiguous"),
            MemberLookup::Fault(fault) => write!(f, "Fault({})", fault),
        }
    }
}

/// The running host's module loader
pub trait HostIntrospection: Send + Sync {
    /// Load a module by name. `Ok(None)` means the host does not ship it.
    fn load_module(&self, name: &str) -> Result<Option<Arc<dyn HostModule>>, HostFault>;

    /// Modules already loaded in the host process
    fn loaded_modules(&self) -> Vec<Arc<dyn HostModule>>;
}

/// A loaded host module
pub trait HostModule: Send + Sync {
    fn name(&self) -> &str;

    /// Find a type by its fully qualified name
    fn get_type(&self, full_name: &str) -> Result<Option<Arc<dyn HostType>>, HostFault>;
}

/// A type exported by a host module
pub trait HostType: Send + Sync {
    fn full_name(&self) -> &str;

    /// Ask the host for the member with exactly this parameter list
    fn lookup_member(&self, name: &str, scope: BindingScope, params: &[TypeDescriptor]) -> MemberLookup;

    /// Every member with this name visible through `scope`, in declaration order
    fn members_named(&self, name: &str, scope: BindingScope) -> Vec<Arc<dyn HostMember>>;

    fn constructors(&self) -> Vec<Arc<dyn HostConstructor>>;
}

/// A method or property on a host type
pub trait HostMember: Send + Sync {
    fn name(&self) -> &str;

    fn declaring_type(&self) -> &str;

    fn kind(&self) -> MemberKind;

    fn parameters(&self) -> &[TypeDescriptor];

    fn return_shape(&self) -> ReturnShape;

    /// Generic invoke path. Faults raised by the member arrive wrapped in
    /// [`HostFault::TargetInvocation`].
    fn invoke(
        &self,
        target: Option<&ObjectRef>,
        args: &[HostValue],
        cancellation: &CancellationToken,
    ) -> Result<HostValue, HostFault>;

    fn get_value(&self, target: Option<&ObjectRef>) -> Result<HostValue, HostFault> {
        let _ = target;
        Err(HostFault::raised(
            "System.ArgumentException",
            format!("{}.{} is not a readable property", self.declaring_type(), self.name()),
        ))
    }

    fn set_value(&self, target: Option<&ObjectRef>, value: HostValue) -> Result<(), HostFault> {
        let _ = (target, value);
        Err(HostFault::raised(
            "System.ArgumentException",
            format!("{}.{} is not a writable property", self.declaring_type(), self.name()),
        ))
    }

    /// Entry point for the direct strategy, when the environment can provide one
    fn direct_entry(&self) -> Option<DirectEntry> {
        None
    }
}

/// A constructor on a host type
pub trait HostConstructor: Send + Sync {
    fn parameters(&self) -> &[TypeDescriptor];

    fn construct(&self, args: &[HostValue]) -> Result<ObjectRef, HostFault>;
}
