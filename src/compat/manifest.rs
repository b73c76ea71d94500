//! Host and Capability Manifests
//!
//! A host manifest describes a simulated host in YAML: its version, the
//! services it hands to constructors, and its modules, types and members with
//! canned results or injected faults. It builds an [`InMemoryHost`] so the
//! engine can be probed without the real host process.
//!
//! A capability manifest lists capabilities to bind, in TOML or YAML, with
//! optional arguments for a dry-run invocation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use serde::Deserialize;
use super::binding::{CapabilitySpec, ServiceCollection};
use super::error::{CompatError, CompatResult, HostFault};
use super::host::{HostValue, ObjectRef, ReturnShape, TypeDescriptor};
use super::memory_host::{InMemoryHost, MethodBuilder, ModuleBuilder, PropertyBuilder, TypeBuilder};
use super::signature::InvocationArgs;
use super::version::HostVersion;

/// Value literal usable in either manifest format
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ManifestValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ManifestValue>),
    /// `{ object = "Type.Name" }` yields an opaque object of that type
    Object { object: String },
}

impl ManifestValue {
    pub fn to_host_value(&self) -> HostValue {
        match self {
            ManifestValue::Null => HostValue::Null,
            ManifestValue::Bool(b) => HostValue::Bool(*b),
            ManifestValue::Int(i) => HostValue::Int(*i),
            ManifestValue::Float(f) => HostValue::Float(*f),
            ManifestValue::Str(s) => HostValue::Str(s.clone()),
            ManifestValue::List(items) => HostValue::List(items.iter().map(ManifestValue::to_host_value).collect()),
            ManifestValue::Object { object } => HostValue::Object(ObjectRef::opaque(TypeDescriptor::new(object.as_str()))),
        }
    }
}

/// Convert a named argument table into invocation arguments
pub fn invocation_args(values: &BTreeMap<String, ManifestValue>) -> InvocationArgs {
    values
        .iter()
        .fold(InvocationArgs::new(), |args, (name, value)| args.with(name.as_str(), value.to_host_value()))
}

/// A fault the simulated host raises
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FaultSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub message: String,
}

impl FaultSpec {
    pub fn to_fault(&self) -> HostFault {
        if self.type_name == "cancelled" {
            return HostFault::Cancelled;
        }
        HostFault::raised(self.type_name.as_str(), self.message.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConstructorSpec {
    #[serde(default)]
    pub params: Vec<TypeDescriptor>,
    pub fault: Option<FaultSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MethodSpec {
    pub name: String,
    #[serde(default)]
    pub params: Vec<TypeDescriptor>,
    #[serde(default)]
    pub returns: ReturnShape,
    /// Value returned, wrapped in a completed deferred for deferred methods
    pub result: Option<ManifestValue>,
    pub fault: Option<FaultSpec>,
    /// Expose a direct entry point
    #[serde(default)]
    pub direct: bool,
    /// Direct entry point that always raises this fault
    pub direct_fault: Option<FaultSpec>,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default = "default_true")]
    pub public: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PropertySpec {
    pub name: String,
    pub value: Option<ManifestValue>,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default = "default_true")]
    pub public: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LookupFaultSpec {
    #[serde(default)]
    pub params: Vec<TypeDescriptor>,
    pub fault: FaultSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TypeSpec {
    pub name: String,
    #[serde(default)]
    pub constructors: Vec<ConstructorSpec>,
    #[serde(default)]
    pub methods: Vec<MethodSpec>,
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
    /// Answer overloaded lookups with an ambiguity
    #[serde(default)]
    pub ambiguous_lookup: bool,
    #[serde(default)]
    pub lookup_faults: Vec<LookupFaultSpec>,
    pub fault: Option<FaultSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleSpec {
    pub name: String,
    /// Not loaded until asked for
    #[serde(default)]
    pub lazy: bool,
    pub load_fault: Option<FaultSpec>,
    #[serde(default)]
    pub types: Vec<TypeSpec>,
}

/// Simulated host description
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HostManifest {
    pub version: HostVersion,
    /// Service types available to constructors
    #[serde(default)]
    pub services: Vec<TypeDescriptor>,
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
    /// Dry-run arguments keyed by capability name
    #[serde(default)]
    pub invocations: BTreeMap<String, BTreeMap<String, ManifestValue>>,
}

/// Everything built from a host manifest
pub struct SimulatedHost {
    pub host: Arc<InMemoryHost>,
    pub version: HostVersion,
    pub services: ServiceCollection,
    pub invocations: BTreeMap<String, InvocationArgs>,
}

impl HostManifest {
    pub fn from_yaml_str(text: &str) -> CompatResult<Self> {
        let manifest: HostManifest = serde_yaml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> CompatResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CompatError::manifest_error(format!("Cannot read host manifest {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    fn validate(&self) -> CompatResult<()> {
        for module in &self.modules {
            if module.name.trim().is_empty() {
                return Err(CompatError::manifest_error("Module with empty name"));
            }
            for host_type in &module.types {
                if host_type.name.trim().is_empty() {
                    return Err(CompatError::manifest_error(format!("Type with empty name in {}", module.name)));
                }
                if host_type.methods.iter().any(|m| m.name.trim().is_empty()) {
                    return Err(CompatError::manifest_error(format!("Method with empty name in {}", host_type.name)));
                }
            }
        }
        Ok(())
    }

    pub fn build(&self) -> SimulatedHost {
        let mut builder = InMemoryHost::builder();
        for module in &self.modules {
            match &module.load_fault {
                Some(fault) => builder = builder.module_load_fault(module.name.as_str(), fault.to_fault()),
                None => builder = builder.module(build_module(module)),
            }
        }

        let services = self.services.iter().fold(ServiceCollection::new(), |services, service| {
            services.with(service.clone(), ObjectRef::opaque(service.clone()))
        });

        SimulatedHost {
            host: builder.build(),
            version: self.version,
            services,
            invocations: self
                .invocations
                .iter()
                .map(|(name, values)| (name.clone(), invocation_args(values)))
                .collect(),
        }
    }
}

fn build_module(spec: &ModuleSpec) -> ModuleBuilder {
    let mut module = ModuleBuilder::new(spec.name.as_str());
    if spec.lazy {
        module = module.lazy();
    }
    for host_type in &spec.types {
        module = match &host_type.fault {
            Some(fault) => module.type_fault(host_type.name.as_str(), fault.to_fault()),
            None => module.with_type(build_type(host_type)),
        };
    }
    module
}

fn build_type(spec: &TypeSpec) -> TypeBuilder {
    let mut builder = TypeBuilder::new(spec.name.as_str());

    for ctor in &spec.constructors {
        builder = match &ctor.fault {
            Some(fault) => builder.failing_constructor(ctor.params.clone(), fault.to_fault()),
            None => builder.opaque_constructor(ctor.params.clone()),
        };
    }

    for method in &spec.methods {
        builder = builder.method(build_method(method));
    }

    for property in &spec.properties {
        let initial = property.value.as_ref().map(ManifestValue::to_host_value).unwrap_or_default();
        let mut prop = PropertyBuilder::new(property.name.as_str(), initial);
        if property.is_static {
            prop = prop.static_member();
        }
        if !property.public {
            prop = prop.non_public();
        }
        builder = builder.property(prop);
    }

    if spec.ambiguous_lookup {
        builder = builder.ambiguous_lookup();
    }
    for lookup in &spec.lookup_faults {
        builder = builder.lookup_fault_for(lookup.params.clone(), lookup.fault.to_fault());
    }
    builder
}

fn build_method(spec: &MethodSpec) -> MethodBuilder {
    let result = spec.result.as_ref().map(ManifestValue::to_host_value).unwrap_or_default();
    let mut method = MethodBuilder::new(spec.name.as_str()).params(spec.params.clone());

    method = match (&spec.fault, spec.returns) {
        (Some(fault), shape) => method.returns(shape).fails_with(fault.to_fault()),
        (None, ReturnShape::Deferred) => method.returns_deferred(result),
        (None, ReturnShape::Value) => method.returns_value(result),
        (None, ReturnShape::Void) => method,
    };

    if let Some(fault) = &spec.direct_fault {
        method = method.direct_fault(fault.to_fault());
    } else if spec.direct {
        method = method.direct();
    }
    if spec.is_static {
        method = method.static_member();
    }
    if !spec.public {
        method = method.non_public();
    }
    method
}

fn default_true() -> bool {
    true
}

/// Capability with optional dry-run arguments
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityEntry {
    #[serde(flatten)]
    pub spec: CapabilitySpec,
    #[serde(default)]
    pub args: BTreeMap<String, ManifestValue>,
}

/// List of capabilities to bind
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityManifest {
    #[serde(default)]
    pub capabilities: Vec<CapabilityEntry>,
}

impl CapabilityManifest {
    pub fn from_toml_str(text: &str) -> CompatResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_yaml_str(text: &str) -> CompatResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read by extension: `.toml` is TOML, anything else YAML
    pub fn from_path<P: AsRef<Path>>(path: P) -> CompatResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CompatError::manifest_error(format!("Cannot read capability manifest {}: {}", path.display(), e))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    pub fn specs(&self) -> Vec<CapabilitySpec> {
        self.capabilities.iter().map(|entry| entry.spec.clone()).collect()
    }
}
