//! Capability Registry
//!
//! Keeps one binding per capability name so every caller in the process shares
//! the same lazily bound handle and the same demotion state.

use dashmap::DashMap;
use serde::Serialize;
use super::binding::{bind_capability, BindingEnvironment, BindingState, CapabilityHandle, CapabilitySpec};
use super::policy::PatchApproach;

/// Summary of one capability for reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityStatus {
    pub name: String,
    pub bound: bool,
    pub approach: PatchApproach,
    pub target: Option<String>,
    pub variant: Option<String>,
    pub reason: Option<String>,
}

/// Name to handle map shared by a process
pub struct CapabilityRegistry {
    env: BindingEnvironment,
    bindings: DashMap<String, CapabilityHandle>,
}

impl CapabilityRegistry {
    pub fn new(env: BindingEnvironment) -> Self {
        Self { env, bindings: DashMap::new() }
    }

    pub fn environment(&self) -> &BindingEnvironment {
        &self.env
    }

    /// Handle for `spec.name`, creating it on first request. A later spec
    /// with the same name gets the existing handle.
    pub fn get_or_bind(&self, spec: CapabilitySpec) -> CapabilityHandle {
        self.bindings
            .entry(spec.name.clone())
            .or_insert_with(|| bind_capability(&self.env, spec))
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<CapabilityHandle> {
        self.bindings.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Status of every capability, binding any that have not been used yet
    pub fn report(&self) -> Vec<CapabilityStatus> {
        let mut handles: Vec<CapabilityHandle> = self.bindings.iter().map(|entry| entry.value().clone()).collect();
        handles.sort_by(|a, b| a.name().cmp(b.name()));
        handles.iter().map(status_of).collect()
    }
}

fn status_of(handle: &CapabilityHandle) -> CapabilityStatus {
    match handle.state() {
        BindingState::Bound(target) => CapabilityStatus {
            name: handle.name().to_string(),
            bound: true,
            approach: target.approach(),
            target: Some(target.member().qualified_name()),
            variant: Some(target.member().variant.label.clone()),
            reason: None,
        },
        BindingState::Unavailable(reason) => CapabilityStatus {
            name: handle.name().to_string(),
            bound: false,
            approach: PatchApproach::None,
            target: None,
            variant: None,
            reason: Some(reason.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::compat::diagnostics::CompatibilityLog;
    use crate::compat::host::TypeDescriptor;
    use crate::compat::memory_host::{InMemoryHost, MethodBuilder, ModuleBuilder, TypeBuilder};
    use crate::compat::signature::SignatureVariant;
    use crate::compat::version::HostVersion;

    fn registry() -> CapabilityRegistry {
        let host = InMemoryHost::builder()
            .module(
                ModuleBuilder::new("Host.Core").with_type(
                    TypeBuilder::new("Host.Core.Jobs")
                        .opaque_constructor(vec![])
                        .method(MethodBuilder::new("Run").params(vec![TypeDescriptor::string()])),
                ),
            )
            .build();
        let env = BindingEnvironment::new(host, HostVersion::new(1, 0, 0, 0))
            .with_diagnostics(Arc::new(CompatibilityLog::new(8)));
        CapabilityRegistry::new(env)
    }

    fn run_spec() -> CapabilitySpec {
        CapabilitySpec::new("run-job", "Host.Core", "Host.Core.Jobs", "Run").variant(SignatureVariant::new(
            "default",
            vec![crate::compat::signature::ParamSpec::new("name", TypeDescriptor::string())],
        ))
    }

    #[test]
    fn test_get_or_bind_returns_shared_handle() {
        let registry = registry();
        let first = registry.get_or_bind(run_spec());
        let second = registry.get_or_bind(run_spec());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("run-job").is_some());
        assert!(registry.get("other").is_none());
    }

    #[test]
    fn test_report_lists_bound_and_unavailable() {
        let registry = registry();
        registry.get_or_bind(run_spec());
        registry.get_or_bind(CapabilitySpec::new("absent", "Host.Missing", "Host.Missing.Type", "Go"));

        let report = registry.report();
        assert_eq!(registry.names(), vec!["absent".to_string(), "run-job".to_string()]);
        assert_eq!(report.len(), 2);

        assert_eq!(report[0].name, "absent");
        assert!(!report[0].bound);
        assert_eq!(report[0].approach, PatchApproach::None);
        assert_eq!(report[0].reason.as_deref(), Some("module not loaded: Host.Missing"));

        assert!(report[1].bound);
        assert_eq!(report[1].approach, PatchApproach::Reflection);
        assert_eq!(report[1].target.as_deref(), Some("Host.Core.Jobs.Run"));
        assert_eq!(report[1].variant.as_deref(), Some("default"));
    }
}
