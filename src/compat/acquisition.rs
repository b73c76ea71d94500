//! Module and Type Acquisition
//!
//! Best-effort loading of the host module and type that implement a
//! capability. A missing module is a normal answer on many host versions, so
//! every failure comes back as an [`UnavailableReason`] rather than a fault.

use std::sync::Arc;
use log::{debug, warn};
use super::error::UnavailableReason;
use super::host::{HostIntrospection, HostModule, HostType};
use super::wrapper::catch_host_panic;

fn loaded_modules(host: &dyn HostIntrospection) -> Vec<Arc<dyn HostModule>> {
    catch_host_panic(|| Ok(host.loaded_modules())).unwrap_or_else(|fault| {
        warn!("Listing loaded modules failed: {}", fault);
        Vec::new()
    })
}

/// Find a module, preferring one the host has already loaded
pub fn load_module(host: &dyn HostIntrospection, name: &str) -> Result<Arc<dyn HostModule>, UnavailableReason> {
    if let Some(module) = loaded_modules(host).into_iter().find(|m| m.name() == name) {
        debug!("Module {} already loaded", name);
        return Ok(module);
    }

    match catch_host_panic(|| host.load_module(name)) {
        Ok(Some(module)) => {
            debug!("Loaded module {}", name);
            Ok(module)
        }
        Ok(None) => {
            debug!("Module {} is not present on this host", name);
            Err(UnavailableReason::ModuleNotLoaded { module: name.to_string() })
        }
        Err(fault) => {
            warn!("Loading module {} failed: {}", name, fault.root_cause());
            Err(UnavailableReason::ModuleNotLoaded { module: name.to_string() })
        }
    }
}

/// Get a type from a module by fully qualified name
pub fn acquire_type(module: &dyn HostModule, type_name: &str) -> Result<Arc<dyn HostType>, UnavailableReason> {
    let not_found = || UnavailableReason::TypeNotFound {
        module: module.name().to_string(),
        type_name: type_name.to_string(),
    };

    match catch_host_panic(|| module.get_type(type_name)) {
        Ok(Some(host_type)) => Ok(host_type),
        Ok(None) => {
            debug!("Type {} not found in {}", type_name, module.name());
            Err(not_found())
        }
        Err(fault) => {
            warn!("Resolving type {} in {} failed: {}", type_name, module.name(), fault.root_cause());
            Err(not_found())
        }
    }
}

/// Search every loaded module for a type, for types that moved between modules
pub fn find_loaded_type(host: &dyn HostIntrospection, type_name: &str) -> Option<(Arc<dyn HostModule>, Arc<dyn HostType>)> {
    loaded_modules(host).into_iter().find_map(|module| {
        match catch_host_panic(|| module.get_type(type_name)) {
            Ok(Some(host_type)) => Some((Arc::clone(&module), host_type)),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::error::HostFault;
    use crate::compat::memory_host::{InMemoryHost, ModuleBuilder, TypeBuilder};

    fn host() -> Arc<InMemoryHost> {
        InMemoryHost::builder()
            .module(
                ModuleBuilder::new("Emby.Server.Implementations")
                    .with_type(TypeBuilder::new("Emby.Server.Implementations.Library.LibraryManager"))
                    .type_fault(
                        "Emby.Server.Implementations.Broken",
                        HostFault::raised("System.TypeLoadException", "missing dependency"),
                    ),
            )
            .module(
                ModuleBuilder::new("Emby.Providers")
                    .lazy()
                    .with_type(TypeBuilder::new("Emby.Providers.Manager")),
            )
            .module_load_fault("Emby.Corrupt", HostFault::raised("System.BadImageFormatException", "bad header"))
            .build()
    }

    #[test]
    fn test_load_module_variants() {
        let host = host();
        assert!(load_module(host.as_ref(), "Emby.Server.Implementations").is_ok());
        assert!(load_module(host.as_ref(), "Emby.Providers").is_ok());
        assert_eq!(
            load_module(host.as_ref(), "Emby.Missing").err(),
            Some(UnavailableReason::ModuleNotLoaded { module: "Emby.Missing".to_string() })
        );
        assert!(matches!(
            load_module(host.as_ref(), "Emby.Corrupt"),
            Err(UnavailableReason::ModuleNotLoaded { .. })
        ));
    }

    #[test]
    fn test_acquire_type_variants() {
        let host = host();
        let module = load_module(host.as_ref(), "Emby.Server.Implementations").unwrap();

        assert!(acquire_type(module.as_ref(), "Emby.Server.Implementations.Library.LibraryManager").is_ok());
        assert!(matches!(
            acquire_type(module.as_ref(), "Emby.Server.Implementations.Nope"),
            Err(UnavailableReason::TypeNotFound { .. })
        ));
        assert!(matches!(
            acquire_type(module.as_ref(), "Emby.Server.Implementations.Broken"),
            Err(UnavailableReason::TypeNotFound { .. })
        ));
    }

    struct CrashingLoader;

    impl HostIntrospection for CrashingLoader {
        fn load_module(&self, _name: &str) -> Result<Option<Arc<dyn HostModule>>, HostFault> {
            panic!("loader crashed")
        }

        fn loaded_modules(&self) -> Vec<Arc<dyn HostModule>> {
            panic!("module table corrupted")
        }
    }

    #[test]
    fn test_panicking_loader_reports_module_not_loaded() {
        assert_eq!(
            load_module(&CrashingLoader, "Emby.Server.Implementations").err(),
            Some(UnavailableReason::ModuleNotLoaded { module: "Emby.Server.Implementations".to_string() })
        );
        assert!(find_loaded_type(&CrashingLoader, "Emby.Providers.Manager").is_none());
    }

    #[test]
    fn test_find_loaded_type_skips_lazy_modules() {
        let host = host();
        let (module, _) = find_loaded_type(host.as_ref(), "Emby.Server.Implementations.Library.LibraryManager").unwrap();
        assert_eq!(module.name(), "Emby.Server.Implementations");
        assert!(find_loaded_type(host.as_ref(), "Emby.Providers.Manager").is_none());
    }
}
