//! Probe execution: bind capabilities, optionally invoke them, build the report

use std::sync::Arc;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;
use crate::cli;
use crate::compat::catalog;
use crate::compat::diagnostics::CompatibilityLog;
use crate::compat::manifest::{self, CapabilityManifest, HostManifest, SimulatedHost};
use crate::compat::signature::InvocationArgs;
use crate::compat::{CapabilityRegistry, CapabilitySpec};
use crate::config::EngineConfig;
use crate::report::{InvocationSummary, ProbeReport};
use super::initialization::build_environment;

/// A capability to bind plus the arguments supplied with it
pub struct PlannedCapability {
    pub spec: CapabilitySpec,
    pub args: Option<InvocationArgs>,
}

/// Capabilities from `--capabilities`, or the built-in catalog
pub fn load_capabilities(args: &cli::Args) -> Result<Vec<PlannedCapability>> {
    match &args.capabilities {
        Some(path) => {
            let manifest = CapabilityManifest::from_path(path)
                .with_context(|| format!("Failed to load capabilities from {}", path.display()))?;
            info!("Loaded {} capabilities from {}", manifest.capabilities.len(), path.display());
            Ok(manifest
                .capabilities
                .into_iter()
                .map(|entry| PlannedCapability {
                    args: (!entry.args.is_empty()).then(|| manifest::invocation_args(&entry.args)),
                    spec: entry.spec,
                })
                .collect())
        }
        None => {
            debug!("Using built-in capability catalog");
            Ok(catalog::builtin()
                .into_iter()
                .map(|spec| PlannedCapability { spec, args: None })
                .collect())
        }
    }
}

/// Load the host manifest named by `--host`
pub fn load_host(args: &cli::Args) -> Result<SimulatedHost> {
    let manifest = HostManifest::from_path(&args.host)
        .with_context(|| format!("Failed to load host manifest {}", args.host.display()))?;
    let simulated = manifest.build();
    info!(
        "Simulated host {} with {} modules and {} services",
        simulated.version,
        manifest.modules.len(),
        simulated.services.len()
    );
    Ok(simulated)
}

/// Bind every planned capability and, when `invoke` is set, call each one
/// once. Deferred results are awaited before they are reported.
pub async fn run_probe(
    simulated: &SimulatedHost,
    capabilities: Vec<PlannedCapability>,
    engine: &EngineConfig,
    invoke: bool,
    cancellation: CancellationToken,
) -> Result<ProbeReport> {
    let diagnostics = Arc::new(CompatibilityLog::new(engine.diagnostics_capacity));
    let env = build_environment(simulated, engine, diagnostics.clone());
    let host_version = env.version();
    let registry = CapabilityRegistry::new(env);

    let mut planned = Vec::with_capacity(capabilities.len());
    for capability in capabilities {
        let name = capability.spec.name.clone();
        let handle = registry.get_or_bind(capability.spec);
        let args = capability
            .args
            .or_else(|| simulated.invocations.get(&name).cloned())
            .unwrap_or_default();
        planned.push((handle, args));
    }

    let mut invocations = Vec::new();
    if invoke {
        for (handle, args) in &planned {
            if cancellation.is_cancelled() {
                warn!("Probe cancelled, skipping remaining invocations");
                break;
            }
            let outcome = handle.invoke(args, &cancellation).settle().await;
            debug!("{} -> {}", handle.name(), outcome.kind());
            invocations.push(InvocationSummary::new(handle.name(), &outcome));
        }
    }

    let capabilities = registry.report();
    Ok(ProbeReport {
        host_version,
        fast_path: engine.fast_path,
        capabilities,
        invocations,
        diagnostics: diagnostics.snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::version::HostVersion;

    const HOST: &str = r#"
version: '4.8.0.0'
services:
  - MediaBrowser.Model.IO.IFileSystem
  - MediaBrowser.Model.Logging.ILogger
  - MediaBrowser.Controller.MediaEncoding.IMediaEncoder
  - MediaBrowser.Controller.Chapters.IChapterManager
  - MediaBrowser.Controller.Library.ILibraryManager
modules:
  - name: Emby.Server.Implementations
    types:
      - name: Emby.Server.Implementations.MediaEncoder.EncodingManager
        constructors:
          - params:
              - MediaBrowser.Model.IO.IFileSystem
              - MediaBrowser.Model.Logging.ILogger
              - MediaBrowser.Controller.MediaEncoding.IMediaEncoder
              - MediaBrowser.Controller.Chapters.IChapterManager
              - MediaBrowser.Controller.Library.ILibraryManager
        methods:
          - name: RefreshChapterImages
            params:
              - MediaBrowser.Controller.Entities.Video
              - System.Collections.Generic.List`1[MediaBrowser.Model.Entities.ChapterInfo]
              - System.Boolean
              - System.Boolean
            returns: deferred
            result: true
invocations:
  chapter-image-refresh:
    video: { object: MediaBrowser.Controller.Entities.Video }
    chapters: []
    extractImages: true
    saveChapters: false
"#;

    #[tokio::test]
    async fn test_probe_binds_and_invokes_builtin_catalog() {
        let simulated = HostManifest::from_yaml_str(HOST).unwrap().build();
        let capabilities: Vec<PlannedCapability> = catalog::builtin()
            .into_iter()
            .map(|spec| PlannedCapability { spec, args: None })
            .collect();

        let report = run_probe(&simulated, capabilities, &EngineConfig::default(), true, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.host_version, HostVersion::new(4, 8, 0, 0));
        let status = &report.capabilities[0];
        assert!(status.bound, "{:?}", status.reason);
        assert_eq!(status.variant.as_deref(), Some("pre-4.9.0.36"));
        assert_eq!(report.invocations.len(), 1);
        assert_eq!(report.invocations[0].outcome, "success");
        assert_eq!(report.invocations[0].value.as_deref(), Some("true"));
        assert!(!report.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_probe_skips_invocations() {
        let simulated = HostManifest::from_yaml_str(HOST).unwrap().build();
        let capabilities = vec![PlannedCapability { spec: catalog::chapter_image_refresh(), args: None }];
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let report = run_probe(&simulated, capabilities, &EngineConfig::default(), true, cancellation)
            .await
            .unwrap();

        assert!(report.invocations.is_empty());
        assert_eq!(report.capabilities.len(), 1);
    }
}
