use std::path::PathBuf;
use hostcompat::app::{run_probe, PlannedCapability};
use hostcompat::compat::manifest::{invocation_args, CapabilityManifest, HostManifest};
use hostcompat::compat::{catalog, HostValue, HostVersion, PatchApproach};
use hostcompat::config::EngineConfig;
use tokio_util::sync::CancellationToken;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

fn planned(manifest: &CapabilityManifest) -> Vec<PlannedCapability> {
    manifest
        .capabilities
        .iter()
        .map(|entry| PlannedCapability {
            spec: entry.spec.clone(),
            args: (!entry.args.is_empty()).then(|| invocation_args(&entry.args)),
        })
        .collect()
}

#[test]
fn test_capability_manifest_from_toml_fixture() {
    let manifest = CapabilityManifest::from_path(fixture("capabilities.toml")).unwrap();

    assert_eq!(manifest.capabilities.len(), 2);
    let scan = &manifest.capabilities[1];
    assert_eq!(scan.spec.name, "library-scan");
    assert_eq!(scan.spec.variants[0].params[0].name, "path");
    assert_eq!(
        invocation_args(&scan.args).get("path"),
        Some(&HostValue::Str("/media".to_string()))
    );
}

#[test]
fn test_host_manifest_fixture_builds() {
    let host = HostManifest::from_path(fixture("emby_4_8.yaml")).unwrap().build();

    assert_eq!(host.version, HostVersion::new(4, 8, 0, 0));
    assert_eq!(host.services.len(), catalog::encoding_manager_dependencies().len());
    assert!(host.invocations.contains_key(catalog::CHAPTER_IMAGE_REFRESH));
}

#[test]
fn test_unreadable_manifests_are_reported() {
    assert!(HostManifest::from_path(fixture("missing.yaml")).is_err());
    assert!(HostManifest::from_yaml_str("version: '4.9'\nmodules:\n  - name: ''\n").is_err());
    assert!(CapabilityManifest::from_toml_str("[[capabilities]]\nname = 3\n").is_err());
}

#[tokio::test]
async fn test_probe_reports_mixed_compatibility() {
    let host = HostManifest::from_path(fixture("emby_4_8.yaml")).unwrap().build();
    let capabilities = planned(&CapabilityManifest::from_path(fixture("capabilities.toml")).unwrap());

    let report = run_probe(&host, capabilities, &EngineConfig::default(), true, CancellationToken::new())
        .await
        .unwrap();

    let scan = report.capabilities.iter().find(|s| s.name == "library-scan").unwrap();
    assert!(!scan.bound);
    assert!(scan.reason.as_deref().unwrap_or_default().contains("Emby.Library"));

    let jobs = report.capabilities.iter().find(|s| s.name == "run-pending-jobs").unwrap();
    assert!(jobs.bound);
    assert_eq!(jobs.approach, PatchApproach::Reflection);

    let outcomes: Vec<(&str, &str)> = report
        .invocations
        .iter()
        .map(|summary| (summary.capability.as_str(), summary.outcome.as_str()))
        .collect();
    assert_eq!(outcomes, vec![("run-pending-jobs", "success"), ("library-scan", "host-incompatible")]);
    assert_eq!(report.incompatible_count(), 1);
}

#[tokio::test]
async fn test_probe_without_fast_path_never_uses_direct_strategy() {
    let host = HostManifest::from_path(fixture("emby_4_9.yaml")).unwrap().build();
    let engine = EngineConfig { fast_path: false, ..EngineConfig::default() };
    let capabilities = vec![PlannedCapability { spec: catalog::chapter_image_refresh(), args: None }];

    let report = run_probe(&host, capabilities, &engine, true, CancellationToken::new()).await.unwrap();

    assert_eq!(report.capabilities[0].approach, PatchApproach::Reflection);
    assert_eq!(report.invocations[0].value.as_deref(), Some("true"));
}
