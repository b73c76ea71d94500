//! Chapter Image Refresh Scenarios
//!
//! End-to-end behaviour of the built-in capability across host releases.

use super::mock_host::*;
use crate::compat::catalog::{self, SERVER_IMPLEMENTATIONS};
use crate::compat::diagnostics::DiagnosticEvent;
use crate::compat::error::{HostFault, UnavailableReason};
use crate::compat::host::{HostValue, ReturnShape, TypeDescriptor};
use crate::compat::binding::{bind_capability, CapabilitySpec};
use crate::compat::memory_host::{InMemoryHost, MethodBuilder};
use crate::compat::policy::{InvocationOutcome, PatchApproach};
use crate::compat::signature::{InvocationArgs, ParamSpec, SignatureVariant};
use crate::compat::version::HostVersion;
use tokio_util::sync::CancellationToken;

fn td(name: &str) -> TypeDescriptor {
    TypeDescriptor::new(name)
}

#[tokio::test]
async fn test_older_host_binds_older_variant_and_passes_three_arguments() {
    let recorder = CallRecorder::new();
    let older = vec![td("Host.Video"), td("Host.ChapterList"), TypeDescriptor::boolean()];
    let host = host_with(encoding_manager().method(recording_refresh(older, recorder.clone())));

    let spec = CapabilitySpec::new("refresh", SERVER_IMPLEMENTATIONS, catalog::ENCODING_MANAGER, "RefreshChapterImages")
        .returns(ReturnShape::Deferred)
        .dependencies(catalog::encoding_manager_dependencies())
        .variant(
            SignatureVariant::new(
                "newer",
                vec![
                    ParamSpec::new("mediaSource", "Host.MediaSource"),
                    ParamSpec::new("video", "Host.Video"),
                    ParamSpec::new("chapters", "Host.ChapterList"),
                    ParamSpec::new("extract", TypeDescriptor::boolean()),
                ],
            )
            .since(HostVersion::new(4, 9, 0, 36)),
        )
        .variant(SignatureVariant::new(
            "older",
            vec![
                ParamSpec::new("video", "Host.Video"),
                ParamSpec::new("chapters", "Host.ChapterList"),
                ParamSpec::new("extract", TypeDescriptor::boolean()),
            ],
        ));

    // the host claims a newer version but only ships the older shape
    let (env, _) = test_env(host, HostVersion::new(4, 9, 1, 0));
    let handle = bind_capability(&env, spec);

    let args = InvocationArgs::new()
        .with("mediaSource", HostValue::Null)
        .with("video", HostValue::from("video"))
        .with("chapters", HostValue::List(vec![]))
        .with("extract", true);

    for _ in 0..2 {
        let outcome = handle.invoke(&args, &CancellationToken::new());
        assert_eq!(outcome.settle().await.value(), Some(&HostValue::Bool(true)));
    }

    assert_eq!(handle.matched_variant().map(|v| v.label.as_str()), Some("older"));
    assert_eq!(recorder.arg_counts(), vec![3, 3]);
}

#[test]
fn test_module_load_failure_leaves_handle_unavailable() {
    let host = InMemoryHost::builder()
        .module_load_fault(
            SERVER_IMPLEMENTATIONS,
            HostFault::raised("System.IO.FileLoadException", "could not load assembly"),
        )
        .build();
    let (env, log) = test_env(host, HostVersion::new(4, 8, 0, 0));
    let handle = bind_capability(&env, catalog::chapter_image_refresh());

    assert_eq!(handle.approach(), PatchApproach::None);

    let outcome = handle.invoke(&chapter_refresh_args(), &CancellationToken::new());
    match outcome {
        InvocationOutcome::HostIncompatible(UnavailableReason::ModuleNotLoaded { module }) => {
            assert_eq!(module, SERVER_IMPLEMENTATIONS);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(log.count(catalog::CHAPTER_IMAGE_REFRESH, DiagnosticEvent::Unavailable), 1);
    assert_eq!(log.snapshot().len(), 1);
}

#[tokio::test]
async fn test_faulting_direct_strategy_is_demoted_once() {
    let recorder = CallRecorder::new();
    let params = chapter_refresh_params("pre-4.9.0.36");
    let host = host_with(
        encoding_manager().method(
            recording_refresh(params, recorder.clone())
                .direct_fault(HostFault::raised("System.InvalidProgramException", "bad IL in patched thunk")),
        ),
    );
    let (env, log) = test_env(host, HostVersion::new(4, 8, 0, 0));
    let handle = bind_capability(&env, catalog::chapter_image_refresh());
    assert_eq!(handle.approach(), PatchApproach::Harmony);

    let first = handle.invoke(&chapter_refresh_args(), &CancellationToken::new());
    assert_eq!(handle.approach(), PatchApproach::Reflection);
    assert_eq!(first.settle().await.value(), Some(&HostValue::Bool(true)));

    let second = handle.invoke(&chapter_refresh_args(), &CancellationToken::new());
    assert_eq!(second.settle().await.value(), Some(&HostValue::Bool(true)));

    assert_eq!(recorder.calls(), 2);
    assert_eq!(log.count(catalog::CHAPTER_IMAGE_REFRESH, DiagnosticEvent::Demoted), 1);
}

#[test]
fn test_first_declared_variant_wins_when_both_shapes_exist() {
    let newer = chapter_refresh_params("4.9.0.36+");
    let older = chapter_refresh_params("pre-4.9.0.36");
    let newer_calls = CallRecorder::new();
    let older_calls = CallRecorder::new();

    // older shape declared first inside the type
    let host = host_with(
        encoding_manager()
            .method(recording_refresh(older, older_calls.clone()))
            .method(recording_refresh(newer, newer_calls.clone())),
    );
    let (env, _) = test_env(host, HostVersion::new(4, 9, 0, 36));
    let handle = bind_capability(&env, catalog::chapter_image_refresh());

    let outcome = handle.invoke(&chapter_refresh_args(), &CancellationToken::new());
    assert!(outcome.is_success());
    assert_eq!(handle.matched_variant().map(|v| v.label.as_str()), Some("4.9.0.36+"));
    assert_eq!(newer_calls.arg_counts(), vec![5]);
    assert_eq!(older_calls.calls(), 0);
}

#[test]
fn test_version_gate_prefers_older_variant_on_older_host() {
    let newer = chapter_refresh_params("4.9.0.36+");
    let older = chapter_refresh_params("pre-4.9.0.36");
    let newer_calls = CallRecorder::new();
    let older_calls = CallRecorder::new();

    // a host that backported the new shape but still reports an old version
    let host = host_with(
        encoding_manager()
            .method(recording_refresh(newer, newer_calls.clone()))
            .method(recording_refresh(older, older_calls.clone())),
    );
    let (env, _) = test_env(host, HostVersion::new(4, 8, 5, 0));
    let handle = bind_capability(&env, catalog::chapter_image_refresh());

    assert!(handle.invoke(&chapter_refresh_args(), &CancellationToken::new()).is_success());
    assert_eq!(handle.matched_variant().map(|v| v.label.as_str()), Some("pre-4.9.0.36"));
    assert_eq!(older_calls.arg_counts(), vec![4]);
    assert_eq!(newer_calls.calls(), 0);
}

#[tokio::test]
async fn test_signature_drift_yields_completed_false() {
    let params = chapter_refresh_params("pre-4.9.0.36");
    let host = host_with(
        encoding_manager().method(
            MethodBuilder::new(catalog::REFRESH_CHAPTER_IMAGES)
                .params(params)
                .returns_value(HostValue::Int(1)),
        ),
    );
    let (env, _) = test_env(host, HostVersion::new(4, 8, 0, 0));
    let handle = bind_capability(&env, catalog::chapter_image_refresh());
    assert_eq!(handle.approach(), PatchApproach::Reflection);

    let outcome = handle.invoke(&chapter_refresh_args(), &CancellationToken::new());
    let value = outcome.value().cloned().unwrap();
    assert!(value.is_deferred());

    let settled = outcome.settle().await;
    assert_eq!(settled.value(), Some(&HostValue::Bool(false)));
}

#[tokio::test]
async fn test_deferred_result_is_returned_unresolved() {
    let recorder = CallRecorder::new();
    let params = chapter_refresh_params("pre-4.9.0.36");
    let host = host_with(encoding_manager().method(recording_refresh(params, recorder.clone()).direct()));
    let (env, _) = test_env(host, HostVersion::new(4, 8, 0, 0));
    let handle = bind_capability(&env, catalog::chapter_image_refresh());

    let outcome = handle.invoke(&chapter_refresh_args(), &CancellationToken::new());
    assert!(matches!(outcome.value(), Some(HostValue::Deferred(_))));
    assert_eq!(handle.approach(), PatchApproach::Harmony);
    assert_eq!(outcome.settle().await.value(), Some(&HostValue::Bool(true)));
}

#[tokio::test]
async fn test_cancellation_surfaces_as_invocation_failure() {
    let recorder = CallRecorder::new();
    let params = chapter_refresh_params("pre-4.9.0.36");
    let host = host_with(encoding_manager().method(recording_refresh(params, recorder.clone())));
    let (env, _) = test_env(host, HostVersion::new(4, 8, 0, 0));
    let handle = bind_capability(&env, catalog::chapter_image_refresh());

    let token = CancellationToken::new();
    token.cancel();
    let settled = handle.invoke(&chapter_refresh_args(), &token).settle().await;

    assert!(settled.is_failed());
    assert!(settled.error().map(|e| e.is_cancelled()).unwrap_or(false));
    assert_eq!(recorder.calls(), 1);
}
