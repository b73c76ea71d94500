//! Concurrency Tests
//!
//! Racing callers must bind once and demote once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use super::mock_host::*;
use crate::compat::binding::bind_capability;
use crate::compat::diagnostics::DiagnosticEvent;
use crate::compat::error::HostFault;
use crate::compat::host::{HostValue, ObjectRef, TypeDescriptor};
use crate::compat::memory_host::{InMemoryHost, MethodBuilder, ModuleBuilder, TypeBuilder};
use crate::compat::policy::PatchApproach;
use crate::compat::signature::InvocationArgs;
use crate::compat::version::HostVersion;
use tokio_util::sync::CancellationToken;

const THREADS: usize = 16;

#[test]
fn test_concurrent_direct_faults_demote_exactly_once() {
    let recorder = CallRecorder::new();
    let host = job_host(vec![switchable_method("Run", FaultSwitch::new(), recorder.clone())
        .direct_fault(HostFault::raised("System.AccessViolationException", "thunk corrupted"))]);
    let (env, log) = test_env(host, HostVersion::new(1, 0, 0, 0));
    let handle = bind_capability(&env, job_spec("run", "Run"));
    assert_eq!(handle.approach(), PatchApproach::Harmony);

    let barrier = Arc::new(Barrier::new(THREADS));
    let outcomes: Vec<bool> = thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let handle = handle.clone();
                let barrier = barrier.clone();
                scope.spawn(move || {
                    barrier.wait();
                    handle.invoke(&InvocationArgs::new(), &CancellationToken::new()).is_success()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap_or(false)).collect()
    });

    assert_eq!(outcomes.len(), THREADS);
    assert!(outcomes.iter().all(|ok| *ok));
    assert_eq!(handle.approach(), PatchApproach::Reflection);
    assert_eq!(log.count("run", DiagnosticEvent::Demoted), 1);
    assert_eq!(recorder.calls(), THREADS);
}

#[test]
fn test_concurrent_first_use_binds_once() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();
    let host = InMemoryHost::builder()
        .module(ModuleBuilder::new("Host.Jobs").with_type(
            TypeBuilder::new("Host.Jobs.Runner")
                .constructor(vec![], move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(ObjectRef::opaque(TypeDescriptor::new("Host.Jobs.Runner")))
                })
                .method(MethodBuilder::new("Run").returns_value(HostValue::Bool(true))),
        ))
        .build();
    let (env, log) = test_env(host, HostVersion::new(1, 0, 0, 0));
    let handle = bind_capability(&env, job_spec("run", "Run"));

    let barrier = Arc::new(Barrier::new(THREADS));
    thread::scope(|scope| {
        for _ in 0..THREADS {
            let handle = handle.clone();
            let barrier = barrier.clone();
            scope.spawn(move || {
                barrier.wait();
                assert!(handle.invoke(&InvocationArgs::new(), &CancellationToken::new()).is_success());
            });
        }
    });

    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    assert_eq!(log.count("run", DiagnosticEvent::Bound), 1);
}
