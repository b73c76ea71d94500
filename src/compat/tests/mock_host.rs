//! Mock Hosts for Testing
//!
//! Builders for the encoding manager host in its different releases, plus
//! counters and argument capture for asserting what the engine actually did.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use crate::compat::binding::{BindingEnvironment, CapabilitySpec, ServiceCollection};
use crate::compat::catalog::{self, ENCODING_MANAGER, REFRESH_CHAPTER_IMAGES, SERVER_IMPLEMENTATIONS};
use crate::compat::diagnostics::CompatibilityLog;
use crate::compat::error::HostFault;
use crate::compat::host::{Deferred, HostValue, ObjectRef, ReturnShape, TypeDescriptor};
use crate::compat::memory_host::{InMemoryHost, MethodBuilder, ModuleBuilder, TypeBuilder};
use crate::compat::signature::{InvocationArgs, ParamSpec, SignatureVariant};
use crate::compat::version::HostVersion;

/// Records every call a mock member receives
#[derive(Default)]
pub struct CallRecorder {
    calls: AtomicUsize,
    arg_counts: Mutex<Vec<usize>>,
}

impl CallRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Argument count of every call, in call order
    pub fn arg_counts(&self) -> Vec<usize> {
        self.arg_counts.lock().clone()
    }

    fn record(&self, args: &[HostValue]) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.arg_counts.lock().push(args.len());
    }
}

/// Switch that makes a mock member fail while set
#[derive(Default)]
pub struct FaultSwitch {
    failing: AtomicBool,
}

impl FaultSwitch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }
}

/// Services the built-in encoding manager needs, as opaque objects
pub fn encoding_services() -> ServiceCollection {
    catalog::encoding_manager_dependencies()
        .into_iter()
        .fold(ServiceCollection::new(), |services, ty| services.with(ty.clone(), ObjectRef::opaque(ty)))
}

/// Environment over `host` with a private diagnostics log
pub fn test_env(host: Arc<InMemoryHost>, version: HostVersion) -> (BindingEnvironment, Arc<CompatibilityLog>) {
    let log = Arc::new(CompatibilityLog::new(64));
    let env = BindingEnvironment::new(host, version)
        .with_services(encoding_services())
        .with_diagnostics(log.clone());
    (env, log)
}

/// Encoding manager type with the services constructor already declared
pub fn encoding_manager() -> TypeBuilder {
    TypeBuilder::new(ENCODING_MANAGER).opaque_constructor(catalog::encoding_manager_dependencies())
}

/// Host containing only the given encoding manager type
pub fn host_with(encoding_manager: TypeBuilder) -> Arc<InMemoryHost> {
    InMemoryHost::builder()
        .module(ModuleBuilder::new(SERVER_IMPLEMENTATIONS).with_type(encoding_manager))
        .build()
}

/// Parameter types of a built-in chapter refresh variant by label
pub fn chapter_refresh_params(label: &str) -> Vec<TypeDescriptor> {
    catalog::chapter_image_refresh()
        .variants
        .iter()
        .find(|variant| variant.label == label)
        .map(SignatureVariant::types)
        .unwrap_or_default()
}

/// A deferred-returning chapter refresh member that records its calls
pub fn recording_refresh(params: Vec<TypeDescriptor>, recorder: Arc<CallRecorder>) -> MethodBuilder {
    MethodBuilder::new(REFRESH_CHAPTER_IMAGES)
        .params(params)
        .returns(ReturnShape::Deferred)
        .handler(move |_, args, token| {
            recorder.record(args);
            if token.is_cancelled() {
                return Ok(HostValue::Deferred(Deferred::failed(HostFault::Cancelled)));
            }
            Ok(HostValue::Deferred(Deferred::completed(HostValue::Bool(true))))
        })
}

/// A member returning `true` that fails while `switch` is set
pub fn switchable_method(name: &str, switch: Arc<FaultSwitch>, recorder: Arc<CallRecorder>) -> MethodBuilder {
    MethodBuilder::new(name)
        .returns(ReturnShape::Value)
        .handler(move |_, args, _| {
            recorder.record(args);
            if switch.is_set() {
                return Err(HostFault::raised("System.InvalidOperationException", "switched off"));
            }
            Ok(HostValue::Bool(true))
        })
}

/// Arguments for every parameter of both built-in chapter refresh variants
pub fn chapter_refresh_args() -> InvocationArgs {
    InvocationArgs::new()
        .with("mediaSource", ObjectRef::opaque(TypeDescriptor::new("MediaBrowser.Model.Dto.MediaSourceInfo")))
        .with("video", ObjectRef::opaque(TypeDescriptor::new("MediaBrowser.Controller.Entities.Video")))
        .with("chapters", HostValue::List(vec![]))
        .with("extractImages", true)
        .with("saveChapters", false)
}

/// Capability over `Host.Jobs.Runner.<member>` with no parameters
pub fn job_spec(name: &str, member: &str) -> CapabilitySpec {
    CapabilitySpec::new(name, "Host.Jobs", "Host.Jobs.Runner", member)
        .variant(SignatureVariant::new("default", Vec::<ParamSpec>::new()))
}

/// Host with a `Host.Jobs.Runner` type holding `methods`
pub fn job_host(methods: Vec<MethodBuilder>) -> Arc<InMemoryHost> {
    let runner = methods
        .into_iter()
        .fold(TypeBuilder::new("Host.Jobs.Runner").opaque_constructor(vec![]), |ty, m| ty.method(m));
    InMemoryHost::builder()
        .module(ModuleBuilder::new("Host.Jobs").with_type(runner))
        .build()
}
