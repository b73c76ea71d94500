//! Signature Variants and Matching
//!
//! A capability declares every call shape it accepts, newest first. The
//! matcher is an exact nominal comparison; the host version only decides which
//! variant is tried first.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use super::host::{HostValue, TypeDescriptor};
use super::version::HostVersion;

/// True iff both lists have the same length and identical types at every position
pub fn matches(candidate: &[TypeDescriptor], variant: &[TypeDescriptor]) -> bool {
    candidate.len() == variant.len()
        && candidate.iter().zip(variant).all(|(c, v)| c == v)
}

/// One named parameter of a call shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
}

impl ParamSpec {
    pub fn new<S: Into<String>, T: Into<TypeDescriptor>>(name: S, ty: T) -> Self {
        Self { name: name.into(), ty: ty.into() }
    }
}

/// One accepted call shape for a capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureVariant {
    /// Human label, e.g. `4.9.0.36+`
    pub label: String,

    /// First host version expected to expose this shape
    #[serde(default)]
    pub since: Option<HostVersion>,

    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl SignatureVariant {
    pub fn new<S: Into<String>>(label: S, params: Vec<ParamSpec>) -> Self {
        Self { label: label.into(), since: None, params }
    }

    pub fn since(mut self, version: HostVersion) -> Self {
        self.since = Some(version);
        self
    }

    pub fn types(&self) -> Vec<TypeDescriptor> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }

    /// Whether the host version is recent enough for this shape
    pub fn applies_to(&self, version: &HostVersion) -> bool {
        self.since.map(|since| version.at_least(&since)).unwrap_or(true)
    }
}

/// Order variants for a host version.
///
/// The first declared variant that applies to `version` goes first; every
/// other variant follows in declaration order so a host that misreports its
/// version or backports a signature still resolves.
pub fn order_for<'a>(variants: &'a [SignatureVariant], version: &HostVersion) -> Vec<&'a SignatureVariant> {
    let preferred = variants.iter().position(|v| v.applies_to(version));

    let mut ordered = Vec::with_capacity(variants.len());
    if let Some(index) = preferred {
        ordered.push(&variants[index]);
    }
    ordered.extend(
        variants
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != preferred)
            .map(|(_, v)| v),
    );
    ordered
}

/// Named argument bag supplied by the caller.
///
/// Callers fill in every argument they know about; only the ones the matched
/// variant declares are passed, in that variant's order.
#[derive(Debug, Clone, Default)]
pub struct InvocationArgs {
    values: HashMap<String, HostValue>,
}

impl InvocationArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<S: Into<String>, V: Into<HostValue>>(mut self, name: S, value: V) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn insert<S: Into<String>, V: Into<HostValue>>(&mut self, name: S, value: V) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&HostValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build the positional list for `variant`. Returns the first parameter
    /// with no matching argument on failure.
    pub fn project(&self, variant: &SignatureVariant) -> Result<Vec<HostValue>, String> {
        variant
            .params
            .iter()
            .map(|param| self.values.get(&param.name).cloned().ok_or_else(|| param.name.clone()))
            .collect()
    }
}
