//! Member Resolver
//!
//! Finds the member of a host type that matches one of a capability's
//! signature variants. Variants are tried in the order given and the first
//! match wins; there is no scoring.

use std::fmt;
use std::sync::Arc;
use log::{debug, warn};
use super::host::{format_signature, BindingScope, HostMember, HostType, MemberLookup};
use super::signature::{matches, SignatureVariant};

/// A member bound to one specific signature variant
#[derive(Clone)]
pub struct ResolvedMember {
    pub type_name: String,
    pub member_name: String,
    pub variant: SignatureVariant,
    pub member: Arc<dyn HostMember>,
}

impl ResolvedMember {
    /// `Type.Member` for log lines
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.type_name, self.member_name)
    }
}

impl fmt::Debug for ResolvedMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMember")
            .field("type_name", &self.type_name)
            .field("member_name", &self.member_name)
            .field("variant", &self.variant.label)
            .finish()
    }
}

/// Try each variant in order and return the first member that matches.
///
/// `None` is the normal answer for a host that does not expose the member.
pub fn resolve<'a, I>(
    host_type: &dyn HostType,
    member_name: &str,
    scope: BindingScope,
    variants: I,
) -> Option<ResolvedMember>
where
    I: IntoIterator<Item = &'a SignatureVariant>,
{
    for variant in variants {
        let types = variant.types();
        debug!(
            "Probing {}.{}({}) for variant '{}'",
            host_type.full_name(),
            member_name,
            format_signature(&types),
            variant.label
        );

        let found = match host_type.lookup_member(member_name, scope, &types) {
            MemberLookup::Found(member) => Some(member),
            MemberLookup::NotFound => None,
            MemberLookup::Ambiguous => {
                debug!(
                    "Lookup of {}.{} was ambiguous, filtering candidates by signature",
                    host_type.full_name(),
                    member_name
                );
                disambiguate(host_type, member_name, scope, variant)
            }
            MemberLookup::Fault(fault) => {
                warn!(
                    "Lookup of {}.{} for variant '{}' failed: {}",
                    host_type.full_name(),
                    member_name,
                    variant.label,
                    fault
                );
                None
            }
        };

        if let Some(member) = found {
            debug!("Resolved {}.{} using variant '{}'", host_type.full_name(), member_name, variant.label);
            return Some(ResolvedMember {
                type_name: host_type.full_name().to_string(),
                member_name: member_name.to_string(),
                variant: variant.clone(),
                member,
            });
        }
    }

    debug!("No variant of {}.{} matched", host_type.full_name(), member_name);
    None
}

/// Enumerate every member with the name and keep the ones whose parameters
/// match exactly. Anything but a single survivor counts as not found.
fn disambiguate(
    host_type: &dyn HostType,
    member_name: &str,
    scope: BindingScope,
    variant: &SignatureVariant,
) -> Option<Arc<dyn HostMember>> {
    let wanted = variant.types();
    let mut survivors: Vec<Arc<dyn HostMember>> = host_type
        .members_named(member_name, scope)
        .into_iter()
        .filter(|member| matches(member.parameters(), &wanted))
        .collect();

    match survivors.len() {
        1 => survivors.pop(),
        0 => None,
        n => {
            warn!(
                "{} members of {}.{} share the signature ({}), skipping variant '{}'",
                n,
                host_type.full_name(),
                member_name,
                format_signature(&wanted),
                variant.label
            );
            None
        }
    }
}
