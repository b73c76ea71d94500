//! Compatibility report rendering

use std::io::IsTerminal;
use anyhow::{Context, Result};
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};
use serde::Serialize;
use crate::compat::diagnostics::DiagnosticRecord;
use crate::compat::host::HostValue;
use crate::compat::policy::{InvocationOutcome, PatchApproach};
use crate::compat::registry::CapabilityStatus;
use crate::compat::version::HostVersion;

/// Result of one dry-run invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationSummary {
    pub capability: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationSummary {
    pub fn new<S: Into<String>>(capability: S, outcome: &InvocationOutcome) -> Self {
        let (value, error) = match outcome {
            InvocationOutcome::Success(value) => (Some(describe_value(value)), None),
            InvocationOutcome::HostIncompatible(reason) => (None, Some(reason.to_string())),
            InvocationOutcome::InvocationFailed(error) => (None, Some(error.to_string())),
        };
        Self {
            capability: capability.into(),
            outcome: outcome.kind().to_string(),
            value,
            error,
        }
    }
}

/// Everything a probe run produced
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub host_version: HostVersion,
    pub fast_path: bool,
    pub capabilities: Vec<CapabilityStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<InvocationSummary>,
    pub diagnostics: Vec<DiagnosticRecord>,
}

impl ProbeReport {
    pub fn incompatible_count(&self) -> usize {
        self.capabilities.iter().filter(|status| !status.bound).count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize compatibility report")
    }

    pub fn to_text(&self, colours: bool) -> String {
        let mut output = format!(
            "Host version {} (fast path {})\n\n",
            self.host_version,
            if self.fast_path { "enabled" } else { "disabled" }
        );

        let rows: Vec<Vec<String>> = self
            .capabilities
            .iter()
            .map(|status| {
                vec![
                    status.name.clone(),
                    status_label(status, colours),
                    status.approach.to_string(),
                    status.variant.clone().unwrap_or_else(|| "-".to_string()),
                    status
                        .target
                        .clone()
                        .or_else(|| status.reason.clone())
                        .unwrap_or_default(),
                ]
            })
            .collect();
        output.push_str(&format_table(&["Capability", "Status", "Approach", "Variant", "Target / Reason"], &rows));

        if !self.invocations.is_empty() {
            let rows: Vec<Vec<String>> = self
                .invocations
                .iter()
                .map(|summary| {
                    vec![
                        summary.capability.clone(),
                        outcome_label(&summary.outcome, colours),
                        summary.value.clone().or_else(|| summary.error.clone()).unwrap_or_default(),
                    ]
                })
                .collect();
            output.push('\n');
            output.push_str(&format_table(&["Capability", "Outcome", "Result"], &rows));
        }

        output.push_str(&format!(
            "\n{} capabilities, {} incompatible, {} diagnostic records\n",
            self.capabilities.len(),
            self.incompatible_count(),
            self.diagnostics.len()
        ));
        output
    }
}

/// Colour output unless NO_COLOR is set or stdout is redirected
pub fn colours_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
}

/// Render a clean prettytable with a two-space indent
pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.add_row(Row::new(headers.iter().map(|header| Cell::new(header)).collect()));
    for row in rows {
        table.add_row(Row::new(row.iter().map(|cell| Cell::new(cell)).collect()));
    }

    table.to_string().lines().fold(String::new(), |mut out, line| {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
        out
    })
}

fn status_label(status: &CapabilityStatus, colours: bool) -> String {
    let label = match (status.bound, status.approach) {
        (false, _) => "UNAVAILABLE",
        (true, PatchApproach::Harmony) => "DIRECT",
        (true, _) => "REFLECTIVE",
    };
    if !colours {
        return label.to_string();
    }
    match (status.bound, status.approach) {
        (false, _) => label.red().bold().to_string(),
        (true, PatchApproach::Harmony) => label.green().to_string(),
        (true, _) => label.yellow().to_string(),
    }
}

fn outcome_label(outcome: &str, colours: bool) -> String {
    if !colours {
        return outcome.to_string();
    }
    match outcome {
        "success" => outcome.green().to_string(),
        "host-incompatible" => outcome.yellow().to_string(),
        _ => outcome.red().to_string(),
    }
}

/// Human readable rendering of a host value
pub fn describe_value(value: &HostValue) -> String {
    match value {
        HostValue::Null => "null".to_string(),
        HostValue::Bool(b) => b.to_string(),
        HostValue::Int(i) => i.to_string(),
        HostValue::Float(f) => f.to_string(),
        HostValue::Str(s) => format!("\"{}\"", s),
        HostValue::List(items) => {
            format!("[{}]", items.iter().map(describe_value).collect::<Vec<_>>().join(", "))
        }
        HostValue::Object(object) => format!("<{}>", object.type_name()),
        HostValue::Deferred(deferred) => format!("{:?}", deferred),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::error::{HostFault, InvocationError, Strategy, UnavailableReason};

    fn report() -> ProbeReport {
        ProbeReport {
            host_version: HostVersion::new(4, 8, 0, 0),
            fast_path: true,
            capabilities: vec![
                CapabilityStatus {
                    name: "chapter-image-refresh".to_string(),
                    bound: true,
                    approach: PatchApproach::Reflection,
                    target: Some("EncodingManager.RefreshChapterImages".to_string()),
                    variant: Some("pre-4.9.0.36".to_string()),
                    reason: None,
                },
                CapabilityStatus {
                    name: "library-scan".to_string(),
                    bound: false,
                    approach: PatchApproach::None,
                    target: None,
                    variant: None,
                    reason: Some("module Host.Library is not loaded".to_string()),
                },
            ],
            invocations: vec![],
            diagnostics: vec![],
        }
    }

    #[test]
    fn test_text_report_without_colours() {
        let text = report().to_text(false);

        assert!(text.contains("Host version 4.8.0.0 (fast path enabled)"));
        assert!(text.contains("REFLECTIVE"));
        assert!(text.contains("UNAVAILABLE"));
        assert!(text.contains("module Host.Library is not loaded"));
        assert!(text.contains("2 capabilities, 1 incompatible, 0 diagnostic records"));
        assert!(!text.contains("Outcome"));
    }

    #[test]
    fn test_json_report_shape() {
        let json: serde_json::Value = serde_json::from_str(&report().to_json().unwrap()).unwrap();

        assert_eq!(json["host_version"], "4.8.0.0");
        assert_eq!(json["capabilities"][0]["approach"], "reflection");
        assert_eq!(json["capabilities"][1]["bound"], false);
        assert!(json.get("invocations").is_none());
    }

    #[test]
    fn test_invocation_summaries() {
        let success = InvocationSummary::new("a", &InvocationOutcome::Success(HostValue::Bool(true)));
        assert_eq!(success.outcome, "success");
        assert_eq!(success.value.as_deref(), Some("true"));

        let incompatible = InvocationSummary::new(
            "b",
            &InvocationOutcome::HostIncompatible(UnavailableReason::ModuleNotLoaded { module: "Host.Library".to_string() }),
        );
        assert_eq!(incompatible.outcome, "host-incompatible");
        assert!(incompatible.error.is_some());

        let failed = InvocationSummary::new(
            "c",
            &InvocationOutcome::InvocationFailed(InvocationError::Faulted {
                member: "Jobs.Run".to_string(),
                strategy: Strategy::Reflective,
                cause: HostFault::raised("System.IO.IOException", "disk full"),
            }),
        );
        assert_eq!(failed.outcome, "invocation-failed");
        assert!(failed.error.unwrap().contains("disk full"));
    }

    #[test]
    fn test_describe_nested_values() {
        let value = HostValue::List(vec![HostValue::Int(3), HostValue::Str("x".to_string()), HostValue::Null]);
        assert_eq!(describe_value(&value), "[3, \"x\", null]");
    }

    #[test]
    fn test_format_table_empty_rows() {
        assert!(format_table(&["A"], &[]).is_empty());
    }
}
