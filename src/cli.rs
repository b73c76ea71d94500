use clap::Parser;
use anyhow::Result;
use std::path::PathBuf;
use log::{debug, info};

/// Host compatibility probe
#[derive(Parser, Debug, Default)]
#[command(name = "hostcompat")]
#[command(about = "Bind plugin capabilities against a simulated host and report which signatures, strategies and fallbacks apply")]
#[command(version)]
pub struct Args {
    /// Host manifest (YAML) describing the simulated host
    #[arg(long, value_name = "FILE")]
    pub host: PathBuf,

    /// Capability manifest (TOML or YAML); defaults to the built-in catalog
    #[arg(long, value_name = "FILE")]
    pub capabilities: Option<PathBuf>,

    /// Perform one dry-run invocation per bound capability
    #[arg(long)]
    pub invoke: bool,

    /// Report format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub format: String,

    /// Bind every capability through the reflective strategy only
    #[arg(long)]
    pub no_fast_path: bool,

    /// Verbose output (debug level logging)
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet output (error level logging only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug output (trace level logging)
    #[arg(long)]
    pub debug: bool,

    /// Log format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log file path for file output
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log level for file output (independent of console level)
    #[arg(long, value_name = "LEVEL")]
    pub log_file_level: Option<String>,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Configuration section name
    #[arg(long, value_name = "SECTION")]
    pub config_name: Option<String>,
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    let args = Args::parse();
    debug!("Parsed CLI arguments: {:?}", args);
    args
}

/// Validate CLI argument combinations
pub fn validate_args(args: &Args) -> Result<()> {
    debug!("Validating CLI argument combinations");

    let log_flags_count = [args.verbose, args.quiet, args.debug]
        .iter()
        .filter(|&&flag| flag)
        .count();

    if log_flags_count > 1 {
        return Err(anyhow::anyhow!(
            "Conflicting log level flags: only one of --verbose, --quiet, or --debug may be specified"
        ));
    }

    for (flag, value) in [("--format", &args.format), ("--log-format", &args.log_format)] {
        match value.to_lowercase().as_str() {
            "text" | "json" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid value '{}' for {}. Valid options: text, json",
                    value,
                    flag
                ))
            }
        }
    }

    if let Some(ref level) = args.log_file_level {
        match level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log file level '{}'. Valid levels: error, warn, info, debug, trace",
                    level
                ))
            }
        }
    }

    if args.log_file_level.is_some() && args.log_file.is_none() {
        return Err(anyhow::anyhow!("--log-file-level requires --log-file to be specified"));
    }

    if args.host.as_os_str().is_empty() {
        return Err(anyhow::anyhow!("--host requires a manifest path"));
    }

    info!("CLI arguments validated successfully");
    Ok(())
}

impl Args {
    /// Whether the report should be rendered as JSON
    pub fn json_report(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}
