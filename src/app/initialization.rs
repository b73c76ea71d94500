//! Application initialization: configuration, logging and the binding environment

use std::str::FromStr;
use std::sync::Arc;
use anyhow::Result;
use log::{debug, LevelFilter};
use crate::cli;
use crate::compat::diagnostics::CompatibilityLog;
use crate::compat::host::HostIntrospection;
use crate::compat::manifest::SimulatedHost;
use crate::compat::version::{FixedVersion, MemoizedVersion, VersionReader};
use crate::compat::BindingEnvironment;
use crate::config::{ConfigManager, EngineConfig};
use crate::logging::{self, LogConfig, LogDestination, LogFormat};

/// Load configuration from the explicit file or the discovery hierarchy
pub fn load_configuration(args: &cli::Args) -> Result<ConfigManager> {
    let mut manager = match &args.config_file {
        Some(config_file) => {
            debug!("Loading configuration from explicit file: {}", config_file.display());
            ConfigManager::load_from_file(config_file.clone())?
        }
        None => ConfigManager::load()?,
    };

    if let Some(section_name) = &args.config_name {
        manager.select_section(section_name.clone());
    }

    Ok(manager)
}

/// Combine CLI flags with `[base]` settings. Flags win.
pub fn configure_logging(args: &cli::Args, config: &ConfigManager) -> Result<LogConfig> {
    let console_level = if args.debug {
        LevelFilter::Trace
    } else if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Error
    } else {
        match config.get_log_level("base", "console-level") {
            Ok(Some(level)) => level,
            Ok(None) => LevelFilter::Info,
            Err(e) => {
                debug!("Invalid console-level in config, using default: {}", e);
                LevelFilter::Info
            }
        }
    };

    let format = if !args.log_format.is_empty() && !args.log_format.eq_ignore_ascii_case("text") {
        LogFormat::from_str(&args.log_format).map_err(|e| anyhow::anyhow!(e))?
    } else {
        config
            .get_value("base", "log-format")
            .and_then(|value| LogFormat::from_str(value).ok())
            .unwrap_or(LogFormat::Text)
    };

    let log_file_path = args.log_file.clone().or_else(|| config.get_path("base", "log-file"));

    let file_log_level = match &args.log_file_level {
        Some(level_str) => Some(logging::parse_log_level(level_str)?),
        None => config.get_log_level("base", "file-log-level").unwrap_or_else(|e| {
            debug!("Invalid file-log-level in config, ignoring: {}", e);
            None
        }),
    };

    let (destination, file_level) = match log_file_path {
        Some(path) => {
            let level = file_log_level.unwrap_or(console_level);
            debug!("File logging enabled: {} (level: {:?})", path.display(), level);
            (LogDestination::Both(path), Some(level))
        }
        None => (LogDestination::Console, None),
    };

    Ok(LogConfig { console_level, file_level, format, destination })
}

/// Engine settings from `[engine]`, with `--no-fast-path` applied on top
pub fn resolve_engine_config(args: &cli::Args, config: &ConfigManager) -> Result<EngineConfig> {
    let mut engine = config.get_engine_config()?;
    if args.no_fast_path {
        engine.fast_path = false;
    }
    debug!("Engine configuration: {:?}", engine);
    Ok(engine)
}

/// Binding environment over a simulated host. A configured host version
/// replaces the one the manifest reports.
pub fn build_environment(
    simulated: &SimulatedHost,
    engine: &EngineConfig,
    diagnostics: Arc<CompatibilityLog>,
) -> BindingEnvironment {
    let reader: Arc<dyn VersionReader> = match engine.host_version {
        Some(configured) if configured != simulated.version => {
            debug!("Overriding host version {} with configured {}", simulated.version, configured);
            Arc::new(FixedVersion(configured))
        }
        _ => Arc::new(FixedVersion(simulated.version)),
    };
    let version = MemoizedVersion::new(reader).get();

    let host: Arc<dyn HostIntrospection> = simulated.host.clone();
    let env = BindingEnvironment::new(host, version)
        .with_services(simulated.services.clone())
        .with_diagnostics(diagnostics);

    if engine.fast_path {
        env
    } else {
        env.without_fast_path()
    }
}
