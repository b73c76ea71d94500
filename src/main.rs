use std::process;
use anyhow::Result;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;
use hostcompat::{app, cli, logging, report};

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("Application panicked: {:?}", panic_info);
        eprintln!("Panic: {:?}", panic_info);
        process::exit(101);
    }));

    if let Err(e) = run() {
        error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = cli::parse_args();
    cli::validate_args(&args)?;

    let config_manager = app::load_configuration(&args)?;
    let log_config = app::configure_logging(&args, &config_manager)?;
    logging::init_logger(log_config)?;

    let engine = app::resolve_engine_config(&args, &config_manager)?;
    let simulated = app::load_host(&args)?;
    let capabilities = app::load_capabilities(&args)?;

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let cancellation = CancellationToken::new();

    let probe = runtime.block_on(async {
        let interrupt = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling outstanding invocations");
                interrupt.cancel();
            }
        });
        app::run_probe(&simulated, capabilities, &engine, args.invoke, cancellation.clone()).await
    })?;

    info!(
        "Probe complete: {} capabilities, {} incompatible",
        probe.capabilities.len(),
        probe.incompatible_count()
    );

    if args.json_report() {
        println!("{}", probe.to_json()?);
    } else {
        print!("{}", probe.to_text(report::colours_enabled()));
    }

    Ok(())
}
