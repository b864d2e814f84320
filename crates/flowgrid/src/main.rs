mod cli;

use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flowgrid_core::Controller;

use crate::cli::Cli;

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] flowgrid_config::ConfigError),

    #[error(transparent)]
    Core(#[from] flowgrid_core::CoreError),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let file_config = flowgrid_config::load(cli.config.as_deref())?;

    if cli.print_config {
        println!("{}", toml::to_string_pretty(&file_config)?);
        return Ok(());
    }

    let controller_config = file_config.to_controller_config()?;
    let initial_pairs = file_config.initial_pairs()?;

    info!(
        rest = %controller_config.rest.base_url,
        marker = %controller_config.plan.transit_marker,
        "starting controller"
    );

    let controller = Controller::new(controller_config)?;
    let handle = controller.handle();
    let cancel = controller.cancellation_token();
    let loop_task = tokio::spawn(controller.run());

    if !initial_pairs.is_empty() {
        info!(pairs = initial_pairs.len(), "seeding allowed pairs");
        handle.replace_allowed_pairs(initial_pairs).await?;
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    cancel.cancel();
    let _ = loop_task.await;
    Ok(())
}
