//! mender CLI entry point.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use mender::cli::commands::{self, CommandContext};
use mender::cli::{exit_code_for, handle_error, wiring, Cli, Commands, EXIT_SETUP};
use mender::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let setup = wiring::repository_root(&cli.repo)
        .and_then(|root| wiring::load_config(&root, cli.config.as_deref()).map(|config| (root, config)));
    let (root, config) = match setup {
        Ok(setup) => setup,
        Err(e) => return handle_error(&e, cli.json, EXIT_SETUP),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => Some(logger),
        Err(e) => {
            eprintln!("logging disabled: {e:#}");
            None
        }
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received; cancelling");
                trigger.cancel();
            }
            Err(e) => error!(error = %e, "cannot listen for interrupts"),
        }
    });

    let ctx = CommandContext {
        root,
        config,
        json: cli.json,
    };
    let result = match cli.command {
        Commands::Repair(args) => commands::repair::execute(args, ctx, &cancel).await,
        Commands::Verify(args) => commands::verify::execute(args, ctx, &cancel).await,
        Commands::Locate(args) => commands::locate::execute(args, ctx, &cancel).await,
        Commands::Snapshot(args) => commands::snapshot::execute(args, ctx).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            let code = exit_code_for(&e);
            handle_error(&e, cli.json, code)
        }
    }
}
