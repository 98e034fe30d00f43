use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use lowmesh_node::{
    EchoHandler, MeshStack, NodeConfig, NodeError, NullRadio, RunnerOptions, Storage, logging, spawn_interface,
};

#[derive(Parser)]
#[command(name = "lowmesh-node", about = "Low-power wireless mesh node", version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/lowmesh/config.toml")]
    config: PathBuf,

    /// Overrides `[logging] level`
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match NodeConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            // Logging is configured from the file, so this goes to stderr.
            eprintln!("failed to load config from {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let json = std::env::var("RUST_LOG_FORMAT").is_ok_and(|f| f == "json") || config.logging.format == "json";
    if json {
        logging::init_json(level);
    } else {
        logging::init(level);
    }

    match run(&config).await {
        Ok(()) => {
            tracing::info!("node stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(%e, "node failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &NodeConfig) -> Result<(), NodeError> {
    let stack_config = config.to_stack_config()?;
    let storage = config.storage_dir().map(Storage::new).transpose()?;

    // Board radio drivers plug in through `RadioDriver`; the stock binary
    // runs the stack against a radio that never receives.
    let stack = MeshStack::new(stack_config, NullRadio)?.with_handler(EchoHandler);
    let options = RunnerOptions {
        tick_ms: config.admission.tick_ms,
        storage,
    };
    let (_handle, task) = spawn_interface(stack, options);

    let shutdown = task.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping interface");
        }
        shutdown.shutdown();
    });

    task.join().await.map(drop)
}
