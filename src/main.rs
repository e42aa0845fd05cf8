mod cli;

use mediaflow::config;
use mediaflow::engine::{InMemoryEngine, TranscodingEngine};
use mediaflow::storage::{InMemoryStorage, ObjectStore, QueueStore};
use mediaflow::upload::Uploader;
use mediaflow::worker::WorkerHost;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;

/// The local backends: one in-memory store serving both object and queue
/// capabilities, and the simulated engine delivering notifications through
/// it. Production deployments swap these for real bindings of the same
/// traits.
fn local_backends() -> (
    Arc<InMemoryStorage>,
    Arc<dyn QueueStore>,
    Arc<dyn TranscodingEngine>,
) {
    let storage = Arc::new(InMemoryStorage::new());
    let queues: Arc<dyn QueueStore> = storage.clone();
    let engine: Arc<dyn TranscodingEngine> = Arc::new(InMemoryEngine::new(queues.clone()));
    (storage, queues, engine)
}

async fn start_worker(config_path: Option<&Path>) -> Result<()> {
    let config = Arc::new(config::load_config_or_default(config_path)?);

    tracing::info!("Starting mediaflow worker host");
    tracing::info!(
        upload_queue = %config.storage.upload_queue,
        progress_queue = %config.storage.progress_queue,
        poll_interval_secs = config.queues.poll_interval_secs,
        "Queue runtime configured"
    );

    let (storage, queues, engine) = local_backends();
    let host = WorkerHost::start(
        storage as Arc<dyn ObjectStore>,
        queues,
        engine,
        config,
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    host.shutdown().await;

    Ok(())
}

async fn upload_file(file: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = Arc::new(config::load_config_or_default(config_path)?);

    let (storage, queues, _engine) = local_backends();
    let uploader = Uploader::new(storage as Arc<dyn ObjectStore>, queues, config);

    let url = uploader.upload_file(file).await?;
    println!("The file has been uploaded to {url}");

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!(
                "  Queues: {} -> {} (poll {}s, ceiling {}, in-flight {})",
                config.storage.upload_queue,
                config.storage.progress_queue,
                config.queues.poll_interval_secs,
                config.queues.max_dequeue_count,
                config.queues.max_in_flight
            );
            println!("  Processor: {}", config.encoding.processor);
            println!("  Thumbnails: {}", config.encoding.generate_thumbnails);
            if config::validate_credentials(&config).is_err() {
                println!("  Note: media service credentials are not set");
            }
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!(
                "  Queues: {} -> {}",
                config.storage.upload_queue, config.storage.progress_queue
            );
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediaflow=trace,mediaflow_common=debug".to_string()
        } else {
            "mediaflow=debug".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_worker(cli.config.as_deref()))
        }
        Commands::Upload { file } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(upload_file(&file, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediaflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
