//! seedid - per-site identities from a single seed phrase
//!
//! Reads newline-delimited JSON requests on stdin and writes one JSON
//! response per line on stdout. Logs go to stderr.

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

use seedid::{
    config::Args,
    logging,
    storage::{JsonFileStore, KeyValueStore, MemoryStore},
    Bridge, IdentityService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    logging::init_tracing(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let store: Arc<dyn KeyValueStore> = match &args.store_path {
        Some(path) => {
            info!(path = %path.display(), "Using JSON file store");
            Arc::new(JsonFileStore::open(path).await?)
        }
        None => {
            info!("Using in-memory store; state is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let config = args.core_config();
    info!(
        kdf_iterations = config.kdf_iterations,
        rate_limit_max = config.rate_limit.max_requests,
        nonce_capacity = config.replay.capacity,
        "Starting seedid"
    );

    let service = Arc::new(IdentityService::start(store, config).await);
    let bridge = Bridge::new(service);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let response = bridge.handle_line(&line).await;
                let mut out = serde_json::to_vec(&response)?;
                out.push(b'\n');
                stdout.write_all(&out).await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    // Drop key material before exit
    let service = bridge.service();
    let session_id = service.vault().session_id().await;
    service.destroy_session().await;
    info!(session_id = ?session_id.map(|id| id.to_string()), "seedid stopped");
    Ok(())
}
