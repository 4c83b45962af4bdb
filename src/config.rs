use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

pub const DEFAULT_WRITE_CHUNK: usize = 1000;

#[derive(Parser, Debug, Clone)]
#[command(name = "resultsd")]
#[command(about = "Results resolution and aggregation sidecar (JSON lines on stdin/stdout)")]
pub struct Args {
    /// Workspace directory to open at startup
    #[arg(long, env = "RESULTSD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Log level for the resultsd target (overridden by RUST_LOG)
    #[arg(long, env = "RESULTSD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Result rows written per insert chunk during an upload
    #[arg(long, env = "RESULTSD_WRITE_CHUNK", default_value_t = DEFAULT_WRITE_CHUNK)]
    pub write_chunk: usize,
}

impl Args {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            write_chunk: self.write_chunk.max(1),
        }
    }
}

/// Tunables the engine reads while handling requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub write_chunk: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            write_chunk: DEFAULT_WRITE_CHUNK,
        }
    }
}

/// Structured logging to stderr; stdout carries the protocol.
pub fn setup_logging(log_level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("resultsd={}", log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .try_init()?;
    Ok(())
}
