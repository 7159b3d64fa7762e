//! Illustrative CLI wiring the flag surface named in spec §6 to the core
//! library. Not part of the library's public contract — a consumer embeds
//! [`substreams_sink::Sinker`] directly and supplies their own handler;
//! manifest loading (resolving `--manifest` into a `Package`) is the
//! external collaborator spec §1 calls out as out of scope, so this demo
//! only decodes an already-fetched `.spkg` file from disk.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use prost::Message;
use substreams_sink::auth::Authenticator;
use substreams_sink::block_range::BlockRange;
use substreams_sink::config::{ClientConfig, EndpointConfig};
use substreams_sink::cursor::Cursor;
use substreams_sink::handler::BlockDataHandler;
use substreams_sink::pb::{BlockScopedData, BlockUndoSignal, Package};
use substreams_sink::session::Mode;
use substreams_sink::Sinker;

#[derive(Parser, Debug)]
#[command(author, version, about = "Substreams sink demo", long_about = None)]
struct Args {
    /// Substreams RPC endpoint
    #[arg(long, env = "SUBSTREAMS_ENDPOINT")]
    endpoint: String,

    /// Path to a compiled .spkg package
    #[arg(long, default_value = "substream.spkg")]
    manifest: String,

    /// Output module name
    #[arg(long)]
    output_module: String,

    /// Chain network name, forwarded as metadata only (manifest resolution
    /// is an external collaborator; this core doesn't validate it)
    #[arg(long)]
    network: Option<String>,

    /// `start[:stop]`, stop omitted or "-" means infinite
    #[arg(long, default_value = "0:-")]
    range: String,

    /// Request only irreversible/final blocks; disables the undo buffer
    #[arg(long, alias = "irreversible-only")]
    final_blocks_only: bool,

    #[arg(long)]
    plaintext: bool,

    #[arg(long)]
    insecure: bool,

    #[arg(long, default_value_t = substreams_sink::auth::DEFAULT_API_KEY_ENVVAR.to_string())]
    api_key_envvar: String,

    #[arg(long, default_value_t = substreams_sink::auth::DEFAULT_API_TOKEN_ENVVAR.to_string())]
    api_token_envvar: String,

    /// Repeatable `module=value` substreams params
    #[arg(long = "param")]
    params: Vec<String>,

    /// Repeatable raw `key: value` headers
    #[arg(long = "header")]
    headers: Vec<String>,

    #[arg(long, default_value_t = 0)]
    buffer: u64,
}

fn parse_range(s: &str) -> anyhow::Result<BlockRange> {
    let (start, stop) = s.split_once(':').unwrap_or((s, "-"));
    let start: i64 = start.parse()?;
    let end = match stop {
        "" | "-" => None,
        n => Some(n.parse::<u64>()?),
    };
    Ok(BlockRange::new(start, end)?)
}

struct LoggingHandler;

#[async_trait]
impl BlockDataHandler for LoggingHandler {
    async fn handle_block_scoped_data(
        &mut self,
        data: &BlockScopedData,
        is_live: Option<bool>,
        cursor: &Cursor,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let number = data.clock.as_ref().map(|c| c.number).unwrap_or_default();
        tracing::info!(block = number, ?is_live, cursor = %cursor, "block scoped data");
        Ok(())
    }

    async fn handle_block_undo_signal(
        &mut self,
        undo: &BlockUndoSignal,
        cursor: &Cursor,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let number = undo.last_valid_block.as_ref().map(|b| b.number).unwrap_or_default();
        tracing::warn!(rewind_to = number, cursor = %cursor, "block undo signal");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if !args.params.is_empty() {
        tracing::debug!(params = ?args.params, "module params (applied by manifest loading, not the core)");
    }
    if let Some(network) = &args.network {
        tracing::debug!(network, "network hint (resolved by manifest loading, not the core)");
    }

    let package_bytes = std::fs::read(&args.manifest)?;
    let package = Package::decode(package_bytes.as_slice())?;

    let client_config = ClientConfig::new(
        EndpointConfig::new(&args.endpoint).plaintext(args.plaintext).insecure(args.insecure),
    )
    .with_authenticator(Authenticator::new(&args.api_key_envvar, &args.api_token_envvar))
    .with_extra_headers(&args.headers.iter().map(String::as_str).collect::<Vec<_>>())?;

    let range = parse_range(&args.range)?;

    let mut sinker = Sinker::new(
        Mode::Production,
        package,
        &args.output_module,
        String::new(),
        client_config,
    )
    .with_block_range(range)
    .with_block_data_buffer(args.buffer);

    if args.final_blocks_only {
        sinker = sinker.with_final_blocks_only();
    }

    let shutdown = sinker.shutdown_handle();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.shutdown(None);
    });

    sinker.run(Cursor::begin(), LoggingHandler, None).await?;

    Ok(())
}

// silence "unused" for the metrics Arc import pattern demo consumers would use
#[allow(dead_code)]
fn _demo_custom_metrics(metrics: Arc<dyn substreams_sink::metrics::Metrics>) {
    metrics.incr_counter(substreams_sink::metrics::DATA_MESSAGE);
}
