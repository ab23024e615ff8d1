//! View client CLI
//!
//! Runs a short session against a server: one bootstrap query with the
//! address key, then one query per `--rounds` carrying the given search keys.

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use fog_view_client::{QuerySession, ViewClient};
use fog_view_core::TxOutRecord;

#[derive(Parser, Debug)]
#[command(name = "fog-view-client")]
#[command(about = "Query a view server for outputs matching search keys", long_about = None)]
struct Args {
    /// Server base URL
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Address public key (hex); enables RNG discovery
    #[arg(long)]
    address: Option<String>,

    /// Search keys (hex), comma separated
    #[arg(long, value_delimiter = ',')]
    keys: Vec<String>,

    /// Search rounds after bootstrap; retry-later keys carry over
    #[arg(long, default_value_t = 1)]
    rounds: usize,

    /// Found payloads are plaintext TxOut records (development seeds)
    #[arg(long)]
    plaintext_records: bool,
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x")).with_context(|| format!("invalid hex: {value}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let args = Args::parse();
    let client = ViewClient::new(&args.server);

    let health = client.health().await?;
    tracing::info!(version = %health.version, protocol = health.protocol_version, "Connected");

    let mut session = match &args.address {
        Some(address) => QuerySession::with_address(decode_hex(address)?),
        None => QuerySession::bootstrap(),
    };
    let mut pending = args
        .keys
        .iter()
        .map(|k| decode_hex(k))
        .collect::<Result<Vec<_>>>()?;

    let bootstrap = client.query(&session.next_request(Vec::new(), true)).await?;
    session.apply(&bootstrap);

    let mut found = Vec::new();
    let mut permanent = Vec::new();
    for round in 0..args.rounds {
        if pending.is_empty() {
            break;
        }
        let response = client
            .query(&session.next_request(std::mem::take(&mut pending), true))
            .await?;
        let update = session.apply(&response);

        tracing::info!(
            round,
            found = update.outcomes.found.len(),
            not_found = update.outcomes.not_found,
            retry_later = update.outcomes.retry_later.len(),
            "Round complete"
        );

        for result in update.outcomes.found {
            let record = if args.plaintext_records {
                let record = TxOutRecord::from_bytes(&result.ciphertext)?;
                Some(json!({
                    "global_index": record.global_index,
                    "block_index": record.block_index,
                    "timestamp": record.has_timestamp().then_some(record.timestamp),
                }))
            } else {
                None
            };
            found.push(json!({
                "search_key": hex::encode(&result.search_key),
                "ciphertext": hex::encode(&result.ciphertext),
                "record": record,
            }));
        }
        permanent.extend(update.outcomes.permanent.iter().map(hex::encode));
        pending = update.outcomes.retry_later;
    }

    let summary = json!({
        "event_cursor": session.event_cursor(),
        "block_cursor": session.block_cursor(),
        "last_known_block_count": session.last_known_block_count(),
        "rngs": session.rngs().map(|rng| json!({
            "ingest_invocation_id": rng.record.ingest_invocation_id,
            "start_block": rng.record.start_block,
            "last_ingested_block": rng.last_ingested_block,
        })).collect::<Vec<_>>(),
        "missed_block_ranges": session
            .missed_ranges()
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>(),
        "found": found,
        "bad_search_keys": permanent,
        "unresolved": pending.iter().map(hex::encode).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
