//! `quidditchctl` — a thin CLI for talking to a running
//! `quidditch-coordinatord` over its HTTP surface.
//!
//! ## Usage
//!
//! ```bash
//! quidditchctl search logs --query '{"term":{"status":"active"}}' --size 20
//! quidditchctl count logs
//! quidditchctl index logs --id doc-1 --source '{"status":"active"}'
//! quidditchctl get logs doc-1
//! quidditchctl delete logs doc-1
//! quidditchctl bulk logs --file actions.ndjson
//! quidditchctl health
//! ```

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "quidditchctl", about = "CLI client for the Quidditch search coordinator")]
struct Cli {
    /// Coordinator base URL.
    #[arg(long, global = true, default_value = "http://127.0.0.1:9200")]
    endpoint: String,

    /// Request timeout in seconds.
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a search request against an index.
    Search {
        index: String,
        /// Full query DSL body as JSON. Defaults to `match_all`.
        #[arg(long, default_value = "{}")]
        query: String,
        #[arg(long)]
        size: Option<usize>,
        #[arg(long)]
        from: Option<usize>,
    },
    /// Run a count-only search against an index.
    Count { index: String, #[arg(long, default_value = "{}")] query: String },
    /// Index (upsert) a single document.
    Index {
        index: String,
        /// Document id. Auto-generated server-side when omitted.
        #[arg(long)]
        id: Option<String>,
        /// Document source as a JSON object.
        #[arg(long)]
        source: String,
    },
    /// Fetch a single document by id.
    Get { index: String, id: String },
    /// Delete a single document by id.
    Delete { index: String, id: String },
    /// Submit a bulk NDJSON action file.
    Bulk {
        index: Option<String>,
        /// Path to a newline-delimited bulk action/source file.
        #[arg(long)]
        file: String,
    },
    /// Coordinator liveness check.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout_secs))
        .build()?;

    let response = dispatch(&client, &cli.endpoint, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn dispatch(client: &reqwest::Client, endpoint: &str, command: Command) -> anyhow::Result<Value> {
    match command {
        Command::Search { index, query, size, from } => {
            let mut body: Value = serde_json::from_str(&query)?;
            if let Some(obj) = body.as_object_mut() {
                if let Some(size) = size {
                    obj.insert("size".into(), size.into());
                }
                if let Some(from) = from {
                    obj.insert("from".into(), from.into());
                }
                if !obj.contains_key("query") && !obj.contains_key("aggs") {
                    // `--query` was passed as a bare query clause, not a full request body.
                    let clause = obj.clone();
                    *obj = serde_json::Map::new();
                    obj.insert("query".into(), Value::Object(clause));
                }
            }
            let url = format!("{endpoint}/{index}/_search");
            send_json(client.post(url).json(&body)).await
        }
        Command::Count { index, query } => {
            let body: Value = serde_json::from_str(&query)?;
            let url = format!("{endpoint}/{index}/_count");
            send_json(client.get(url).json(&body)).await
        }
        Command::Index { index, id, source } => {
            let body: Value = serde_json::from_str(&source)?;
            let url = match id {
                Some(id) => format!("{endpoint}/{index}/_doc/{id}"),
                None => format!("{endpoint}/{index}/_doc"),
            };
            send_json(client.put(url).json(&body)).await
        }
        Command::Get { index, id } => {
            let url = format!("{endpoint}/{index}/_doc/{id}");
            send_json(client.get(url)).await
        }
        Command::Delete { index, id } => {
            let url = format!("{endpoint}/{index}/_doc/{id}");
            send_json(client.delete(url)).await
        }
        Command::Bulk { index, file } => {
            let body = std::fs::read_to_string(&file)?;
            let url = match index {
                Some(index) => format!("{endpoint}/{index}/_bulk"),
                None => format!("{endpoint}/_bulk"),
            };
            send_json(
                client
                    .post(url)
                    .header("content-type", "application/x-ndjson")
                    .body(body),
            )
            .await
        }
        Command::Health => {
            let url = format!("{endpoint}/health");
            let resp = client.get(url).send().await?;
            Ok(Value::String(resp.text().await?))
        }
    }
}

async fn send_json(builder: reqwest::RequestBuilder) -> anyhow::Result<Value> {
    let resp = builder.send().await?;
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        anyhow::bail!("request failed with status {status}: {body}");
    }
    Ok(body)
}
