//! CLI for consistent reads against a replicated cluster

use anyhow::Context;
use clap::{Parser, Subcommand};
use replikv::common::parse_duration;
use replikv::replica::{AdditionalProperties, ConsistencyLevel, Object};
use replikv::{Config, Finder, HttpReplicaClient};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "replikv")]
#[command(about = "Quorum reads and read repair over replicated shards")]
#[command(version)]
struct Cli {
    /// Cluster config file (TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Consistency level (ONE, QUORUM, ALL); defaults to the configured one
    #[arg(long, short)]
    level: Option<ConsistencyLevel>,

    /// Per-replica read timeout (e.g. "500ms", "2s"); overrides the config
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one object
    Get {
        #[arg(long)]
        shard: String,

        id: Uuid,

        /// Properties to return (comma-separated)
        #[arg(long, value_delimiter = ',')]
        props: Vec<String>,

        /// Include the vector
        #[arg(long)]
        vector: bool,
    },

    /// Read several objects of one shard
    GetAll {
        #[arg(long)]
        shard: String,

        #[arg(required = true)]
        ids: Vec<Uuid>,
    },

    /// Check whether an object exists
    Exists {
        #[arg(long)]
        shard: String,

        id: Uuid,
    },

    /// Read an object from one node, without coordination
    NodeObject {
        #[arg(long)]
        node: String,

        #[arg(long)]
        shard: String,

        id: Uuid,
    },

    /// Check a JSON array of objects against their replicas
    Check {
        /// File holding the objects
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("loading config")?;
    if let Some(timeout) = cli.timeout {
        config.read_timeout_ms = u64::try_from(timeout.as_millis().max(1)).unwrap_or(u64::MAX);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let client = Arc::new(HttpReplicaClient::new(config.read_timeout())?);
    let finder = Finder::from_config(&config, client)?;
    let level = cli.level.unwrap_or(config.consistency_level);

    let ctx = CancellationToken::new();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let out = match cli.command {
        Commands::Get {
            shard,
            id,
            props,
            vector,
        } => {
            let adds = AdditionalProperties {
                vector,
                ..Default::default()
            };
            let object = finder.get_one(&ctx, level, &shard, id, &props, &adds).await?;
            json!({ "level": level, "object": object })
        }

        Commands::GetAll { shard, ids } => {
            let items = finder.get_all(&ctx, level, &shard, &ids).await?;
            let items: Vec<Value> = ids
                .iter()
                .zip(items)
                .map(|(id, item)| match item {
                    Ok(object) => json!({ "id": id, "object": object }),
                    Err(cause) => json!({ "id": id, "error": cause.to_string() }),
                })
                .collect();
            json!({ "level": level, "objects": items })
        }

        Commands::Exists { shard, id } => {
            let exists = finder.exists(&ctx, level, &shard, id).await?;
            json!({ "level": level, "id": id, "exists": exists })
        }

        Commands::NodeObject { node, shard, id } => {
            let object = finder
                .node_object(&ctx, &node, &shard, id, &Vec::new(), &AdditionalProperties::default())
                .await?;
            json!({ "node": node, "object": object })
        }

        Commands::Check { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let objects: Vec<Option<Object>> = serde_json::from_str(&raw)?;
            let report = finder.check_consistency(&ctx, level, &objects).await?;
            json!({
                "level": level,
                "consistent": report.verdicts(),
                "all_consistent": report.all_consistent(),
            })
        }
    };

    // Let repairs triggered by the read land before exiting.
    finder.shutdown().await;
    let stats = finder.repair_stats();
    if stats.scheduled > 0 {
        tracing::info!(
            scheduled = stats.scheduled,
            done = stats.done,
            failed = stats.failed,
            "read repair finished"
        );
    }

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
