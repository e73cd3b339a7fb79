//! kvtemplate demo
//!
//! `serve` runs an in-memory store behind a RESP listener, `tour` connects to
//! a store and exercises each facade once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use kvtemplate::{
    Aggregate, ClientConfig, CodecConfig, CombineOptions, DateTimeMode, JsonCodec, KvTemplate,
    Limit, MemoryServer, MemoryStore, RespClient, Side, ValueDto,
};

#[derive(Parser, Debug)]
#[command(name = "kvtemplate")]
#[command(about = "Typed client facade for a Redis-style store")]
struct Args {
    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Serve an in-memory store over RESP
    Serve {
        #[arg(short, long, default_value = "127.0.0.1:6379")]
        addr: String,

        /// Demo only: snapshot file loaded at startup and written on Ctrl-C.
        /// Keys written between the two are lost on a crash.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Run every facade once against a store
    Tour {
        #[arg(short, long, default_value = "127.0.0.1:6379")]
        addr: String,

        /// JSON client configuration; overrides --addr
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Mode::Serve { addr, snapshot } => serve(&addr, snapshot).await,
        Mode::Tour { addr, config } => {
            let config = match config {
                Some(path) => {
                    let json = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    ClientConfig::from_json(&json)?
                }
                None => ClientConfig::new(addr),
            };
            tour(config).await
        }
    }
}

async fn serve(addr: &str, snapshot: Option<PathBuf>) -> anyhow::Result<()> {
    let store = MemoryStore::new();
    if let Some(path) = snapshot.as_ref().filter(|p| p.exists()) {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        store.restore_from_snapshot(&bytes)?;
    }

    let server = MemoryServer::bind(store.clone(), addr).await?;
    let local = server.local_addr();
    info!("Connect with: redis-cli -h {} -p {}", local.ip(), local.port());
    let task = server.spawn();

    tokio::signal::ctrl_c().await?;
    task.abort();
    if let Some(path) = snapshot {
        std::fs::write(&path, store.create_snapshot()?)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote {} keys to {}", store.len(), path.display());
    }
    Ok(())
}

async fn tour(config: ClientConfig) -> anyhow::Result<()> {
    let grace = config.blocking_grace;
    let client = Arc::new(RespClient::connect(config).await?);
    let template = KvTemplate::new(client.clone()).with_blocking_grace(grace);

    let values = template.ops_for_value_with(JsonCodec::<ValueDto>::new(CodecConfig {
        date_time: DateTimeMode::Timestamp,
        ..CodecConfig::default()
    }));
    values.set("tour:dto", &ValueDto::new("first", "second")).await?;
    info!("value: {:?}", values.get("tour:dto").await?);

    let hashes = template.ops_for_hash();
    hashes.put("tour:hash", "visits", &"1".to_string()).await?;
    info!("hash visits -> {}", hashes.increment("tour:hash", "visits", 41i64).await?);

    let lists = template.ops_for_list();
    lists.push_all_right("tour:list", &["a", "c"]).await?;
    lists.insert("tour:list", Side::Before, "c", "b").await?;
    info!("list: {:?}", lists.range("tour:list", 0, -1).await?);
    info!(
        "blocking pop: {:?}",
        lists.blocking_pop_left("tour:list", Duration::from_millis(100)).await?
    );

    let sets = template.ops_for_set();
    sets.add_all("tour:s1", &["x", "y"]).await?;
    sets.add_all("tour:s2", &["y", "z"]).await?;
    info!("union: {:?}", sets.union("tour:s1", &["tour:s2"]).await?);

    let zsets = template.ops_for_zset();
    zsets.add_all("tour:z1", &[("m", 2.0), ("n", 1.0)]).await?;
    zsets.add_all("tour:z2", &[("m", 3.0)]).await?;
    let options = CombineOptions::new().aggregate(Aggregate::Max);
    zsets.intersect_and_store("tour:z1", &["tour:z2"], "tour:zout", &options).await?;
    info!("combined: {:?}", zsets.range_with_scores("tour:zout", 0, -1).await?);
    info!(
        "top: {:?}",
        zsets
            .reverse_range_by_score_with_scores("tour:z1", f64::NEG_INFINITY, f64::INFINITY, Some(Limit::new(0, 1)))
            .await?
    );

    template
        .ops_for_value()
        .delete_many(&[
            "tour:dto", "tour:hash", "tour:list", "tour:s1", "tour:s2", "tour:z1", "tour:z2",
            "tour:zout",
        ])
        .await?;
    client.close().await;
    Ok(())
}
