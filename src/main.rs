use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use widget_index::api::WidgetServer;
use widget_index::config::Config;
use widget_index::index::{OrderedIndex, WidgetStore};
use widget_index::storage::{checkpoint, SnapshotStore};

#[derive(Parser, Debug)]
#[command(name = "widget-index", version, about = "Z-ordered widget index over HTTP")]
struct Args {
    /// 配置文件（默认 ~/.config/widget-index/config.toml）
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    bind: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    max_page_size: Option<usize>,

    /// 快照文件；不指定则纯内存运行
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut cfg = match (&args.config, Config::default_path()) {
        (Some(path), _) => Config::load(path)?,
        (None, Some(path)) => Config::load_or_default(&path)?,
        (None, None) => Config::default(),
    };

    if let Some(bind) = &args.bind {
        cfg.bind = bind.clone();
    }
    if let Some(port) = args.port {
        cfg.port = port;
    }
    if let Some(max) = args.max_page_size {
        cfg.max_page_size = max;
        cfg.default_page_size = cfg.default_page_size.min(max);
    }
    if let Some(snapshot) = &args.snapshot {
        cfg.snapshot_path = Some(snapshot.clone());
    }
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = load_config(&args)?;

    info!("Starting widget-index");

    let store = cfg
        .snapshot_path
        .clone()
        .map(|p| Arc::new(SnapshotStore::new(p)));

    let index = Arc::new(match &store {
        Some(store) => checkpoint::load_or_empty(store)?,
        None => OrderedIndex::new(),
    });
    info!("Index ready: {} widgets", index.len());

    let snapshot_task = store.as_ref().map(|store| {
        tokio::spawn(checkpoint::snapshot_loop(
            index.clone(),
            store.clone(),
            cfg.snapshot_interval_secs,
        ))
    });

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", cfg.bind, cfg.port)).await?;
    let server = WidgetServer::new(index.clone() as Arc<dyn WidgetStore>, cfg.page_limits());

    info!(
        "widget-index ready. Try: http://localhost:{}/widgets?page=0&size={}",
        cfg.port, cfg.default_page_size
    );

    // 优雅退出处理
    server
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;
    info!("Shutting down...");

    // 先停周期快照，再写最后一次；进行中的写入由 SnapshotStore 内部的锁串行化
    if let Some(task) = snapshot_task {
        task.abort();
        let _ = task.await;
    }

    if let Some(store) = &store {
        let idx = index.clone();
        let st = store.clone();
        tokio::task::spawn_blocking(move || checkpoint::save(&idx, &st)).await??;
    }
    info!("{}", index.stats());

    Ok(())
}
