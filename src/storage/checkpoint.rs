use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::index::OrderedIndex;
use crate::storage::snapshot::{SnapshotStore, WidgetSnapshotV1};

/// 启动时恢复：无快照或快照无效时从空索引开始
pub fn load_or_empty(store: &SnapshotStore) -> anyhow::Result<OrderedIndex> {
    match store.load_if_valid() {
        Ok(Some(snap)) => {
            tracing::info!("Loaded widget snapshot v1: {} widgets", snap.widgets.len());
            OrderedIndex::restore(snap.widgets)
                .with_context(|| format!("restore snapshot {}", store.path().display()))
        }
        Ok(None) => {
            tracing::info!("No valid snapshot, starting with empty index");
            Ok(OrderedIndex::new())
        }
        Err(e) => {
            tracing::warn!("Failed to load snapshot: {}, starting empty", e);
            Ok(OrderedIndex::new())
        }
    }
}

/// 写一次快照：单次读锁内拷出全量，落盘不持锁
pub fn save(index: &OrderedIndex, store: &SnapshotStore) -> anyhow::Result<()> {
    let snap = WidgetSnapshotV1 {
        widgets: index.snapshot(),
    };
    store.write_atomic(&snap)
}

/// 周期快照：只有 mutation_seq 变化才落盘
pub async fn snapshot_loop(index: Arc<OrderedIndex>, store: Arc<SnapshotStore>, interval_secs: u64) {
    let mut written_seq = index.mutation_seq();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    // 第一次 tick 立即返回，跳过
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let seq = index.mutation_seq();
        if seq == written_seq {
            tracing::debug!("No widget changes, skipping snapshot");
            continue;
        }

        let idx = index.clone();
        let st = store.clone();
        match tokio::task::spawn_blocking(move || save(&idx, &st)).await {
            Ok(Ok(())) => written_seq = seq,
            Ok(Err(e)) => tracing::error!("Snapshot failed: {:#}", e),
            Err(e) => tracing::error!("Snapshot task panicked: {}", e),
        }
    }
}
