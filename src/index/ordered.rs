use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::core::{IndexError, NewWidget, Widget, WidgetId, WidgetPatch};
use crate::index::page::Page;
use crate::index::WidgetStore;
use crate::stats::{IndexStats, OpCounters};

/// 按 z 排序的 widget 容器（持锁内部状态）
///
/// ## 不变量
/// - `by_z` 与 `z_of` 始终一一对应：`z_of[id] == z` ⇔ `by_z[z].id == id`
/// - 同一时刻任意两个 widget 的 z 不同（由 BTreeMap 的 key 唯一性直接保证）
/// - 已存储 widget 的 key 从不原地修改：要变 z 必须先 remove 再 insert
#[derive(Debug, Default)]
struct IndexState {
    by_z: BTreeMap<i32, Widget>,
    z_of: HashMap<WidgetId, i32>,
}

impl IndexState {
    fn highest_z(&self) -> Option<i32> {
        self.by_z.last_key_value().map(|(z, _)| *z)
    }

    fn lowest_z(&self) -> Option<i32> {
        self.by_z.first_key_value().map(|(z, _)| *z)
    }

    /// 置顶位置：max + 1，空索引为 0
    fn front_z(&self) -> Result<i32, IndexError> {
        match self.highest_z() {
            None => Ok(0),
            Some(top) => top.checked_add(1).ok_or(IndexError::ZOverflow(top)),
        }
    }

    /// 为目标层 `target` 腾位置，返回被上移的 widget 数。
    ///
    /// `target` 空闲时什么都不做；否则 `[target, ∞)` 全部 z+1。
    /// 从最高层往下逐个 remove → 改 key → insert：上方的层已先挪走，
    /// 所以 `z + 1` 在插回时一定空闲，任何时刻都不会出现两个相同的 key。
    fn make_room(&mut self, target: i32, now: DateTime<Utc>) -> Result<usize, IndexError> {
        if !self.by_z.contains_key(&target) {
            return Ok(0);
        }

        // 先校验再动手，溢出时不能留下半截位移
        if let Some(top) = self.highest_z() {
            if top == i32::MAX {
                return Err(IndexError::ZOverflow(top));
            }
        }

        let keys: Vec<i32> = self.by_z.range(target..).map(|(z, _)| *z).collect();
        for z in keys.iter().rev().copied() {
            let Some(mut widget) = self.by_z.remove(&z) else {
                continue;
            };
            widget.z = z + 1;
            widget.last_updated = now;
            self.z_of.insert(widget.id, widget.z);
            self.by_z.insert(widget.z, widget);
        }
        Ok(keys.len())
    }

    fn put(&mut self, widget: Widget) {
        debug_assert!(!self.by_z.contains_key(&widget.z));
        self.z_of.insert(widget.id, widget.z);
        self.by_z.insert(widget.z, widget);
    }

    fn take(&mut self, id: &WidgetId) -> Option<Widget> {
        let z = self.z_of.remove(id)?;
        self.by_z.remove(&z)
    }

    fn get(&self, id: &WidgetId) -> Option<&Widget> {
        self.z_of.get(id).and_then(|z| self.by_z.get(z))
    }
}

#[derive(Debug, Default)]
struct Counters {
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    cascades: AtomicU64,
    shifted: AtomicU64,
    /// 每次成功写入 +1（快照循环据此判断是否有变更）
    mutation_seq: AtomicU64,
}

impl Counters {
    fn record(&self, op: &AtomicU64, shifted: usize) {
        op.fetch_add(1, Ordering::Relaxed);
        if shifted > 0 {
            self.cascades.fetch_add(1, Ordering::Relaxed);
            self.shifted.fetch_add(shifted as u64, Ordering::Relaxed);
        }
        self.mutation_seq.fetch_add(1, Ordering::Release);
    }

    fn snapshot(&self) -> OpCounters {
        OpCounters {
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            cascades: self.cascades.load(Ordering::Relaxed),
            shifted_widgets: self.shifted.load(Ordering::Relaxed),
        }
    }
}

/// 内存有序索引：单把公平读写锁保护全部状态。
///
/// - 读操作（查找 / 区间 / 分页）走读锁，可并发
/// - 写操作（insert / update / delete 及其级联位移）整段持有写锁，
///   其他读写看不到位移到一半的状态
/// - 不可重入，也没有更细粒度的锁
#[derive(Debug)]
pub struct OrderedIndex {
    state: RwLock<IndexState>,
    counters: Counters,
}

impl Default for OrderedIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderedIndex {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            counters: Counters::default(),
        }
    }

    /// 从快照恢复：widget 原样落位（不做碰撞处理），重复 id / z 视为损坏
    pub fn restore(widgets: Vec<Widget>) -> Result<Self, IndexError> {
        let mut state = IndexState::default();
        for widget in widgets {
            if state.z_of.contains_key(&widget.id) {
                return Err(IndexError::Corrupt(format!("duplicate id {}", widget.id)));
            }
            if state.by_z.contains_key(&widget.z) {
                return Err(IndexError::Corrupt(format!("duplicate z {}", widget.z)));
            }
            state.put(widget);
        }
        tracing::info!("Restored widget index: {} widgets", state.by_z.len());
        Ok(Self {
            state: RwLock::new(state),
            counters: Counters::default(),
        })
    }

    /// 全量有序拷贝（单次读锁，保证一致）
    pub fn snapshot(&self) -> Vec<Widget> {
        self.state.read().by_z.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().by_z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mutation_seq(&self) -> u64 {
        self.counters.mutation_seq.load(Ordering::Acquire)
    }
}

impl WidgetStore for OrderedIndex {
    fn insert(&self, new: NewWidget) -> Result<Widget, IndexError> {
        new.validate()?;
        let now = Utc::now();

        let mut state = self.state.write();
        let id = new.id.unwrap_or_else(WidgetId::generate);
        if state.z_of.contains_key(&id) {
            return Err(IndexError::DuplicateId(id));
        }

        let (z, shifted) = match new.z {
            Some(target) => (target, state.make_room(target, now)?),
            None => (state.front_z()?, 0),
        };

        let widget = Widget {
            id,
            x: new.x,
            y: new.y,
            z,
            width: new.width,
            height: new.height,
            last_updated: now,
        };
        state.put(widget.clone());
        self.counters.record(&self.counters.inserts, shifted);
        drop(state);

        if shifted > 0 {
            tracing::debug!("insert {} at z={} shifted {} widgets", id, z, shifted);
        }
        Ok(widget)
    }

    fn update(&self, id: &WidgetId, patch: &WidgetPatch) -> Result<Widget, IndexError> {
        patch.validate()?;
        let now = Utc::now();

        let mut state = self.state.write();
        let original = state.take(id).ok_or(IndexError::NotFound(*id))?;

        let mut widget = original.clone();
        patch.apply_extent(&mut widget);
        if let Some(z) = patch.z {
            widget.z = z;
        }
        widget.last_updated = now;

        // 自身已移出，碰撞只针对剩余 widget；z 未变时原位置必然空闲
        let shifted = match state.make_room(widget.z, now) {
            Ok(n) => n,
            Err(e) => {
                state.put(original);
                return Err(e);
            }
        };
        state.put(widget.clone());
        self.counters.record(&self.counters.updates, shifted);
        drop(state);

        if shifted > 0 {
            tracing::debug!("update {} to z={} shifted {} widgets", id, widget.z, shifted);
        }
        Ok(widget)
    }

    fn delete_by_id(&self, id: &WidgetId) -> bool {
        let mut state = self.state.write();
        let removed = state.take(id).is_some();
        if removed {
            self.counters.record(&self.counters.deletes, 0);
        }
        removed
    }

    fn find_by_id(&self, id: &WidgetId) -> Option<Widget> {
        self.state.read().get(id).cloned()
    }

    fn find_by_z(&self, z: i32) -> Option<Widget> {
        self.state.read().by_z.get(&z).cloned()
    }

    fn highest_z(&self) -> Option<i32> {
        self.state.read().highest_z()
    }

    fn ordered_range(&self, from_z: i32) -> Vec<Widget> {
        self.state
            .read()
            .by_z
            .range(from_z..)
            .map(|(_, w)| w.clone())
            .collect()
    }

    fn page(&self, offset: usize, limit: usize) -> Page<Widget> {
        let state = self.state.read();
        Page::slice(state.by_z.values(), state.by_z.len(), offset, limit)
    }

    fn stats(&self) -> IndexStats {
        let state = self.state.read();
        IndexStats {
            widget_count: state.by_z.len(),
            lowest_z: state.lowest_z(),
            highest_z: state.highest_z(),
            ops: self.counters.snapshot(),
        }
    }
}
