pub mod ordered;
pub mod page;

use crate::core::{IndexError, NewWidget, Widget, WidgetId, WidgetPatch};
use crate::stats::IndexStats;

/// Widget 存储契约：服务层只通过它访问索引。
///
/// ## 契约（重要）
/// - 每个写操作对其他所有操作是原子的：碰撞级联要么全部生效，要么完全不发生
/// - 任意两个操作之间，已存储 widget 的 z 两两不同
/// - 返回值都是拷贝；调用方无法绕过 `update` 改动已存储的 z
/// - 查找类操作用 `None` 表示不存在；`update` 对未知 id 返回 `NotFound`
///
/// 持久化后端实现同一契约时，需要用事务边界代替共享写锁。
pub trait WidgetStore: Send + Sync {
    fn insert(&self, widget: NewWidget) -> Result<Widget, IndexError>;
    fn update(&self, id: &WidgetId, patch: &WidgetPatch) -> Result<Widget, IndexError>;
    fn delete_by_id(&self, id: &WidgetId) -> bool;
    fn find_by_id(&self, id: &WidgetId) -> Option<Widget>;
    fn find_by_z(&self, z: i32) -> Option<Widget>;
    fn highest_z(&self) -> Option<i32>;
    /// `z >= from_z` 的 widget，按 z 升序
    fn ordered_range(&self, from_z: i32) -> Vec<Widget>;
    fn page(&self, offset: usize, limit: usize) -> Page<Widget>;
    fn stats(&self) -> IndexStats;
}

pub use ordered::OrderedIndex;
pub use page::Page;
