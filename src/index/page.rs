use serde::Serialize;

/// 一页有序结果：`total` 与 `items` 来自同一次读锁
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl<T: Clone> Page<T> {
    /// 从已排序的迭代器切出 `[offset, offset + limit)`；越界返回空页
    pub fn slice<'a, I>(sorted: I, total: usize, offset: usize, limit: usize) -> Self
    where
        I: Iterator<Item = &'a T>,
        T: 'a,
    {
        let items = sorted.skip(offset).take(limit).cloned().collect();
        Self {
            items,
            total,
            offset,
            limit,
        }
    }
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.offset.saturating_add(self.items.len()) < self.total
    }
}
