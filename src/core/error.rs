use thiserror::Error;

use crate::core::widget::WidgetId;

/// 索引层错误。任何一个错误返回时，索引都保持调用前的状态。
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("widget not found by id: [{0}]")]
    NotFound(WidgetId),

    #[error("invalid {field}: {value} (must be >= 1)")]
    InvalidArgument { field: &'static str, value: i32 },

    #[error("widget id already exists: [{0}]")]
    DuplicateId(WidgetId),

    /// 置顶或级联位移会让 z 超过 i32::MAX
    #[error("z-index overflow at {0}")]
    ZOverflow(i32),

    #[error("corrupt widget set: {0}")]
    Corrupt(String),
}
