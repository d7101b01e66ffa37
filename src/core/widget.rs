use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::IndexError;

/// Widget 标识（ULID）：创建后不可变
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetId(ulid::Ulid);

impl WidgetId {
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for WidgetId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(Self)
    }
}

/// 已存储的 Widget。
///
/// 只由索引持有；调用方拿到的永远是 clone，改了也不会影响索引里的 z 顺序。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: WidgetId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub width: i32,
    pub height: i32,
    pub last_updated: DateTime<Utc>,
}

/// 创建请求：`id` / `z` 可缺省（缺省 z 表示“置顶”）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWidget {
    #[serde(default)]
    pub id: Option<WidgetId>,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub z: Option<i32>,
    pub width: i32,
    pub height: i32,
}

impl NewWidget {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            id: None,
            x,
            y,
            z: None,
            width,
            height,
        }
    }

    pub fn with_z(mut self, z: i32) -> Self {
        self.z = Some(z);
        self
    }

    pub fn with_id(mut self, id: WidgetId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        check_extent("width", self.width)?;
        check_extent("height", self.height)
    }
}

/// 局部更新：`None` 字段保持原值
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetPatch {
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    #[serde(default)]
    pub z: Option<i32>,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
}

impl WidgetPatch {
    pub fn validate(&self) -> Result<(), IndexError> {
        if let Some(w) = self.width {
            check_extent("width", w)?;
        }
        if let Some(h) = self.height {
            check_extent("height", h)?;
        }
        Ok(())
    }

    /// 覆盖非 z 字段；z 由索引在碰撞处理时单独落位
    pub(crate) fn apply_extent(&self, widget: &mut Widget) {
        if let Some(x) = self.x {
            widget.x = x;
        }
        if let Some(y) = self.y {
            widget.y = y;
        }
        if let Some(width) = self.width {
            widget.width = width;
        }
        if let Some(height) = self.height {
            widget.height = height;
        }
    }
}

fn check_extent(field: &'static str, value: i32) -> Result<(), IndexError> {
    if value < 1 {
        return Err(IndexError::InvalidArgument { field, value });
    }
    Ok(())
}
