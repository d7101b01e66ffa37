use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// 服务配置（TOML）。文件缺省时全部取默认值；CLI 参数再覆盖文件。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    /// `size` 缺省时的分页大小
    pub default_page_size: usize,
    /// 分页大小上限（索引本身不限制，由 HTTP 层截断）
    pub max_page_size: usize,
    /// 快照文件；None 表示纯内存
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            default_page_size: 10,
            max_page_size: 500,
            snapshot_path: None,
            snapshot_interval_secs: 60,
        }
    }
}

impl Config {
    /// `~/.config/widget-index/config.toml`（按平台）
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("widget-index").join("config.toml"))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 读取显式指定的配置文件；文件不存在即报错
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// 默认路径用：文件不存在时返回默认配置
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("Config {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_page_size == 0 {
            anyhow::bail!("max_page_size must be >= 1");
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            anyhow::bail!(
                "default_page_size must be in 1..={} (got {})",
                self.max_page_size,
                self.default_page_size
            );
        }
        Ok(())
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_size: self.default_page_size,
            max_size: self.max_page_size,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLimits {
    pub default_size: usize,
    pub max_size: usize,
}
