use serde::Serialize;
use std::fmt;

/// 索引运行统计（计数器单调递增，进程重启清零）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// 当前 widget 数量
    pub widget_count: usize,
    /// 最底层 z（空索引为 None）
    pub lowest_z: Option<i32>,
    /// 最顶层 z（空索引为 None）
    pub highest_z: Option<i32>,
    /// 成功的写操作计数
    pub ops: OpCounters,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OpCounters {
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    /// 触发了碰撞位移的写操作次数
    pub cascades: u64,
    /// 因位移而 z+1 的 widget 累计数
    pub shifted_widgets: u64,
}

impl IndexStats {
    /// z 空洞数量：删除留下的、位移从不回填的层
    pub fn z_gaps(&self) -> u64 {
        match (self.lowest_z, self.highest_z) {
            (Some(lo), Some(hi)) => {
                let span = (i64::from(hi) - i64::from(lo) + 1) as u64;
                span.saturating_sub(self.widget_count as u64)
            }
            _ => 0,
        }
    }
}

fn fmt_z(z: Option<i32>) -> String {
    z.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           widget-index Report                    ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(f, "║   widgets:      {:>10}                       ║", self.widget_count)?;
        writeln!(
            f,
            "║   z range:      {:>10} .. {:<10}          ║",
            fmt_z(self.lowest_z),
            fmt_z(self.highest_z)
        )?;
        writeln!(f, "║   z gaps:       {:>10}                       ║", self.z_gaps())?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║   inserts:      {:>10}                       ║", self.ops.inserts)?;
        writeln!(f, "║   updates:      {:>10}                       ║", self.ops.updates)?;
        writeln!(f, "║   deletes:      {:>10}                       ║", self.ops.deletes)?;
        writeln!(f, "║   cascades:     {:>10}                       ║", self.ops.cascades)?;
        writeln!(
            f,
            "║   shifted:      {:>10}                       ║",
            self.ops.shifted_widgets
        )?;
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaps_count_missing_layers() {
        let stats = IndexStats {
            widget_count: 4,
            lowest_z: Some(0),
            highest_z: Some(4),
            ops: OpCounters::default(),
        };
        assert_eq!(stats.z_gaps(), 1);
        assert_eq!(IndexStats::default().z_gaps(), 0);
    }

    #[test]
    fn report_renders_empty_range() {
        let s = IndexStats::default().to_string();
        assert!(s.contains("widgets:"));
        assert!(s.contains("- .. -"));
    }
}
