//! 导航记忆地图 - 稀疏网格
//!
//! 引擎以增量事件推送探索结果；地图按量化 (x, y) 网格键存储
//! 单元内容（已探明无障碍、障碍、悬崖等）。内容描述的是该处
//! 「是什么」，不是占用概率。
//!
//! 重定位后引擎会带新的 origin_id 重建地图，旧内容整体失效。

use rovi_protocol::{NavCellContent, NavMapCell};
use std::collections::HashMap;
use tracing::debug;

/// 稀疏导航地图
#[derive(Debug, Clone, Default)]
pub struct NavMap {
    origin_id: u32,
    /// 单元边长（毫米）；首个更新事件到达前为 0
    tile_size_mm: f32,
    cells: HashMap<(i32, i32), NavCellContent>,
}

impl NavMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并一次增量更新
    ///
    /// origin_id 变化意味着坐标系已重建，旧单元全部丢弃。
    pub fn apply_update(&mut self, origin_id: u32, tile_size_mm: f32, cells: &[NavMapCell]) {
        if origin_id != self.origin_id {
            debug!(
                old = self.origin_id,
                new = origin_id,
                dropped = self.cells.len(),
                "nav map origin changed; rebuilding"
            );
            self.cells.clear();
            self.origin_id = origin_id;
        }
        self.tile_size_mm = tile_size_mm;
        for cell in cells {
            self.cells.insert((cell.tile_x, cell.tile_y), cell.content);
        }
    }

    /// 查询平面坐标处的单元内容（未探索返回 `Unknown`）
    pub fn content_at(&self, x_mm: f32, y_mm: f32) -> NavCellContent {
        if self.tile_size_mm <= 0.0 {
            return NavCellContent::Unknown;
        }
        let tile_x = (x_mm / self.tile_size_mm).floor() as i32;
        let tile_y = (y_mm / self.tile_size_mm).floor() as i32;
        self.cells
            .get(&(tile_x, tile_y))
            .copied()
            .unwrap_or(NavCellContent::Unknown)
    }

    /// 已知单元数量
    pub fn known_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn origin_id(&self) -> u32 {
        self.origin_id
    }

    pub fn tile_size_mm(&self) -> f32 {
        self.tile_size_mm
    }

    /// 遍历已知单元
    pub fn iter(&self) -> impl Iterator<Item = (&(i32, i32), &NavCellContent)> {
        self.cells.iter()
    }
}
