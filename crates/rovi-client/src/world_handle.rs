//! 世界模型访问句柄
//!
//! 所有读取走 `ArcSwap` 快照：拿到的是某一时刻的完整一致视图，
//! 不与调度线程竞争锁。等待类方法组合「快照检查 + 事件等待」
//! 循环，事件到达后重新检查快照，直到满足或超时。

use crate::error::ClientError;
use rovi_driver::{EngineContext, WaitError, WorldEntity, WorldState};
use rovi_protocol::{Event, NavCellContent};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 是否为会改变世界模型的观测事件
fn is_observation(event: &Event) -> bool {
    matches!(
        event,
        Event::ObjectObserved(_) | Event::FaceObserved(_) | Event::PetObserved { .. }
    )
}

/// 世界模型只读句柄
pub struct WorldHandle {
    ctx: Arc<EngineContext>,
}

impl WorldHandle {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// 当前世界快照
    pub fn snapshot(&self) -> Arc<WorldState> {
        self.ctx.world_snapshot()
    }

    /// 已知实体总数（含不可见）
    pub fn entity_count(&self) -> usize {
        self.snapshot().entities.len()
    }

    /// 当前可见实体数
    pub fn visible_count(&self) -> usize {
        self.snapshot().visible_entities().count()
    }

    /// 查询平面坐标处的导航地图内容
    pub fn nav_content_at(&self, x_mm: f32, y_mm: f32) -> NavCellContent {
        self.snapshot().nav_map.content_at(x_mm, y_mm)
    }

    /// 等待至少 `count` 个满足条件的已观测实体
    ///
    /// 计数按「曾被观测」累计（可见与否均计入，只增不减）。
    /// 满足后返回匹配列表。超时不是错误：返回此刻的匹配列表，
    /// 由调用方检查数量是否达标（缺口处理交给上层）。
    pub fn wait_until_count(
        &self,
        count: usize,
        filter: impl Fn(&WorldEntity) -> bool,
        timeout: Duration,
    ) -> Result<Vec<WorldEntity>, ClientError> {
        let deadline = Instant::now() + timeout;
        loop {
            // 先注册再查快照，快照与等待之间到达的观测不会丢失
            let waiter = self.ctx.bus.register_waiter(is_observation);

            let snapshot = self.snapshot();
            let matched: Vec<WorldEntity> = snapshot
                .entities_matching(|e| filter(e))
                .cloned()
                .collect();
            if matched.len() >= count {
                return Ok(matched);
            }

            let Some(remaining) =
                deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero())
            else {
                return Ok(matched);
            };
            match waiter.wait(remaining) {
                Ok(_) => {}
                Err(WaitError::Timeout) => {}
                Err(WaitError::ConnectionLost) => return Err(ClientError::Disconnected),
            }
        }
    }

    /// 等待首个满足条件的已观测实体
    ///
    /// 超时返回 `Ok(None)`；会话断开返回错误。
    pub fn wait_for_entity(
        &self,
        filter: impl Fn(&WorldEntity) -> bool,
        timeout: Duration,
    ) -> Result<Option<WorldEntity>, ClientError> {
        let mut matched = self.wait_until_count(1, filter, timeout)?;
        Ok(if matched.is_empty() {
            None
        } else {
            Some(matched.swap_remove(0))
        })
    }
}
