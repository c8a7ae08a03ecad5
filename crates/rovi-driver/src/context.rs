//! 引擎共享上下文 - 调度循环与客户端句柄之间的共享状态
//!
//! 上下文本身全部由无锁结构组成（ArcSwap 快照槽、原子计数、
//! 内部自带锁的总线），任意线程可安全克隆持有。

use crate::actions::action_tag_for;
use crate::bus::EventBus;
use crate::heartbeat::ConnectionMonitor;
use crate::metrics::EngineMetrics;
use crate::world::WorldState;
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// 调度循环与句柄共享的引擎状态
pub struct EngineContext {
    /// 世界模型快照槽（调度循环发布，读取方无锁加载）
    pub world: Arc<ArcSwap<WorldState>>,
    pub bus: EventBus,
    pub monitor: ConnectionMonitor,
    pub metrics: EngineMetrics,
    /// 动作序列 ID 分配计数（客户端线程提交时取号）
    next_action_seq: AtomicU64,
    /// 会话是否仍连接（拆除后置 false）
    connected: AtomicBool,
}

impl EngineContext {
    pub fn new(connection_timeout: Duration) -> Self {
        Self {
            world: Arc::new(ArcSwap::from_pointee(WorldState::default())),
            bus: EventBus::new(),
            monitor: ConnectionMonitor::new(connection_timeout),
            metrics: EngineMetrics::new(),
            next_action_seq: AtomicU64::new(0),
            connected: AtomicBool::new(true),
        }
    }

    /// 分配下一个 SDK 区间的动作序列 ID
    pub fn allocate_action_tag(&self) -> u32 {
        let seq = self.next_action_seq.fetch_add(1, Ordering::Relaxed);
        action_tag_for(seq)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// 当前世界快照
    pub fn world_snapshot(&self) -> Arc<WorldState> {
        self.world.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rovi_protocol::{FIRST_SDK_ACTION_TAG, LAST_SDK_ACTION_TAG};

    /// 测试动作序列 ID 依次分配且落在 SDK 区间
    #[test]
    fn test_action_tags_sequential_in_range() {
        let ctx = EngineContext::new(Duration::from_secs(5));
        let a = ctx.allocate_action_tag();
        let b = ctx.allocate_action_tag();
        assert_eq!(a, FIRST_SDK_ACTION_TAG);
        assert_eq!(b, FIRST_SDK_ACTION_TAG + 1);
        assert!(b <= LAST_SDK_ACTION_TAG);
    }

    /// 测试连接标志的置位与读取
    #[test]
    fn test_connected_flag() {
        let ctx = EngineContext::new(Duration::from_secs(5));
        assert!(ctx.is_connected());
        ctx.mark_disconnected();
        assert!(!ctx.is_connected());
    }
}
