//! 调度循环性能指标模块
//!
//! 零开销原子计数器，监控链路健康与事件投递情况。
//! 所有计数器使用 `Ordering::Relaxed` 原子操作，任意线程可安全读取，
//! 不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 调度循环实时指标
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// 接收的总帧数
    pub rx_frames_total: AtomicU64,
    /// 发送的总帧数
    pub tx_frames_total: AtomicU64,
    /// 解码失败后丢弃的帧数
    pub decode_errors: AtomicU64,
    /// 向监听器扇出的事件总数
    pub events_dispatched: AtomicU64,
    /// 被捕获的监听器 panic 次数
    pub listener_panics: AtomicU64,
    /// 被捕获的等待者谓词 panic 次数
    pub waiter_panics: AtomicU64,
    /// 受理的动作提交数
    pub actions_submitted: AtomicU64,
    /// 达到终态的动作数
    pub actions_completed: AtomicU64,
    /// 因抢占被取消的动作数
    pub actions_preempted: AtomicU64,
    /// 本地启动超时的动作数
    pub action_start_timeouts: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取当前计数快照
    ///
    /// 各计数器独立原子读取，彼此之间允许微小时间差。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rx_frames_total: self.rx_frames_total.load(Ordering::Relaxed),
            tx_frames_total: self.tx_frames_total.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
            waiter_panics: self.waiter_panics.load(Ordering::Relaxed),
            actions_submitted: self.actions_submitted.load(Ordering::Relaxed),
            actions_completed: self.actions_completed.load(Ordering::Relaxed),
            actions_preempted: self.actions_preempted.load(Ordering::Relaxed),
            action_start_timeouts: self.action_start_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照（普通值类型，可随意拷贝/打印）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub rx_frames_total: u64,
    pub tx_frames_total: u64,
    pub decode_errors: u64,
    pub events_dispatched: u64,
    pub listener_panics: u64,
    pub waiter_panics: u64,
    pub actions_submitted: u64,
    pub actions_completed: u64,
    pub actions_preempted: u64,
    pub action_start_timeouts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试快照反映计数器更新
    #[test]
    fn test_snapshot_reflects_updates() {
        let metrics = EngineMetrics::new();
        metrics.rx_frames_total.fetch_add(3, Ordering::Relaxed);
        metrics.listener_panics.fetch_add(1, Ordering::Relaxed);

        let snap = metrics.snapshot();
        assert_eq!(snap.rx_frames_total, 3);
        assert_eq!(snap.listener_panics, 1);
        assert_eq!(snap.tx_frames_total, 0);
    }
}
