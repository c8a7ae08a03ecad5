//! 连接监控 - 基于入站流量判断引擎是否仍在响应
//!
//! 引擎会周期性发送 ping 与机器人状态帧，因此健康链路上入站流量
//! 不会长时间中断。监控器记录最近一次入站帧的时刻，超过阈值未见
//! 任何入站帧即判定连接丢失，由调度循环触发会话拆除。
//!
//! 时间锚定在进程启动时刻的单调时钟上，不受系统时钟调整（NTP、
//! 手动改时）影响，可安全存放在 `AtomicU64` 中做无锁读写。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 单调时钟全局锚点（首次访问时设置，此后不变）
static APP_START: OnceLock<Instant> = OnceLock::new();

/// 自进程启动以来的单调微秒数
fn monotonic_micros() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    start.elapsed().as_micros() as u64
}

/// 自进程启动以来的单调毫秒数（心跳帧的时间戳字段）
pub(crate) fn monotonic_millis() -> u64 {
    monotonic_micros() / 1000
}

/// 连接健康监控器
pub struct ConnectionMonitor {
    last_inbound: AtomicU64,
    timeout: Duration,
}

impl ConnectionMonitor {
    /// 创建监控器
    ///
    /// `timeout` 为允许的最大入站静默时长，超过即视为连接丢失。
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_inbound: AtomicU64::new(monotonic_micros()),
            timeout,
        }
    }

    /// 记录一次入站帧（调度循环每收到帧后调用）
    pub fn register_inbound(&self) {
        self.last_inbound.store(monotonic_micros(), Ordering::Relaxed);
    }

    /// 连接是否仍视为存活
    pub fn is_alive(&self) -> bool {
        self.silence() < self.timeout
    }

    /// 当前入站静默时长
    pub fn silence(&self) -> Duration {
        let last = self.last_inbound.load(Ordering::Relaxed);
        let now = monotonic_micros();
        Duration::from_micros(now.saturating_sub(last))
    }
}
