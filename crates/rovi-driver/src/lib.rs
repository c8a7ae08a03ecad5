//! # Rovi Driver Layer
//!
//! 本模块提供 Rovi SDK 的事件/动作协调引擎，包括：
//! - 调度循环（单线程投递：解码 → 世界模型 → 动作迁移 → 监听器扇出）
//! - 事件总线（按类别订阅 + 一次性等待者，监听器故障隔离）
//! - 世界模型（ArcSwap 快照发布，可见性衰减，导航地图）
//! - 动作注册表（执行器冲突排队/抢占，协作式取消）
//! - 连接监控（入站心跳超时检测）
//!
//! # 使用场景
//!
//! 适用于需要直接驱动调度循环的场景（自定义链路、模拟引擎）。
//! 大多数用户应该使用 `rovi-client` 提供的会话接口。

pub mod actions;
pub mod bus;
pub mod command;
pub mod context;
pub mod heartbeat;
pub mod metrics;
pub mod nav_map;
pub mod pipeline;
pub mod world;

pub use actions::{
    ActionOutcome, ActionRegistry, ActionShared, ActionState, FailureCode, SubmitRequest,
};
pub use bus::{EventBus, EventListener, EventWaiter, ListenerId, WaitError};
pub use command::EngineCommand;
pub use context::EngineContext;
pub use heartbeat::ConnectionMonitor;
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use nav_map::NavMap;
pub use pipeline::{LoopConfig, io_loop};
pub use world::{EntityId, EntityKind, WorldEntity, WorldState, WorldStore};
