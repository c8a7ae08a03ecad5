//! # Rovi Client Layer
//!
//! 面向应用的会话接口：建连与版本握手、动作提交与等待、
//! 世界模型读取、事件订阅。
//!
//! ```no_run
//! use rovi_client::SessionBuilder;
//! use rovi_protocol::ActionSpec;
//! use std::time::Duration;
//!
//! let session = SessionBuilder::new("192.168.1.20").connect()?;
//! let action = session.submit(ActionSpec::SayText {
//!     text: "hello".into(),
//!     voice_pitch: 0.0,
//!     duration_scalar: 1.0,
//! })?;
//! if let Some(outcome) = action.wait(Duration::from_secs(10)) {
//!     println!("said hello: {:?}", outcome);
//! }
//! # Ok::<(), rovi_client::ClientError>(())
//! ```

pub mod builder;
mod error;
pub mod handle;
pub mod session;
pub mod world_handle;

pub use builder::{SessionBuilder, SessionConfig};
pub use error::ClientError;
pub use handle::ActionHandle;
pub use session::{ActionOptions, Session};
pub use world_handle::WorldHandle;

// 下游常用的驱动层类型
pub use rovi_driver::{
    ActionOutcome, ActionState, EntityId, EntityKind, EventListener, EventWaiter, FailureCode,
    ListenerId, MetricsSnapshot, NavMap, WaitError, WorldEntity, WorldState,
};
