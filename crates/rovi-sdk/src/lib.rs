//! # Rovi SDK
//!
//! Rovi 桌面机器人宿主侧 SDK 的统一入口：
//! - 会话建立与版本握手（`rovi-client`）
//! - 动作提交、冲突排队、抢占与协作取消（`rovi-driver`）
//! - 世界模型快照与导航地图（`rovi-driver`）
//! - 链路与协议层（`rovi-link` / `rovi-protocol`）
//!
//! ## 快速开始
//!
//! ```no_run
//! use rovi_sdk::prelude::*;
//! use std::time::Duration;
//!
//! rovi_sdk::init_logging();
//! let session = SessionBuilder::new("192.168.1.20").connect()?;
//! let action = session.submit(ActionSpec::DriveStraight {
//!     distance_mm: 150.0,
//!     speed_mmps: 50.0,
//!     should_play_anim: true,
//! })?;
//! match action.wait(Duration::from_secs(30)) {
//!     Some(ActionOutcome::Succeeded) => println!("arrived"),
//!     Some(other) => println!("did not arrive: {:?}", other),
//!     None => println!("still driving"),
//! }
//! # Ok::<(), rovi_sdk::client::ClientError>(())
//! ```

pub use rovi_client as client;
pub use rovi_driver as driver;
pub use rovi_link as link;
pub use rovi_protocol as protocol;

/// 常用类型一站式导入
pub mod prelude {
    pub use rovi_client::{
        ActionHandle, ActionOptions, ActionOutcome, ActionState, ClientError, EntityKind,
        FailureCode, Session, SessionBuilder, SessionConfig, WaitError, WorldEntity,
        WorldHandle, WorldState,
    };
    pub use rovi_protocol::{
        ActionSpec, ActuatorMask, Event, EventCategory, LightState, NavCellContent, ObjectFamily,
        PetKind, Pose,
    };
}

/// 初始化日志（环境变量 `RUST_LOG` 控制级别，默认 `info`）
///
/// 同时桥接 `log` 生态的输出。重复调用是无操作。
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
    let _ = tracing_log::LogTracer::init();
}
