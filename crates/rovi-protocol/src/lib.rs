//! # Rovi Protocol
//!
//! 引擎消息协议定义（无 I/O 依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量（版本号、端口、动作 ID 区间）
//! - `types`: 共享类型（位姿、实体类别、执行器掩码）
//! - `command`: SDK → 引擎 出站命令
//! - `event`: 引擎 → SDK 入站事件
//! - `codec`: 帧编解码边界（bincode）
//!
//! ## 边界约定
//!
//! 本层只定义消息的逻辑结构和字节表示，不感知连接状态。
//! 编解码对上层是不透明边界：`encode_command` / `decode_event`
//! 是传输层与调度层之间唯一的转换入口。

pub mod codec;
pub mod command;
pub mod constants;
pub mod event;
pub mod types;

// 重新导出常用类型
pub use codec::{decode_command, decode_event, encode_command, encode_event};
pub use command::{ActionSpec, Command};
pub use constants::*;
pub use event::{
    ActionResultCode, Event, EventCategory, NavCellContent, NavMapCell, ObservedEntity,
};
pub use types::{ActuatorMask, EntityKey, LightState, ObjectFamily, PetKind, Pose};

use thiserror::Error;

/// 协议层统一错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// 帧编码失败（不应在正常数据上出现）
    #[error("Encode error: {0}")]
    Encode(String),

    /// 帧解码失败（对单条消息可恢复：记录日志后丢弃）
    #[error("Decode error: {0}")]
    Decode(String),

    /// 帧长度不合法
    #[error("Invalid frame length: expected <= {max}, actual {actual}")]
    InvalidLength { max: usize, actual: usize },
}
