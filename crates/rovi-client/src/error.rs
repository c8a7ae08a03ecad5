//! 客户端层统一错误类型

use rovi_link::LinkError;
use rovi_protocol::ProtocolError;
use thiserror::Error;

/// 会话层错误
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 握手窗口内未收到引擎版本帧
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// 握手阶段收到无法理解的流量
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// 版本不兼容，会话在任何应用消息之前终止
    #[error(
        "Incompatible engine version (engine protocol {engine_protocol}, build {engine_build})"
    )]
    IncompatibleVersion {
        engine_protocol: u32,
        engine_build: String,
    },

    /// 会话已断开（提交/等待的目标会话不再存活）
    #[error("Session disconnected")]
    Disconnected,
}
