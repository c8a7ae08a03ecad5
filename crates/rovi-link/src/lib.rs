//! # Rovi Link Layer
//!
//! 到伴侣应用（引擎）的链路抽象，提供统一的帧收发接口。
//!
//! 链路是有序、带消息边界的双向字节流：`send_frame` 写入一个完整帧，
//! `recv_frame` 按到达顺序取出一个完整帧。帧内容对本层不透明，
//! 编解码由 `rovi-protocol` 负责。
//!
//! ## 后端
//!
//! - [`TcpLink`]: 生产后端，长度前缀帧格式（u32 LE + 负载）
//! - `MockLink`（`mock` feature）: 进程内通道对，测试专用

use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

pub mod tcp;

#[cfg(feature = "mock")]
pub mod mock;

pub use tcp::TcpLink;

#[cfg(feature = "mock")]
pub use mock::MockLink;

/// 链路层统一错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 本次等待窗口内无完整帧到达（可恢复，调度循环据此让出）
    #[error("Receive timeout")]
    Timeout,

    /// 链路已关闭（对端断开或本端 shutdown），终态
    #[error("Link closed")]
    Closed,

    /// 帧长度超出协议上限（坏长度前缀按链路损坏处理）
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },
}

impl LinkError {
    /// 是否为终态错误（链路不可再用）
    pub fn is_fatal(&self) -> bool {
        match self {
            LinkError::Timeout => false,
            LinkError::Io(_) | LinkError::Closed | LinkError::FrameTooLarge { .. } => true,
        }
    }
}

/// 帧链路统一接口
///
/// 实现必须保证：发送保持调用顺序；接收按到达顺序返回完整帧；
/// 任何底层 I/O 故障后续调用稳定返回终态错误。
pub trait FrameLink: Send {
    /// 发送一个完整帧
    fn send_frame(&mut self, payload: &[u8]) -> Result<(), LinkError>;

    /// 接收一个完整帧，最多等待 `timeout`
    fn recv_frame(&mut self, timeout: Duration) -> Result<Bytes, LinkError>;

    /// 链路描述（用于日志）
    fn describe(&self) -> String;
}

impl<T: FrameLink + ?Sized> FrameLink for Box<T> {
    fn send_frame(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        (**self).send_frame(payload)
    }

    fn recv_frame(&mut self, timeout: Duration) -> Result<Bytes, LinkError> {
        (**self).recv_frame(timeout)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
