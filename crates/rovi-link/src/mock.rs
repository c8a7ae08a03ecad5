//! Mock 链路后端（测试专用）
//!
//! 一对进程内端点，经 crossbeam 通道互联，语义与 TCP 后端对齐：
//! 有序、带消息边界、对端整体丢弃后本端观察到 `Closed`。
//! 集成测试用它扮演引擎侧，无需真实网络。

use crate::{FrameLink, LinkError};
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, unbounded};
use std::time::Duration;

/// 进程内帧链路端点
pub struct MockLink {
    tx: Option<Sender<Bytes>>,
    rx: Receiver<Bytes>,
    label: &'static str,
}

impl MockLink {
    /// 创建一对互联端点 `(sdk 侧, 引擎侧)`
    pub fn pair() -> (MockLink, MockLink) {
        let (a_tx, a_rx) = unbounded();
        let (b_tx, b_rx) = unbounded();
        (
            MockLink {
                tx: Some(a_tx),
                rx: b_rx,
                label: "sdk",
            },
            MockLink {
                tx: Some(b_tx),
                rx: a_rx,
                label: "engine",
            },
        )
    }

    /// 单向关闭发送端（对端后续 recv 在耗尽在途帧后得到 `Closed`）
    pub fn shutdown_send(&mut self) {
        self.tx = None;
    }
}

impl FrameLink for MockLink {
    fn send_frame(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        let tx = self.tx.as_ref().ok_or(LinkError::Closed)?;
        match tx.try_send(Bytes::copy_from_slice(payload)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Disconnected(_)) => {
                self.tx = None;
                Err(LinkError::Closed)
            }
            // unbounded 通道不会满，这个分支理论不可达
            Err(TrySendError::Full(_)) => Err(LinkError::Closed),
        }
    }

    fn recv_frame(&mut self, timeout: Duration) -> Result<Bytes, LinkError> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(LinkError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
        }
    }

    fn describe(&self) -> String {
        format!("mock://{}", self.label)
    }
}
