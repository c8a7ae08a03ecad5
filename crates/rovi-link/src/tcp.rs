//! TCP 链路后端
//!
//! 帧格式：4 字节小端长度前缀 + 负载。读取端维护内部缓冲，
//! 允许一帧跨多次 `read` 到达；等待窗口结束时缓冲内容保留，
//! 下次调用继续拼帧，不会因超时丢失半帧。

use crate::{FrameLink, LinkError};
use bytes::{Bytes, BytesMut};
use rovi_protocol::MAX_FRAME_LEN;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// 长度前缀字节数
const HEADER_LEN: usize = 4;

/// 单次 `read` 的临时缓冲大小
const READ_CHUNK: usize = 4096;

/// TCP 帧链路
pub struct TcpLink {
    stream: TcpStream,
    peer: SocketAddr,
    /// 已收到但尚未拼成完整帧的字节
    rx_buf: BytesMut,
    /// 终态错误后置位，后续调用直接返回 `Closed`
    closed: bool,
}

impl TcpLink {
    /// 连接到引擎，带连接超时
    ///
    /// 地址解析出多个候选时逐个尝试，全部失败返回最后一个错误。
    pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> Result<Self, LinkError> {
        let mut last_err: Option<std::io::Error> = None;
        for candidate in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => return Self::from_stream(stream, candidate),
                Err(e) => {
                    debug!(addr = %candidate, error = %e, "TCP connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .map(LinkError::Io)
            .unwrap_or_else(|| LinkError::Io(ErrorKind::AddrNotAvailable.into())))
    }

    /// 从已建立的流构造链路（接受端/测试用）
    pub fn from_stream(stream: TcpStream, peer: SocketAddr) -> Result<Self, LinkError> {
        // 命令帧都很小，关闭 Nagle 降低往返延迟
        stream.set_nodelay(true)?;
        debug!(peer = %peer, "TCP link established");
        Ok(Self {
            stream,
            peer,
            rx_buf: BytesMut::with_capacity(READ_CHUNK),
            closed: false,
        })
    }

    /// 尝试从缓冲中取出一个完整帧
    fn try_take_frame(&mut self) -> Result<Option<Bytes>, LinkError> {
        if self.rx_buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_le_bytes([
            self.rx_buf[0],
            self.rx_buf[1],
            self.rx_buf[2],
            self.rx_buf[3],
        ]) as usize;
        if len > MAX_FRAME_LEN {
            self.closed = true;
            return Err(LinkError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        if self.rx_buf.len() < HEADER_LEN + len {
            return Ok(None);
        }
        let _ = self.rx_buf.split_to(HEADER_LEN);
        let frame = self.rx_buf.split_to(len).freeze();
        trace!(len, "frame received");
        Ok(Some(frame))
    }
}

impl FrameLink for TcpLink {
    fn send_frame(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        if payload.len() > MAX_FRAME_LEN {
            return Err(LinkError::FrameTooLarge {
                len: payload.len(),
                max: MAX_FRAME_LEN,
            });
        }
        let header = (payload.len() as u32).to_le_bytes();
        let result = self
            .stream
            .write_all(&header)
            .and_then(|_| self.stream.write_all(payload))
            .and_then(|_| self.stream.flush());
        if let Err(e) = result {
            self.closed = true;
            return Err(LinkError::Io(e));
        }
        trace!(len = payload.len(), "frame sent");
        Ok(())
    }

    fn recv_frame(&mut self, timeout: Duration) -> Result<Bytes, LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.try_take_frame()? {
                return Ok(frame);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::Timeout);
            }
            // set_read_timeout(0) 含义是「无超时」，必须避开
            self.stream
                .set_read_timeout(Some(remaining.max(Duration::from_millis(1))))?;

            let mut chunk = [0u8; READ_CHUNK];
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    debug!(peer = %self.peer, "peer closed the connection");
                    self.closed = true;
                    return Err(LinkError::Closed);
                }
                Ok(n) => self.rx_buf.extend_from_slice(&chunk[..n]),
                Err(e)
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                {
                    return Err(LinkError::Timeout);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.closed = true;
                    return Err(LinkError::Io(e));
                }
            }
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn link_pair() -> (TcpLink, TcpLink) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = thread::spawn(move || listener.accept().unwrap());
        let client = TcpLink::connect(addr, Duration::from_secs(1)).unwrap();
        let (stream, peer) = accept.join().unwrap();
        let server = TcpLink::from_stream(stream, peer).unwrap();
        (client, server)
    }

    /// 测试单帧收发
    #[test]
    fn test_send_recv_single_frame() {
        let (mut client, mut server) = link_pair();
        client.send_frame(b"hello engine").unwrap();
        let frame = server.recv_frame(Duration::from_secs(1)).unwrap();
        assert_eq!(&frame[..], b"hello engine");
    }

    /// 测试多帧保持发送顺序
    #[test]
    fn test_frames_preserve_order() {
        let (mut client, mut server) = link_pair();
        for i in 0u8..10 {
            client.send_frame(&[i; 5]).unwrap();
        }
        for i in 0u8..10 {
            let frame = server.recv_frame(Duration::from_secs(1)).unwrap();
            assert_eq!(&frame[..], &[i; 5]);
        }
    }

    /// 测试空闲链路按超时返回
    #[test]
    fn test_recv_timeout_on_idle_link() {
        let (_client, mut server) = link_pair();
        let err = server.recv_frame(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, LinkError::Timeout));
    }

    /// 测试对端关闭后返回 Closed 终态
    #[test]
    fn test_recv_closed_after_peer_drop() {
        let (client, mut server) = link_pair();
        drop(client);
        // 先耗尽可能在途的数据，最终必须观察到 Closed
        let mut saw_closed = false;
        for _ in 0..10 {
            match server.recv_frame(Duration::from_millis(100)) {
                Err(LinkError::Closed) => {
                    saw_closed = true;
                    break;
                }
                Err(LinkError::Timeout) | Ok(_) => continue,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(saw_closed, "server should observe Closed after peer drop");
        assert!(matches!(
            server.recv_frame(Duration::from_millis(10)),
            Err(LinkError::Closed)
        ));
    }

    /// 测试超时不破坏半帧重组
    #[test]
    fn test_partial_frame_survives_timeout() {
        let (mut client, mut server) = link_pair();
        // 手工发送半个帧：长度前缀声明 8 字节，但只先发 3 字节
        let header = 8u32.to_le_bytes();
        client.stream.write_all(&header).unwrap();
        client.stream.write_all(&[1, 2, 3]).unwrap();
        client.stream.flush().unwrap();

        assert!(matches!(
            server.recv_frame(Duration::from_millis(50)),
            Err(LinkError::Timeout)
        ));

        client.stream.write_all(&[4, 5, 6, 7, 8]).unwrap();
        client.stream.flush().unwrap();
        let frame = server.recv_frame(Duration::from_secs(1)).unwrap();
        assert_eq!(&frame[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    /// 测试超限帧被拒绝
    #[test]
    fn test_oversized_frame_rejected_on_send() {
        let (mut client, _server) = link_pair();
        let huge = vec![0u8; MAX_FRAME_LEN + 1];
        assert!(matches!(
            client.send_frame(&huge),
            Err(LinkError::FrameTooLarge { .. })
        ));
    }
}
