//! 会话构建器

use crate::error::ClientError;
use crate::session::Session;
use rovi_link::{FrameLink, TcpLink};
use rovi_protocol::DEFAULT_PORT;
use std::time::Duration;
use tracing::info;

/// 会话参数（全部带默认值）
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// TCP 建连超时
    pub connect_timeout: Duration,
    /// 等待引擎版本帧的窗口
    pub handshake_timeout: Duration,
    /// 入站静默判定连接丢失的阈值
    pub connection_timeout: Duration,
    /// 实体可见性窗口
    pub visibility_window: Duration,
    /// 动作开始确认窗口
    pub start_timeout: Duration,
    /// 主动心跳间隔
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(5),
            visibility_window: Duration::from_secs(1),
            start_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(1),
        }
    }
}

/// 会话构建器
///
/// ```no_run
/// use rovi_client::SessionBuilder;
///
/// let session = SessionBuilder::new("192.168.1.20")
///     .handshake_timeout(std::time::Duration::from_secs(10))
///     .connect()?;
/// # Ok::<(), rovi_client::ClientError>(())
/// ```
pub struct SessionBuilder {
    host: String,
    port: u16,
    config: SessionConfig,
}

impl SessionBuilder {
    /// 以默认参数指向给定主机
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            config: SessionConfig::default(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    pub fn visibility_window(mut self, window: Duration) -> Self {
        self.config.visibility_window = window;
        self
    }

    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.config.start_timeout = timeout;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// 建立 TCP 链路并完成握手
    pub fn connect(self) -> Result<Session, ClientError> {
        let addr = (self.host.as_str(), self.port);
        info!(host = %self.host, port = self.port, "connecting to engine");
        let link = TcpLink::connect(addr, self.config.connect_timeout)?;
        Session::connect_over(link, self.config)
    }

    /// 在已建立的链路上完成握手（注入自定义链路或模拟引擎）
    pub fn connect_over<L: FrameLink + 'static>(self, link: L) -> Result<Session, ClientError> {
        Session::connect_over(link, self.config)
    }
}
