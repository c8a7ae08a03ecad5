//! 测试公共设施：脚本化模拟引擎
//!
//! `MockEngine` 持有链路的引擎端，测试按脚本推送事件、断言
//! SDK 写出的命令。心跳帧（双向 ping）对脚本不可见，由
//! `recv` 自动跳过。

use rovi_client::{Session, SessionBuilder};
use rovi_link::{FrameLink, MockLink};
use rovi_protocol::{
    ActionResultCode, Command, Event, PROTOCOL_VERSION, SDK_BUILD_VERSION, codec,
};
use std::time::Duration;

pub struct MockEngine {
    link: MockLink,
}

impl MockEngine {
    /// 完成握手并返回可用会话
    pub fn start(
        configure: impl FnOnce(SessionBuilder) -> SessionBuilder,
    ) -> (Session, MockEngine) {
        let (sdk, mut link) = MockLink::pair();
        let info = codec::encode_event(&Event::ConnectionInfo {
            protocol_version: PROTOCOL_VERSION,
            build_version: SDK_BUILD_VERSION.to_string(),
            device_id: 1,
        })
        .unwrap();
        link.send_frame(&info).unwrap();

        let builder = configure(
            SessionBuilder::new("mock-engine").connection_timeout(Duration::from_secs(30)),
        );
        let session = builder.connect_over(sdk).unwrap();

        let mut engine = MockEngine { link };
        match engine.recv_raw(Duration::from_secs(2)) {
            Some(Command::ConnectAck { .. }) => {}
            other => panic!("expected connect ack, got {other:?}"),
        }
        (session, engine)
    }

    pub fn send(&mut self, event: &Event) {
        let payload = codec::encode_event(event).unwrap();
        self.link.send_frame(&payload).unwrap();
    }

    /// 取下一条出站命令（不过滤）
    pub fn recv_raw(&mut self, timeout: Duration) -> Option<Command> {
        let frame = self.link.recv_frame(timeout).ok()?;
        Some(codec::decode_command(&frame).unwrap())
    }

    /// 取下一条非心跳命令
    pub fn recv(&mut self) -> Command {
        loop {
            match self.recv_raw(Duration::from_secs(2)) {
                Some(Command::Ping { .. }) => continue,
                Some(command) => return command,
                None => panic!("no command within window"),
            }
        }
    }

    /// 断言下一条非心跳命令是入队，并返回其序列 ID
    pub fn expect_queue(&mut self) -> u32 {
        match self.recv() {
            Command::QueueAction { id_tag, .. } => id_tag,
            other => panic!("expected queue command, got {other:?}"),
        }
    }

    /// 断言窗口内没有非心跳命令
    pub fn expect_silence(&mut self, window: Duration) {
        let deadline = std::time::Instant::now() + window;
        while let Some(remaining) = deadline.checked_duration_since(std::time::Instant::now()) {
            match self.recv_raw(remaining) {
                Some(Command::Ping { .. }) | None => continue,
                Some(command) => panic!("unexpected command: {command:?}"),
            }
        }
    }

    pub fn start_action(&mut self, id_tag: u32) {
        self.send(&Event::ActionStarted { id_tag });
    }

    pub fn complete_action(&mut self, id_tag: u32, result: ActionResultCode) {
        self.send(&Event::ActionCompleted {
            id_tag,
            result,
            reason: String::new(),
        });
    }
}
