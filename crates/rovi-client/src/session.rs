//! 会话 - 握手、调度线程与客户端入口
//!
//! 连接流程：建链 → 等待引擎版本帧 → 版本校验 → 回应确认 →
//! 启动调度线程。版本不兼容时会话在任何应用消息之前失败。
//!
//! `Session` 是线程安全入口；动作提交与取消经命令通道送往
//! 调度线程，世界模型经快照槽无锁读取。丢弃会话（或调用
//! `close`）会请求调度线程拆除并等待其退出。

use crate::builder::SessionConfig;
use crate::error::ClientError;
use crate::handle::ActionHandle;
use crate::world_handle::WorldHandle;
use crossbeam_channel::{Sender, unbounded};
use rovi_driver::{
    ActionShared, EngineCommand, EngineContext, EventListener, EventWaiter, ListenerId,
    LoopConfig, MetricsSnapshot, SubmitRequest, io_loop,
};
use rovi_link::{FrameLink, LinkError};
use rovi_protocol::{
    ActionSpec, ActuatorMask, Command, Event, EventCategory, LightState, PROTOCOL_VERSION,
    SDK_BUILD_VERSION, build_versions_compatible, codec,
};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// 单次提交的可选参数
#[derive(Debug, Clone, Default)]
pub struct ActionOptions {
    /// 覆盖动作的默认执行器掩码
    pub mask: Option<ActuatorMask>,
    /// 抢占冲突的在途动作（先协作取消占用者）
    pub preempt: bool,
    /// 引擎侧可重试失败的最大重试次数
    pub num_retries: u32,
}

/// 与引擎的一次活动会话
pub struct Session {
    ctx: Arc<EngineContext>,
    cmd_tx: Sender<EngineCommand>,
    join: Option<JoinHandle<()>>,
    device_id: u32,
    engine_build: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device_id", &self.device_id)
            .field("engine_build", &self.engine_build)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// 在已建立的链路上完成握手并启动调度线程
    pub fn connect_over<L: FrameLink + 'static>(
        mut link: L,
        config: SessionConfig,
    ) -> Result<Self, ClientError> {
        let (engine_build, device_id) = handshake(&mut link, config.handshake_timeout)?;
        info!(
            engine_build = %engine_build,
            device_id,
            link = %link.describe(),
            "handshake complete"
        );

        let ctx = Arc::new(EngineContext::new(config.connection_timeout));
        let (cmd_tx, cmd_rx) = unbounded();
        let loop_config = LoopConfig {
            visibility_window: config.visibility_window,
            start_timeout: config.start_timeout,
            heartbeat_interval: config.heartbeat_interval,
            ..LoopConfig::default()
        };
        let loop_ctx = Arc::clone(&ctx);
        let join = std::thread::Builder::new()
            .name("rovi-dispatch".to_string())
            .spawn(move || io_loop(link, cmd_rx, loop_ctx, loop_config))
            .map_err(|e| ClientError::Link(LinkError::Io(e)))?;

        Ok(Self {
            ctx,
            cmd_tx,
            join: Some(join),
            device_id,
            engine_build,
        })
    }

    /// 以默认参数提交动作
    pub fn submit(&self, spec: ActionSpec) -> Result<ActionHandle, ClientError> {
        self.submit_with(spec, ActionOptions::default())
    }

    /// 提交动作（可覆盖掩码/请求抢占/指定重试）
    pub fn submit_with(
        &self,
        spec: ActionSpec,
        options: ActionOptions,
    ) -> Result<ActionHandle, ClientError> {
        if !self.ctx.is_connected() {
            return Err(ClientError::Disconnected);
        }
        let id_tag = self.ctx.allocate_action_tag();
        let mask = options.mask.unwrap_or_else(|| spec.default_mask());
        let shared = Arc::new(ActionShared::new());
        debug!(id_tag, kind = spec.kind_name(), "submitting action");
        self.cmd_tx
            .send(EngineCommand::Submit(SubmitRequest {
                id_tag,
                spec,
                mask,
                preempt: options.preempt,
                num_retries: options.num_retries,
                shared: Arc::clone(&shared),
            }))
            .map_err(|_| ClientError::Disconnected)?;
        Ok(ActionHandle::new(id_tag, shared, self.cmd_tx.clone()))
    }

    /// 协作取消全部在途动作
    pub fn cancel_all(&self) -> Result<(), ClientError> {
        self.cmd_tx
            .send(EngineCommand::CancelAll)
            .map_err(|_| ClientError::Disconnected)
    }

    /// 请求引擎推送一次导航地图全量
    pub fn request_nav_map(&self) -> Result<(), ClientError> {
        self.cmd_tx
            .send(EngineCommand::RequestNavMap)
            .map_err(|_| ClientError::Disconnected)
    }

    /// 设置方块四角灯（角顺序与方块朝向无关，由引擎映射）
    pub fn set_cube_lights(
        &self,
        object_id: u32,
        lights: [LightState; 4],
    ) -> Result<(), ClientError> {
        self.cmd_tx
            .send(EngineCommand::SetCubeLights { object_id, lights })
            .map_err(|_| ClientError::Disconnected)
    }

    /// 世界模型访问句柄
    pub fn world(&self) -> WorldHandle {
        WorldHandle::new(Arc::clone(&self.ctx))
    }

    /// 注册持久事件监听器
    pub fn add_listener(
        &self,
        category: EventCategory,
        listener: Arc<dyn EventListener>,
    ) -> ListenerId {
        self.ctx.bus.add_listener(category, listener)
    }

    /// 退订事件监听器
    pub fn remove_listener(&self, id: ListenerId) {
        self.ctx.bus.remove_listener(id);
    }

    /// 注册一次性事件等待者
    pub fn wait_for_event(
        &self,
        predicate: impl Fn(&Event) -> bool + Send + 'static,
    ) -> EventWaiter {
        self.ctx.bus.register_waiter(predicate)
    }

    /// 当前调度指标
    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_connected()
    }

    /// 引擎自述的设备 ID
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// 引擎构建版本（握手时获取）
    pub fn engine_build_version(&self) -> &str {
        &self.engine_build
    }

    /// 关闭会话并等待调度线程退出
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // 通道已断说明调度线程已自行拆除
        let _ = self.cmd_tx.send(EngineCommand::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 握手：等待版本帧、校验、回应确认
///
/// 返回引擎构建版本与设备 ID。版本帧之前到达的其他流量被忽略。
fn handshake<L: FrameLink>(
    link: &mut L,
    timeout: Duration,
) -> Result<(String, u32), ClientError> {
    let deadline = Instant::now() + timeout;
    loop {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero())
        else {
            return Err(ClientError::HandshakeTimeout);
        };
        let frame = match link.recv_frame(remaining) {
            Ok(frame) => frame,
            Err(LinkError::Timeout) => return Err(ClientError::HandshakeTimeout),
            Err(err) => return Err(err.into()),
        };
        match codec::decode_event(&frame) {
            Ok(Event::ConnectionInfo {
                protocol_version,
                build_version,
                device_id,
            }) => {
                if protocol_version != PROTOCOL_VERSION
                    || !build_versions_compatible(&build_version, SDK_BUILD_VERSION)
                {
                    return Err(ClientError::IncompatibleVersion {
                        engine_protocol: protocol_version,
                        engine_build: build_version,
                    });
                }
                let ack = Command::ConnectAck {
                    sdk_build_version: SDK_BUILD_VERSION.to_string(),
                    protocol_version: PROTOCOL_VERSION,
                };
                link.send_frame(&codec::encode_command(&ack)?)?;
                return Ok((build_version, device_id));
            }
            Ok(other) => {
                trace!(category = ?other.category(), "ignoring pre-handshake frame");
            }
            Err(err) => return Err(ClientError::HandshakeFailed(err.to_string())),
        }
    }
}
