//! 调度循环 - 会话的单线程心脏
//!
//! 每轮迭代按固定顺序推进四类工作：
//! 1. 链路轮询：取出一个入站帧，解码后路由（世界模型更新 →
//!    动作状态迁移 → 总线扇出，保证监听器看到已更新的快照）
//! 2. 命令排空：处交客户端线程经通道提交的动作/取消请求
//! 3. 定时维护：可见性扫描、启动超时检查、周期心跳
//! 4. 健康检查：入站静默超阈值即拆除会话
//!
//! 世界模型与动作注册表只在本线程修改；所有出站帧也只经本线程
//! 写出，天然串行，无帧交错。解码失败按单帧丢弃处理，不终止
//! 会话；链路终态错误与引擎静默才触发拆除。

use crate::actions::ActionRegistry;
use crate::command::EngineCommand;
use crate::context::EngineContext;
use crate::heartbeat::monotonic_millis;
use crate::metrics::EngineMetrics;
use crate::world::WorldStore;
use crossbeam_channel::{Receiver, TryRecvError};
use rovi_link::FrameLink;
use rovi_protocol::{Command, Event, codec};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 调度循环参数
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// 单次链路轮询的等待窗口
    pub receive_timeout: Duration,
    /// 实体可见性窗口（窗口内无新观测即标记不可见）
    pub visibility_window: Duration,
    /// 排队命令写线后等待开始确认的窗口
    pub start_timeout: Duration,
    /// 主动心跳发送间隔
    pub heartbeat_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_millis(2),
            visibility_window: Duration::from_secs(1),
            start_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(1),
        }
    }
}

/// 拆除原因（日志用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Shutdown,
    LinkFailed,
    EngineSilent,
    CommandChannelDropped,
}

/// 运行调度循环直到会话结束
///
/// 在专用线程上调用；返回即表示会话已完成拆除（在途动作已
/// 全部解除、总线已关闭、连接标志已清除）。
pub fn io_loop<L: FrameLink>(
    link: L,
    cmd_rx: Receiver<EngineCommand>,
    ctx: Arc<EngineContext>,
    config: LoopConfig,
) {
    Pipeline::new(link, cmd_rx, ctx, config).run()
}

struct Pipeline<L: FrameLink> {
    link: L,
    cmd_rx: Receiver<EngineCommand>,
    ctx: Arc<EngineContext>,
    config: LoopConfig,
    registry: ActionRegistry,
    world: WorldStore,
    ping_counter: u32,
    last_ping: Instant,
}

impl<L: FrameLink> Pipeline<L> {
    fn new(
        link: L,
        cmd_rx: Receiver<EngineCommand>,
        ctx: Arc<EngineContext>,
        config: LoopConfig,
    ) -> Self {
        let registry = ActionRegistry::new(config.start_timeout);
        let world = WorldStore::new(config.visibility_window, Arc::clone(&ctx.world));
        Self {
            link,
            cmd_rx,
            ctx,
            config,
            registry,
            world,
            ping_counter: 0,
            last_ping: Instant::now(),
        }
    }

    fn run(mut self) {
        info!(link = %self.link.describe(), "dispatch loop started");
        let reason = loop {
            // 1. 链路轮询
            match self.link.recv_frame(self.config.receive_timeout) {
                Ok(frame) => {
                    EngineMetrics::incr(&self.ctx.metrics.rx_frames_total);
                    self.ctx.monitor.register_inbound();
                    match codec::decode_event(&frame) {
                        Ok(event) => {
                            if let Err(reason) = self.route(event) {
                                break reason;
                            }
                        }
                        Err(err) => {
                            // 单帧可恢复：丢弃并继续
                            EngineMetrics::incr(&self.ctx.metrics.decode_errors);
                            warn!(error = %err, len = frame.len(), "dropping undecodable frame");
                        }
                    }
                }
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "link failed");
                    break StopReason::LinkFailed;
                }
                Err(_) => {}
            }

            // 2. 命令排空
            if let Some(reason) = self.drain_commands() {
                break reason;
            }

            // 3. 定时维护
            let now = Instant::now();
            if self.world.visibility_sweep(now) {
                self.world.publish();
            }
            let before = self.registry.in_flight();
            let follow_ups = self.registry.check_start_timeouts(now);
            let timed_out = before - self.registry.in_flight();
            for _ in 0..timed_out {
                EngineMetrics::incr(&self.ctx.metrics.action_start_timeouts);
                EngineMetrics::incr(&self.ctx.metrics.actions_completed);
            }
            if let Err(reason) = self.send_all(follow_ups) {
                break reason;
            }
            if now.duration_since(self.last_ping) >= self.config.heartbeat_interval {
                self.last_ping = now;
                self.ping_counter = self.ping_counter.wrapping_add(1);
                let ping = Command::Ping {
                    counter: self.ping_counter,
                    time_sent_ms: monotonic_millis(),
                    is_response: false,
                };
                if let Err(reason) = self.send_all(vec![ping]) {
                    break reason;
                }
            }

            // 4. 健康检查
            if !self.ctx.monitor.is_alive() {
                warn!(silence = ?self.ctx.monitor.silence(), "engine silent past threshold");
                break StopReason::EngineSilent;
            }
        };
        self.teardown(reason);
    }

    /// 路由一个已解码事件
    fn route(&mut self, event: Event) -> Result<(), StopReason> {
        let now = Instant::now();
        match &event {
            // 心跳短路：直接回帧，不进总线
            Event::Ping {
                counter,
                time_sent_ms,
                is_response,
            } => {
                if !is_response {
                    trace!(counter, "answering engine ping");
                    self.send_all(vec![Command::Ping {
                        counter: *counter,
                        time_sent_ms: *time_sent_ms,
                        is_response: true,
                    }])?;
                }
                return Ok(());
            }
            // 握手已在连接阶段完成，此后到达的版本帧属异常流量
            Event::ConnectionInfo { build_version, .. } => {
                warn!(build_version = %build_version, "unexpected version frame after handshake; dropped");
                return Ok(());
            }
            Event::ActionStarted { id_tag } => {
                self.registry.on_action_started(*id_tag);
            }
            Event::ActionCompleted {
                id_tag,
                result,
                reason,
            } => {
                let before = self.registry.in_flight();
                let follow_ups = self
                    .registry
                    .on_action_completed(*id_tag, *result, reason, now);
                if self.registry.in_flight() < before {
                    EngineMetrics::incr(&self.ctx.metrics.actions_completed);
                }
                self.send_all(follow_ups)?;
            }
            Event::ObjectObserved(obs) | Event::FaceObserved(obs) => {
                if self.world.on_observed(obs, now).is_none() {
                    // 陈旧观测：不发布、不扇出
                    return Ok(());
                }
                self.world.publish();
            }
            Event::PetObserved {
                pet_id,
                kind,
                observed_at_ms,
            } => {
                if self
                    .world
                    .on_observed_pet(*pet_id, *kind, *observed_at_ms, now)
                    .is_none()
                {
                    return Ok(());
                }
                self.world.publish();
            }
            Event::RobotState {
                pose,
                battery_volts,
                lift_ratio,
                head_angle_rad,
                carrying_object_id,
                timestamp_ms,
            } => {
                self.world.on_robot_state(
                    *pose,
                    *battery_volts,
                    *lift_ratio,
                    *head_angle_rad,
                    *carrying_object_id,
                    *timestamp_ms,
                );
                self.world.publish();
            }
            Event::NavMapUpdate {
                origin_id,
                tile_size_mm,
                cells,
            } => {
                self.world.on_nav_map_update(*origin_id, *tile_size_mm, cells);
                self.world.publish();
            }
            Event::RobotDelocalized => {
                self.world.on_delocalized();
                self.world.publish();
            }
            // 本地合成标记，引擎不应发送
            Event::ConnectionLost => {
                warn!("connection-lost marker received over the wire; dropped");
                return Ok(());
            }
        }
        // 世界模型与注册表先行更新，监听器读快照不会看到旧视图
        self.ctx.bus.dispatch(&event, &self.ctx.metrics);
        Ok(())
    }

    /// 排空命令通道；返回 Some 表示循环应结束
    fn drain_commands(&mut self) -> Option<StopReason> {
        loop {
            match self.cmd_rx.try_recv() {
                Ok(EngineCommand::Submit(request)) => {
                    EngineMetrics::incr(&self.ctx.metrics.actions_submitted);
                    let preempt = request.preempt;
                    let now = Instant::now();
                    let commands = self.registry.submit(request, now);
                    if preempt {
                        let cancelled = commands
                            .iter()
                            .filter(|c| matches!(c, Command::CancelActionByTag { .. }))
                            .count();
                        for _ in 0..cancelled {
                            EngineMetrics::incr(&self.ctx.metrics.actions_preempted);
                        }
                    }
                    if let Err(reason) = self.send_all(commands) {
                        return Some(reason);
                    }
                }
                Ok(EngineCommand::Cancel { id_tag }) => {
                    let commands = self.registry.cancel(id_tag, Instant::now());
                    if let Err(reason) = self.send_all(commands) {
                        return Some(reason);
                    }
                }
                Ok(EngineCommand::CancelAll) => {
                    let commands = self.registry.cancel_all();
                    if let Err(reason) = self.send_all(commands) {
                        return Some(reason);
                    }
                }
                Ok(EngineCommand::RequestNavMap) => {
                    if let Err(reason) = self.send_all(vec![Command::RequestNavMap]) {
                        return Some(reason);
                    }
                }
                Ok(EngineCommand::SetCubeLights { object_id, lights }) => {
                    let command = Command::SetCubeLights { object_id, lights };
                    if let Err(reason) = self.send_all(vec![command]) {
                        return Some(reason);
                    }
                }
                Ok(EngineCommand::Shutdown) => {
                    debug!("shutdown requested");
                    // 尽力通知引擎放弃在途动作，失败也不影响拆除
                    let commands = self.registry.cancel_all();
                    let _ = self.send_all(commands);
                    return Some(StopReason::Shutdown);
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    // 客户端句柄全部丢弃，会话随之结束
                    return Some(StopReason::CommandChannelDropped);
                }
            }
        }
    }

    /// 经唯一发送路径写出一批命令
    fn send_all(&mut self, commands: Vec<Command>) -> Result<(), StopReason> {
        for command in commands {
            let payload = match codec::encode_command(&command) {
                Ok(payload) => payload,
                Err(err) => {
                    // 编码失败只可能是本端缺陷，丢弃该命令
                    error!(error = %err, "failed to encode outbound command");
                    continue;
                }
            };
            if let Err(err) = self.link.send_frame(&payload) {
                error!(error = %err, "link write failed");
                return Err(StopReason::LinkFailed);
            }
            EngineMetrics::incr(&self.ctx.metrics.tx_frames_total);
        }
        Ok(())
    }

    /// 会话拆除：解除在途动作与等待者，发布终局快照
    fn teardown(mut self, reason: StopReason) {
        info!(?reason, "tearing down session");
        self.registry.fail_all_connection_lost();
        self.world.mark_all_invisible();
        self.world.publish();
        // Connection 类监听器在总线关闭前收到合成的断开通知
        self.ctx.bus.dispatch(&Event::ConnectionLost, &self.ctx.metrics);
        self.ctx.bus.close();
        self.ctx.mark_disconnected();
    }
}
