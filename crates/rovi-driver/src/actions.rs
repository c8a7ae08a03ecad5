//! 动作注册表 - 在途动作的生命周期管理
//!
//! 状态机：`Queued → Running → Succeeded | Failed | Aborted`
//!
//! - 入 `Running` 仅凭引擎按序列 ID 关联的开始确认事件；
//!   排队命令发出后超过启动窗口未见确认，本地判 `StartTimeout`。
//! - 执行器掩码相交的动作互相冲突：默认排在占用者之后按提交
//!   顺序执行；提交时可请求抢占（先协作取消占用者，确认终态后
//!   再发出本动作）。掩码不相交的动作完全并行。
//! - 取消是协作式的：发出取消命令后动作仍是非终态，直到引擎的
//!   完成事件确认；对终态动作取消是无操作（幂等，不重复发线）。
//!
//! 注册表仅由调度循环线程修改。所有需要写链路的方法返回待发送
//! 命令列表，由循环经唯一发送路径写出，保证帧边界与发送顺序。

use parking_lot::{Condvar, Mutex};
use rovi_protocol::{
    ActionResultCode, ActionSpec, ActuatorMask, Command, FIRST_SDK_ACTION_TAG,
    LAST_SDK_ACTION_TAG,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 动作公开状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    /// 已受理，尚未收到引擎开始确认（可能还在本地冲突队列里）
    Queued,
    /// 引擎已确认开始执行
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionState::Succeeded | ActionState::Failed | ActionState::Aborted
        )
    }
}

/// 失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCode {
    /// 启动窗口内未收到引擎开始确认
    StartTimeout,
    /// 会话在动作终态前断开
    ConnectionLost,
    /// 引擎上报的执行失败
    Engine(ActionResultCode),
}

/// 动作终态结果
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Succeeded,
    Failed {
        code: FailureCode,
        reason: String,
    },
    Aborted,
}

impl ActionOutcome {
    pub fn state(&self) -> ActionState {
        match self {
            ActionOutcome::Succeeded => ActionState::Succeeded,
            ActionOutcome::Failed { .. } => ActionState::Failed,
            ActionOutcome::Aborted => ActionState::Aborted,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Succeeded)
    }
}

struct SharedInner {
    state: ActionState,
    outcome: Option<ActionOutcome>,
}

/// 动作完成信号（注册表与句柄共享）
///
/// 终态恰好投递一次；`wait` 只挂起调用线程，超时后可重复等待。
pub struct ActionShared {
    inner: Mutex<SharedInner>,
    cond: Condvar,
}

impl Default for ActionShared {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionShared {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SharedInner {
                state: ActionState::Queued,
                outcome: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// 当前状态（无阻塞）
    pub fn state(&self) -> ActionState {
        self.inner.lock().state
    }

    /// 已有终态则返回其副本
    pub fn outcome(&self) -> Option<ActionOutcome> {
        self.inner.lock().outcome.clone()
    }

    /// 标记进入 Running（终态后到达的迟到确认被忽略）
    pub(crate) fn mark_running(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ActionState::Queued {
            inner.state = ActionState::Running;
        }
    }

    /// 投递终态（恰好一次：重复投递是无操作）
    pub(crate) fn resolve(&self, outcome: ActionOutcome) {
        let mut inner = self.inner.lock();
        if inner.outcome.is_some() {
            return;
        }
        inner.state = outcome.state();
        inner.outcome = Some(outcome);
        self.cond.notify_all();
    }

    /// 阻塞等待终态，最多 `timeout`；超时返回 `None`
    pub fn wait(&self, timeout: Duration) -> Option<ActionOutcome> {
        let mut inner = self.inner.lock();
        if inner.outcome.is_some() {
            return inner.outcome.clone();
        }
        let deadline = Instant::now() + timeout;
        while inner.outcome.is_none() {
            if self.cond.wait_until(&mut inner, deadline).timed_out() {
                return inner.outcome.clone();
            }
        }
        inner.outcome.clone()
    }
}

/// 一次动作提交（经引擎命令通道进入调度循环）
pub struct SubmitRequest {
    pub id_tag: u32,
    pub spec: ActionSpec,
    pub mask: ActuatorMask,
    pub preempt: bool,
    pub num_retries: u32,
    pub shared: Arc<ActionShared>,
}

/// 注册表内部的投递状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchState {
    /// 本地排队，排队命令尚未写线
    Pending,
    /// 排队命令已写线，等待开始确认（带启动截止时刻）
    Sent,
    /// 引擎已确认开始
    Running,
}

struct ActionRecord {
    id_tag: u32,
    spec: ActionSpec,
    mask: ActuatorMask,
    num_retries: u32,
    dispatch: DispatchState,
    start_deadline: Option<Instant>,
    /// 已发出取消命令，等待引擎确认终态
    aborting: bool,
    shared: Arc<ActionShared>,
}

/// 分配 SDK 区间内的动作序列 ID（单调递增，到上界回绕）
pub fn action_tag_for(counter: u64) -> u32 {
    let span = (LAST_SDK_ACTION_TAG - FIRST_SDK_ACTION_TAG + 1) as u64;
    FIRST_SDK_ACTION_TAG + (counter % span) as u32
}

/// 序列 ID 是否属于 SDK 区间
pub fn is_sdk_action_tag(id_tag: u32) -> bool {
    (FIRST_SDK_ACTION_TAG..=LAST_SDK_ACTION_TAG).contains(&id_tag)
}

/// 动作注册表（仅调度循环持有）
pub struct ActionRegistry {
    /// 全部非终态动作
    records: HashMap<u32, ActionRecord>,
    /// 提交顺序（冲突组内 FIFO 的依据）
    submit_order: Vec<u32>,
    start_timeout: Duration,
}

impl ActionRegistry {
    pub fn new(start_timeout: Duration) -> Self {
        Self {
            records: HashMap::new(),
            submit_order: Vec::new(),
            start_timeout,
        }
    }

    /// 非终态动作数量
    pub fn in_flight(&self) -> usize {
        self.records.len()
    }

    /// 受理一次提交，返回需写线的命令
    pub fn submit(&mut self, request: SubmitRequest, now: Instant) -> Vec<Command> {
        let mut commands = Vec::new();
        let SubmitRequest {
            id_tag,
            spec,
            mask,
            preempt,
            num_retries,
            shared,
        } = request;

        debug!(
            id_tag,
            kind = spec.kind_name(),
            mask = mask.0,
            preempt,
            "action submitted"
        );

        if preempt {
            // 抢占：协作取消全部冲突占用者；本动作在其终态确认后发出
            let conflicting: Vec<u32> = self
                .submit_order
                .iter()
                .copied()
                .filter(|tag| {
                    self.records
                        .get(tag)
                        .map(|r| r.mask.conflicts_with(mask) && !r.aborting)
                        .unwrap_or(false)
                })
                .collect();
            for tag in conflicting {
                info!(occupant = tag, preemptor = id_tag, "preempting conflicting action");
                commands.extend(self.cancel(tag, now));
            }
        }

        self.records.insert(
            id_tag,
            ActionRecord {
                id_tag,
                spec,
                mask,
                num_retries,
                dispatch: DispatchState::Pending,
                start_deadline: None,
                aborting: false,
                shared,
            },
        );
        self.submit_order.push(id_tag);

        commands.extend(self.dispatch_ready(now));
        commands
    }

    /// 请求取消一个动作，返回需写线的命令
    ///
    /// 幂等：未知/终态/已在取消中的动作不产生任何命令。
    pub fn cancel(&mut self, id_tag: u32, now: Instant) -> Vec<Command> {
        let Some(record) = self.records.get_mut(&id_tag) else {
            debug!(id_tag, "cancel ignored: action not in flight");
            return Vec::new();
        };
        if record.aborting {
            return Vec::new();
        }

        match record.dispatch {
            DispatchState::Pending => {
                // 排队命令从未写线：本地立即终结，无需打扰引擎
                info!(id_tag, "cancelling queued action locally");
                let shared = Arc::clone(&record.shared);
                self.remove(id_tag);
                shared.resolve(ActionOutcome::Aborted);
                self.dispatch_ready(now)
            }
            DispatchState::Sent | DispatchState::Running => {
                info!(id_tag, "requesting cooperative abort");
                record.aborting = true;
                // 取消中的动作不再受启动超时约束（终态以确认事件为准）
                record.start_deadline = None;
                vec![Command::CancelActionByTag { id_tag }]
            }
        }
    }

    /// 请求协作取消全部在途动作
    ///
    /// 未写线的本地终结；已写线的统一标记取消中，由一条全量
    /// 取消命令覆盖，终态仍以各自的完成事件为准。
    pub fn cancel_all(&mut self) -> Vec<Command> {
        let tags = self.submit_order.clone();
        let mut wire_needed = false;
        for id_tag in tags {
            let Some(record) = self.records.get_mut(&id_tag) else {
                continue;
            };
            if record.aborting {
                continue;
            }
            match record.dispatch {
                DispatchState::Pending => {
                    let shared = Arc::clone(&record.shared);
                    self.remove(id_tag);
                    shared.resolve(ActionOutcome::Aborted);
                }
                DispatchState::Sent | DispatchState::Running => {
                    record.aborting = true;
                    record.start_deadline = None;
                    wire_needed = true;
                }
            }
        }
        if wire_needed {
            info!("cancelling all in-flight actions");
            vec![Command::CancelAll]
        } else {
            Vec::new()
        }
    }

    /// 引擎确认动作开始执行
    pub fn on_action_started(&mut self, id_tag: u32) {
        match self.records.get_mut(&id_tag) {
            Some(record) => {
                debug!(id_tag, "action started");
                record.dispatch = DispatchState::Running;
                record.start_deadline = None;
                record.shared.mark_running();
            }
            None => {
                if is_sdk_action_tag(id_tag) {
                    warn!(id_tag, "started event for unknown SDK action");
                }
            }
        }
    }

    /// 引擎上报动作终态，返回后继排队动作的写线命令
    pub fn on_action_completed(
        &mut self,
        id_tag: u32,
        result: ActionResultCode,
        reason: &str,
        now: Instant,
    ) -> Vec<Command> {
        let Some(record) = self.records.get(&id_tag) else {
            // 引擎自身行为的完成事件会带非 SDK 区间的 id，属正常流量
            if is_sdk_action_tag(id_tag) {
                error!(id_tag, "completed event for unknown SDK action");
            }
            return Vec::new();
        };

        let was_aborting = record.aborting;
        let shared = Arc::clone(&record.shared);
        self.remove(id_tag);

        let outcome = match result {
            ActionResultCode::Success => ActionOutcome::Succeeded,
            ActionResultCode::Cancelled if was_aborting => ActionOutcome::Aborted,
            code => {
                let reason = if reason.is_empty() {
                    code.describe().to_string()
                } else {
                    reason.to_string()
                };
                ActionOutcome::Failed {
                    code: FailureCode::Engine(code),
                    reason,
                }
            }
        };
        debug!(id_tag, ?result, was_aborting, "action reached terminal state");
        shared.resolve(outcome);

        self.dispatch_ready(now)
    }

    /// 检查启动超时：已写线但超过窗口未获确认的动作本地判失败
    pub fn check_start_timeouts(&mut self, now: Instant) -> Vec<Command> {
        let expired: Vec<u32> = self
            .records
            .values()
            .filter(|r| {
                r.dispatch == DispatchState::Sent
                    && !r.aborting
                    && r.start_deadline.is_some_and(|deadline| now >= deadline)
            })
            .map(|r| r.id_tag)
            .collect();

        let mut commands = Vec::new();
        for id_tag in expired {
            warn!(id_tag, "no start acknowledgment within window");
            if let Some(record) = self.records.get(&id_tag) {
                let shared = Arc::clone(&record.shared);
                self.remove(id_tag);
                shared.resolve(ActionOutcome::Failed {
                    code: FailureCode::StartTimeout,
                    reason: "engine did not acknowledge action start".to_string(),
                });
            }
            commands.extend(self.dispatch_ready(now));
        }
        commands
    }

    /// 连接拆除：全部非终态动作以 ConnectionLost 失败
    pub fn fail_all_connection_lost(&mut self) {
        let records = std::mem::take(&mut self.records);
        self.submit_order.clear();
        if !records.is_empty() {
            warn!(count = records.len(), "failing in-flight actions: connection lost");
        }
        for (_, record) in records {
            record.shared.resolve(ActionOutcome::Failed {
                code: FailureCode::ConnectionLost,
                reason: "connection to the engine was lost".to_string(),
            });
        }
    }

    /// 把所有可以写线的排队动作发出去
    ///
    /// 一个 Pending 动作可写线的条件：与任何已写线/执行中/取消中
    /// 的动作不冲突，且不与更早提交、仍在 Pending 的动作冲突
    /// （保证冲突组内严格按提交顺序）。
    fn dispatch_ready(&mut self, now: Instant) -> Vec<Command> {
        let mut commands = Vec::new();
        let order = self.submit_order.clone();
        let mut earlier_pending_masks: Vec<ActuatorMask> = Vec::new();

        for id_tag in order {
            let mask = match self.records.get(&id_tag) {
                Some(record) if record.dispatch == DispatchState::Pending => record.mask,
                _ => continue,
            };

            let blocked_by_active = self.records.values().any(|other| {
                other.id_tag != id_tag
                    && other.dispatch != DispatchState::Pending
                    && other.mask.conflicts_with(mask)
            });
            let blocked_by_earlier =
                earlier_pending_masks.iter().any(|m| m.conflicts_with(mask));

            if blocked_by_active || blocked_by_earlier {
                earlier_pending_masks.push(mask);
                continue;
            }

            if let Some(record) = self.records.get_mut(&id_tag) {
                record.dispatch = DispatchState::Sent;
                record.start_deadline = Some(now + self.start_timeout);
                debug!(id_tag, "queue command written to link");
                commands.push(Command::QueueAction {
                    id_tag,
                    num_retries: record.num_retries,
                    action: record.spec.clone(),
                });
            }
        }
        commands
    }

    fn remove(&mut self, id_tag: u32) {
        self.records.remove(&id_tag);
        self.submit_order.retain(|tag| *tag != id_tag);
    }
}
