//! 动作句柄

use crossbeam_channel::Sender;
use rovi_driver::{ActionOutcome, ActionShared, ActionState, EngineCommand};
use std::sync::Arc;
use std::time::Duration;

/// 一次已提交动作的句柄
///
/// 句柄可丢弃：动作继续执行，终态随注册表解除。`wait` 只挂起
/// 调用线程，超时后动作仍在途，可再次等待或取消。
pub struct ActionHandle {
    id_tag: u32,
    shared: Arc<ActionShared>,
    cmd_tx: Sender<EngineCommand>,
}

impl ActionHandle {
    pub(crate) fn new(
        id_tag: u32,
        shared: Arc<ActionShared>,
        cmd_tx: Sender<EngineCommand>,
    ) -> Self {
        Self {
            id_tag,
            shared,
            cmd_tx,
        }
    }

    /// 动作序列 ID
    pub fn id_tag(&self) -> u32 {
        self.id_tag
    }

    /// 当前状态（无阻塞）
    pub fn state(&self) -> ActionState {
        self.shared.state()
    }

    /// 已有终态则返回其副本（无阻塞）
    pub fn outcome(&self) -> Option<ActionOutcome> {
        self.shared.outcome()
    }

    /// 阻塞等待终态，最多 `timeout`；超时返回 `None`
    pub fn wait(&self, timeout: Duration) -> Option<ActionOutcome> {
        self.shared.wait(timeout)
    }

    /// 请求协作取消
    ///
    /// 立即返回；动作保持非终态直到引擎确认（或本地排队动作
    /// 直接终结）。对终态动作是无操作。会话已结束时同样是
    /// 无操作（动作此时已以连接丢失解除）。
    pub fn cancel(&self) {
        let _ = self.cmd_tx.send(EngineCommand::Cancel {
            id_tag: self.id_tag,
        });
    }
}
