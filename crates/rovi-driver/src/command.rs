//! 引擎命令通道 - 客户端线程向调度循环提交工作的唯一入口
//!
//! 注册表与世界模型只在调度循环线程上修改；客户端的提交和取消
//! 打包成 `EngineCommand` 经 crossbeam 通道送入循环，由循环在
//! 两次链路轮询之间排空。链路写出也因此天然串行化。

use crate::actions::SubmitRequest;
use rovi_protocol::LightState;

/// 送往调度循环的命令
pub enum EngineCommand {
    /// 提交一个动作
    Submit(SubmitRequest),
    /// 请求协作取消指定序列 ID 的动作
    Cancel { id_tag: u32 },
    /// 请求协作取消全部在途动作
    CancelAll,
    /// 请求引擎推送一次导航地图全量
    RequestNavMap,
    /// 设置方块四角灯
    SetCubeLights {
        object_id: u32,
        lights: [LightState; 4],
    },
    /// 关闭会话：循环完成拆除后退出
    Shutdown,
}
