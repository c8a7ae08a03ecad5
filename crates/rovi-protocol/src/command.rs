//! SDK → 引擎 出站命令定义
//!
//! 命令是不可变值对象，由会话层构造、调度循环统一编码发送。

use crate::types::{ActuatorMask, LightState, Pose};
use serde::{Deserialize, Serialize};

/// 动作规格
///
/// 描述一个可排队执行的高层动作。每种动作声明默认的执行器占用掩码，
/// 提交时可被调用方覆盖（见 `default_mask`）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionSpec {
    /// 朗读一段文本
    SayText {
        text: String,
        /// 音高调制（0.0 为默认音色）
        voice_pitch: f32,
        /// 播放速率倍率
        duration_scalar: f32,
    },
    /// 直线行驶
    DriveStraight {
        distance_mm: f32,
        speed_mmps: f32,
        /// 行驶时是否播放行进动画
        should_play_anim: bool,
    },
    /// 行驶到目标位姿
    GoToPose { pose: Pose },
    /// 原地转向
    TurnInPlace { angle_rad: f32, speed_rad_per_sec: f32 },
    /// 设置升降臂高度（0.0 最低 ~ 1.0 最高）
    SetLiftHeight { height_ratio: f32 },
    /// 设置头部俯仰角
    SetHeadAngle { angle_rad: f32 },
    /// 拾取指定物体
    PickupObject { object_id: u32, use_pre_dock_pose: bool },
    /// 将携带的物体放到地面
    PlaceObjectOnGround,
    /// 播放具名动画
    PlayAnimation { name: String, loop_count: u32 },
    /// 启动具名行为
    StartBehavior { name: String },
}

impl ActionSpec {
    /// 该动作默认占用的执行器掩码
    ///
    /// 语音只占用扬声器通道，可与任何机械动作并行；
    /// 动画和行为会驱动全部机械子系统，因此占用整机掩码。
    pub fn default_mask(&self) -> ActuatorMask {
        match self {
            ActionSpec::SayText { .. } => ActuatorMask::SPEECH,
            ActionSpec::DriveStraight { .. }
            | ActionSpec::GoToPose { .. }
            | ActionSpec::TurnInPlace { .. } => ActuatorMask::WHEELS,
            ActionSpec::SetLiftHeight { .. } => ActuatorMask::LIFT,
            ActionSpec::SetHeadAngle { .. } => ActuatorMask::HEAD,
            // 对接取放需要整机配合（移动 + 升降臂 + 低头对准标记）
            ActionSpec::PickupObject { .. } | ActionSpec::PlaceObjectOnGround => {
                ActuatorMask::BODY
            }
            ActionSpec::PlayAnimation { .. } | ActionSpec::StartBehavior { .. } => {
                ActuatorMask::BODY
            }
        }
    }

    /// 动作种类名（用于日志）
    pub fn kind_name(&self) -> &'static str {
        match self {
            ActionSpec::SayText { .. } => "say_text",
            ActionSpec::DriveStraight { .. } => "drive_straight",
            ActionSpec::GoToPose { .. } => "go_to_pose",
            ActionSpec::TurnInPlace { .. } => "turn_in_place",
            ActionSpec::SetLiftHeight { .. } => "set_lift_height",
            ActionSpec::SetHeadAngle { .. } => "set_head_angle",
            ActionSpec::PickupObject { .. } => "pickup_object",
            ActionSpec::PlaceObjectOnGround => "place_object_on_ground",
            ActionSpec::PlayAnimation { .. } => "play_animation",
            ActionSpec::StartBehavior { .. } => "start_behavior",
        }
    }
}

/// 出站命令
///
/// 除 `Ping` 外均由会话/调度层产生；所有命令经由调度循环的
/// 单一发送路径写入链路，保证帧边界不被并发写破坏。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// 心跳（引擎发起的 ping 以 `is_response=true` 回应；
    /// SDK 周期性保活 ping 以 `is_response=false` 发出）
    Ping {
        counter: u32,
        time_sent_ms: u64,
        is_response: bool,
    },
    /// 握手应答（版本校验通过后发送，之后才允许应用消息）
    ConnectAck {
        sdk_build_version: String,
        protocol_version: u32,
    },
    /// 将动作入引擎执行队列
    QueueAction {
        /// 动作序列 ID（SDK 区间内单调递增）
        id_tag: u32,
        num_retries: u32,
        action: ActionSpec,
    },
    /// 按序列 ID 取消动作（协作式：真正的终态以完成事件为准）
    CancelActionByTag { id_tag: u32 },
    /// 取消全部 SDK 动作
    CancelAll,
    /// 请求引擎重发完整导航地图
    RequestNavMap,
    /// 设置方块四角灯（即时生效，不占用动作队列）
    SetCubeLights {
        object_id: u32,
        lights: [LightState; 4],
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试默认掩码：语音与轮组不冲突
    #[test]
    fn test_default_masks_disjoint() {
        let say = ActionSpec::SayText {
            text: "hello".into(),
            voice_pitch: 0.0,
            duration_scalar: 1.0,
        };
        let drive = ActionSpec::DriveStraight {
            distance_mm: 100.0,
            speed_mmps: 50.0,
            should_play_anim: false,
        };
        assert!(!say.default_mask().conflicts_with(drive.default_mask()));
    }

    /// 测试默认掩码：行为与一切机械动作冲突
    #[test]
    fn test_behavior_mask_conflicts_with_mechanical() {
        let behavior = ActionSpec::StartBehavior {
            name: "look_around".into(),
        };
        let lift = ActionSpec::SetLiftHeight { height_ratio: 1.0 };
        assert!(behavior.default_mask().conflicts_with(lift.default_mask()));
    }
}
