//! 引擎 → SDK 入站事件定义
//!
//! 每条链路帧解码为至多一个事件。事件按线序进入调度循环，
//! 循环保证世界模型更新与动作状态迁移观测到同一顺序。

use crate::types::{EntityKey, ObjectFamily, PetKind, Pose};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// 动作完成结果码
///
/// 与引擎完成事件的结果字段一一对应；SDK 将其归并为
/// 成功 / 失败（带原因）/ 中止 三类终态。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum ActionResultCode {
    Success = 0,
    /// 显式取消（SDK 或引擎侧）
    Cancelled = 1,
    /// 被更高优先级行为打断
    Interrupted = 2,
    /// 引擎侧执行超时
    Timeout = 3,
    /// 可重试失败（路径被挡等）
    Retry = 4,
    /// 达到最大重试次数后放弃
    Abort = 5,
    /// 动作从未开始执行
    NotStarted = 6,
    /// 所需执行器轨道被锁定
    TracksLocked = 7,
    /// 引擎不认识该动作标签
    BadTag = 8,
    Unknown = 255,
}

impl ActionResultCode {
    /// 人类可读的失败原因（用于终态上报与日志）
    pub fn describe(&self) -> &'static str {
        match self {
            ActionResultCode::Success => "completed successfully",
            ActionResultCode::Cancelled => "action was cancelled",
            ActionResultCode::Interrupted => "action was interrupted",
            ActionResultCode::Timeout => "the action timed out",
            ActionResultCode::Retry => "action failed and may be retried",
            ActionResultCode::Abort => "reached maximum retries for action",
            ActionResultCode::NotStarted => "the action was not started",
            ActionResultCode::TracksLocked => "action failed due to tracks locked",
            ActionResultCode::BadTag => "action failed due to bad tag",
            ActionResultCode::Unknown => "action failed with unknown reason",
        }
    }
}

/// 导航地图单元内容
///
/// 内容携带的信息不是占用概率，而是该处「是什么」。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavCellContent {
    /// 未探索
    Unknown,
    /// 已确认无障碍
    ClearOfObstacle,
    /// 已确认无悬崖
    ClearOfCliff,
    /// 障碍：方块
    ObstacleCube,
    /// 障碍：充电座
    ObstacleCharger,
    /// 悬崖（桌面边缘等）
    Cliff,
    /// 视觉上值得探索的边缘
    InterestingEdge,
}

/// 单个导航地图单元更新（量化平面坐标）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavMapCell {
    pub tile_x: i32,
    pub tile_y: i32,
    pub content: NavCellContent,
}

/// 一次实体观测
///
/// 关联键保证同一物理实体的重复观测归并到同一记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedEntity {
    pub key: EntityKey,
    pub pose: Pose,
    /// 机器人时钟下的观测时间戳（毫秒）
    pub observed_at_ms: u64,
    /// 人脸观测附带的已注册姓名（未注册为空）
    pub face_name: Option<String>,
}

impl ObservedEntity {
    pub fn object(family: ObjectFamily, object_id: u32, pose: Pose, observed_at_ms: u64) -> Self {
        Self {
            key: EntityKey::Object { family, object_id },
            pose,
            observed_at_ms,
            face_name: None,
        }
    }

    pub fn face(face_id: u32, name: Option<String>, pose: Pose, observed_at_ms: u64) -> Self {
        Self {
            key: EntityKey::Face { face_id },
            pose,
            observed_at_ms,
            face_name: name,
        }
    }

}

/// 入站事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// 心跳（引擎发起，SDK 需回应；引擎据回应累计延迟统计）
    Ping {
        counter: u32,
        time_sent_ms: u64,
        is_response: bool,
    },
    /// 握手首包：引擎自述版本信息
    ConnectionInfo {
        protocol_version: u32,
        build_version: String,
        device_id: u32,
    },
    /// 动作开始执行确认（按序列 ID 关联）
    ActionStarted { id_tag: u32 },
    /// 动作终态（按序列 ID 关联）
    ActionCompleted {
        id_tag: u32,
        result: ActionResultCode,
        /// 引擎附带的补充原因（可为空）
        reason: String,
    },
    /// 观测到物体（方块/充电座/自定义标记）
    ObjectObserved(ObservedEntity),
    /// 观测到人脸
    FaceObserved(ObservedEntity),
    /// 观测到宠物（宠物观测不带位姿）
    PetObserved { pet_id: u32, kind: PetKind, observed_at_ms: u64 },
    /// 周期机器人状态
    RobotState {
        pose: Pose,
        battery_volts: f32,
        lift_ratio: f32,
        head_angle_rad: f32,
        /// 正携带的物体 ID（未携带为 None）
        carrying_object_id: Option<u32>,
        timestamp_ms: u64,
    },
    /// 导航地图增量更新
    NavMapUpdate {
        origin_id: u32,
        /// 单元边长（毫米）
        tile_size_mm: f32,
        cells: Vec<NavMapCell>,
    },
    /// 机器人重定位（被拿起/坠落后坐标系失效）
    RobotDelocalized,
    /// 连接丢失（调度循环本地合成，不经线路传输）
    ConnectionLost,
}

impl Event {
    /// 事件类别（订阅注册表的键）
    pub fn category(&self) -> EventCategory {
        match self {
            Event::Ping { .. } => EventCategory::Connection,
            Event::ConnectionInfo { .. } => EventCategory::Connection,
            Event::ActionStarted { .. } | Event::ActionCompleted { .. } => EventCategory::Action,
            Event::ObjectObserved(_) => EventCategory::Object,
            Event::FaceObserved(_) => EventCategory::Face,
            Event::PetObserved { .. } => EventCategory::Pet,
            Event::RobotState { .. } => EventCategory::RobotState,
            Event::NavMapUpdate { .. } => EventCategory::NavMap,
            Event::RobotDelocalized => EventCategory::RobotState,
            Event::ConnectionLost => EventCategory::Connection,
        }
    }
}

/// 事件类别
///
/// 持久监听器按类别订阅；`Connection` 类别额外承载
/// 连接丢失等由调度循环本地合成的通知。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Connection,
    Action,
    Object,
    Face,
    Pet,
    RobotState,
    NavMap,
}
