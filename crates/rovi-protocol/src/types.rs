//! 协议共享类型定义
//!
//! 位姿、实体类别、执行器掩码等在命令和事件两侧共用的类型。

use serde::{Deserialize, Serialize};

/// 机器人坐标系下的位姿
///
/// 位置单位毫米，朝向为绕 Z 轴的偏航角（弧度）。
/// 引擎在重定位（delocalization）后会重置坐标原点，
/// 位姿只在同一原点序号内可比。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x_mm: f32,
    pub y_mm: f32,
    pub z_mm: f32,
    /// 偏航角（弧度）
    pub angle_rad: f32,
    /// 坐标原点序号（重定位后递增）
    pub origin_id: u32,
}

impl Pose {
    pub fn new(x_mm: f32, y_mm: f32, z_mm: f32, angle_rad: f32) -> Self {
        Self {
            x_mm,
            y_mm,
            z_mm,
            angle_rad,
            origin_id: 0,
        }
    }

    /// 与另一位姿的平面欧氏距离（毫米）
    pub fn distance_to(&self, other: &Pose) -> f32 {
        let dx = self.x_mm - other.x_mm;
        let dy = self.y_mm - other.y_mm;
        (dx * dx + dy * dy).sqrt()
    }

    /// 是否与另一位姿可比（同一坐标原点）
    pub fn is_comparable(&self, other: &Pose) -> bool {
        self.origin_id == other.origin_id
    }
}

/// 可观测物体类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectFamily {
    /// 发光方块（可被举起/堆叠）
    LightCube,
    /// 充电座
    Charger,
    /// 用户自定义标记物
    CustomMarker,
}

/// 宠物类别（来自视觉识别）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PetKind {
    Cat,
    Dog,
    Unknown,
}

/// 实体关联键
///
/// 世界模型用它把重复观测归并到同一个稳定实体：
/// 同一关联键的观测永远落到同一个实体记录上。
/// 各类观测来源的 ID 空间相互独立，因此键里必须带上来源类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKey {
    Object { family: ObjectFamily, object_id: u32 },
    Face { face_id: u32 },
    Pet { pet_id: u32 },
}

/// 执行器占用掩码
///
/// 每个动作声明它占用的物理子系统；两掩码相交非空即视为冲突，
/// 同一时刻冲突动作只能有一个在机器人上执行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActuatorMask(pub u8);

impl ActuatorMask {
    /// 空掩码（与任何动作都不冲突）
    pub const NONE: ActuatorMask = ActuatorMask(0);
    /// 轮组
    pub const WHEELS: ActuatorMask = ActuatorMask(0b0001);
    /// 升降臂
    pub const LIFT: ActuatorMask = ActuatorMask(0b0010);
    /// 头部
    pub const HEAD: ActuatorMask = ActuatorMask(0b0100);
    /// 语音
    pub const SPEECH: ActuatorMask = ActuatorMask(0b1000);
    /// 整机（行为/动画占用全部机械子系统）
    pub const BODY: ActuatorMask = ActuatorMask(0b0111);

    /// 两个掩码是否冲突（占用集合相交）
    #[inline]
    pub fn conflicts_with(&self, other: ActuatorMask) -> bool {
        self.0 & other.0 != 0
    }

    /// 合并两个掩码
    #[inline]
    pub fn union(&self, other: ActuatorMask) -> ActuatorMask {
        ActuatorMask(self.0 | other.0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for ActuatorMask {
    type Output = ActuatorMask;

    fn bitor(self, rhs: ActuatorMask) -> ActuatorMask {
        self.union(rhs)
    }
}

/// 方块单角灯状态
///
/// 引擎在 `on_color` 与 `off_color` 之间按周期切换；
/// `off_period_ms` 为 0 即常亮 `on_color`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    pub on_color: [u8; 3],
    pub off_color: [u8; 3],
    pub on_period_ms: u32,
    pub off_period_ms: u32,
}

impl LightState {
    /// 常亮指定颜色
    pub fn steady(color: [u8; 3]) -> Self {
        Self {
            on_color: color,
            off_color: color,
            on_period_ms: 1000,
            off_period_ms: 0,
        }
    }

    /// 按给定周期在颜色与熄灭之间闪烁
    pub fn blink(color: [u8; 3], on_period_ms: u32, off_period_ms: u32) -> Self {
        Self {
            on_color: color,
            off_color: [0, 0, 0],
            on_period_ms,
            off_period_ms,
        }
    }

    /// 熄灭
    pub fn off() -> Self {
        Self::steady([0, 0, 0])
    }
}
