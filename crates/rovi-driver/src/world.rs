//! 世界模型 - 观测实体与机器人状态的唯一权威存储
//!
//! 存储只被调度循环单线程修改（单写者不变量），其他线程通过
//! `ArcSwap` 发布的不可变快照读取：读取方拿到的是某一时刻的
//! 完整一致视图，绝不会看到半更新的实体，也不会在持锁状态下
//! 执行用户逻辑。
//!
//! 实体身份在连接生命周期内稳定：同一关联键的重复观测永远
//! 归并到同一 `EntityId`。实体从不被静默删除——观测停止后
//! 只会被可见性扫描标记为不可见，末次位姿保留给规划连续性。

use crate::nav_map::NavMap;
use arc_swap::ArcSwap;
use rovi_protocol::{EntityKey, ObjectFamily, ObservedEntity, PetKind, Pose};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// 连接内稳定的实体标识（首次观测时分配，单调递增）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

/// 实体种类
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    LightCube,
    Charger,
    CustomMarker,
    Face {
        /// 已注册的姓名（未注册为空）
        name: Option<String>,
    },
    Pet {
        kind: PetKind,
    },
}

impl EntityKind {
    pub fn is_cube(&self) -> bool {
        matches!(self, EntityKind::LightCube)
    }

    pub fn is_face(&self) -> bool {
        matches!(self, EntityKind::Face { .. })
    }

    pub fn is_pet(&self) -> bool {
        matches!(self, EntityKind::Pet { .. })
    }
}

/// 世界模型中的一条实体记录
#[derive(Debug, Clone, PartialEq)]
pub struct WorldEntity {
    pub id: EntityId,
    pub key: EntityKey,
    pub kind: EntityKind,
    /// 末次观测位姿（宠物观测不带位姿，保持默认值）
    pub pose: Pose,
    /// 机器人时钟下的末次观测时间戳（毫秒）
    pub observed_at_ms: u64,
    /// 当前是否可见（可见性窗口内有新观测）
    pub visible: bool,
    /// 累计观测次数（只增不减）
    pub observation_count: u64,
}

/// 发布给并发读取方的世界快照
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    /// 快照序号（每次发布递增，便于读取方判断新旧）
    pub seq: u64,
    /// 全部已知实体（按 id 升序）
    pub entities: Vec<WorldEntity>,
    pub nav_map: NavMap,
    pub robot_pose: Pose,
    pub battery_volts: f32,
    pub lift_ratio: f32,
    pub head_angle_rad: f32,
    pub carrying_object_id: Option<u32>,
    /// 末次机器人状态帧的时间戳（毫秒）
    pub last_robot_state_ms: u64,
}

impl WorldState {
    /// 满足谓词的实体（可见与否均计入）
    pub fn entities_matching<'a>(
        &'a self,
        predicate: impl Fn(&WorldEntity) -> bool + 'a,
    ) -> impl Iterator<Item = &'a WorldEntity> {
        self.entities.iter().filter(move |e| predicate(e))
    }

    /// 当前可见实体
    pub fn visible_entities(&self) -> impl Iterator<Item = &WorldEntity> {
        self.entities.iter().filter(|e| e.visible)
    }

    pub fn entity_by_id(&self, id: EntityId) -> Option<&WorldEntity> {
        self.entities.iter().find(|e| e.id == id)
    }
}

/// 世界模型存储（仅调度循环持有可变引用）
pub struct WorldStore {
    entities: HashMap<EntityKey, WorldEntity>,
    /// 宿主时钟下的末次观测时刻（可见性扫描用，不进快照）
    last_seen: HashMap<EntityId, Instant>,
    next_entity_id: u32,
    nav_map: NavMap,
    robot_pose: Pose,
    battery_volts: f32,
    lift_ratio: f32,
    head_angle_rad: f32,
    carrying_object_id: Option<u32>,
    last_robot_state_ms: u64,
    seq: u64,
    visibility_window: Duration,
    /// 发布槽（读取方经 ArcSwap 无锁加载）
    published: Arc<ArcSwap<WorldState>>,
}

impl WorldStore {
    pub fn new(visibility_window: Duration, published: Arc<ArcSwap<WorldState>>) -> Self {
        Self {
            entities: HashMap::new(),
            last_seen: HashMap::new(),
            next_entity_id: 1,
            nav_map: NavMap::new(),
            robot_pose: Pose::default(),
            battery_volts: 0.0,
            lift_ratio: 0.0,
            head_angle_rad: 0.0,
            carrying_object_id: None,
            last_robot_state_ms: 0,
            seq: 0,
            visibility_window,
            published,
        }
    }

    /// 处理一次实体观测（upsert）
    ///
    /// 旧于已应用时间戳的观测被忽略（乱序到达的陈旧帧）。
    /// 返回本次观测归并到的实体 id；陈旧观测返回 `None`。
    pub fn on_observed(&mut self, update: &ObservedEntity, now: Instant) -> Option<EntityId> {
        if let Some(existing) = self.entities.get_mut(&update.key) {
            if update.observed_at_ms < existing.observed_at_ms {
                trace!(
                    id = existing.id.0,
                    stale_ms = update.observed_at_ms,
                    applied_ms = existing.observed_at_ms,
                    "ignoring stale observation"
                );
                return None;
            }
            existing.pose = update.pose;
            existing.observed_at_ms = update.observed_at_ms;
            existing.visible = true;
            existing.observation_count += 1;
            if let (EntityKind::Face { name }, Some(new_name)) =
                (&mut existing.kind, update.face_name.clone())
            {
                *name = Some(new_name);
            }
            let id = existing.id;
            self.last_seen.insert(id, now);
            Some(id)
        } else {
            let id = EntityId(self.next_entity_id);
            self.next_entity_id += 1;
            let kind = match update.key {
                EntityKey::Object { family, .. } => match family {
                    ObjectFamily::LightCube => EntityKind::LightCube,
                    ObjectFamily::Charger => EntityKind::Charger,
                    ObjectFamily::CustomMarker => EntityKind::CustomMarker,
                },
                EntityKey::Face { .. } => EntityKind::Face {
                    name: update.face_name.clone(),
                },
                // 宠物观测经 on_observed_pet 进入，这里兜底为 Unknown
                EntityKey::Pet { .. } => EntityKind::Pet {
                    kind: PetKind::Unknown,
                },
            };
            info!(id = id.0, key = ?update.key, "new world entity");
            self.entities.insert(
                update.key,
                WorldEntity {
                    id,
                    key: update.key,
                    kind,
                    pose: update.pose,
                    observed_at_ms: update.observed_at_ms,
                    visible: true,
                    observation_count: 1,
                },
            );
            self.last_seen.insert(id, now);
            Some(id)
        }
    }

    /// 处理一次宠物观测（不带位姿）
    pub fn on_observed_pet(
        &mut self,
        pet_id: u32,
        kind: PetKind,
        observed_at_ms: u64,
        now: Instant,
    ) -> Option<EntityId> {
        let key = EntityKey::Pet { pet_id };
        let id = self.on_observed(
            &ObservedEntity {
                key,
                pose: Pose::default(),
                observed_at_ms,
                face_name: None,
            },
            now,
        )?;
        // 识别结果可能随观测细化（Unknown → Cat/Dog）
        if let Some(entity) = self.entities.get_mut(&key) {
            if kind != PetKind::Unknown {
                entity.kind = EntityKind::Pet { kind };
            }
        }
        Some(id)
    }

    /// 处理周期机器人状态帧
    pub fn on_robot_state(
        &mut self,
        pose: Pose,
        battery_volts: f32,
        lift_ratio: f32,
        head_angle_rad: f32,
        carrying_object_id: Option<u32>,
        timestamp_ms: u64,
    ) {
        self.robot_pose = pose;
        self.battery_volts = battery_volts;
        self.lift_ratio = lift_ratio;
        self.head_angle_rad = head_angle_rad;
        self.carrying_object_id = carrying_object_id;
        self.last_robot_state_ms = timestamp_ms;
    }

    /// 合并导航地图增量
    pub fn on_nav_map_update(
        &mut self,
        origin_id: u32,
        tile_size_mm: f32,
        cells: &[rovi_protocol::NavMapCell],
    ) {
        self.nav_map.apply_update(origin_id, tile_size_mm, cells);
    }

    /// 可见性扫描：窗口内无新观测的实体标记为不可见
    ///
    /// 实体从不删除；返回是否有实体状态变化（变化才需要重新发布）。
    pub fn visibility_sweep(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for entity in self.entities.values_mut() {
            if !entity.visible {
                continue;
            }
            let last = self.last_seen.get(&entity.id).copied();
            let expired = match last {
                Some(seen) => now.duration_since(seen) >= self.visibility_window,
                None => true,
            };
            if expired {
                debug!(id = entity.id.0, "entity visibility expired");
                entity.visible = false;
                changed = true;
            }
        }
        changed
    }

    /// 重定位：位姿坐标系失效，全部实体转为不可见
    ///
    /// 末次位姿仍保留（旧坐标系内自洽），由读取方结合 origin 判断。
    pub fn on_delocalized(&mut self) {
        info!("robot delocalized; marking all entities not visible");
        for entity in self.entities.values_mut() {
            entity.visible = false;
        }
    }

    /// 连接拆除：全部实体标记不可见（§拆除路径）
    pub fn mark_all_invisible(&mut self) {
        for entity in self.entities.values_mut() {
            entity.visible = false;
        }
    }

    /// 发布新快照供并发读取方加载
    pub fn publish(&mut self) {
        self.seq += 1;
        let mut entities: Vec<WorldEntity> = self.entities.values().cloned().collect();
        entities.sort_by_key(|e| e.id);
        let state = WorldState {
            seq: self.seq,
            entities,
            nav_map: self.nav_map.clone(),
            robot_pose: self.robot_pose,
            battery_volts: self.battery_volts,
            lift_ratio: self.lift_ratio,
            head_angle_rad: self.head_angle_rad,
            carrying_object_id: self.carrying_object_id,
            last_robot_state_ms: self.last_robot_state_ms,
        };
        self.published.store(Arc::new(state));
    }

    /// 已知实体总数
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(window_ms: u64) -> (WorldStore, Arc<ArcSwap<WorldState>>) {
        let published = Arc::new(ArcSwap::from_pointee(WorldState::default()));
        (
            WorldStore::new(Duration::from_millis(window_ms), Arc::clone(&published)),
            published,
        )
    }

    fn cube_obs(object_id: u32, observed_at_ms: u64) -> ObservedEntity {
        ObservedEntity::object(
            ObjectFamily::LightCube,
            object_id,
            Pose::new(observed_at_ms as f32, 0.0, 0.0, 0.0),
            observed_at_ms,
        )
    }

    /// 测试同一关联键的重复观测保持实体身份稳定
    #[test]
    fn test_identity_stable_across_observations() {
        let (mut store, _) = store(1000);
        let now = Instant::now();
        let first = store.on_observed(&cube_obs(5, 100), now).unwrap();
        let second = store.on_observed(&cube_obs(5, 200), now).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.entity_count(), 1);

        // 不同键分配新 id
        let other = store.on_observed(&cube_obs(6, 200), now).unwrap();
        assert_ne!(first, other);
        assert_eq!(store.entity_count(), 2);
    }

    /// 测试陈旧观测被忽略，位姿不回退
    #[test]
    fn test_stale_observation_ignored() {
        let (mut store, published) = store(1000);
        let now = Instant::now();
        store.on_observed(&cube_obs(5, 200), now).unwrap();
        assert!(store.on_observed(&cube_obs(5, 150), now).is_none());
        store.publish();
        let snap = published.load();
        assert_eq!(snap.entities[0].observed_at_ms, 200);
        assert_eq!(snap.entities[0].observation_count, 1);
    }

    /// 测试可见性衰减：窗口外标记不可见但不删除
    #[test]
    fn test_visibility_sweep_marks_not_visible() {
        let (mut store, published) = store(10);
        let t0 = Instant::now();
        store.on_observed(&cube_obs(1, 100), t0).unwrap();

        // 窗口内不衰减
        assert!(!store.visibility_sweep(t0 + Duration::from_millis(5)));
        // 窗口外衰减，末次位姿保留
        assert!(store.visibility_sweep(t0 + Duration::from_millis(20)));
        store.publish();
        let snap = published.load();
        assert_eq!(snap.entities.len(), 1);
        assert!(!snap.entities[0].visible);
        assert_eq!(snap.entities[0].pose.x_mm, 100.0);

        // 再次观测恢复可见
        store
            .on_observed(&cube_obs(1, 300), t0 + Duration::from_millis(30))
            .unwrap();
        store.publish();
        assert!(published.load().entities[0].visible);
    }

    /// 测试观测计数单调累积
    #[test]
    fn test_observation_count_monotonic() {
        let (mut store, published) = store(1000);
        let now = Instant::now();
        for ms in [100u64, 200, 300] {
            store.on_observed(&cube_obs(9, ms), now).unwrap();
        }
        store.publish();
        assert_eq!(published.load().entities[0].observation_count, 3);
    }

    /// 测试人脸姓名随观测细化
    #[test]
    fn test_face_name_refined() {
        let (mut store, published) = store(1000);
        let now = Instant::now();
        store
            .on_observed(&ObservedEntity::face(3, None, Pose::default(), 100), now)
            .unwrap();
        store
            .on_observed(
                &ObservedEntity::face(3, Some("nadia".into()), Pose::default(), 200),
                now,
            )
            .unwrap();
        store.publish();
        let snap = published.load();
        assert_eq!(
            snap.entities[0].kind,
            EntityKind::Face {
                name: Some("nadia".into())
            }
        );
    }

    /// 测试宠物识别结果细化
    #[test]
    fn test_pet_kind_refined() {
        let (mut store, _) = store(1000);
        let now = Instant::now();
        let id = store
            .on_observed_pet(1, PetKind::Unknown, 100, now)
            .unwrap();
        store.on_observed_pet(1, PetKind::Cat, 200, now).unwrap();
        store.publish();
        let entity = store.entities.values().find(|e| e.id == id).unwrap();
        assert_eq!(entity.kind, EntityKind::Pet { kind: PetKind::Cat });
    }

    /// 测试快照序号递增且读取方看到完整视图
    #[test]
    fn test_snapshot_seq_and_isolation() {
        let (mut store, published) = store(1000);
        let now = Instant::now();
        store.on_observed(&cube_obs(1, 100), now).unwrap();
        store.publish();
        let snap1 = published.load_full();
        store.on_observed(&cube_obs(2, 200), now).unwrap();
        store.publish();
        let snap2 = published.load_full();

        // 旧快照不受后续变更影响
        assert_eq!(snap1.entities.len(), 1);
        assert_eq!(snap2.entities.len(), 2);
        assert!(snap2.seq > snap1.seq);
    }

    /// 测试重定位标记全部不可见
    #[test]
    fn test_delocalized_marks_invisible() {
        let (mut store, _) = store(1000);
        let now = Instant::now();
        store.on_observed(&cube_obs(1, 100), now).unwrap();
        store.on_observed(&cube_obs(2, 100), now).unwrap();
        store.on_delocalized();
        assert!(store.entities.values().all(|e| !e.visible));
        assert_eq!(store.entity_count(), 2);
    }
}
