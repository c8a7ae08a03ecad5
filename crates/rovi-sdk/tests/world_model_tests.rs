//! 世界模型集成测试
//!
//! 覆盖观测归并、可见性衰减、计数等待的缺口语义、导航地图
//! 与重定位。

mod common;

use common::MockEngine;
use rovi_protocol::{
    Event, NavCellContent, NavMapCell, ObjectFamily, ObservedEntity, PetKind, Pose,
};
use rovi_sdk::prelude::*;
use std::time::Duration;

fn cube(object_id: u32, observed_at_ms: u64) -> Event {
    Event::ObjectObserved(ObservedEntity::object(
        ObjectFamily::LightCube,
        object_id,
        Pose::new(observed_at_ms as f32, 0.0, 0.0, 0.0),
        observed_at_ms,
    ))
}

/// 测试观测出现在快照中且可等待
#[test]
fn test_observation_reaches_snapshot() {
    let (session, mut engine) = MockEngine::start(|b| b);
    let world = session.world();
    engine.send(&cube(5, 100));

    let entity = world
        .wait_for_entity(|e| e.kind.is_cube(), Duration::from_secs(2))
        .unwrap()
        .expect("cube should become visible");
    assert!(entity.visible);
    assert_eq!(entity.pose.x_mm, 100.0);
    session.close();
}

/// 测试同一物体的重复观测归并到同一实体
#[test]
fn test_repeat_observation_merges() {
    let (session, mut engine) = MockEngine::start(|b| b);
    let world = session.world();
    engine.send(&cube(5, 100));
    engine.send(&cube(5, 200));

    let entity = world
        .wait_for_entity(
            |e| e.kind.is_cube() && e.observation_count >= 2,
            Duration::from_secs(2),
        )
        .unwrap()
        .expect("merged cube entity");
    assert_eq!(world.entity_count(), 1);
    assert_eq!(entity.observed_at_ms, 200);
    session.close();
}

/// 测试陈旧观测不回退实体状态
#[test]
fn test_stale_observation_ignored() {
    let (session, mut engine) = MockEngine::start(|b| b);
    let world = session.world();
    engine.send(&cube(5, 200));
    world
        .wait_for_entity(|e| e.kind.is_cube(), Duration::from_secs(2))
        .unwrap()
        .expect("cube visible");

    // 乱序到达的旧帧
    engine.send(&cube(5, 150));
    engine.send(&cube(6, 300));
    world
        .wait_for_entity(
            |e| matches!(e.key, rovi_protocol::EntityKey::Object { object_id: 6, .. }),
            Duration::from_secs(2),
        )
        .unwrap()
        .expect("second cube visible");

    let snapshot = world.snapshot();
    let first = snapshot
        .entities
        .iter()
        .find(|e| matches!(e.key, rovi_protocol::EntityKey::Object { object_id: 5, .. }))
        .expect("first cube retained");
    assert_eq!(first.observed_at_ms, 200);
    assert_eq!(first.observation_count, 1);
    session.close();
}

/// 测试可见性衰减：停止观测后标记不可见但实体保留
#[test]
fn test_visibility_decay_retains_entity() {
    let (session, mut engine) = MockEngine::start(|b| {
        b.visibility_window(Duration::from_millis(100))
    });
    let world = session.world();
    engine.send(&cube(5, 100));
    world
        .wait_for_entity(|e| e.kind.is_cube(), Duration::from_secs(2))
        .unwrap()
        .expect("cube visible");

    // 窗口过后实体转为不可见，末次位姿保留
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        let snapshot = world.snapshot();
        if snapshot.visible_entities().count() == 0 {
            assert_eq!(snapshot.entities.len(), 1);
            assert_eq!(snapshot.entities[0].pose.x_mm, 100.0);
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "visibility should decay"
        );
        std::thread::sleep(Duration::from_millis(20));
    }
    session.close();
}

/// 测试计数等待：达标返回匹配列表
#[test]
fn test_wait_until_count_satisfied() {
    let (session, mut engine) = MockEngine::start(|b| b);
    let world = session.world();
    engine.send(&cube(1, 100));
    engine.send(&cube(2, 100));

    let cubes = world
        .wait_until_count(2, |e| e.kind.is_cube(), Duration::from_secs(2))
        .unwrap();
    assert_eq!(cubes.len(), 2);
    session.close();
}

/// 测试计数等待超时不是错误：返回缺口列表
#[test]
fn test_wait_until_count_shortfall() {
    let (session, mut engine) = MockEngine::start(|b| b);
    let world = session.world();
    engine.send(&cube(1, 100));

    let cubes = world
        .wait_until_count(3, |e| e.kind.is_cube(), Duration::from_millis(300))
        .unwrap();
    assert_eq!(cubes.len(), 1);
    session.close();
}

/// 测试导航地图增量合并与坐标查询
#[test]
fn test_nav_map_updates() {
    let (session, mut engine) = MockEngine::start(|b| b);
    let world = session.world();
    let waiter = session.wait_for_event(|e| matches!(e, Event::NavMapUpdate { .. }));
    engine.send(&Event::NavMapUpdate {
        origin_id: 1,
        tile_size_mm: 10.0,
        cells: vec![
            NavMapCell {
                tile_x: 0,
                tile_y: 0,
                content: NavCellContent::ClearOfObstacle,
            },
            NavMapCell {
                tile_x: 3,
                tile_y: 0,
                content: NavCellContent::Cliff,
            },
        ],
    });
    waiter.wait(Duration::from_secs(2)).unwrap();

    assert_eq!(
        world.nav_content_at(5.0, 5.0),
        NavCellContent::ClearOfObstacle
    );
    assert_eq!(world.nav_content_at(35.0, 5.0), NavCellContent::Cliff);
    assert_eq!(world.nav_content_at(-50.0, -50.0), NavCellContent::Unknown);
    session.close();
}

/// 测试机器人状态帧进入快照
#[test]
fn test_robot_state_in_snapshot() {
    let (session, mut engine) = MockEngine::start(|b| b);
    let world = session.world();
    let waiter = session.wait_for_event(|e| matches!(e, Event::RobotState { .. }));
    engine.send(&Event::RobotState {
        pose: Pose::new(10.0, 20.0, 0.0, 0.5),
        battery_volts: 3.9,
        lift_ratio: 0.5,
        head_angle_rad: 0.2,
        carrying_object_id: Some(4),
        timestamp_ms: 1234,
    });
    waiter.wait(Duration::from_secs(2)).unwrap();

    let snapshot = world.snapshot();
    assert_eq!(snapshot.robot_pose.x_mm, 10.0);
    assert_eq!(snapshot.battery_volts, 3.9);
    assert_eq!(snapshot.carrying_object_id, Some(4));
    assert_eq!(snapshot.last_robot_state_ms, 1234);
    session.close();
}

/// 测试重定位：全部实体转为不可见
#[test]
fn test_delocalization_hides_entities() {
    let (session, mut engine) = MockEngine::start(|b| b);
    let world = session.world();
    engine.send(&cube(1, 100));
    engine.send(&Event::PetObserved {
        pet_id: 9,
        kind: PetKind::Cat,
        observed_at_ms: 100,
    });
    world
        .wait_until_count(2, |_| true, Duration::from_secs(2))
        .unwrap();

    let waiter = session.wait_for_event(|e| matches!(e, Event::RobotDelocalized));
    engine.send(&Event::RobotDelocalized);
    waiter.wait(Duration::from_secs(2)).unwrap();

    let snapshot = world.snapshot();
    assert_eq!(snapshot.visible_entities().count(), 0);
    assert_eq!(snapshot.entities.len(), 2);
    session.close();
}
