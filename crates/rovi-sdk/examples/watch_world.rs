//! 世界模型观察演示
//!
//! 订阅观测事件并周期打印世界快照：可见实体、电量与
//! 导航地图已知单元数。
//!
//! 运行：`cargo run --example watch_world -- <engine-host>`

use rovi_sdk::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    rovi_sdk::init_logging();
    let host = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1".into());

    let session = SessionBuilder::new(host)
        .visibility_window(Duration::from_secs(2))
        .connect()?;

    session.add_listener(
        EventCategory::Object,
        Arc::new(|event: &Event| {
            if let Event::ObjectObserved(obs) = event {
                println!(
                    "observed {:?} at ({:.0}, {:.0})",
                    obs.key, obs.pose.x_mm, obs.pose.y_mm
                );
            }
        }),
    );

    let world = session.world();
    for _ in 0..30 {
        std::thread::sleep(Duration::from_secs(1));
        if !session.is_connected() {
            println!("session lost");
            break;
        }
        let snapshot = world.snapshot();
        println!(
            "seq {} | visible {}/{} | battery {:.1}V | nav cells {}",
            snapshot.seq,
            snapshot.visible_entities().count(),
            snapshot.entities.len(),
            snapshot.battery_volts,
            snapshot.nav_map.known_cells(),
        );
    }

    session.close();
    Ok(())
}
