//! 语音 + 行驶并行演示
//!
//! 演示执行器掩码的并行语义：语音与行驶占用不同执行器，
//! 两个动作同时执行；随后的转身与行驶冲突，自动排队。
//!
//! 运行：`cargo run --example say_and_drive -- <engine-host>`

use rovi_sdk::prelude::*;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    rovi_sdk::init_logging();
    let host = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1".into());

    let session = SessionBuilder::new(host).connect()?;
    println!(
        "connected to engine {} (device {})",
        session.engine_build_version(),
        session.device_id()
    );

    // 语音与行驶并行
    let talk = session.submit(ActionSpec::SayText {
        text: "off we go".into(),
        voice_pitch: 0.0,
        duration_scalar: 1.0,
    })?;
    let roll = session.submit(ActionSpec::DriveStraight {
        distance_mm: 150.0,
        speed_mmps: 50.0,
        should_play_anim: true,
    })?;

    // 转身与行驶都占轮子，在行驶终态后才会执行
    let turn = session.submit(ActionSpec::TurnInPlace {
        angle_rad: std::f32::consts::FRAC_PI_2,
        speed_rad_per_sec: 1.0,
    })?;

    for (name, handle) in [("say", talk), ("drive", roll), ("turn", turn)] {
        match handle.wait(Duration::from_secs(30)) {
            Some(ActionOutcome::Succeeded) => println!("{name}: done"),
            Some(outcome) => println!("{name}: {outcome:?}"),
            None => println!("{name}: still running, cancelling"),
        }
    }

    session.close();
    Ok(())
}
