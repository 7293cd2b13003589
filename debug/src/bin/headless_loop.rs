//! Host loop without a GPU: synthetic camera -> FrameSlot -> RenderLoop<HeadlessDevice>,
//! with the lens orbiting the screen centre.
//! Run: RUST_LOG=debug cargo run -p debug --bin headless_loop

use std::sync::Arc;
use std::time::Duration;

use debug::synthetic::SyntheticSource;
use gravlens_bridge::{FrameSlot, LensInput, RenderLoop, TickOutcome};
use gravlens_renderer::{HeadlessDevice, LensConfig, ShaderSources};
use lens_api::{FrameSource, LensControl};

const SCREEN: (u32, u32) = (800, 600);

fn main() -> Result<(), String> {
    env_logger::init();
    let config = LensConfig::from_env();
    let slot = Arc::new(FrameSlot::new());
    let lens = Arc::new(LensInput::default());

    let mut render_loop = RenderLoop::new(HeadlessDevice::new(), &config, Arc::clone(&lens), SCREEN.0, SCREEN.1)
        .map_err(|e| e.to_string())?;
    render_loop.attach_source(Arc::clone(&slot));
    render_loop.initialize(ShaderSources::builtin()).map_err(|e| e.to_string())?;

    let mut camera = SyntheticSource::new(640, 480, 30);
    camera.start(slot.clone()).map_err(|e| e.to_string())?;

    for step in 0..120u32 {
        let angle = step as f32 * 0.05;
        lens.set_lens_params(
            SCREEN.0 as f32 / 2.0 + 200.0 * angle.cos(),
            SCREEN.1 as f32 / 2.0 + 150.0 * angle.sin(),
            config.default_lens_radius,
            config.default_lens_strength,
        )
        .map_err(|e| e.to_string())?;
        match render_loop.tick() {
            Ok(TickOutcome::Drawn) => log::debug!("tick {step}: drawn"),
            Ok(other) => log::debug!("tick {step}: {other:?}"),
            Err(e) => log::error!("tick {step}: {e}"),
        }
        std::thread::sleep(Duration::from_millis(16));
    }
    camera.stop();

    let stats = render_loop.stats();
    let slot_stats = slot.stats();
    println!(
        "ticks {} draws {} no-frame {} dropped {} mesh rebuilds {}",
        stats.ticks, stats.draws, stats.no_frame, stats.dropped, stats.mesh_rebuilds
    );
    println!(
        "camera frames delivered {} superseded {} rejected {}",
        slot_stats.delivered, slot_stats.dropped, slot_stats.rejected
    );
    render_loop.shutdown();
    let live = render_loop.pipeline().device().counts();
    println!("live GPU objects after shutdown: {}", live.total());
    Ok(())
}
