use anyhow::Result;
use breakwatch::prelude::*;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    // 2. Load the configuration (breakwatch.toml + BREAKWATCH_* env).
    let config = BreakwatchConfig::load()?;

    // 3. Create the engine.
    let engine = BreakwatchEngine::new(config)?;

    // 4. Spawn listeners for every event stream so the dev loop shows the
    //    engine's full behavior.
    spawn_event_listeners(&engine);

    // 5. Run until Ctrl+C.
    engine.run().await?;

    Ok(())
}

/// Spawns a task per event stream, logging everything the engine broadcasts.
fn spawn_event_listeners(engine: &BreakwatchEngine) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut transition_rx = engine.subscribe_transitions();
    tokio::spawn(async move {
        while let Ok(event) = transition_rx.recv().await {
            info!(
                "[TRANSITION] => {:?} (window {:?}) at {}",
                event.transition, event.window_id, event.at
            );
        }
    });

    let mut frame_rx = engine.subscribe_frames();
    tokio::spawn(async move {
        while let Ok(frame) = frame_rx.recv().await {
            info!(
                "[FRAME] => {} {:>6} progress={:.3} ({:?})",
                frame.clock_text, frame.phase_label, frame.progress, frame.connectivity
            );
        }
    });
}
