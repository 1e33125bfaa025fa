use anyhow::Result;
use breakwatch::prelude::*;
use breakwatch::{ENGINE_NAME, VERSION as LIB_VERSION};
use colored::Colorize;
use std::env;
use std::io::Write;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", "breakshell".cyan().bold());
    println!(
        "          Shell   v{:<8} Engine    v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!(
        "{}",
        "-----------------------------------------------------------------".dimmed()
    );
}

/// One status line per frame, overwritten in place: clock, break banner,
/// progress bar, connectivity dot.
fn paint(frame: &RenderFrame) {
    let clock = frame.clock_text.bold().cyan();
    let indicator = match frame.connectivity {
        Connectivity::Connected => "●".green(),
        Connectivity::Stale => "●".yellow(),
        Connectivity::Unavailable => "●".red(),
    };
    let line = if frame.phase_label.is_empty() {
        format!("{indicator} {clock}")
    } else {
        let banner = if frame.banner.is_empty() {
            frame.phase_label.to_string()
        } else {
            format!("{} — {}", frame.phase_label, frame.banner)
        };
        format!(
            "{indicator} {clock}  {}  {}",
            banner.black().on_yellow().bold(),
            progress_bar(frame.progress, 20)
        )
    };
    print!("\r\x1b[2K{line}");
    std::io::stdout().flush().ok();
}

fn progress_bar(progress: f64, cells: usize) -> String {
    let filled = (progress.clamp(0.0, 1.0) * cells as f64).round() as usize;
    format!(
        "{}{}",
        "█".repeat(filled).yellow(),
        "░".repeat(cells - filled).dimmed()
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    // Keep the painted line clean; engine logs go to stderr at warn level.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = BreakwatchConfig::load()?;
    let engine = BreakwatchEngine::new(config)?;

    let mut frames = engine.subscribe_frames();
    tokio::spawn(async move {
        loop {
            match frames.recv().await {
                Ok(frame) => paint(&frame),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });

    println!(
        "{} is running. Press Ctrl+C to quit.",
        ENGINE_NAME.cyan()
    );

    // Runs until Ctrl+C; the display task dies with the process.
    engine.run().await?;
    println!();
    Ok(())
}
