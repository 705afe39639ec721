use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use effectconfig::EffectConfig;
use renderer::{Engine, InputEvent, KeyCommand};
use tracing_subscriber::EnvFilter;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, Touch, TouchPhase, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::cli::Cli;

/// Window resizes are storms of intermediate sizes; the surface is only
/// reconfigured after this quiet period.
const RESIZE_DEBOUNCE: Duration = Duration::from_millis(100);

/// How often the performance summary is logged when
/// `show_performance_info` is enabled.
const PERF_LOG_INTERVAL: Duration = Duration::from_secs(5);

fn perf_log_due(enabled: bool, last: Instant, now: Instant) -> bool {
    enabled && now.duration_since(last) >= PERF_LOG_INTERVAL
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<EffectConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config at {}", path.display()))?;
            EffectConfig::from_toml_str(&text)
                .with_context(|| format!("invalid config at {}", path.display()))?
        }
        None => EffectConfig::default(),
    };

    if let Some(distortion) = cli.distortion {
        config.distortion_type = distortion;
    }
    if let Some(quality) = cli.quality {
        config.quality = quality;
    }
    if cli.auto_animate {
        config.auto_animation = true;
    }
    if cli.no_grid {
        config.show_grid = false;
    }
    config.validate().context("invalid effect configuration")?;
    Ok(config)
}

fn normalize(position: PhysicalPosition<f64>, size: PhysicalSize<u32>) -> [f32; 2] {
    [
        (position.x / size.width.max(1) as f64) as f32,
        (position.y / size.height.max(1) as f64) as f32,
    ]
}

fn key_command(event: &KeyEvent) -> Option<KeyCommand> {
    if event.state != ElementState::Pressed {
        return None;
    }
    match event.logical_key {
        Key::Named(NamedKey::ArrowLeft) => Some(KeyCommand::NudgeLeft),
        Key::Named(NamedKey::ArrowRight) => Some(KeyCommand::NudgeRight),
        Key::Named(NamedKey::ArrowUp) => Some(KeyCommand::NudgeUp),
        Key::Named(NamedKey::ArrowDown) => Some(KeyCommand::NudgeDown),
        Key::Named(NamedKey::Space) => Some(KeyCommand::Recenter),
        _ => None,
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let (width, height) = cli.size.unwrap_or((1280, 720));
    let title = if config.aria_label.is_empty() {
        "warpgrid".to_string()
    } else {
        config.aria_label.clone()
    };

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(&title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(&event_loop)
            .context("failed to create window")?,
    );

    let size = window.inner_size();
    let pixel_ratio = window.scale_factor() as f32;
    let mut engine = Engine::new(window.clone(), size, pixel_ratio, config);
    if let Some(reason) = engine.fallback_state() {
        tracing::error!(reason = reason.as_str(), "engine started in fallback");
    }
    if let Some(image) = &cli.image {
        engine.load_image(&image.display().to_string());
    }

    let show_performance = engine.config().show_performance_info;
    let mut window_size = size;
    let mut pending_resize: Option<(PhysicalSize<u32>, Instant)> = None;
    let mut pointer_entered = false;
    let mut last_perf_log = Instant::now();

    let run_result = event_loop.run(move |event, elwt| {
        match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state == ElementState::Pressed
                        && matches!(event.logical_key, Key::Named(NamedKey::Escape))
                    {
                        elwt.exit();
                        return;
                    }
                    if let Some(command) = key_command(&event) {
                        engine.handle_input(InputEvent::Key(command), Instant::now());
                    }
                }
                WindowEvent::CursorEntered { .. } => {
                    // Position arrives with the first CursorMoved.
                    pointer_entered = true;
                }
                WindowEvent::CursorLeft { .. } => {
                    pointer_entered = false;
                    engine.handle_input(InputEvent::PointerLeave, Instant::now());
                }
                WindowEvent::CursorMoved { position, .. } => {
                    let position = normalize(position, window_size);
                    let event = if pointer_entered {
                        pointer_entered = false;
                        InputEvent::PointerEnter { position }
                    } else {
                        InputEvent::PointerMove { position }
                    };
                    engine.handle_input(event, Instant::now());
                }
                WindowEvent::Touch(Touch {
                    phase, location, ..
                }) => {
                    let position = normalize(location, window_size);
                    let event = match phase {
                        TouchPhase::Started => InputEvent::TouchStart { position },
                        TouchPhase::Moved => InputEvent::TouchMove { position },
                        TouchPhase::Ended | TouchPhase::Cancelled => InputEvent::TouchEnd,
                    };
                    engine.handle_input(event, Instant::now());
                }
                WindowEvent::Resized(new_size) => {
                    pending_resize = Some((new_size, Instant::now() + RESIZE_DEBOUNCE));
                }
                WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                    engine.resize(window_size, scale_factor as f32);
                }
                WindowEvent::RedrawRequested => {
                    let now = Instant::now();
                    engine.pump(now);
                    engine.render_frame(now);
                    if perf_log_due(show_performance, last_perf_log, now) {
                        last_perf_log = now;
                        let summary = engine.performance_summary();
                        tracing::info!(
                            fps = summary.average_fps,
                            frames = summary.frame_count,
                            tier = ?summary.tier,
                            "performance summary"
                        );
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                let now = Instant::now();
                if let Some((size, deadline)) = pending_resize {
                    if now >= deadline {
                        pending_resize = None;
                        window_size = size;
                        engine.resize(size, window.scale_factor() as f32);
                    } else {
                        elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
                    }
                }
                window.request_redraw();
                if pending_resize.is_none() {
                    elwt.set_control_flow(ControlFlow::Poll);
                }
            }
            _ => {}
        }
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn performance_logging_respects_toggle_and_interval() {
        let start = Instant::now();
        assert!(!perf_log_due(false, start, start + PERF_LOG_INTERVAL));
        assert!(!perf_log_due(true, start, start + PERF_LOG_INTERVAL / 2));
        assert!(perf_log_due(true, start, start + PERF_LOG_INTERVAL));
    }
}
