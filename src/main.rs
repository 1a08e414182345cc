//! SignVision desktop client
//!
//! Opens the detection window: webcam video with a hand skeleton overlay and
//! the sign reported by the prediction service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use sign_detection::config::AppConfig;
use sign_detection::telemetry::init_logging;
use sign_detection::App;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, Window, WindowAttributes, WindowId};

const WINDOW_TITLE: &str = "SignVision - Sign Language Detection";

enum Lifecycle {
    /// Waiting for the first `resumed`
    Pending,
    Active { window: Arc<Window>, app: App },
    /// Shut down, or failed to start
    Finished,
}

/// Redraw pacing at the configured frame rate
struct Pacer {
    interval: Duration,
    next: Instant,
}

impl Pacer {
    fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / fps.max(1),
            next: Instant::now(),
        }
    }

    /// Whether a redraw is due; advances the deadline when it is
    fn tick(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next += self.interval;
        // Skip missed frames instead of bursting to catch up
        if now > self.next + self.interval * 2 {
            self.next = now + self.interval;
        }
        true
    }
}

struct SignVision {
    lifecycle: Lifecycle,
    config: AppConfig,
    pacer: Pacer,
    /// Startup failure handed back to `main`
    startup_error: Option<anyhow::Error>,
}

impl SignVision {
    fn new(config: AppConfig) -> Self {
        let pacer = Pacer::new(config.window.target_fps);
        Self {
            lifecycle: Lifecycle::Pending,
            config,
            pacer,
            startup_error: None,
        }
    }

    fn open_window(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<(Arc<Window>, App)> {
        let attributes = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(self.config.window.width, self.config.window.height));

        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("Failed to create window")?,
        );
        let size = window.inner_size();
        tracing::info!(width = size.width, height = size.height, "Window opened");

        let app = pollster::block_on(App::new(window.clone(), self.config.clone()))
            .context("Failed to initialize graphics")?;
        Ok((window, app))
    }

    fn quit(&mut self, event_loop: &ActiveEventLoop) {
        if let Lifecycle::Active { mut app, .. } = std::mem::replace(&mut self.lifecycle, Lifecycle::Finished) {
            app.shutdown();
            save_camera_choice(&self.config, app.config());
        }
        event_loop.exit();
    }

    /// Returns true when the key asks to quit
    fn handle_key(window: &Window, app: &mut App, key: KeyCode) -> bool {
        match key {
            KeyCode::Escape => return true,
            KeyCode::F11 => {
                let fullscreen = match window.fullscreen() {
                    Some(_) => None,
                    None => Some(Fullscreen::Borderless(None)),
                };
                window.set_fullscreen(fullscreen);
            }
            KeyCode::Space => app.toggle_detection(),
            _ => {}
        }
        false
    }

    /// Run a detection cycle and draw. Returns false on an unrecoverable GPU error.
    fn redraw(app: &mut App) -> bool {
        app.update();
        match app.render() {
            Ok(()) => true,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("Surface out of date, reconfiguring");
                app.resize(app.size());
                true
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                tracing::error!("GPU out of memory");
                false
            }
            Err(e) => {
                tracing::warn!("Skipped frame: {:?}", e);
                true
            }
        }
    }
}

/// Persist the camera picked in the UI
fn save_camera_choice(initial: &AppConfig, current: &AppConfig) {
    if initial.camera.index == current.camera.index {
        return;
    }
    let mut updated = initial.clone();
    updated.camera.index = current.camera.index;
    match updated.save() {
        Ok(path) => tracing::info!("Saved settings to {:?}", path),
        Err(e) => tracing::warn!("Failed to save settings: {}", e),
    }
}

impl ApplicationHandler for SignVision {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !matches!(self.lifecycle, Lifecycle::Pending) {
            return;
        }
        match self.open_window(event_loop) {
            Ok((window, app)) => {
                tracing::info!("Ready. Space starts/stops detection, F11 toggles fullscreen, Esc quits");
                self.lifecycle = Lifecycle::Active { window, app };
            }
            Err(e) => {
                tracing::error!("{:#}", e);
                self.startup_error = Some(e);
                self.lifecycle = Lifecycle::Finished;
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Lifecycle::Active { window, app } = &mut self.lifecycle else {
            return;
        };

        // egui sees every event; keys it consumed don't reach the shortcuts
        let consumed = app.handle_window_event(&event);

        let quit = match event {
            WindowEvent::CloseRequested => true,
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } if !consumed => Self::handle_key(window, app, key),
            WindowEvent::Resized(size) => {
                app.resize(size);
                false
            }
            WindowEvent::RedrawRequested => !Self::redraw(app),
            _ => false,
        };

        if quit {
            tracing::info!("Exiting");
            self.quit(event_loop);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Lifecycle::Active { window, .. } = &self.lifecycle else {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        };

        if self.pacer.tick(Instant::now()) {
            window.request_redraw();
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.pacer.next));
    }
}

fn main() -> anyhow::Result<()> {
    // Logging is configured from the settings file, so load it first and
    // report any problem once the subscriber is up
    let (config, config_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    let _log_guard = init_logging(&config.logging).context("Failed to initialize logging")?;

    tracing::info!("SignVision v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = config_error {
        tracing::warn!("Using default settings: {}", e);
    }
    tracing::info!(
        mode = ?config.detection.mode,
        endpoint = %config.service.base_url,
        "Configuration loaded"
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = SignVision::new(config);
    event_loop.run_app(&mut app).context("Event loop error")?;

    match app.startup_error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
