//! Main application state and rendering
//!
//! Owns the wgpu context, the egui integration, the attached frame source and
//! the worker threads, and runs one detection cycle per redraw:
//! new frame -> tracker -> tracker events -> prediction replies -> overlay -> UI.

use std::sync::Arc;
use std::time::Instant;

use glam::Vec2;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::camera::{CameraCapture, CameraInfo, FrameSource, MjpegCapture};
use crate::config::{AppConfig, DetectionMode};
use crate::detection::DetectionSession;
use crate::overlay::{OverlayRenderer, Viewport};
use crate::predict::{PredictJob, PredictionClient, PredictionWorker};
use crate::tracker::{HandTracker, OnnxHandLandmarker, TrackerEvent};
use crate::ui::{self, PanelView, ShellActions};

/// Errors that prevent the window from running at all
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("Failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("Failed to start worker thread: {0}")]
    Worker(#[from] std::io::Error),
}

/// What the detection cycle does with the attached video source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceAction {
    Keep,
    /// Detection stopped on its own; the stream must not outlive it
    Release,
    /// The stream ended underneath us
    Lost,
}

/// `running` is `None` when no source is attached
fn source_action(running: Option<bool>, detecting: bool) -> SourceAction {
    match running {
        None => SourceAction::Keep,
        Some(false) => SourceAction::Lost,
        Some(true) if !detecting => SourceAction::Release,
        Some(true) => SourceAction::Keep,
    }
}

/// Window, GPU context and the running detection pipeline
pub struct App {
    // Window and GPU
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,

    // egui integration
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    // Settings
    config: AppConfig,
    cameras: Vec<CameraInfo>,

    // Video
    source: Option<Box<dyn FrameSource>>,
    video_texture: Option<egui::TextureHandle>,
    last_video_frame: u64,

    // Detection
    tracker: Option<HandTracker>,
    worker: PredictionWorker,
    session: DetectionSession,
    overlay: OverlayRenderer,
    footer_year: i32,

    // Frame timing
    fps: f64,
    last_fps_update: Instant,
    frames_since_update: u64,
}

impl App {
    /// Set up the GPU surface and egui, and start the prediction worker.
    ///
    /// No camera is opened until detection is started.
    pub async fn new(window: Arc<Window>, config: AppConfig) -> Result<Self, AppError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(AppError::NoAdapter)?;

        tracing::info!(
            gpu = %adapter.get_info().name,
            backend = ?adapter.get_info().backend,
            "GPU adapter selected"
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Sign Detection Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .unwrap_or(wgpu::TextureFormat::Bgra8Unorm);

        let present_mode = if surface_caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
            wgpu::PresentMode::Mailbox
        } else {
            wgpu::PresentMode::Fifo
        };

        tracing::debug!(format = ?surface_format, present_mode = ?present_mode, "Configuring surface");

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        // Initialize egui
        let egui_ctx = egui::Context::default();
        let mut style = (*egui_ctx.style()).clone();
        style.visuals.window_shadow = egui::epaint::Shadow::NONE;
        egui_ctx.set_style(style);

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        let worker = PredictionWorker::spawn(PredictionClient::new(&config.service))?;
        tracing::info!(endpoint = %config.service.predict_url(), "Prediction client ready");

        let cameras = match config.detection.mode {
            DetectionMode::Local => CameraCapture::list_cameras(),
            DetectionMode::Remote => Vec::new(),
        };

        let session = DetectionSession::new(&config.detection);
        let now = Instant::now();

        Ok(Self {
            window,
            surface,
            device,
            queue,
            surface_config,
            size,
            egui_ctx,
            egui_state,
            egui_renderer,
            config,
            cameras,
            source: None,
            video_texture: None,
            last_video_frame: 0,
            tracker: None,
            worker,
            session,
            overlay: OverlayRenderer::new(),
            footer_year: ui::shell::current_year(),
            fps: 0.0,
            last_fps_update: now,
            frames_since_update: 0,
        })
    }

    /// Forward an event to egui; true when egui wants it for itself
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(&self.window, event);
        response.consumed
    }

    /// Resize the surface
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.surface_config.width = new_size.width;
            self.surface_config.height = new_size.height;
            self.surface.configure(&self.device, &self.surface_config);
        }
    }

    /// Get current size
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn is_detecting(&self) -> bool {
        self.session.is_active()
    }

    /// Start or stop detection
    pub fn toggle_detection(&mut self) {
        if self.session.is_active() {
            self.stop_detection();
        } else {
            self.start_detection();
        }
    }

    /// Acquire the video source and begin the detection cycle
    pub fn start_detection(&mut self) {
        if self.session.is_active() {
            return;
        }
        let now = Instant::now();

        let source: Result<Box<dyn FrameSource>, _> = match self.config.detection.mode {
            DetectionMode::Local => {
                tracing::info!(camera = self.config.camera.index, "Starting camera");
                CameraCapture::start(&self.config.camera).map(|c| Box::new(c) as Box<dyn FrameSource>)
            }
            DetectionMode::Remote => {
                let url = self.config.service.video_feed_url();
                tracing::info!(url = %url, "Connecting to video feed");
                let timeout = self.config.service.timeout();
                MjpegCapture::start(&url, timeout, timeout).map(|c| Box::new(c) as Box<dyn FrameSource>)
            }
        };

        match source {
            Ok(source) => {
                self.attach_source(source);
                self.session.start();
                match self.config.detection.mode {
                    DetectionMode::Local => self.ensure_tracker(),
                    DetectionMode::Remote => {
                        let job = self.session.toggle_job(true);
                        self.submit(job);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Failed to start video: {}", e);
                self.session.camera_failed(&e, now);
            }
        }
    }

    /// Stop detection and release the video source
    pub fn stop_detection(&mut self) {
        if !self.session.is_active() {
            return;
        }
        self.session.stop();
        if self.config.detection.mode == DetectionMode::Remote {
            let job = self.session.toggle_job(false);
            self.submit(job);
        }
        self.detach_source();
    }

    fn attach_source(&mut self, source: Box<dyn FrameSource>) {
        self.detach_source();
        tracing::info!(source = %source.describe(), "Video source attached");
        self.source = Some(source);
    }

    fn detach_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
            tracing::info!(source = %source.describe(), "Video source detached");
        }
        self.video_texture = None;
        self.last_video_frame = 0;
        self.overlay.clear();
    }

    fn ensure_tracker(&mut self) {
        if self.tracker.is_some() {
            return;
        }
        let settings = self.config.tracker.clone();
        match HandTracker::spawn(move || OnnxHandLandmarker::new(&settings)) {
            Ok(tracker) => self.tracker = Some(tracker),
            Err(e) => {
                tracing::error!("Failed to spawn hand tracker: {}", e);
                self.session
                    .tracker_unavailable(&e.to_string(), Instant::now());
            }
        }
    }

    fn submit(&self, job: PredictJob) {
        self.worker.submit(job);
    }

    /// Run one detection cycle
    pub fn update(&mut self) {
        let now = Instant::now();

        self.pump_video();
        self.drain_tracker(now);

        while let Some(reply) = self.worker.try_recv() {
            if let Some(job) = self.session.on_reply(reply, now) {
                self.submit(job);
            }
        }
        if let Some(job) = self.session.poll(now) {
            self.submit(job);
        }

        let action = source_action(
            self.source.as_ref().map(|s| s.is_running()),
            self.session.is_active(),
        );
        match action {
            SourceAction::Keep => {}
            SourceAction::Release => {
                // e.g. the remote service refused to start detecting
                tracing::info!("Detection ended, releasing video source");
                self.detach_source();
            }
            SourceAction::Lost => {
                self.session.source_lost(now);
                self.detach_source();
            }
        }

        self.session.notices_mut().prune(now);
    }

    /// Upload a new frame and hand it to the tracker
    fn pump_video(&mut self) {
        let Some(source) = &self.source else { return };
        let Some(frame) = source.latest_frame() else { return };

        if frame.frame_number <= self.last_video_frame {
            return;
        }
        self.last_video_frame = frame.frame_number;

        let image = egui::ColorImage::from_rgba_unmultiplied(
            [frame.width as usize, frame.height as usize],
            &frame.data,
        );
        match self.video_texture {
            Some(ref mut texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                tracing::debug!("Creating video texture: {}x{}", frame.width, frame.height);
                self.video_texture =
                    Some(self.egui_ctx.load_texture("video", image, egui::TextureOptions::LINEAR));
            }
        }

        if self.session.is_active() {
            if let Some(ref tracker) = self.tracker {
                tracker.submit(frame);
            }
        }
    }

    fn drain_tracker(&mut self, now: Instant) {
        let Some(ref tracker) = self.tracker else { return };
        let events: Vec<TrackerEvent> = std::iter::from_fn(|| tracker.try_recv()).collect();

        for event in events {
            match event {
                TrackerEvent::Hands { hand, .. } => {
                    if let Some(job) = self.session.on_hands(hand, now) {
                        self.submit(job);
                    }
                }
                TrackerEvent::Unavailable(message) => {
                    self.session.tracker_unavailable(&message, now);
                    self.tracker = None;
                }
            }
        }
    }

    /// Stop all threads
    pub fn shutdown(&mut self) {
        self.stop_detection();
        if let Some(mut tracker) = self.tracker.take() {
            tracker.stop();
        }
        self.worker.stop();
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        self.render_ui(&mut encoder, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.update_fps();
        Ok(())
    }

    fn render_ui(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let raw_input = self.egui_state.take_egui_input(&self.window);

        // Gather state before running egui
        let snapshot = self.session.snapshot();
        let panel = PanelView::from_snapshot(&snapshot);
        let video = self
            .video_texture
            .as_ref()
            .map(|t| (t.id(), t.size()));
        let header_state = ui::shell::HeaderState {
            is_detecting: snapshot.is_detecting(),
            mode: self.config.detection.mode,
            source: self.source.as_ref().map(|s| s.describe()),
            cameras: &self.cameras,
            selected_camera: self.config.camera.index,
            fps: self.fps,
        };
        let frame_count = self.source.as_ref().map(|s| s.frame_count()).unwrap_or(0);
        let tracker_status = match (self.config.detection.mode, &self.tracker) {
            (DetectionMode::Remote, _) => "Hand tracking: on service",
            (DetectionMode::Local, Some(t)) if t.is_ready() => "Hand tracking: ready",
            (DetectionMode::Local, Some(_)) => "Hand tracking: loading model...",
            (DetectionMode::Local, None) => "Hand tracking: off",
        };
        let endpoint = match self.config.detection.mode {
            DetectionMode::Local => self.config.service.predict_url(),
            DetectionMode::Remote => self.config.service.video_feed_url(),
        };
        let footer_year = self.footer_year;

        let mut actions = ShellActions::default();
        let mut dismissed = None;
        let overlay = &mut self.overlay;

        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            ui::shell::header(ctx, &header_state, &mut actions);
            ui::shell::footer(ctx, footer_year);

            egui::SidePanel::right("detection_panel")
                .resizable(false)
                .min_width(260.0)
                .show(ctx, |ui| {
                    ui.add_space(8.0);
                    ui.heading("Detected Sign");
                    panel.show(ui);
                    ui.separator();
                    ui.weak(tracker_status);
                    ui.weak(format!("Service: {}", endpoint));
                    ui.weak(format!("Frames: {}", frame_count));
                    if snapshot.awaiting_reply {
                        ui.weak("Waiting for prediction...");
                    }
                });

            egui::CentralPanel::default().show(ctx, |ui| {
                ui::shell::intro(ui);
                ui.add_space(8.0);

                let available = ui.available_size();
                let video_height = (available.y - 120.0).max(160.0);
                let (rect, _) = ui.allocate_exact_size(
                    egui::vec2(available.x, video_height),
                    egui::Sense::hover(),
                );
                ui.painter().rect_filled(rect, 6.0, egui::Color32::from_gray(24));

                let area = Viewport::new(
                    Vec2::new(rect.min.x, rect.min.y),
                    Vec2::new(rect.width(), rect.height()),
                );
                match video {
                    Some((texture_id, [width, height])) => {
                        let fitted = area.fit(width as u32, height as u32);
                        let image_rect = egui::Rect::from_min_size(
                            egui::pos2(fitted.origin.x, fitted.origin.y),
                            egui::vec2(fitted.size.x, fitted.size.y),
                        );
                        ui.painter().image(
                            texture_id,
                            image_rect,
                            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                            egui::Color32::WHITE,
                        );
                        overlay.update(snapshot.hand.as_ref(), fitted);
                        ui::overlay::paint(&ui.painter_at(image_rect), overlay);
                    }
                    None => {
                        overlay.clear();
                        ui.painter().text(
                            rect.center(),
                            egui::Align2::CENTER_CENTER,
                            "Camera off. Press Start Detection to begin.",
                            egui::FontId::proportional(16.0),
                            egui::Color32::GRAY,
                        );
                    }
                }

                ui.add_space(12.0);
                ui::shell::feature_cards(ui);
            });

            dismissed = ui::toasts::show(ctx, &snapshot.notices);
        });

        // Apply UI actions
        if actions.toggle_detection {
            self.toggle_detection();
        }
        if let Some(index) = actions.select_camera {
            tracing::info!(camera = index, "Camera selected");
            self.config.camera.index = index;
        }
        if actions.refresh_cameras {
            self.cameras = CameraCapture::list_cameras();
        }
        if let Some(index) = dismissed {
            self.session.notices_mut().dismiss(index);
        }

        self.egui_state
            .handle_platform_output(&self.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, image_delta);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.surface_config.width, self.surface_config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut render_pass = render_pass.forget_lifetime();
            self.egui_renderer
                .render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }

    fn update_fps(&mut self) {
        self.frames_since_update += 1;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f64();
        if elapsed >= 1.0 {
            self.fps = self.frames_since_update as f64 / elapsed;
            self.frames_since_update = 0;
            self.last_fps_update = now;
        }
    }
}
