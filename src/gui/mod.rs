//! GUI module for the application.
//!
//! Settings window built with egui/eframe, plus the live status overlay that
//! follows the game window while a session runs.

pub mod render;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use eframe::egui::{self, Vec2};

use crate::automation::config::AppConfig;
use crate::automation::queue::Waker;
use crate::automation::{Controller, STOP_TIMEOUT, SessionEvent, create_event_channel};
use crate::capture::{WindowLocator, create_locator};

use render::IconCache;
use state::{GuiState, SessionStatus};

/// How often the settings window looks for the game window.
const WINDOW_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Main GUI application struct.
pub struct GuiApp {
    /// Application state.
    state: GuiState,
    /// Loaded item icon textures.
    icons: IconCache,
    /// Flag to track if icons have been loaded.
    icons_loaded: bool,
    /// Used only for the "detected" indicator; sessions create their own.
    locator: Box<dyn WindowLocator>,
    controller: Option<Controller>,
    events: Option<Receiver<SessionEvent>>,
    assets_dir: PathBuf,
    history_dir: PathBuf,
}

impl GuiApp {
    /// Create a new GUI application instance.
    pub fn new(config: AppConfig) -> Self {
        let locator = create_locator(&config.window_title, config.process_name.as_deref());
        Self {
            state: GuiState::new(config),
            icons: IconCache::new(),
            icons_loaded: false,
            locator,
            controller: None,
            events: None,
            assets_dir: crate::paths::get_assets_dir(),
            history_dir: crate::paths::get_history_dir(),
        }
    }

    /// Load item icons as textures.
    fn load_icons(&mut self, ctx: &egui::Context) {
        if self.icons_loaded {
            return;
        }

        for choice in &mut self.state.items {
            let path = self.assets_dir.join(&choice.item.icon);
            match image::open(&path) {
                Ok(image) => {
                    let rgba = image.to_rgba8();
                    let size = [rgba.width() as usize, rgba.height() as usize];
                    let pixels = rgba.into_raw();
                    let color_image = egui::ColorImage::from_rgba_unmultiplied(size, &pixels);
                    let texture =
                        ctx.load_texture(&choice.item.icon, color_image, egui::TextureOptions::LINEAR);
                    self.icons.insert(choice.item.icon.clone(), texture);
                }
                Err(e) => {
                    log::warn!("GUI: Failed to load icon {}: {}", path.display(), e);
                    choice.icon_available = false;
                }
            }
        }

        self.icons_loaded = true;
    }

    /// Refresh the window-detected indicator at most once per interval.
    fn update_window_status(&mut self) {
        let due = self
            .state
            .last_window_check
            .is_none_or(|t| t.elapsed() >= WINDOW_CHECK_INTERVAL);
        if !due || self.state.status.is_running() {
            return;
        }
        self.state.window_detected = self.locator.locate().is_ok();
        self.state.last_window_check = Some(Instant::now());
    }

    /// Drain session events sent by the worker.
    fn drain_events(&mut self) {
        let Some(events) = &self.events else {
            return;
        };
        let received: Vec<SessionEvent> = events.try_iter().collect();

        for event in received {
            match event {
                SessionEvent::Started { window } => {
                    self.state.overlay_anchor = Some(window);
                }
                SessionEvent::Progress(progress) => self.state.apply_progress(progress),
                SessionEvent::Finished(report) => {
                    log::info!("GUI: Session finished: {}", report.reason);
                    self.state.session_finished(&report);
                    self.release_session();
                }
            }
        }
    }

    /// Joins the finished worker and drops the channel.
    fn release_session(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.stop(STOP_TIMEOUT);
        }
        self.events = None;
    }

    /// Handle start button click.
    fn handle_start(&mut self, ctx: &egui::Context) {
        let settings = match self
            .state
            .session_settings(&self.assets_dir, &self.history_dir)
        {
            Ok(settings) => settings,
            Err(msg) => {
                self.state.status = SessionStatus::Error(msg);
                return;
            }
        };

        let repaint = ctx.clone();
        let waker: Waker = Arc::new(move || repaint.request_repaint());
        let (sender, receiver) = create_event_channel(Some(waker));

        let items = settings.items.clone();
        let mut controller = Controller::new(settings);
        match controller.start(sender) {
            Ok(()) => {
                log::info!("GUI: Started refreshing {} item(s)", items.len());
                self.state.session_started(items);
                self.controller = Some(controller);
                self.events = Some(receiver);
            }
            Err(e) => {
                log::error!("GUI: Failed to start: {}", e);
                self.state.status = SessionStatus::Error(e.to_string());
            }
        }
    }

    /// Handle stop button click or Escape.
    fn handle_stop(&mut self) {
        log::info!("GUI: Requested stop");
        let Some(controller) = &mut self.controller else {
            return;
        };
        if controller.stop(STOP_TIMEOUT) {
            // Finished is already queued; the next drain picks it up
            self.drain_events();
        } else {
            self.controller = None;
            self.events = None;
            self.state.overlay_anchor = None;
            self.state.status =
                SessionStatus::Error("The refresh worker did not stop in time".to_string());
        }
    }

    fn show_overlay(&self, ctx: &egui::Context) {
        let Some(window) = self.state.overlay_anchor else {
            return;
        };
        let ppp = ctx.pixels_per_point();
        let position = egui::pos2(
            window.left as f32 / ppp,
            (window.top + window.height as i32) as f32 / ppp,
        );

        ctx.show_viewport_immediate(
            egui::ViewportId::from_hash_of("refresh_overlay"),
            egui::ViewportBuilder::default()
                .with_title("Hint")
                .with_inner_size(Vec2::new(220.0, 140.0))
                .with_position(position)
                .with_decorations(false)
                .with_always_on_top(),
            |ctx, _class| {
                egui::CentralPanel::default()
                    .frame(render::overlay_frame())
                    .show(ctx, |ui| {
                        render::render_overlay(ui, &self.state, &self.icons);
                    });
            },
        );
    }
}

impl eframe::App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.load_icons(ctx);
        self.update_window_status();
        self.drain_events();

        if self.state.status.is_running() && ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.handle_stop();
        }

        // Keep the elapsed time and window indicator current
        ctx.request_repaint_after(if self.state.status.is_running() {
            Duration::from_millis(200)
        } else {
            WINDOW_CHECK_INTERVAL
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Shop Refresher");
            ui.add_space(8.0);

            egui::ScrollArea::vertical().show(ui, |ui| {
                render::render_window_status(ui, &self.state);
                render::render_items(ui, &mut self.state, &self.icons);
                render::render_settings(ui, &mut self.state);

                let (start_clicked, stop_clicked) = render::render_controls(ui, &self.state);
                if start_clicked {
                    self.handle_start(ctx);
                }
                if stop_clicked {
                    self.handle_stop();
                }

                render::render_progress(ui, &self.state, &self.icons);
            });
        });

        if self.state.status.is_running() {
            self.show_overlay(ctx);
        }
    }
}

/// Run the GUI application.
/// This function blocks until the window is closed.
pub fn run_gui(config: AppConfig) -> eframe::Result<()> {
    log::info!("GUI: Creating native options...");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(Vec2::new(420.0, 480.0))
            .with_min_inner_size(Vec2::new(360.0, 360.0))
            .with_title("Shop Refresher"),
        ..Default::default()
    };

    eframe::run_native(
        "Shop Refresher",
        options,
        Box::new(move |_cc| {
            log::info!("GUI: Creating GuiApp instance...");
            Ok(Box::new(GuiApp::new(config)))
        }),
    )
}
