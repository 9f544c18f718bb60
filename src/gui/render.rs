//! GUI rendering functions.
//!
//! Contains UI layout and component rendering logic.

use std::collections::HashMap;

use eframe::egui::{self, Color32, RichText, TextureHandle, Vec2};

use super::state::{GuiState, SessionStatus};
use crate::automation::config::ItemConfig;

/// Side length of item icons in the settings window and overlay.
const ICON_SIZE: f32 = 45.0;

const OVERLAY_BG: Color32 = Color32::from_rgb(0x17, 0x17, 0x17);
const OVERLAY_FG: Color32 = Color32::from_rgb(0xdd, 0xdd, 0xdd);

/// Item icons keyed by icon file name.
pub type IconCache = HashMap<String, TextureHandle>;

/// Render whether the game window is currently found.
pub fn render_window_status(ui: &mut egui::Ui, state: &GuiState) {
    ui.horizontal(|ui| {
        ui.label("Game window:");
        if state.window_detected {
            ui.label(
                RichText::new(format!("\"{}\" detected", state.config.window_title))
                    .color(Color32::from_rgb(0, 150, 0)),
            );
        } else {
            ui.label(
                RichText::new(format!("\"{}\" not found", state.config.window_title))
                    .color(Color32::from_rgb(200, 0, 0)),
            );
        }
    });
}

/// Render one checkbox per catalog item.
pub fn render_items(ui: &mut egui::Ui, state: &mut GuiState, icons: &IconCache) {
    ui.add_space(8.0);
    ui.separator();
    ui.label(RichText::new("Items to buy").strong());

    let enabled = !state.status.is_running();
    for choice in &mut state.items {
        ui.horizontal(|ui| {
            ui.add_enabled(enabled, egui::Checkbox::without_text(&mut choice.selected));
            render_icon(ui, icons, &choice.item);
            ui.label(format!("{} ({})", choice.item.name, choice.item.price));
            if !choice.icon_available {
                ui.label(
                    RichText::new(format!("{} missing", choice.item.icon))
                        .small()
                        .color(Color32::from_rgb(200, 0, 0)),
                );
            }
        });
    }

    if state.items.iter().any(|choice| !choice.icon_available) {
        ui.label(
            RichText::new("Put the item icons into the assets folder next to the executable (see assets/README.md).")
                .small()
                .color(Color32::GRAY),
        );
    }
}

/// Render the delay and budget entries.
pub fn render_settings(ui: &mut egui::Ui, state: &mut GuiState) {
    ui.add_space(8.0);
    ui.separator();

    let enabled = !state.status.is_running();
    let mouse_valid = state.mouse_delay_valid();
    let screenshot_valid = state.screenshot_delay_valid();
    let budget_valid = state.budget_valid();

    egui::Grid::new("session_settings")
        .num_columns(2)
        .spacing([12.0, 6.0])
        .show(ui, |ui| {
            ui.label("Mouse delay (s):");
            text_entry(ui, &mut state.mouse_delay_text, enabled, mouse_valid);
            ui.end_row();

            ui.label("Screenshot delay (s):");
            text_entry(ui, &mut state.screenshot_delay_text, enabled, screenshot_valid);
            ui.end_row();

            ui.label("Refresh budget:");
            text_entry(ui, &mut state.budget_text, enabled, budget_valid);
            ui.end_row();
        });
    ui.label(
        RichText::new("Leave the budget empty to refresh until stopped.")
            .small()
            .color(Color32::GRAY),
    );
}

fn text_entry(ui: &mut egui::Ui, text: &mut String, enabled: bool, valid: bool) {
    let mut edit = egui::TextEdit::singleline(text).desired_width(80.0);
    if !valid {
        edit = edit.text_color(Color32::from_rgb(200, 0, 0));
    }
    ui.add_enabled(enabled, edit);
}

/// Render the control buttons.
/// Returns (start_clicked, stop_clicked).
pub fn render_controls(ui: &mut egui::Ui, state: &GuiState) -> (bool, bool) {
    let mut start_clicked = false;
    let mut stop_clicked = false;

    ui.add_space(8.0);
    ui.separator();
    ui.add_space(8.0);

    ui.horizontal(|ui| {
        let is_running = state.status.is_running();

        // Start button - disabled while running
        ui.add_enabled_ui(!is_running, |ui| {
            if ui.button(RichText::new("▶ Start refreshing").size(16.0)).clicked() {
                start_clicked = true;
            }
        });

        ui.add_space(20.0);

        // Stop button - enabled only while running
        ui.add_enabled_ui(is_running, |ui| {
            if ui.button(RichText::new("◼ Stop").size(16.0)).clicked() {
                stop_clicked = true;
            }
        });
    });

    (start_clicked, stop_clicked)
}

/// Render the status line and live counts.
pub fn render_progress(ui: &mut egui::Ui, state: &GuiState, icons: &IconCache) {
    ui.add_space(8.0);
    ui.separator();
    ui.add_space(8.0);

    ui.horizontal(|ui| {
        ui.label("Status:");

        let status_color = match &state.status {
            SessionStatus::Idle => Color32::GRAY,
            SessionStatus::Running { .. } => Color32::from_rgb(0, 120, 200),
            SessionStatus::Finished { .. } => Color32::from_rgb(0, 150, 0),
            SessionStatus::Error(_) => Color32::from_rgb(200, 0, 0),
        };

        ui.label(RichText::new(state.status.status_text()).color(status_color));
    });

    if let Some(elapsed) = state.status.elapsed_text() {
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            ui.label("Elapsed:");
            ui.label(elapsed);
        });
    }

    if let SessionStatus::Finished {
        history_path: Some(path),
        ..
    } = &state.status
    {
        ui.label(
            RichText::new(format!("Saved to {}", path.display()))
                .small()
                .color(Color32::GRAY),
        );
    }

    if let Some(progress) = &state.progress {
        ui.add_space(4.0);
        ui.label(format!("Refreshes: {}", progress.refresh_count));
        ui.horizontal(|ui| {
            for (item, count) in state.session_items.iter().zip(&progress.purchased) {
                render_icon(ui, icons, item);
                ui.label(count.to_string());
                ui.add_space(12.0);
            }
        });
    }
}

/// Render the always-on-top hint shown below the game window.
pub fn render_overlay(ui: &mut egui::Ui, state: &GuiState, icons: &IconCache) {
    ui.vertical_centered(|ui| {
        ui.label(RichText::new("Press ESC to stop refreshing!").color(OVERLAY_FG));
    });
    ui.add_space(6.0);

    let Some(progress) = &state.progress else {
        return;
    };
    ui.horizontal_wrapped(|ui| {
        for (item, count) in state.session_items.iter().zip(&progress.purchased) {
            ui.vertical(|ui| {
                render_icon(ui, icons, item);
                ui.label(RichText::new(count.to_string()).color(OVERLAY_FG));
            });
        }
    });
}

/// Frame for the overlay panel.
pub fn overlay_frame() -> egui::Frame {
    egui::Frame::default().fill(OVERLAY_BG).inner_margin(8.0)
}

fn render_icon(ui: &mut egui::Ui, icons: &IconCache, item: &ItemConfig) {
    if let Some(texture) = icons.get(&item.icon) {
        ui.image((texture.id(), Vec2::splat(ICON_SIZE)));
    } else {
        // Placeholder when image not loaded
        let (rect, _response) =
            ui.allocate_exact_size(Vec2::splat(ICON_SIZE), egui::Sense::hover());
        ui.painter().rect_filled(rect, 4.0, Color32::from_gray(200));
    }
}
