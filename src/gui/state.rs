//! GUI application state management.
//!
//! Tracks user input values and session status for display.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::automation::config::{AppConfig, ItemConfig, SessionSettings, parse_budget, parse_delay};
use crate::automation::csv_writer::format_duration;
use crate::automation::{Progress, SessionReport, StopReason};
use crate::capture::Region;

/// Session status for display in GUI.
#[derive(Clone, Debug, Default)]
pub enum SessionStatus {
    /// Not running, ready to start
    #[default]
    Idle,
    /// Session is running
    Running {
        state_description: String,
        start_time: Instant,
    },
    /// Session ended
    Finished {
        reason: StopReason,
        refresh_count: u32,
        total_cost: u64,
        history_path: Option<PathBuf>,
    },
    /// Session could not start or was lost
    Error(String),
}

impl SessionStatus {
    /// Get display text for current status.
    pub fn status_text(&self) -> String {
        match self {
            Self::Idle => "Ready".to_string(),
            Self::Running {
                state_description, ..
            } => format!("Running - {}", state_description),
            Self::Finished {
                reason,
                refresh_count,
                total_cost,
                ..
            } => format!(
                "{} after {} refreshes ({} spent on items)",
                reason, refresh_count, total_cost
            ),
            Self::Error(msg) => format!("Error: {}", msg),
        }
    }

    /// Get elapsed time string if running.
    pub fn elapsed_text(&self) -> Option<String> {
        match self {
            Self::Running { start_time, .. } => Some(format_duration(start_time.elapsed())),
            _ => None,
        }
    }

    /// Check if a session is currently running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn from_report(report: &SessionReport) -> Self {
        Self::Finished {
            reason: report.reason.clone(),
            refresh_count: report.record.refresh_count,
            total_cost: report.record.total_cost(),
            history_path: report.history_path.clone(),
        }
    }
}

/// One catalog item with its checkbox.
#[derive(Clone, Debug)]
pub struct ItemChoice {
    pub item: ItemConfig,
    pub selected: bool,
    /// False once loading the icon from the assets folder failed
    pub icon_available: bool,
}

/// GUI application state.
#[derive(Debug)]
pub struct GuiState {
    pub config: AppConfig,
    pub items: Vec<ItemChoice>,
    /// Text fields, validated on start
    pub mouse_delay_text: String,
    pub screenshot_delay_text: String,
    pub budget_text: String,
    pub status: SessionStatus,
    /// Whether the game window was found by the last lookup
    pub window_detected: bool,
    pub last_window_check: Option<Instant>,
    /// Items of the running session, in registry order
    pub session_items: Vec<ItemConfig>,
    /// Latest live counters of the running session
    pub progress: Option<Progress>,
    /// Game window of the running session, for overlay placement
    pub overlay_anchor: Option<Region>,
}

impl GuiState {
    pub fn new(config: AppConfig) -> Self {
        let items = config
            .items
            .iter()
            .map(|item| ItemChoice {
                item: item.clone(),
                selected: !config.skip_items.contains(&item.icon),
                icon_available: true,
            })
            .collect();
        Self {
            items,
            mouse_delay_text: config.mouse_delay_secs.to_string(),
            screenshot_delay_text: config.screenshot_delay_secs.to_string(),
            budget_text: config.budget.map(|b| b.to_string()).unwrap_or_default(),
            status: SessionStatus::Idle,
            window_detected: false,
            last_window_check: None,
            session_items: Vec::new(),
            progress: None,
            overlay_anchor: None,
            config,
        }
    }

    pub fn mouse_delay_valid(&self) -> bool {
        parse_delay(&self.mouse_delay_text).is_some()
    }

    pub fn screenshot_delay_valid(&self) -> bool {
        parse_delay(&self.screenshot_delay_text).is_some()
    }

    pub fn budget_valid(&self) -> bool {
        parse_budget(&self.budget_text).is_some()
    }

    /// Icon file names of selected items whose icon could not be loaded.
    pub fn missing_icons(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|choice| choice.selected && !choice.icon_available)
            .map(|choice| choice.item.icon.as_str())
            .collect()
    }

    /// Applies the form values to the loaded config and builds the settings
    /// of a new session.
    ///
    /// Returns a message naming the first invalid field.
    pub fn session_settings(
        &self,
        assets_dir: &Path,
        history_dir: &Path,
    ) -> std::result::Result<SessionSettings, String> {
        let mouse_delay = parse_delay(&self.mouse_delay_text)
            .ok_or("Mouse delay must be a number between 0 and 10")?;
        let screenshot_delay = parse_delay(&self.screenshot_delay_text)
            .ok_or("Screenshot delay must be a number between 0 and 10")?;
        let budget = parse_budget(&self.budget_text)
            .ok_or("Budget must be empty or a whole number below 100000000")?;
        let missing = self.missing_icons();
        if !missing.is_empty() {
            return Err(format!(
                "Item icon not found in the assets folder: {}",
                missing.join(", ")
            ));
        }

        let skip_items = self
            .items
            .iter()
            .filter(|choice| !choice.selected)
            .map(|choice| choice.item.icon.clone())
            .collect();
        let config = AppConfig {
            mouse_delay_secs: mouse_delay,
            screenshot_delay_secs: screenshot_delay,
            budget,
            skip_items,
            ..self.config.clone()
        };

        let settings = config.session_settings(assets_dir, history_dir);
        if settings.items.is_empty() {
            return Err("Select at least one item".to_string());
        }
        Ok(settings)
    }

    /// Records the start of a session.
    pub fn session_started(&mut self, items: Vec<ItemConfig>) {
        self.progress = Some(Progress {
            refresh_count: 0,
            purchased: vec![0; items.len()],
            total_cost: 0,
            state: "Starting".to_string(),
        });
        self.session_items = items;
        self.status = SessionStatus::Running {
            state_description: "Starting".to_string(),
            start_time: Instant::now(),
        };
    }

    pub fn apply_progress(&mut self, progress: Progress) {
        if let SessionStatus::Running {
            state_description, ..
        } = &mut self.status
        {
            *state_description = progress.state.clone();
        }
        self.progress = Some(progress);
    }

    pub fn session_finished(&mut self, report: &SessionReport) {
        self.status = SessionStatus::from_report(report);
        self.overlay_anchor = None;
        // Keep the final counts visible
        if let Some(progress) = &mut self.progress {
            progress.refresh_count = report.record.refresh_count;
            progress.purchased = report.record.items.iter().map(|t| t.purchased).collect();
            progress.total_cost = report.record.total_cost();
            progress.state = report.reason.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_builds_settings() {
        let mut state = GuiState::new(AppConfig::default());
        state.mouse_delay_text = "0.5".to_string();
        state.budget_text = "".to_string();
        state.items[1].selected = false;

        let settings = state
            .session_settings(Path::new("assets"), Path::new("history"))
            .unwrap();
        assert_eq!(settings.budget, None);
        assert_eq!(settings.mouse_delay.as_millis(), 500);
        assert_eq!(settings.items.len(), 1);
        assert_eq!(settings.items[0].name, "Covenant bookmark");
    }

    #[test]
    fn test_form_rejects_invalid_fields() {
        let mut state = GuiState::new(AppConfig::default());
        state.screenshot_delay_text = "soon".to_string();
        assert!(!state.screenshot_delay_valid());
        assert!(
            state
                .session_settings(Path::new("a"), Path::new("h"))
                .unwrap_err()
                .contains("Screenshot delay")
        );

        state.screenshot_delay_text = "0.3".to_string();
        for choice in &mut state.items {
            choice.selected = false;
        }
        assert_eq!(
            state
                .session_settings(Path::new("a"), Path::new("h"))
                .unwrap_err(),
            "Select at least one item"
        );
    }

    #[test]
    fn test_skip_list_preselects_items() {
        let config = AppConfig {
            skip_items: vec!["mys.png".to_string()],
            ..Default::default()
        };
        let state = GuiState::new(config);
        assert!(state.items[0].selected);
        assert!(!state.items[1].selected);
        assert_eq!(state.budget_text, "100");
    }

    #[test]
    fn test_missing_icon_blocks_start() {
        let mut state = GuiState::new(AppConfig::default());
        state.items[0].icon_available = false;
        state.items[1].icon_available = false;
        assert_eq!(state.missing_icons(), vec!["cov.png", "mys.png"]);

        let err = state
            .session_settings(Path::new("a"), Path::new("h"))
            .unwrap_err();
        assert!(err.contains("cov.png, mys.png"), "message was {}", err);

        // Deselected items do not need an icon
        state.items[0].selected = false;
        state.items[1].icon_available = true;
        let settings = state
            .session_settings(Path::new("a"), Path::new("h"))
            .unwrap();
        assert_eq!(settings.items.len(), 1);
        assert_eq!(settings.items[0].icon, "mys.png");
    }
}
