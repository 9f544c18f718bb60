//! Configuration types for the shop refresher.
//!
//! Loads settings from config.json at startup. Provides the item catalog,
//! shop layout ratios, timing constants and the per-session settings that are
//! handed to the controller as an immutable value.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest accepted mouse/screenshot delay in seconds.
pub const MIN_DELAY_SECS: f32 = 0.01;
/// Largest accepted mouse/screenshot delay in seconds.
pub const MAX_DELAY_SECS: f32 = 10.0;
/// Budgets must stay below this value.
pub const MAX_BUDGET: u32 = 100_000_000;

/// A rectangle in relative coordinates (0.0 to 1.0).
/// Used for defining screen regions that scale with window size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    /// X position of top-left corner (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position of top-left corner (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
    /// Width as fraction of window width
    pub width: f32,
    /// Height as fraction of window height
    pub height: f32,
}

impl Default for RelativeRect {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }
}

/// A point in relative coordinates for button centers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ButtonConfig {
    /// X position (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self { x: 0.5, y: 0.5 }
    }
}

/// One purchasable item of the shop catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemConfig {
    /// Icon file name inside the assets directory
    pub icon: String,
    /// Display name, also used as the CSV column header
    pub name: String,
    /// Price of one purchase in the secondary currency
    pub price: u64,
}

/// Screen layout of the shop, in ratios of the game window.
///
/// These values are tuned against one client layout and are not expected
/// to generalize; adjust them in config.json rather than in code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopLayout {
    /// Part of the window searched for item icons: the icon column of the
    /// shop list. Search time grows with its area.
    pub item_search_region: RelativeRect,
    /// X position of the buy button column
    pub buy_button_x: f32,
    /// Offset from the top of a matched icon down to the buy button band
    pub buy_offset_y: f32,
    /// Confirm button of the purchase dialog
    pub confirm_buy: ButtonConfig,
    /// Refresh button of the shop
    pub refresh_button: ButtonConfig,
    /// Confirm button of the refresh dialog
    pub confirm_refresh: ButtonConfig,
    /// Start point of the scroll-down drag
    pub scroll_start: ButtonConfig,
    /// End point of the scroll-down drag
    pub scroll_end: ButtonConfig,
}

impl Default for ShopLayout {
    fn default() -> Self {
        Self {
            item_search_region: RelativeRect {
                x: 0.30,
                y: 0.0,
                width: 0.35,
                height: 1.0,
            },
            buy_button_x: 0.90,
            buy_offset_y: 0.085,
            confirm_buy: ButtonConfig { x: 0.55, y: 0.70 },
            refresh_button: ButtonConfig { x: 0.20, y: 0.90 },
            confirm_refresh: ButtonConfig { x: 0.58, y: 0.65 },
            scroll_start: ButtonConfig { x: 0.58, y: 0.65 },
            scroll_end: ButtonConfig { x: 0.58, y: 0.15 },
        }
    }
}

/// Settle and pacing constants, in seconds unless noted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Base of the slide-in wait before each round (added to the screenshot delay)
    pub slide_in_base_secs: f32,
    /// Lower bound of the slide-in wait
    pub slide_in_min_secs: f32,
    /// Wait between the buy click and the confirm click
    pub buy_settle_secs: f32,
    /// Wait between the refresh click and the refresh confirm click
    pub refresh_settle_secs: f32,
    /// Pointer travel to the scroll start point
    pub scroll_move_secs: f32,
    /// Duration of the scroll drag itself
    pub scroll_drag_secs: f32,
    /// Lower bound of the wait after a scroll
    pub scroll_settle_min_secs: f32,
    /// Random spread around the post-click wait
    pub click_jitter_secs: f32,
    /// Random spread of click positions in pixels
    pub position_jitter_px: i32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            slide_in_base_secs: 0.7,
            slide_in_min_secs: 1.0,
            buy_settle_secs: 0.2,
            refresh_settle_secs: 0.3,
            scroll_move_secs: 0.2,
            scroll_drag_secs: 0.5,
            scroll_settle_min_secs: 0.3,
            click_jitter_secs: 0.1,
            position_jitter_px: 3,
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Title (substring) of the game window
    pub window_title: String,
    /// Optional executable name the window must belong to (case-insensitive)
    pub process_name: Option<String>,
    /// Purchasable items
    pub items: Vec<ItemConfig>,
    /// Icon file names of catalog items that are not searched for
    pub skip_items: Vec<String>,
    /// Pointer travel and post-click pacing
    pub mouse_delay_secs: f32,
    /// Extra wait for screen content to settle before capturing
    pub screenshot_delay_secs: f32,
    /// Maximum number of refreshes; `None` or 0 means unlimited
    pub budget: Option<u32>,
    /// Minimum correlation score accepted as a match (0.0-1.0)
    pub min_confidence: f32,
    /// Sigma of the Gaussian smoothing applied before matching
    pub smoothing_sigma: f32,
    /// Resize factor for screenshot and icons before matching (1.0 = full size)
    pub match_scale: f32,
    /// Primary currency spent per refresh
    pub refresh_cost: u32,
    /// CSV header for the refresh currency
    pub refresh_currency_label: String,
    /// CSV header for the item currency
    pub item_currency_label: String,
    pub layout: ShopLayout,
    pub timings: Timings,
    /// Verbose logging of matching and clicks
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window_title: "Epic Seven".to_string(),
            process_name: None,
            items: vec![
                ItemConfig {
                    icon: "cov.png".to_string(),
                    name: "Covenant bookmark".to_string(),
                    price: 184_000,
                },
                ItemConfig {
                    icon: "mys.png".to_string(),
                    name: "Mystic medal".to_string(),
                    price: 280_000,
                },
            ],
            skip_items: Vec::new(),
            mouse_delay_secs: 0.3,
            screenshot_delay_secs: 0.3,
            budget: Some(100),
            min_confidence: 0.8,
            smoothing_sigma: 1.0,
            match_scale: 0.5,
            refresh_cost: 3,
            refresh_currency_label: "Skystone spent".to_string(),
            item_currency_label: "Gold spent".to_string(),
            layout: ShopLayout::default(),
            timings: Timings::default(),
            debug: false,
        }
    }
}

impl AppConfig {
    /// Catalog items that are not in the skip list, in catalog order.
    pub fn selected_items(&self) -> Vec<ItemConfig> {
        self.items
            .iter()
            .filter(|item| !self.skip_items.contains(&item.icon))
            .cloned()
            .collect()
    }

    /// Builds the immutable settings for one session.
    ///
    /// Delays are clamped into the accepted range so a bad config value
    /// cannot produce a zero-paced click storm.
    pub fn session_settings(&self, assets_dir: &Path, history_dir: &Path) -> SessionSettings {
        SessionSettings {
            window_title: self.window_title.clone(),
            process_name: self.process_name.clone(),
            budget: self.budget.filter(|b| *b > 0),
            items: self.selected_items(),
            assets_dir: assets_dir.to_path_buf(),
            history_dir: history_dir.to_path_buf(),
            mouse_delay: Duration::from_secs_f32(clamp_delay(self.mouse_delay_secs)),
            screenshot_delay: Duration::from_secs_f32(clamp_delay(self.screenshot_delay_secs)),
            min_confidence: self.min_confidence.clamp(0.0, 1.0),
            smoothing_sigma: self.smoothing_sigma.max(0.0),
            match_scale: self.match_scale.clamp(0.1, 1.0),
            refresh_cost: self.refresh_cost,
            refresh_currency_label: self.refresh_currency_label.clone(),
            item_currency_label: self.item_currency_label.clone(),
            layout: self.layout.clone(),
            timings: self.timings.clone(),
        }
    }
}

/// Everything one refresh session needs, fixed at construction.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub window_title: String,
    pub process_name: Option<String>,
    /// Refresh budget; `None` runs until cancelled
    pub budget: Option<u32>,
    pub items: Vec<ItemConfig>,
    pub assets_dir: PathBuf,
    pub history_dir: PathBuf,
    pub mouse_delay: Duration,
    pub screenshot_delay: Duration,
    pub min_confidence: f32,
    pub smoothing_sigma: f32,
    pub match_scale: f32,
    pub refresh_cost: u32,
    pub refresh_currency_label: String,
    pub item_currency_label: String,
    pub layout: ShopLayout,
    pub timings: Timings,
}

impl SessionSettings {
    /// Wait for the shop rows to finish sliding in: `max(base + screenshot_delay, min)`.
    pub fn slide_in_delay(&self) -> Duration {
        let base = secs(self.timings.slide_in_base_secs) + self.screenshot_delay;
        base.max(secs(self.timings.slide_in_min_secs))
    }

    /// Wait after a scroll gesture: `max(scroll_settle_min, screenshot_delay)`.
    pub fn scroll_settle(&self) -> Duration {
        secs(self.timings.scroll_settle_min_secs).max(self.screenshot_delay)
    }

    /// Returns true once the refresh count has used up the budget.
    pub fn budget_reached(&self, refresh_count: u32) -> bool {
        matches!(self.budget, Some(budget) if refresh_count >= budget)
    }
}

/// Converts a possibly negative seconds value into a duration.
pub fn secs(value: f32) -> Duration {
    Duration::from_secs_f32(value.max(0.0))
}

/// Clamps a delay into `[MIN_DELAY_SECS, MAX_DELAY_SECS]`.
pub fn clamp_delay(value: f32) -> f32 {
    if value.is_nan() {
        return MIN_DELAY_SECS;
    }
    value.clamp(MIN_DELAY_SECS, MAX_DELAY_SECS)
}

/// Parses a delay typed into the settings window.
///
/// Returns `None` for text that is not a number in `[0, 10]`.
pub fn parse_delay(text: &str) -> Option<f32> {
    let value: f32 = text.trim().parse().ok()?;
    (0.0..=MAX_DELAY_SECS).contains(&value).then_some(value)
}

/// Parses a budget typed into the settings window.
///
/// Empty text means "no budget" (`Some(None)`); invalid text returns `None`.
pub fn parse_budget(text: &str) -> Option<Option<u32>> {
    let text = text.trim();
    if text.is_empty() {
        return Some(None);
    }
    let value: u32 = text.parse().ok()?;
    (value < MAX_BUDGET).then_some(Some(value))
}

/// Loads configuration from `path` or returns defaults.
pub fn load_config(path: &Path) -> AppConfig {
    log::info!("Looking for config at: {}", path.display());

    if !path.exists() {
        log::info!("config.json not found. Using default config.");
        return AppConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                log::info!("Config loaded from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to parse config.json: {}. Using defaults.", e);
                AppConfig::default()
            }
        },
        Err(e) => {
            log::warn!("Failed to read config.json: {}. Using defaults.", e);
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "window_title": "Epic Seven - Emulator", "budget": 5 }"#).unwrap();

        let config = load_config(&path);
        assert_eq!(config.window_title, "Epic Seven - Emulator");
        assert_eq!(config.budget, Some(5));
        assert_eq!(config.items.len(), 2);
        assert_eq!(config.layout.buy_button_x, 0.90);
        assert_eq!(config.match_scale, 0.5);
        // Only the icon column is searched by default
        assert!(config.layout.item_search_region.width < 0.5);
    }

    #[test]
    fn test_match_scale_is_clamped() {
        let config = AppConfig {
            match_scale: 0.0,
            ..Default::default()
        };
        let settings = config.session_settings(Path::new("assets"), Path::new("history"));
        assert_eq!(settings.match_scale, 0.1);

        let config = AppConfig {
            match_scale: 4.0,
            ..Default::default()
        };
        let settings = config.session_settings(Path::new("assets"), Path::new("history"));
        assert_eq!(settings.match_scale, 1.0);
    }

    #[test]
    fn test_malformed_config_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(load_config(&path), AppConfig::default());
    }

    #[test]
    fn test_selected_items_respects_skip_list() {
        let config = AppConfig {
            skip_items: vec!["cov.png".to_string()],
            ..Default::default()
        };
        let names: Vec<String> = config.selected_items().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["Mystic medal".to_string()]);
    }

    #[test]
    fn test_session_settings_budget_zero_is_unlimited() {
        let config = AppConfig {
            budget: Some(0),
            ..Default::default()
        };
        let settings = config.session_settings(Path::new("assets"), Path::new("history"));
        assert_eq!(settings.budget, None);
        assert!(!settings.budget_reached(1_000));
    }

    #[test]
    fn test_slide_in_delay() {
        let mut settings =
            AppConfig::default().session_settings(Path::new("assets"), Path::new("history"));
        // 0.7 + 0.3 = 1.0
        assert!((settings.slide_in_delay().as_secs_f32() - 1.0).abs() < 1e-3);

        settings.screenshot_delay = Duration::from_millis(100);
        // max(0.8, 1.0)
        assert!((settings.slide_in_delay().as_secs_f32() - 1.0).abs() < 1e-3);

        settings.screenshot_delay = Duration::from_millis(800);
        assert!((settings.slide_in_delay().as_secs_f32() - 1.5).abs() < 1e-3);
    }

    #[test]
    fn test_delays_are_clamped() {
        let config = AppConfig {
            mouse_delay_secs: 0.0,
            screenshot_delay_secs: 60.0,
            ..Default::default()
        };
        let settings = config.session_settings(Path::new("assets"), Path::new("history"));
        assert_eq!(settings.mouse_delay, Duration::from_secs_f32(MIN_DELAY_SECS));
        assert_eq!(settings.screenshot_delay, Duration::from_secs_f32(MAX_DELAY_SECS));
    }

    #[test]
    fn test_parse_inputs() {
        assert_eq!(parse_delay("0.5"), Some(0.5));
        assert_eq!(parse_delay("11"), None);
        assert_eq!(parse_delay("abc"), None);
        assert_eq!(parse_budget(""), Some(None));
        assert_eq!(parse_budget("250"), Some(Some(250)));
        assert_eq!(parse_budget("100000000"), None);
        assert_eq!(parse_budget("-1"), None);
    }
}
