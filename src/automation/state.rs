//! Refresh state machine.
//!
//! One round scans the shop, scrolls down and scans again, buying every
//! tracked item it finds, then refreshes the shop:
//! Starting → Scanning → Buying → ... → Refreshing → Scanning → ... → Stopping
//! Each step checks the cancellation signal before it acts, and every wait
//! between clicks returns early once it is set.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crate::automation::config::{ButtonConfig, SessionSettings, secs};
use crate::automation::csv_writer::{CurrencyLabels, write_session};
use crate::automation::detection::ItemMatcher;
use crate::automation::input::{InputDevice, InputPacing, InputSimulator};
use crate::automation::items::ItemRegistry;
use crate::automation::queue::{EventSender, Progress, SessionEvent, SessionReport};
use crate::automation::runner::CancellationSignal;
use crate::automation::stats::SessionStats;
use crate::capture::{RegionTracker, ScreenCapturer, WindowLocator};
use crate::error::{RefresherError, Result};

/// Which of the two scan passes of a round is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPass {
    /// Shop as shown after a refresh
    First,
    /// Rows revealed by the scroll-down gesture
    AfterScroll,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    BudgetReached,
    Cancelled,
    Failed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::BudgetReached => write!(f, "Budget reached"),
            StopReason::Cancelled => write!(f, "Cancelled"),
            StopReason::Failed(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// A matched item waiting to be bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPurchase {
    /// Index into the item registry
    pub index: usize,
    /// Buy button position relative to the window origin
    pub point: (u32, u32),
}

/// Refresh state machine states.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshState {
    /// Not started yet
    Idle,
    /// Bringing the game window to front
    Starting,
    /// Capturing and matching one scan pass
    Scanning(ScanPass),
    /// Buying the items matched by the last capture
    Buying {
        pass: ScanPass,
        queue: VecDeque<PendingPurchase>,
    },
    /// Clicking refresh and its confirmation
    Refreshing,
    /// Loop finished; statistics not yet persisted
    Stopping(StopReason),
    /// Statistics persisted and completion sent
    Stopped(StopReason),
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshState::Idle => write!(f, "Idle"),
            RefreshState::Starting => write!(f, "Starting"),
            RefreshState::Scanning(ScanPass::First) => write!(f, "Scanning"),
            RefreshState::Scanning(ScanPass::AfterScroll) => write!(f, "Scanning lower rows"),
            RefreshState::Buying { .. } => write!(f, "Buying"),
            RefreshState::Refreshing => write!(f, "Refreshing"),
            RefreshState::Stopping(reason) => write!(f, "Stopping ({})", reason),
            RefreshState::Stopped(reason) => write!(f, "Stopped ({})", reason),
        }
    }
}

/// OS-facing collaborators of one session.
pub struct SessionBackends {
    pub locator: Box<dyn WindowLocator>,
    pub capturer: Box<dyn ScreenCapturer>,
    pub device: Box<dyn InputDevice>,
    pub matcher: Box<dyn ItemMatcher>,
}

/// Refresh session context holding state, settings and backends.
pub struct RefreshEngine {
    state: RefreshState,
    settings: SessionSettings,
    registry: ItemRegistry,
    stats: SessionStats,
    /// Items already handled in the current round
    seen: Vec<bool>,
    round: u32,
    tracker: RegionTracker,
    capturer: Box<dyn ScreenCapturer>,
    input: InputSimulator,
    matcher: Box<dyn ItemMatcher>,
    cancel: CancellationSignal,
    events: EventSender,
}

impl RefreshEngine {
    pub fn new(
        settings: SessionSettings,
        registry: ItemRegistry,
        backends: SessionBackends,
        cancel: CancellationSignal,
        events: EventSender,
    ) -> Self {
        let pacing = InputPacing::from_settings(&settings);
        Self {
            state: RefreshState::Idle,
            stats: SessionStats::new(&registry, settings.refresh_cost),
            seen: vec![false; registry.len()],
            round: 0,
            tracker: RegionTracker::new(backends.locator),
            capturer: backends.capturer,
            input: InputSimulator::new(backends.device, pacing, cancel.clone()),
            matcher: backends.matcher,
            settings,
            registry,
            cancel,
            events,
        }
    }

    pub fn state(&self) -> &RefreshState {
        &self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Advances the state machine by one step.
    ///
    /// Returns `Ok(true)` while the session should continue and `Ok(false)`
    /// once it reached `Stopping`. An error means the session cannot go on;
    /// the caller records it with [`RefreshEngine::fail`].
    pub fn step(&mut self) -> Result<bool> {
        if matches!(
            self.state,
            RefreshState::Stopping(_) | RefreshState::Stopped(_)
        ) {
            return Ok(false);
        }

        // Check for cancellation before each state transition
        if self.checkpoint() {
            return Ok(false);
        }

        let state = std::mem::replace(&mut self.state, RefreshState::Idle);
        let outcome = match state {
            RefreshState::Idle => {
                log::info!(
                    "Starting refresh session: {} item(s), budget {}",
                    self.registry.len(),
                    self.settings
                        .budget
                        .map_or("unlimited".to_string(), |b| b.to_string())
                );
                self.state = RefreshState::Starting;
                Ok(())
            }

            RefreshState::Starting => self.start(),

            RefreshState::Scanning(pass) => self.scan(pass),

            RefreshState::Buying { pass, mut queue } => match queue.pop_front() {
                Some(purchase) => {
                    self.buy(purchase);
                    if !self.is_stopping() {
                        self.state = RefreshState::Buying { pass, queue };
                    }
                    Ok(())
                }
                None => {
                    self.finish_pass(pass);
                    Ok(())
                }
            },

            RefreshState::Refreshing => self.refresh(),

            RefreshState::Stopping(_) | RefreshState::Stopped(_) => {
                self.state = state;
                Ok(())
            }
        };

        match outcome {
            Err(RefresherError::Cancelled) => {
                self.stop_cancelled();
                Ok(false)
            }
            Err(e) => Err(e),
            Ok(()) => Ok(!self.is_stopping()),
        }
    }

    /// Moves to `Stopping` with an error that ended the loop.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::error!("Refresh session failed: {}", message);
        self.state = RefreshState::Stopping(StopReason::Failed(message));
    }

    /// Persists the statistics and moves to `Stopped`.
    ///
    /// Runs on every exit path. A failed history write is logged and does
    /// not prevent the report.
    pub fn finalize(&mut self) -> SessionReport {
        let reason = match &self.state {
            RefreshState::Stopping(reason) | RefreshState::Stopped(reason) => reason.clone(),
            other => StopReason::Failed(format!("session ended while {}", other)),
        };

        let record = self.stats.finish();
        log::info!(
            "Session finished ({}): {} refreshes, {} spent on items in {:.1}s",
            reason,
            record.refresh_count,
            record.total_cost(),
            record.duration.as_secs_f32()
        );

        let labels = CurrencyLabels {
            refresh: self.settings.refresh_currency_label.clone(),
            items: self.settings.item_currency_label.clone(),
        };
        let history_path = match write_session(&self.settings.history_dir, &record, &labels) {
            Ok(path) => {
                log::info!("History written to {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::error!("{}", RefresherError::History(format!("{:#}", e)));
                None
            }
        };

        self.state = RefreshState::Stopped(reason.clone());
        SessionReport {
            reason,
            record,
            history_path,
        }
    }

    fn start(&mut self) -> Result<()> {
        // A missing window is fatal only here
        let window = self.tracker.refresh()?;
        if let Err(e) = self.tracker.bring_to_front() {
            log::warn!("Could not bring the game window to front: {}", e);
        }
        log::info!(
            "Game window at ({}, {}) size {}x{}",
            window.left,
            window.top,
            window.width,
            window.height
        );

        self.stats = SessionStats::new(&self.registry, self.settings.refresh_cost);
        self.events.send(SessionEvent::Started { window });
        self.state = RefreshState::Scanning(ScanPass::First);
        Ok(())
    }

    fn scan(&mut self, pass: ScanPass) -> Result<()> {
        if pass == ScanPass::First {
            self.round += 1;
            self.seen.fill(false);
            log::debug!("Round {}: waiting for the shop to settle", self.round);
            if self.pause(self.settings.slide_in_delay()) {
                return Ok(());
            }
        }

        let region = self.tracker.current()?;
        let screenshot = match self.capturer.capture(&region) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("Round {}: {}; skipping this pass", self.round, e);
                self.finish_pass(pass);
                return Ok(());
            }
        };

        let mut queue = VecDeque::new();
        let mut interrupted = false;
        for (index, item) in self.registry.iter() {
            if self.seen[index] {
                continue;
            }
            // Matching one item can take a while; poll between items
            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            log::debug!("Round {}: searching for {}", self.round, item.name);
            if let Some(point) = self.matcher.find(&screenshot, item) {
                log::info!("Round {}: found {}", self.round, item.name);
                queue.push_back(PendingPurchase { index, point });
            }
        }
        if interrupted {
            self.stop_cancelled();
            return Ok(());
        }

        if queue.is_empty() {
            self.finish_pass(pass);
        } else {
            self.state = RefreshState::Buying { pass, queue };
        }
        Ok(())
    }

    /// Buys one matched item. Input failures skip the item for this round.
    fn buy(&mut self, purchase: PendingPurchase) {
        let PendingPurchase { index, point } = purchase;
        if self.seen[index] {
            return;
        }
        let name = self.registry.items()[index].name.clone();

        if self.checkpoint() {
            return;
        }
        let clicked = self.tracker.current().and_then(|region| {
            let (x, y) = region.to_screen(point.0, point.1);
            self.input.click_at(x, y)
        });
        if let Err(e) = clicked {
            if self.checkpoint() {
                return;
            }
            log::warn!("Buy click for {} failed: {}; skipping", name, e);
            self.seen[index] = true;
            return;
        }

        if self.pause(secs(self.settings.timings.buy_settle_secs)) || self.checkpoint() {
            return;
        }

        let confirm = self.settings.layout.confirm_buy;
        if let Err(e) = self.click_relative(&confirm) {
            if self.checkpoint() {
                return;
            }
            log::warn!("Purchase confirm for {} failed: {}; skipping", name, e);
            self.seen[index] = true;
            return;
        }

        self.seen[index] = true;
        self.stats.record_purchase(index);
        log::info!(
            "Bought {} ({} this session)",
            name,
            self.stats.purchased(index)
        );
        self.send_progress();
    }

    /// Ends a scan pass: scroll after the first one, check termination after
    /// the second one.
    fn finish_pass(&mut self, pass: ScanPass) {
        match pass {
            ScanPass::First => {
                if self.checkpoint() {
                    return;
                }
                let scrolled = self.tracker.current().and_then(|region| {
                    let layout = &self.settings.layout;
                    self.input
                        .drag_region(&region, &layout.scroll_start, &layout.scroll_end)
                });
                if let Err(e) = scrolled {
                    if self.checkpoint() {
                        return;
                    }
                    log::warn!("Round {}: scroll failed: {}", self.round, e);
                }
                self.state = RefreshState::Scanning(ScanPass::AfterScroll);
            }
            ScanPass::AfterScroll => {
                if self.checkpoint() {
                    return;
                }
                if self.settings.budget_reached(self.stats.refresh_count()) {
                    log::info!(
                        "Refresh budget of {} reached",
                        self.stats.refresh_count()
                    );
                    self.state = RefreshState::Stopping(StopReason::BudgetReached);
                } else {
                    self.state = RefreshState::Refreshing;
                }
            }
        }
    }

    fn refresh(&mut self) -> Result<()> {
        if self.checkpoint() {
            return Ok(());
        }
        let refresh_button = self.settings.layout.refresh_button;
        self.click_relative(&refresh_button)?;

        if self.pause(secs(self.settings.timings.refresh_settle_secs)) || self.checkpoint() {
            return Ok(());
        }
        let confirm = self.settings.layout.confirm_refresh;
        self.click_relative(&confirm)?;

        self.stats.record_refresh();
        log::info!("Shop refreshed ({} so far)", self.stats.refresh_count());
        self.send_progress();

        if self.pause(self.settings.mouse_delay) {
            return Ok(());
        }
        self.state = RefreshState::Scanning(ScanPass::First);
        Ok(())
    }

    /// Clicks a button given as ratios of the live window region.
    fn click_relative(&mut self, button: &ButtonConfig) -> Result<(i32, i32)> {
        let region = self.tracker.current()?;
        let (x, y) = region.point_at(button.x, button.y);
        self.input.click_at(x, y)
    }

    /// Waits `duration`; returns true (and stops) if cancelled meanwhile.
    fn pause(&mut self, duration: Duration) -> bool {
        if self.cancel.wait(duration) {
            self.stop_cancelled();
            return true;
        }
        false
    }

    /// Returns true (and stops) if cancellation was requested.
    fn checkpoint(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            self.stop_cancelled();
            return true;
        }
        false
    }

    fn stop_cancelled(&mut self) {
        if !self.is_stopping() {
            log::info!("Cancellation requested, stopping refresh session");
            self.state = RefreshState::Stopping(StopReason::Cancelled);
        }
    }

    fn is_stopping(&self) -> bool {
        matches!(
            self.state,
            RefreshState::Stopping(_) | RefreshState::Stopped(_)
        )
    }

    fn send_progress(&self) {
        self.events.send(SessionEvent::Progress(Progress {
            refresh_count: self.stats.refresh_count(),
            purchased: self.stats.items().iter().map(|t| t.purchased).collect(),
            total_cost: self.stats.total_cost(),
            state: self.state.to_string(),
        }));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::automation::config::{AppConfig, ItemConfig};
    use crate::automation::input::tests::RecordingDevice;
    use crate::automation::items::TrackedItem;
    use crate::automation::queue::create_event_channel;
    use crate::capture::Region;
    use image::{GrayImage, Luma};
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    pub(crate) const BOOKMARK: &str = "Covenant bookmark";

    pub(crate) struct FixedLocator(pub Option<Region>);

    impl WindowLocator for FixedLocator {
        fn locate(&self) -> Result<Region> {
            self.0
                .ok_or_else(|| RefresherError::WindowNotFound("Epic Seven".to_string()))
        }

        fn bring_to_front(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Encodes the capture number in the first pixel.
    pub(crate) struct CountingCapturer {
        pub captures: Arc<AtomicU32>,
        pub fail: bool,
    }

    impl ScreenCapturer for CountingCapturer {
        fn capture(&mut self, _region: &Region) -> Result<GrayImage> {
            let n = self.captures.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RefresherError::Capture("black screen".to_string()));
            }
            Ok(GrayImage::from_pixel(4, 4, Luma([n as u8])))
        }
    }

    /// Reports the bookmark in the listed rounds (1-based), on both passes.
    pub(crate) struct ScriptedMatcher {
        pub rounds: Vec<u32>,
    }

    impl ItemMatcher for ScriptedMatcher {
        fn find(&self, screenshot: &GrayImage, item: &TrackedItem) -> Option<(u32, u32)> {
            let capture = screenshot.get_pixel(0, 0)[0] as u32;
            let round = capture / 2 + 1;
            (item.name == BOOKMARK && self.rounds.contains(&round)).then_some((10, 10))
        }
    }

    /// Presses cancel the session once `cancel_after` presses happened.
    struct CancellingDevice {
        inner: RecordingDevice,
        cancel: CancellationSignal,
        presses: u32,
        cancel_after: u32,
    }

    impl InputDevice for CancellingDevice {
        fn cursor_position(&self) -> Result<(i32, i32)> {
            self.inner.cursor_position()
        }

        fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
            self.inner.move_to(x, y)
        }

        fn press(&mut self) -> Result<()> {
            self.presses += 1;
            if self.presses >= self.cancel_after {
                self.cancel.cancel();
            }
            self.inner.press()
        }

        fn release(&mut self) -> Result<()> {
            self.inner.release()
        }
    }

    /// Moves cancel the session once `cancel_after` moves happened.
    struct MoveCancellingDevice {
        inner: RecordingDevice,
        cancel: CancellationSignal,
        moves: u32,
        cancel_after: u32,
    }

    impl InputDevice for MoveCancellingDevice {
        fn cursor_position(&self) -> Result<(i32, i32)> {
            self.inner.cursor_position()
        }

        fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
            self.moves += 1;
            if self.moves >= self.cancel_after {
                self.cancel.cancel();
            }
            self.inner.move_to(x, y)
        }

        fn press(&mut self) -> Result<()> {
            self.inner.press()
        }

        fn release(&mut self) -> Result<()> {
            self.inner.release()
        }
    }

    /// Cancels the session while matching the first item.
    struct CancellingMatcher {
        cancel: CancellationSignal,
        searched: Arc<Mutex<Vec<String>>>,
    }

    impl ItemMatcher for CancellingMatcher {
        fn find(&self, _screenshot: &GrayImage, item: &TrackedItem) -> Option<(u32, u32)> {
            self.searched.lock().unwrap().push(item.name.clone());
            self.cancel.cancel();
            Some((10, 10))
        }
    }

    pub(crate) fn registry() -> ItemRegistry {
        ItemRegistry::new(vec![
            TrackedItem {
                name: BOOKMARK.to_string(),
                template: GrayImage::new(2, 2),
                price: 184_000,
            },
            TrackedItem {
                name: "Mystic medal".to_string(),
                template: GrayImage::new(2, 2),
                price: 280_000,
            },
        ])
    }

    /// Settings with every wait zeroed.
    pub(crate) fn instant_settings(history_dir: &Path, budget: Option<u32>) -> SessionSettings {
        let config = AppConfig {
            items: vec![ItemConfig {
                icon: "unused.png".to_string(),
                name: BOOKMARK.to_string(),
                price: 184_000,
            }],
            ..Default::default()
        };
        let mut settings = config.session_settings(Path::new("assets"), history_dir);
        settings.budget = budget;
        settings.mouse_delay = Duration::ZERO;
        settings.screenshot_delay = Duration::ZERO;
        settings.timings.slide_in_base_secs = 0.0;
        settings.timings.slide_in_min_secs = 0.0;
        settings.timings.buy_settle_secs = 0.0;
        settings.timings.refresh_settle_secs = 0.0;
        settings.timings.scroll_move_secs = 0.0;
        settings.timings.scroll_drag_secs = 0.0;
        settings.timings.scroll_settle_min_secs = 0.0;
        settings.timings.click_jitter_secs = 0.0;
        settings.timings.position_jitter_px = 0;
        settings
    }

    fn engine(
        settings: SessionSettings,
        device: Box<dyn InputDevice>,
        matcher_rounds: Vec<u32>,
        fail_capture: bool,
        cancel: CancellationSignal,
    ) -> RefreshEngine {
        let (events, _receiver) = create_event_channel(None);
        RefreshEngine::new(
            settings,
            registry(),
            SessionBackends {
                locator: Box::new(FixedLocator(Some(Region::new(0, 0, 100, 100)))),
                capturer: Box::new(CountingCapturer {
                    captures: Arc::new(AtomicU32::new(0)),
                    fail: fail_capture,
                }),
                device,
                matcher: Box::new(ScriptedMatcher {
                    rounds: matcher_rounds,
                }),
            },
            cancel,
            events,
        )
    }

    fn run_to_end(engine: &mut RefreshEngine) -> SessionReport {
        let mut steps = 0;
        loop {
            match engine.step() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    engine.fail(e.to_string());
                    break;
                }
            }
            steps += 1;
            assert!(steps < 10_000, "state machine did not terminate");
        }
        engine.finalize()
    }

    #[test]
    fn test_budget_scenario() {
        let dir = tempdir().unwrap();
        let device = RecordingDevice::default();
        let mut engine = engine(
            instant_settings(dir.path(), Some(3)),
            Box::new(device.clone()),
            vec![1, 3],
            false,
            CancellationSignal::new(),
        );

        let report = run_to_end(&mut engine);

        assert_eq!(report.reason, StopReason::BudgetReached);
        assert_eq!(report.record.refresh_count, 3);
        assert_eq!(report.record.purchased(BOOKMARK), Some(2));
        assert_eq!(report.record.purchased("Mystic medal"), Some(0));
        assert_eq!(report.record.total_cost(), 368_000);
        assert_eq!(engine.state(), &RefreshState::Stopped(StopReason::BudgetReached));

        // 4 rounds: 2 purchases x 2 clicks, 4 scrolls, 3 refreshes x 2 clicks
        assert_eq!(device.press_points().len(), 14);

        let path = report.history_path.unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with(",3,9,368000,2,0"), "row was {}", lines[1]);
    }

    #[test]
    fn test_seen_item_not_bought_twice_in_round() {
        let dir = tempdir().unwrap();
        let device = RecordingDevice::default();
        let mut engine = engine(
            instant_settings(dir.path(), Some(1)),
            Box::new(device.clone()),
            vec![1],
            false,
            CancellationSignal::new(),
        );

        let report = run_to_end(&mut engine);

        // Found on both passes of round 1, bought once
        assert_eq!(report.record.purchased(BOOKMARK), Some(1));
        // Buy point (10, 10) is clicked once, confirm once
        let buy_clicks = device
            .press_points()
            .into_iter()
            .filter(|p| *p == (10, 10))
            .count();
        assert_eq!(buy_clicks, 1);
    }

    #[test]
    fn test_cancel_during_buy() {
        let dir = tempdir().unwrap();
        let cancel = CancellationSignal::new();
        let device = CancellingDevice {
            inner: RecordingDevice::default(),
            cancel: cancel.clone(),
            presses: 0,
            cancel_after: 1,
        };
        let inner = device.inner.clone();
        let mut engine = engine(
            instant_settings(dir.path(), Some(3)),
            Box::new(device),
            vec![1],
            false,
            cancel,
        );

        let report = run_to_end(&mut engine);

        assert_eq!(report.reason, StopReason::Cancelled);
        assert_eq!(report.record.purchased(BOOKMARK), Some(0));
        assert_eq!(report.record.refresh_count, 0);
        // Buy clicked, confirm never clicked
        assert_eq!(inner.press_points().len(), 1);
        assert!(report.history_path.unwrap().exists());
    }

    #[test]
    fn test_cancel_between_item_searches() {
        let dir = tempdir().unwrap();
        let cancel = CancellationSignal::new();
        let searched = Arc::new(Mutex::new(Vec::new()));
        let device = RecordingDevice::default();
        let (events, _receiver) = create_event_channel(None);
        let mut engine = RefreshEngine::new(
            instant_settings(dir.path(), None),
            registry(),
            SessionBackends {
                locator: Box::new(FixedLocator(Some(Region::new(0, 0, 100, 100)))),
                capturer: Box::new(CountingCapturer {
                    captures: Arc::new(AtomicU32::new(0)),
                    fail: false,
                }),
                device: Box::new(device.clone()),
                matcher: Box::new(CancellingMatcher {
                    cancel: cancel.clone(),
                    searched: searched.clone(),
                }),
            },
            cancel,
            events,
        );

        let report = run_to_end(&mut engine);

        assert_eq!(report.reason, StopReason::Cancelled);
        // The second item is never searched and nothing is clicked
        assert_eq!(*searched.lock().unwrap(), vec![BOOKMARK.to_string()]);
        assert!(device.press_points().is_empty());
    }

    #[test]
    fn test_cancel_while_gliding_to_refresh() {
        let dir = tempdir().unwrap();
        let cancel = CancellationSignal::new();
        let device = MoveCancellingDevice {
            inner: RecordingDevice::default(),
            cancel: cancel.clone(),
            moves: 0,
            // The scroll makes two moves; the refresh glide starts with the third
            cancel_after: 3,
        };
        let inner = device.inner.clone();
        let mut settings = instant_settings(dir.path(), None);
        settings.mouse_delay = Duration::from_millis(50);
        let mut engine = engine(settings, Box::new(device), vec![], false, cancel);

        let report = run_to_end(&mut engine);

        // An interrupted click is a cancellation, not a failure
        assert_eq!(report.reason, StopReason::Cancelled);
        assert_eq!(report.record.refresh_count, 0);
        // Only the scroll pressed the button
        assert_eq!(inner.press_points().len(), 1);
    }

    #[test]
    fn test_capture_failure_skips_pass() {
        let dir = tempdir().unwrap();
        let mut engine = engine(
            instant_settings(dir.path(), Some(2)),
            Box::new(RecordingDevice::default()),
            vec![1, 2, 3],
            true,
            CancellationSignal::new(),
        );

        let report = run_to_end(&mut engine);

        assert_eq!(report.reason, StopReason::BudgetReached);
        assert_eq!(report.record.refresh_count, 2);
        assert_eq!(report.record.total_cost(), 0);
    }

    #[test]
    fn test_input_failure_ends_in_failed_stop() {
        let dir = tempdir().unwrap();
        let device = RecordingDevice {
            fail_press: true,
            ..Default::default()
        };
        let mut engine = engine(
            instant_settings(dir.path(), None),
            Box::new(device),
            vec![1],
            false,
            CancellationSignal::new(),
        );

        let report = run_to_end(&mut engine);

        // Buy skipped, then the refresh click fails
        assert!(matches!(report.reason, StopReason::Failed(_)));
        assert_eq!(report.record.purchased(BOOKMARK), Some(0));
        assert_eq!(report.record.refresh_count, 0);
        assert!(report.history_path.is_some());
    }

    #[test]
    fn test_missing_window_fails_at_start() {
        let dir = tempdir().unwrap();
        let (events, receiver) = create_event_channel(None);
        let mut engine = RefreshEngine::new(
            instant_settings(dir.path(), Some(1)),
            registry(),
            SessionBackends {
                locator: Box::new(FixedLocator(None)),
                capturer: Box::new(CountingCapturer {
                    captures: Arc::new(AtomicU32::new(0)),
                    fail: false,
                }),
                device: Box::new(RecordingDevice::default()),
                matcher: Box::new(ScriptedMatcher { rounds: vec![] }),
            },
            CancellationSignal::new(),
            events,
        );

        let report = run_to_end(&mut engine);

        assert!(matches!(&report.reason, StopReason::Failed(msg) if msg.contains("Epic Seven")));
        assert!(receiver.try_recv().is_err(), "no Started event without a window");
    }

    #[test]
    fn test_unlimited_budget_stops_only_on_cancel() {
        let dir = tempdir().unwrap();
        let cancel = CancellationSignal::new();
        let mut engine = engine(
            instant_settings(dir.path(), None),
            Box::new(RecordingDevice::default()),
            vec![],
            false,
            cancel.clone(),
        );

        for _ in 0..200 {
            assert!(engine.step().unwrap());
        }
        assert!(engine.stats().refresh_count() > 10);

        cancel.cancel();
        assert!(!engine.step().unwrap());
        assert_eq!(engine.finalize().reason, StopReason::Cancelled);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", RefreshState::Idle), "Idle");
        assert_eq!(
            format!("{}", RefreshState::Scanning(ScanPass::AfterScroll)),
            "Scanning lower rows"
        );
        assert_eq!(
            format!("{}", RefreshState::Stopped(StopReason::Failed("test".to_string()))),
            "Stopped (Error: test)"
        );
    }
}
