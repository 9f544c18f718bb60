//! Shop refresh automation.
//!
//! This module provides:
//! - Item detection via template matching
//! - Input simulation with position and timing jitter
//! - The refresh state machine and its worker thread
//! - Session statistics and the CSV refresh history

pub mod config;
pub mod csv_writer;
pub mod detection;
pub mod hotkey;
pub mod input;
pub mod items;
pub mod queue;
pub mod runner;
pub mod state;
pub mod stats;

pub use config::{AppConfig, ItemConfig, SessionSettings, load_config};
pub use queue::{Progress, SessionEvent, SessionReport, create_event_channel};
pub use runner::{CancellationSignal, Controller, STOP_TIMEOUT};
pub use state::StopReason;
