//! Shop Refresher
//!
//! A desktop tool that refreshes the in-game shop, finds tracked items by
//! template matching and buys them with simulated clicks until the refresh
//! budget is spent or the user presses Escape.

// Hide console window on Windows in release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod automation;
mod capture;
mod error;
mod gui;
mod logger;
mod paths;

use anyhow::{Context, Result, anyhow};

fn main() -> Result<()> {
    // Set up panic hook to log panics
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = if let Some(loc) = panic_info.location() {
            format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            String::new()
        };
        let thread = std::thread::current();
        log::error!(
            "[PANIC] thread '{}'{} {}",
            thread.name().unwrap_or("<unnamed>"),
            location,
            msg
        );
    }));

    // Ensure output directories exist
    paths::ensure_directories().context("Failed to create output directories")?;

    if let Err(e) = logger::init(&paths::get_logs_dir(), false) {
        eprintln!("Failed to install logger: {}", e);
    }

    enable_dpi_awareness();

    // Load configuration
    let config = automation::load_config(&paths::get_config_path());
    if config.debug {
        logger::set_debug(true);
        log::debug!("Debug logging enabled");
    }

    log::info!("Starting GUI application...");
    match gui::run_gui(config) {
        Ok(()) => {
            log::info!("GUI application exited normally");
            Ok(())
        }
        Err(e) => {
            log::error!("GUI error: {}", e);
            Err(anyhow!("GUI error: {}", e))
        }
    }
}

/// Makes capture and input coordinates physical pixels.
///
/// The embedded manifest already declares this; the call covers builds
/// without the manifest resource.
#[cfg(windows)]
fn enable_dpi_awareness() {
    use windows::Win32::UI::HiDpi::{
        DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2, SetProcessDpiAwarenessContext,
    };

    if let Err(e) = unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) } {
        // Fails when the manifest already set it
        log::debug!("SetProcessDpiAwarenessContext: {}", e);
    }
}

#[cfg(not(windows))]
fn enable_dpi_awareness() {}
