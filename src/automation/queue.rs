//! Event channel from the refresh worker to the GUI thread.
//!
//! Uses std::sync::mpsc for single-producer, single-consumer communication.
//! The worker never touches widgets: it sends events and asks the GUI to
//! repaint, and the GUI drains the receiver on its own thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};

use crate::automation::state::StopReason;
use crate::automation::stats::SessionRecord;
use crate::capture::Region;

/// Callback asking the GUI to repaint.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Live counters shown while a session runs.
#[derive(Clone, Debug, PartialEq)]
pub struct Progress {
    pub refresh_count: u32,
    /// Purchased count per tracked item, in registry order
    pub purchased: Vec<u32>,
    pub total_cost: u64,
    /// Human readable state of the controller
    pub state: String,
}

/// Everything the GUI learns when a session ends.
#[derive(Clone, Debug)]
pub struct SessionReport {
    pub reason: StopReason,
    pub record: SessionRecord,
    /// CSV file the record was appended to, if the write succeeded
    pub history_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// The game window was brought to front; the overlay may open.
    Started { window: Region },
    Progress(Progress),
    /// Sent exactly once per session, on every exit path.
    Finished(SessionReport),
}

/// Sending half of the event channel.
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<SessionEvent>,
    waker: Option<Waker>,
}

impl EventSender {
    /// Sends an event and wakes the GUI. A closed GUI is not an error.
    pub fn send(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("Event receiver dropped");
            return;
        }
        if let Some(waker) = &self.waker {
            waker();
        }
    }
}

/// Creates a new event channel.
///
/// Returns a tuple of (sender, receiver):
/// - The sender is moved into the worker thread
/// - The receiver is drained by the GUI every frame
pub fn create_event_channel(waker: Option<Waker>) -> (EventSender, Receiver<SessionEvent>) {
    let (sender, receiver) = channel();
    (EventSender { sender, waker }, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn progress(refresh_count: u32) -> Progress {
        Progress {
            refresh_count,
            purchased: vec![0, 0],
            total_cost: 0,
            state: "Scanning".to_string(),
        }
    }

    #[test]
    fn test_events_arrive_in_order() {
        let (sender, receiver) = create_event_channel(None);

        for i in 1..=5 {
            sender.send(SessionEvent::Progress(progress(i)));
        }

        for i in 1..=5 {
            match receiver.recv().unwrap() {
                SessionEvent::Progress(p) => assert_eq!(p.refresh_count, i),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_waker_called_per_event() {
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = wakes.clone();
        let waker: Waker = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (sender, _receiver) = create_event_channel(Some(waker));

        sender.send(SessionEvent::Progress(progress(1)));
        sender.send(SessionEvent::Progress(progress(2)));
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (sender, receiver) = create_event_channel(None);
        drop(receiver);
        // Must not panic
        sender.send(SessionEvent::Progress(progress(1)));
    }
}
