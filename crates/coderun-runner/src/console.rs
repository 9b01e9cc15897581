//! Run output: per-run buffers, console events and the display slot.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Identifies one run. Ids grow monotonically per console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u64);

impl RunId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Constructing,
    Executing,
    Completed,
    Failed,
}

/// What a run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub run: RunId,
    /// Newline-terminated lines, in order
    pub logs: String,
    /// Set when the run failed; `logs` still holds what came before
    pub error: Option<String>,
}

impl RunOutput {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    Phase { run: RunId, phase: RunPhase },
    Line { run: RunId, text: String },
    Finished(RunOutput),
}

/// Shared console for all runs of a runner
pub struct Console {
    next_run: AtomicU64,
    display: Mutex<DisplaySlot>,
    events: broadcast::Sender<ConsoleEvent>,
}

#[derive(Default)]
struct DisplaySlot {
    shown: Option<RunOutput>,
    /// Runs below this id started before the last clear
    floor: u64,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            next_run: AtomicU64::new(1),
            display: Mutex::new(DisplaySlot::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }

    /// Allocate the next run id
    pub fn begin(&self) -> RunId {
        RunId(self.next_run.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn phase(&self, run: RunId, phase: RunPhase) {
        tracing::debug!(run = %run, ?phase, "run phase");
        // No subscribers is fine
        let _ = self.events.send(ConsoleEvent::Phase { run, phase });
    }

    pub(crate) fn line(&self, run: RunId, text: &str) {
        let _ = self.events.send(ConsoleEvent::Line {
            run,
            text: text.to_string(),
        });
    }

    /// Publish a finished run. The display only moves forward: an older
    /// run finishing late does not replace a newer one, and a run started
    /// before the last [`clear`](Self::clear) is not shown at all.
    pub(crate) fn finish(&self, output: RunOutput) {
        {
            let mut display = self.display.lock();
            let current = output.run.0 >= display.floor
                && display
                    .shown
                    .as_ref()
                    .is_none_or(|shown| output.run >= shown.run);
            if current {
                display.shown = Some(output.clone());
            } else {
                tracing::debug!(run = %output.run, "stale run not displayed");
            }
        }
        let _ = self.events.send(ConsoleEvent::Finished(output));
    }

    /// Output of the latest run, if any
    pub fn display(&self) -> Option<RunOutput> {
        self.display.lock().shown.clone()
    }

    /// Empty the display. Runs already in flight stay off it when they end.
    pub fn clear(&self) {
        let mut display = self.display.lock();
        display.shown = None;
        display.floor = self.next_run.load(Ordering::Relaxed);
    }
}

/// Output buffer owned by a single run
pub(crate) struct RunLog {
    run: RunId,
    buffer: Mutex<String>,
    console: Arc<Console>,
}

impl RunLog {
    pub(crate) fn new(run: RunId, console: Arc<Console>) -> Self {
        Self {
            run,
            buffer: Mutex::new(String::new()),
            console,
        }
    }

    /// Append one line; the newline is added here
    pub(crate) fn push(&self, text: &str) {
        {
            let mut buffer = self.buffer.lock();
            buffer.push_str(text);
            buffer.push('\n');
        }
        self.console.line(self.run, text);
    }

    pub(crate) fn take(&self) -> String {
        std::mem::take(&mut *self.buffer.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(console: &Console, logs: &str) -> RunOutput {
        RunOutput {
            run: console.begin(),
            logs: logs.to_string(),
            error: None,
        }
    }

    #[test]
    fn run_ids_increase() {
        let console = Console::new();
        let a = console.begin();
        let b = console.begin();
        assert!(b > a);
        assert_eq!(a.to_string(), "#1");
    }

    #[test]
    fn display_keeps_the_newest_run() {
        let console = Console::new();
        let older = output(&console, "old\n");
        let newer = output(&console, "new\n");

        console.finish(newer.clone());
        console.finish(older);
        assert_eq!(console.display(), Some(newer));

        console.clear();
        assert_eq!(console.display(), None);
    }

    #[test]
    fn runs_started_before_a_clear_stay_hidden() {
        let console = Console::new();
        let in_flight = output(&console, "stale\n");
        console.clear();

        console.finish(in_flight.clone());
        assert_eq!(console.display(), None);

        let next = output(&console, "fresh\n");
        console.finish(next.clone());
        assert_eq!(console.display(), Some(next));
    }

    #[test]
    fn run_log_terminates_lines() {
        let console = Arc::new(Console::new());
        let mut events = console.subscribe();
        let log = RunLog::new(console.begin(), console.clone());
        log.push("a");
        log.push("b");
        assert_eq!(log.take(), "a\nb\n");
        assert!(matches!(
            events.try_recv(),
            Ok(ConsoleEvent::Line { text, .. }) if text == "a"
        ));
    }
}
