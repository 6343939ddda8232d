//! Communication log view: tails the backend's append-only log and keeps a
//! bounded window of rendered lines.

use std::collections::VecDeque;

use crate::backend::{Category, DeviceKind, Direction, LogEntry, LogSnapshot};

/// Default number of lines kept on screen
pub const LOG_WINDOW: usize = 100;

pub const PLACEHOLDER_IDLE: &str = "Start the monitor to see ESP32 communication";
pub const PLACEHOLDER_CLEARED: &str = "Communication log cleared";

/// One rendered log line. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: String,
    pub icon: &'static str,
    pub direction: &'static str,
    pub device_icon: &'static str,
    pub device_id: String,
    pub message: String,
    pub direction_kind: Direction,
    pub category: Category,
}

impl LogLine {
    pub fn render(entry: &LogEntry) -> Self {
        Self {
            timestamp: entry
                .formatted_time
                .clone()
                .unwrap_or_else(|| chrono::Local::now().format("%H:%M:%S").to_string()),
            icon: entry_icon(entry.direction, entry.category),
            direction: direction_label(entry.direction),
            device_icon: device_icon(entry.device_type),
            device_id: entry
                .device_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            message: entry.message.clone(),
            direction_kind: entry.direction,
            category: entry.category,
        }
    }
}

pub fn entry_icon(direction: Direction, category: Category) -> &'static str {
    match direction {
        Direction::Sent => "📤",
        Direction::Received => match category {
            Category::Vend => "🏪",
            Category::Status => "📊",
            Category::Error => "❌",
            Category::Success => "✅",
            Category::Discovery => "🔍",
            Category::Other => "📥",
        },
        Direction::Other => "ℹ️",
    }
}

pub fn device_icon(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::Serial => "🔌",
        DeviceKind::Wifi => "📶",
        DeviceKind::Unknown => "❓",
    }
}

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Sent => "SENT",
        _ => "RECV",
    }
}

/// What identifies an entry across snapshots: time, message and device
type EntryKey = (Option<String>, String, Option<String>);

fn entry_key(entry: &LogEntry) -> EntryKey {
    (
        entry.formatted_time.clone(),
        entry.message.clone(),
        entry.device_id.clone(),
    )
}

#[derive(Debug, Clone)]
pub struct LogView {
    lines: VecDeque<LogLine>,
    window: usize,
    /// Entries already rendered, as counted by the backend
    last_count: usize,
    total_entries: usize,
    /// Last entry rendered
    tail: Option<EntryKey>,
    /// Last entry rendered before a clear; snapshots still holding it are
    /// from before the clear
    stale_tail: Option<EntryKey>,
    placeholder: Option<&'static str>,
    /// Lines scrolled up from the tail; 0 = following
    scroll_back: usize,
}

impl Default for LogView {
    fn default() -> Self {
        Self::new(LOG_WINDOW)
    }
}

impl LogView {
    pub fn new(window: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(window),
            window: window.max(1),
            last_count: 0,
            total_entries: 0,
            tail: None,
            stale_tail: None,
            placeholder: Some(PLACEHOLDER_IDLE),
            scroll_back: 0,
        }
    }

    #[cfg(test)]
    pub fn lines(&self) -> impl DoubleEndedIterator<Item = &LogLine> + ExactSizeIterator {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_entries(&self) -> usize {
        self.total_entries
    }

    #[cfg(test)]
    pub fn last_count(&self) -> usize {
        self.last_count
    }

    pub fn placeholder(&self) -> Option<&'static str> {
        self.placeholder
    }

    pub fn scroll_back(&self) -> usize {
        self.scroll_back
    }

    /// Monitor started: drop placeholder and stale lines. The observed count
    /// is kept so entries seen before aren't replayed.
    pub fn begin(&mut self) {
        self.lines.clear();
        self.placeholder = None;
        self.scroll_back = 0;
    }

    /// Backend log was cleared
    pub fn clear(&mut self) {
        self.lines.clear();
        self.last_count = 0;
        self.total_entries = 0;
        self.stale_tail = self.tail.take();
        self.placeholder = Some(PLACEHOLDER_CLEARED);
        self.scroll_back = 0;
    }

    /// Render whatever the backend has appended since the last snapshot.
    /// Returns the number of new lines.
    ///
    /// The backend only returns its most recent entries, so the delta is
    /// computed from its running total, not from the slice length. Once the
    /// total stops growing (the backend caps its log) new entries are found
    /// by locating the last rendered entry in the slice.
    pub fn reconcile(&mut self, snapshot: &LogSnapshot) -> usize {
        let entries = &snapshot.log_entries;

        if let Some(stale) = &self.stale_tail {
            if entries.iter().any(|e| entry_key(e) == *stale) {
                tracing::debug!("Dropping communication log fetched before the clear");
                return 0;
            }
            self.stale_tail = None;
        }

        let observed = snapshot.total_entries.max(entries.len());
        self.total_entries = observed;

        if observed < self.last_count {
            tracing::debug!(
                "Communication log shrank ({} < {}), re-reading from start",
                observed,
                self.last_count
            );
            self.last_count = 0;
        }

        let mut fresh = (observed - self.last_count).min(entries.len());
        if fresh == 0 {
            fresh = self.entries_after_tail(entries);
        }
        if fresh == 0 {
            return 0;
        }

        for entry in &entries[entries.len() - fresh..] {
            self.push(LogLine::render(entry));
        }
        self.tail = entries.last().map(entry_key);
        self.last_count = observed;
        self.scroll_back = 0;
        fresh
    }

    /// Entries in `entries` newer than the last rendered one
    fn entries_after_tail(&self, entries: &[LogEntry]) -> usize {
        let Some(tail) = &self.tail else {
            return 0;
        };
        if entries.last().map(entry_key).as_ref() == Some(tail) {
            return 0;
        }
        match entries.iter().rposition(|e| entry_key(e) == *tail) {
            Some(i) => entries.len() - 1 - i,
            // Everything rolled over since the last poll
            None => entries.len(),
        }
    }

    fn push(&mut self, line: LogLine) {
        self.placeholder = None;
        self.lines.push_back(line);
        while self.lines.len() > self.window {
            self.lines.pop_front();
        }
    }

    pub fn scroll_up(&mut self, by: usize) {
        self.scroll_back = (self.scroll_back + by).min(self.lines.len().saturating_sub(1));
    }

    pub fn scroll_down(&mut self, by: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(by);
    }

    /// The slice that fits in `height` rows, ending at the current scroll
    /// position.
    pub fn visible(&self, height: usize) -> impl Iterator<Item = &LogLine> {
        let end = self.lines.len().saturating_sub(self.scroll_back);
        let start = end.saturating_sub(height);
        self.lines.range(start..end)
    }
}
