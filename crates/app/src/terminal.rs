use std::sync::atomic::{AtomicU64, Ordering};

use session_engine::{
    ListenerId, ProctorPlatform, ProctorWarning, SessionSnapshot, SignalKind, SyncStatus,
};
use tracing::debug;

/// Proctoring host for a terminal: there are no real browser events, so
/// listeners are bookkeeping only and warnings go to stderr.
#[derive(Debug, Default)]
pub struct TerminalPlatform {
    next: AtomicU64,
}

impl TerminalPlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProctorPlatform for TerminalPlatform {
    fn subscribe(&self, kind: SignalKind) -> ListenerId {
        let id = ListenerId::new(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        debug!(event = kind.event_name(), listener = %id, "listener registered");
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        debug!(listener = %id, "listener removed");
    }

    fn request_fullscreen(&self) {
        eprintln!("[lockdown] please keep the exam in fullscreen");
    }

    fn show_warning(&self, warning: &ProctorWarning) {
        eprintln!("[lockdown] {}", warning.message);
    }
}

pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn sync_label(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Idle => "",
        SyncStatus::Saving => "saving…",
        SyncStatus::Saved => "saved",
        SyncStatus::Error => "not saved",
    }
}

/// Render the current question and the status line.
pub fn render(snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();
    let position = snapshot.current_index.map_or(0, |index| index + 1);
    out.push_str(&format!(
        "\nQuestion {position}/{}   time {}   answered {}/{}   {}\n",
        snapshot.total(),
        format_clock(snapshot.remaining_seconds),
        snapshot.progress.done,
        snapshot.progress.total,
        sync_label(snapshot.sync),
    ));
    if let Some(count) = snapshot.violations {
        out.push_str(&format!("violations: {count}\n"));
    }
    if let Some(question) = &snapshot.current {
        let flag = if question.is_marked() { " [marked]" } else { "" };
        out.push_str(&format!("{}{flag}\n", question.prompt()));
        for option in question.options() {
            let chosen = if question.selected_option_id() == Some(option.id) {
                '*'
            } else {
                ' '
            };
            out.push_str(&format!(" {chosen} {}. {}", option.label, option.text));
            if let Some(correct) = option.is_correct {
                out.push_str(if correct { "  (correct)" } else { "" });
            }
            out.push('\n');
        }
        if let Some(explanation) = question.explanation() {
            out.push_str(&format!("explanation: {explanation}\n"));
        }
    }
    let grid: Vec<String> = snapshot
        .navigation
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let state = match (item.done, item.marked) {
                (_, true) => "?",
                (true, false) => "x",
                (false, false) => ".",
            };
            format!("{}{state}", index + 1)
        })
        .collect();
    out.push_str(&format!("grid: {}\n", grid.join(" ")));
    if let Some(error) = &snapshot.last_error {
        out.push_str(&format!("error: {error}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_minutes_and_seconds() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(61), "01:01");
        assert_eq!(format_clock(3_600), "60:00");
    }

    #[test]
    fn listener_ids_are_unique() {
        let platform = TerminalPlatform::new();
        let a = platform.subscribe(SignalKind::Copy);
        let b = platform.subscribe(SignalKind::Blur);
        assert_ne!(a, b);
    }
}
