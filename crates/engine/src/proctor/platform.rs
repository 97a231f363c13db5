use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::monitor::ProctorWarning;
use super::signal::SignalKind;

/// Handle for one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The host environment the monitor runs in.
///
/// In a browser this wraps `addEventListener`, the fullscreen API and a modal
/// dialog; tests use a recording fake.
pub trait ProctorPlatform: Send + Sync {
    fn subscribe(&self, kind: SignalKind) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId);
    fn request_fullscreen(&self);
    fn show_warning(&self, warning: &ProctorWarning);
}

/// Every listener the monitor registered; all are removed on drop.
pub(super) struct ListenerSet {
    platform: Arc<dyn ProctorPlatform>,
    ids: Vec<(SignalKind, ListenerId)>,
}

impl ListenerSet {
    pub(super) fn register_all(platform: Arc<dyn ProctorPlatform>) -> Self {
        let ids = SignalKind::ALL
            .iter()
            .map(|kind| (*kind, platform.subscribe(*kind)))
            .collect();
        Self { platform, ids }
    }

    pub(super) fn len(&self) -> usize {
        self.ids.len()
    }
}

impl Drop for ListenerSet {
    fn drop(&mut self) {
        for (kind, id) in self.ids.drain(..) {
            debug!(event = kind.event_name(), listener = %id, "removing proctoring listener");
            self.platform.unsubscribe(id);
        }
    }
}
