use std::fmt;

use exam_core::model::ViolationKind;

/// Browser event sources the monitor listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Copy,
    Cut,
    Paste,
    ContextMenu,
    VisibilityChange,
    Blur,
    FullscreenChange,
    KeyDown,
    BeforeUnload,
}

impl SignalKind {
    pub const ALL: [Self; 9] = [
        Self::Copy,
        Self::Cut,
        Self::Paste,
        Self::ContextMenu,
        Self::VisibilityChange,
        Self::Blur,
        Self::FullscreenChange,
        Self::KeyDown,
        Self::BeforeUnload,
    ];

    /// DOM event name.
    #[must_use]
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Cut => "cut",
            Self::Paste => "paste",
            Self::ContextMenu => "contextmenu",
            Self::VisibilityChange => "visibilitychange",
            Self::Blur => "blur",
            Self::FullscreenChange => "fullscreenchange",
            Self::KeyDown => "keydown",
            Self::BeforeUnload => "beforeunload",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardAction {
    Copy,
    Cut,
    Paste,
}

impl ClipboardAction {
    pub(super) fn violation(self) -> ViolationKind {
        match self {
            Self::Copy => ViolationKind::Copy,
            Self::Cut => ViolationKind::Cut,
            Self::Paste => ViolationKind::Paste,
        }
    }
}

/// Why a key combination is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restriction {
    DevTools,
    ViewSource,
    AltTab,
    AltF4,
    OsKey,
}

impl Restriction {
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::DevTools => "developer tools shortcut",
            Self::ViewSource => "view source shortcut",
            Self::AltTab => "Alt+Tab",
            Self::AltF4 => "Alt+F4",
            Self::OsKey => "OS key",
        }
    }

    /// Restrictions that also pop the warning dialog.
    #[must_use]
    pub fn warns(self) -> bool {
        matches!(self, Self::AltTab)
    }
}

/// A `keydown` with its modifier state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyChord {
    pub key: String,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyChord {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    #[must_use]
    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    #[must_use]
    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    #[must_use]
    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    /// The restriction this chord hits, if any.
    #[must_use]
    pub fn restriction(&self) -> Option<Restriction> {
        let key = self.key.as_str();
        let upper = key.to_ascii_uppercase();
        let mac_inspector = self.meta && self.alt;

        if key == "F12"
            || (self.ctrl && self.shift && matches!(upper.as_str(), "I" | "J" | "C"))
            || (mac_inspector && matches!(upper.as_str(), "I" | "J" | "C"))
        {
            return Some(Restriction::DevTools);
        }
        if (self.ctrl || mac_inspector) && upper == "U" {
            return Some(Restriction::ViewSource);
        }
        if self.alt && key == "Tab" {
            return Some(Restriction::AltTab);
        }
        if self.alt && key == "F4" {
            return Some(Restriction::AltF4);
        }
        if matches!(key, "Meta" | "OS" | "Super") {
            return Some(Restriction::OsKey);
        }
        None
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (held, name) in [
            (self.ctrl, "Ctrl"),
            (self.meta, "Meta"),
            (self.alt, "Alt"),
            (self.shift, "Shift"),
        ] {
            if held {
                write!(f, "{name}+")?;
            }
        }
        f.write_str(&self.key)
    }
}

/// One browser event as seen by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserSignal {
    Clipboard(ClipboardAction),
    ContextMenu,
    VisibilityChange { hidden: bool },
    Blur,
    FullscreenChange { active: bool },
    KeyDown(KeyChord),
    BeforeUnload,
}

impl BrowserSignal {
    #[must_use]
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::Clipboard(ClipboardAction::Copy) => SignalKind::Copy,
            Self::Clipboard(ClipboardAction::Cut) => SignalKind::Cut,
            Self::Clipboard(ClipboardAction::Paste) => SignalKind::Paste,
            Self::ContextMenu => SignalKind::ContextMenu,
            Self::VisibilityChange { .. } => SignalKind::VisibilityChange,
            Self::Blur => SignalKind::Blur,
            Self::FullscreenChange { .. } => SignalKind::FullscreenChange,
            Self::KeyDown(_) => SignalKind::KeyDown,
            Self::BeforeUnload => SignalKind::BeforeUnload,
        }
    }
}
