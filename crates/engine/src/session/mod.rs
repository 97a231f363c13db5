mod events;
mod service;
mod view;

pub use events::{SessionEvent, SessionMode, SessionPhase};
pub use service::{AssessmentSession, SessionBuilder};
pub use view::{NavigationOutcome, SessionSnapshot};
