mod common;

use std::sync::Arc;
use std::time::Duration;

use exam_core::model::ViolationKind;
use session_engine::{
    BrowserSignal, ClipboardAction, KeyChord, SessionEvent, SessionMode, SignalKind, Verdict,
};
use tokio::time::sleep;

use common::{FakePlatform, backend, load, load_lockdown, opt, ordered, qid};

#[tokio::test(start_paused = true)]
async fn leaving_fullscreen_counts_warns_and_retries() {
    let api = backend(3, 600);
    let platform = Arc::new(FakePlatform::default());
    let session = load_lockdown(&api, ordered(), &platform).await;
    let mut events = session.subscribe();
    assert_eq!(session.mode(), SessionMode::Lockdown);
    assert_eq!(platform.live_listeners(), SignalKind::ALL.len());
    assert_eq!(platform.fullscreen_requests(), 1);

    let verdict = session.handle_signal(&BrowserSignal::FullscreenChange { active: false });

    assert_eq!(verdict.violation, Some(1));
    assert_eq!(verdict.refullscreen_after, Some(Duration::from_secs(1)));
    assert_eq!(session.snapshot().violations, Some(1));
    assert_eq!(platform.warnings().len(), 1);
    assert!(matches!(
        events.recv().await.expect("event"),
        SessionEvent::Warning(warning) if warning.kind == ViolationKind::FullscreenExit
    ));

    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(platform.fullscreen_requests(), 2);
}

#[tokio::test(start_paused = true)]
async fn each_blocked_action_counts_once_and_never_blocks_answers() {
    let api = backend(2, 600);
    let platform = Arc::new(FakePlatform::default());
    let session = load_lockdown(&api, ordered(), &platform).await;

    let signals = [
        BrowserSignal::Clipboard(ClipboardAction::Copy),
        BrowserSignal::ContextMenu,
        BrowserSignal::VisibilityChange { hidden: true },
        BrowserSignal::FullscreenChange { active: false },
        BrowserSignal::KeyDown(KeyChord::new("Tab").alt()),
    ];
    for (i, signal) in signals.iter().enumerate() {
        let verdict = session.handle_signal(signal);
        assert_eq!(verdict.violation, Some(u32::try_from(i).expect("small") + 1));
        let selection = session.select(qid(1), opt(1, 2)).expect("select");
        assert!(selection.is_staged());
    }

    let log = session.violations().expect("lockdown log");
    assert_eq!(log.count(), 5);
    assert_eq!(log.count_of(ViolationKind::RestrictedKey), 1);
    assert_eq!(
        session.snapshot().warning.map(|w| w.kind),
        Some(ViolationKind::RestrictedKey)
    );

    sleep(Duration::from_secs(3)).await;
    assert_eq!(api.answer_calls(), vec![(qid(1), opt(1, 2))]);
}

#[tokio::test(start_paused = true)]
async fn finishing_tears_down_proctoring() {
    let api = backend(2, 600);
    let platform = Arc::new(FakePlatform::default());
    let session = load_lockdown(&api, ordered(), &platform).await;
    assert!(session.handle_signal(&BrowserSignal::BeforeUnload).confirm_unload);

    session.finish().await.expect("finish");

    assert_eq!(platform.live_listeners(), 0);
    assert_eq!(
        session.handle_signal(&BrowserSignal::BeforeUnload),
        Verdict::allow()
    );
    assert_eq!(
        session.handle_signal(&BrowserSignal::ContextMenu),
        Verdict::allow()
    );
    assert_eq!(session.violations().map(|log| log.count()), Some(0));
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_listeners() {
    let api = backend(1, 600);
    let platform = Arc::new(FakePlatform::default());
    let session = load_lockdown(&api, ordered(), &platform).await;
    session.shutdown();
    assert_eq!(platform.live_listeners(), 0);

    let remaining = session.remaining_seconds();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(session.remaining_seconds(), remaining);
}

#[tokio::test(start_paused = true)]
async fn practice_sessions_ignore_browser_signals() {
    let api = backend(1, 600);
    let session = load(&api, ordered()).await;
    assert_eq!(session.mode(), SessionMode::Practice);
    assert_eq!(
        session.handle_signal(&BrowserSignal::Clipboard(ClipboardAction::Paste)),
        Verdict::allow()
    );
    assert!(session.violations().is_none());
    assert_eq!(session.snapshot().violations, None);
}
