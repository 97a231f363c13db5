use session_engine::{
    AssessmentSession, BrowserSignal, ClipboardAction, FinishOutcome, KeyChord, NavigationOutcome,
    SessionError, SessionEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::terminal::render;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Next,
    Previous,
    Go(usize),
    Answer(String),
    Mark,
    Finish,
    Show,
    Help,
    Quit,
    Signal(BrowserSignal),
}

fn parse_input(line: &str) -> Result<Input, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(Input::Show);
    };
    let arg = parts.next();
    let input = match (head, arg) {
        ("n", None) => Input::Next,
        ("p", None) => Input::Previous,
        ("g", Some(raw)) => {
            let slot: usize = raw.parse().map_err(|_| format!("not a question number: {raw}"))?;
            Input::Go(slot.checked_sub(1).ok_or("question numbers start at 1")?)
        }
        ("a", Some(label)) => Input::Answer(label.to_owned()),
        ("m", None) => Input::Mark,
        ("f", None) => Input::Finish,
        ("s", None) => Input::Show,
        ("h", None) => Input::Help,
        ("q", None) => Input::Quit,
        ("!copy", None) => Input::Signal(BrowserSignal::Clipboard(ClipboardAction::Copy)),
        ("!paste", None) => Input::Signal(BrowserSignal::Clipboard(ClipboardAction::Paste)),
        ("!menu", None) => Input::Signal(BrowserSignal::ContextMenu),
        ("!hide", None) => Input::Signal(BrowserSignal::VisibilityChange { hidden: true }),
        ("!blur", None) => Input::Signal(BrowserSignal::Blur),
        ("!fs-exit", None) => Input::Signal(BrowserSignal::FullscreenChange { active: false }),
        ("!fs-enter", None) => Input::Signal(BrowserSignal::FullscreenChange { active: true }),
        ("!alt-tab", None) => Input::Signal(BrowserSignal::KeyDown(KeyChord::new("Tab").alt())),
        ("!devtools", None) => Input::Signal(BrowserSignal::KeyDown(KeyChord::new("F12"))),
        _ => return Err(format!("unrecognised command: {line}")),
    };
    Ok(input)
}

fn print_help() {
    println!("n next | p previous | g <k> go to question k | a <label> answer");
    println!("m toggle mark | f finish | s show | q quit | h help");
    println!("lockdown simulation: !copy !paste !menu !hide !blur !fs-exit !fs-enter !alt-tab !devtools");
}

fn report_navigation(outcome: &NavigationOutcome) {
    match outcome {
        NavigationOutcome::Shown(_) => {}
        NavigationOutcome::Superseded => println!("(that question loaded after you moved on)"),
        NavigationOutcome::Terminal(status) => println!("attempt is {status}; answering is closed"),
    }
}

fn report_event(event: &SessionEvent) {
    match event {
        SessionEvent::NavigationFailed { no, message } => {
            println!("could not load question {no}: {message}");
        }
        SessionEvent::Warning(warning) => println!("warning: {}", warning.message),
        SessionEvent::Expired => println!("time is up, submitting…"),
        SessionEvent::Finished(result) => {
            let verdict = if result.is_passed { "passed" } else { "not passed" };
            println!(
                "submitted: {}/{} correct, accuracy {:.1}%, {verdict}",
                result.summary.correct, result.summary.total_questions, result.summary.accuracy
            );
        }
        SessionEvent::FinishFailed { message } => {
            println!("submit failed: {message}. Your answers are kept; press f to retry.");
        }
        SessionEvent::Closed(status) => println!("the attempt was closed by the server ({status})"),
    }
}

async fn apply(session: &AssessmentSession, input: Input) -> Result<bool, SessionError> {
    match input {
        Input::Next => {
            if let Some(outcome) = session.next().await? {
                report_navigation(&outcome);
            }
        }
        Input::Previous => {
            if let Some(outcome) = session.previous().await? {
                report_navigation(&outcome);
            }
        }
        Input::Go(index) => report_navigation(&session.navigate(index).await?),
        Input::Answer(label) => {
            let selection = session.select_label(&label)?;
            if !selection.is_staged() {
                println!("answer ignored: {selection:?}");
            }
        }
        Input::Mark => {
            if let Some(question) = session.current_question() {
                session.toggle_mark(question.id()).await?;
            }
        }
        Input::Finish => {
            if let FinishOutcome::InFlight = session.finish().await? {
                println!("already submitting…");
            }
        }
        Input::Show => {}
        Input::Help => print_help(),
        Input::Quit => return Ok(false),
        Input::Signal(signal) => {
            let verdict = session.handle_signal(&signal);
            if verdict.prevent_default {
                println!("(blocked)");
            }
            if verdict.confirm_unload {
                println!("(leave-page confirmation requested)");
            }
        }
    }
    Ok(true)
}

/// Read commands from stdin until the learner quits or the attempt ends.
pub async fn drive(session: AssessmentSession) {
    let mut events = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_help();
    print!("{}", render(&session.snapshot()));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match parse_input(&line) {
                    Ok(input) => match apply(&session, input).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(err) => println!("{err}"),
                    },
                    Err(message) => println!("{message}"),
                }
                print!("{}", render(&session.snapshot()));
            }
            event = events.recv() => match event {
                Ok(event) => {
                    report_event(&event);
                    if matches!(event, SessionEvent::Finished(_) | SessionEvent::Closed(_)) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed session events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_navigation_and_answers() {
        assert_eq!(parse_input("n"), Ok(Input::Next));
        assert_eq!(parse_input("g 3"), Ok(Input::Go(2)));
        assert_eq!(parse_input("a B"), Ok(Input::Answer("B".into())));
        assert_eq!(parse_input("   "), Ok(Input::Show));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse_input("g 0").is_err());
        assert!(parse_input("g x").is_err());
        assert!(parse_input("a").is_err());
        assert!(parse_input("dance").is_err());
    }

    #[test]
    fn simulated_signals_map_to_browser_events() {
        assert_eq!(
            parse_input("!fs-exit"),
            Ok(Input::Signal(BrowserSignal::FullscreenChange { active: false }))
        );
        assert_eq!(
            parse_input("!alt-tab"),
            Ok(Input::Signal(BrowserSignal::KeyDown(KeyChord::new("Tab").alt())))
        );
    }
}
