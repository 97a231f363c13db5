use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use assessment_api::{
    ApiConfig, AssessmentApi, AuthContext, FakeOption, HttpAssessmentApi, InMemoryAssessment,
};
use exam_core::model::AttemptId;
use session_engine::{EngineConfig, SessionBuilder};

mod runner;
mod terminal;

use terminal::TerminalPlatform;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    MissingAttempt,
    InvalidAttemptId { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::MissingAttempt => write!(f, "run requires --attempt <id>"),
            ArgsError::InvalidAttemptId { raw } => write!(f, "invalid --attempt value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  exam run  --attempt <id> [--lockdown] [--api <url>] [--token <t>] [--config <path>]");
    eprintln!("  exam demo [--lockdown] [--config <path>]");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_API_BASE_URL, EXAM_API_TOKEN, EXAM_API_TIMEOUT_SECS");
    eprintln!("  EXAM_DEBOUNCE_MS, EXAM_STATUS_DISPLAY_MS, EXAM_REQUEST_TIMEOUT_MS,");
    eprintln!("  EXAM_FULLSCREEN_RETRY_MS, EXAM_SHUFFLE, EXAM_SEED, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Demo,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "run" => Some(Self::Run),
            "demo" => Some(Self::Demo),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    attempt: Option<AttemptId>,
    lockdown: bool,
    api_url: Option<String>,
    token: Option<String>,
    config: Option<PathBuf>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--attempt" => {
                    let value = require_value(args, "--attempt")?;
                    let attempt = value
                        .parse::<AttemptId>()
                        .map_err(|_| ArgsError::InvalidAttemptId { raw: value.clone() })?;
                    parsed.attempt = Some(attempt);
                }
                "--lockdown" => parsed.lockdown = true,
                "--api" => parsed.api_url = Some(require_value(args, "--api")?),
                "--token" => parsed.token = Some(require_value(args, "--token")?),
                "--config" => parsed.config = Some(PathBuf::from(require_value(args, "--config")?)),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        Ok(parsed)
    }

    fn engine_config(&self) -> Result<EngineConfig, Box<dyn std::error::Error>> {
        let base = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        Ok(base.with_env_overrides()?)
    }
}

/// A small in-memory attempt for trying the runner without a backend.
fn demo_backend() -> InMemoryAssessment {
    let backend = InMemoryAssessment::new(AttemptId::new(1), 300);
    backend
        .push_question(
            1,
            "Which keyword declares an immutable binding in Rust?",
            vec![
                FakeOption::new(11, "let", true),
                FakeOption::new(12, "var", false),
                FakeOption::new(13, "const mut", false),
                FakeOption::new(14, "mut", false),
            ],
        )
        .push_question(
            2,
            "What does the ? operator do on an Err value?",
            vec![
                FakeOption::new(21, "Panics", false),
                FakeOption::new(22, "Returns it early from the function", true),
                FakeOption::new(23, "Ignores it", false),
            ],
        )
        .push_question(
            3,
            "Which type gives shared ownership across threads?",
            vec![
                FakeOption::new(31, "Rc<T>", false),
                FakeOption::new(32, "Box<T>", false),
                FakeOption::new(33, "Arc<T>", true),
                FakeOption::new(34, "Cell<T>", false),
            ],
        );
    backend.set_passing_score(60.0);
    backend
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,session_engine=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let config = parsed.engine_config()?;

    let (api, attempt): (Arc<dyn AssessmentApi>, AttemptId) = match cmd {
        Command::Run => {
            let attempt = parsed.attempt.ok_or(ArgsError::MissingAttempt)?;
            let api_config = match &parsed.api_url {
                Some(url) => ApiConfig::new(url)?,
                None => ApiConfig::from_env()?,
            };
            let auth = match &parsed.token {
                Some(token) => AuthContext::bearer(token.clone()),
                None => AuthContext::from_env(),
            };
            (Arc::new(HttpAssessmentApi::new(api_config, auth)?), attempt)
        }
        Command::Demo => {
            let backend = demo_backend();
            let attempt = backend.attempt_id();
            (Arc::new(backend), attempt)
        }
    };

    let mut builder = SessionBuilder::new(api, config);
    if parsed.lockdown {
        builder = builder.with_lockdown(Arc::new(TerminalPlatform::new()));
    }
    let session = builder.load(attempt).await?;
    runner::drive(session).await;
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
