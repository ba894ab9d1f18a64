//! script-host - terminal rendering surface for a single script session
//!
//! ```bash
//! script-host ~/scripts/extract.py --standalone
//! script-host ~/scripts/extract.py --host-socket /tmp/host.sock -- --fast
//! ```
//!
//! Prompts are printed to stdout. Press a button by typing its key (`b1`,
//! `b2`, ...); any other line is handed to the prompt's input field.

use std::io::{self, BufRead, Write};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context};
use clap::Parser;
use parking_lot::Mutex;
use tracing::{info, warn};

use script_host::bridge::HostTransport;
use script_host::config::{self, Config, ScriptConfig};
use script_host::logging;
use script_host::prompts::{Element, InputKind, RenderState};
use script_host::protocol::Payload;
use script_host::worker::ProcessWorker;
use script_host::{Assembly, SessionOutcome};

#[derive(Parser, Debug)]
#[command(name = "script-host", version, about = "Run a script against a terminal prompt surface")]
struct Cli {
    /// Script to run; overrides `script.path` from the config file
    script: Option<PathBuf>,

    /// Run without an embedding host (loopback bridge)
    #[arg(long)]
    standalone: bool,

    /// Unix socket of the embedding host
    #[arg(long, value_name = "PATH", conflicts_with = "standalone")]
    host_socket: Option<PathBuf>,

    /// Config file to use instead of ~/.scripthost/config.json
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Locale handed to prompt factories
    #[arg(long)]
    locale: Option<String>,

    /// Arguments passed through to the script
    #[arg(last = true)]
    args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = config::load_config_from(path)?;
            config::apply_env_overrides(
                &mut config,
                std::env::var(config::STANDALONE_ENV).ok().as_deref(),
            );
            config
        }
        None => config::load_config(),
    };
    apply_cli(&cli, &mut config);

    let log_guard = logging::init(&config.log);

    let Some(script) = config.script.as_ref() else {
        bail!("no script given (pass a path or set \"script\" in the config file)");
    };
    let worker = ProcessWorker::new(script.to_spec(), config.term_grace());

    let mut builder = Assembly::builder(worker).configure(&config);
    builder = match config.host_socket() {
        Some(socket) => builder.host(connect_host(&socket)?),
        None => builder.standalone(),
    };
    let assembly = Arc::new(builder.build());

    let screen: Arc<Mutex<RenderState>> = Arc::new(Mutex::new(RenderState::default()));
    let shown = screen.clone();
    assembly.subscribe(move |state| {
        if state.is_awaiting() {
            print_state(state);
        }
        *shown.lock() = state.clone();
    });
    spawn_operator(screen);

    assembly.start()?;
    let outcome = assembly.wait();
    report(&outcome);

    // process::exit skips destructors; flush the log file first
    drop(log_guard);
    std::process::exit(outcome.exit_code());
}

#[cfg(unix)]
fn connect_host(socket: &Path) -> anyhow::Result<HostTransport> {
    let stream = UnixStream::connect(socket)
        .with_context(|| format!("connecting to host at {}", socket.display()))?;
    info!(socket = %socket.display(), "Connected to host");
    Ok(HostTransport::unix(stream)?)
}

#[cfg(not(unix))]
fn connect_host(socket: &Path) -> anyhow::Result<HostTransport> {
    bail!(
        "host sockets need a Unix platform (got {}); run with --standalone",
        socket.display()
    )
}

/// Command-line flags win over the config file and the environment
fn apply_cli(cli: &Cli, config: &mut Config) {
    if let Some(path) = &cli.script {
        let previous = config.script.take().unwrap_or_else(|| ScriptConfig {
            path: String::new(),
            interpreter: None,
            args: Vec::new(),
        });
        config.script = Some(ScriptConfig {
            path: path.display().to_string(),
            ..previous
        });
    }
    if !cli.args.is_empty() {
        if let Some(script) = config.script.as_mut() {
            script.args = cli.args.clone();
        }
    }
    if cli.standalone {
        config.standalone = Some(true);
    }
    if let Some(socket) = &cli.host_socket {
        config.standalone = Some(false);
        config.host = Some(config::HostConfig {
            socket: socket.display().to_string(),
        });
    }
    if let Some(locale) = &cli.locale {
        config.locale = locale.clone();
    }
}

fn print_state(state: &RenderState) {
    let mut out = io::stdout().lock();
    let mut button = 0;
    let _ = writeln!(out);
    for element in &state.elements {
        let _ = match element {
            Element::Header { text } => writeln!(out, "== {text} =="),
            Element::Text { text } => writeln!(out, "{text}"),
            Element::Table {
                title,
                columns,
                rows,
                ..
            } => {
                let _ = writeln!(out, "[{title}]");
                let _ = writeln!(out, "  {}", columns.join(" | "));
                rows.iter()
                    .try_for_each(|row| writeln!(out, "  {}", row.join(" | ")))
            }
            Element::Button { label, .. } => {
                button += 1;
                writeln!(out, "  [b{button}] {label}")
            }
            Element::Input { label, kind } => match kind {
                InputKind::Choice { options } => {
                    let _ = writeln!(out, "{label}:");
                    options
                        .iter()
                        .enumerate()
                        .try_for_each(|(i, option)| writeln!(out, "  {}. {option}", i + 1))
                }
                InputKind::File { extensions } => writeln!(out, "{label} ({extensions}) >"),
                InputKind::Text => writeln!(out, "{label} >"),
            },
            Element::Progress { percentage } => {
                let filled = usize::from(*percentage) / 5;
                writeln!(
                    out,
                    "  [{}{}] {percentage}%",
                    "#".repeat(filled),
                    "-".repeat(20 - filled)
                )
            }
        };
    }
    let _ = out.flush();
}

/// Map one line typed by the operator to the payload it selects
fn operator_choice(state: &RenderState, line: &str) -> Option<Payload> {
    let line = line.trim();
    let pressed = line
        .strip_prefix('b')
        .and_then(|n| n.parse::<usize>().ok())
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| state.buttons().nth(i));
    if let Some((_, payload)) = pressed {
        return Some(payload.clone());
    }
    state
        .inputs()
        .next()
        .and_then(|(_, kind)| kind.payload_for(line))
}

/// Reads stdin on its own thread; subscribers run on the session loop and
/// must not block
fn spawn_operator(screen: Arc<Mutex<RenderState>>) {
    thread::Builder::new()
        .name("operator".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let state = screen.lock().clone();
                let Some(prompt) = state.prompt.as_ref().filter(|p| !p.is_resolved()) else {
                    eprintln!("(no prompt is waiting)");
                    continue;
                };
                match operator_choice(&state, &line) {
                    Some(payload) => {
                        prompt.resolve(payload);
                    }
                    None => eprintln!("(unrecognised answer: {})", line.trim()),
                }
            }
        })
        .map_err(|e| warn!(error = %e, "Could not start operator input thread"))
        .ok();
}

fn report(outcome: &SessionOutcome) {
    match outcome {
        SessionOutcome::Terminated => info!("Session terminated"),
        SessionOutcome::Finished { code, info } => {
            info!(code, info = %info, "Script finished");
            if !info.is_empty() {
                println!("{info}");
            }
        }
        SessionOutcome::Failed(e) => {
            eprintln!("script-host: {e}");
            if let script_host::HostError::WorkerFailed {
                stderr: Some(stderr),
                ..
            } = e
            {
                eprintln!("--- script stderr ---\n{stderr}");
            }
        }
    }
}
