use super::*;
use crate::prompts::Element;
use crate::protocol::Command;
use crate::worker::{ScriptContext, ThreadWorker};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::mpsc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

type Seen = Arc<Mutex<Vec<Payload>>>;

/// Plays the operator: presses the first button of any pending prompt
fn click_first_button(state: &RenderState) {
    if let Some(prompt) = state.prompt.as_ref().filter(|p| !p.is_resolved()) {
        if let Some((_, payload)) = state.buttons().next() {
            prompt.resolve(payload.clone());
        }
    }
}

fn script<F>(name: &str, body: F) -> (ThreadWorker, Seen)
where
    F: FnOnce(&mut ScriptContext, &Seen) + Send + 'static,
{
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    (ThreadWorker::new(name, move |ctx| body(ctx, &log)), seen)
}

/// Joins `wait()` on a helper thread so a hung session fails the test
fn wait_for(assembly: &Arc<Assembly>) -> SessionOutcome {
    let (tx, rx) = mpsc::channel();
    let waiter = assembly.clone();
    thread::spawn(move || {
        let _ = tx.send(waiter.wait());
    });
    rx.recv_timeout(WAIT).expect("session did not end in time")
}

#[test]
fn test_consent_flow_resumes_script_with_boolean() {
    let (worker, seen) = script("consent", |ctx, seen| {
        let answer = ctx.prompt(Command::consent("Do you agree?"));
        seen.lock().push(answer);
    });
    let assembly = Arc::new(Assembly::builder(worker).standalone().build());

    let factories = Arc::new(Mutex::new(Vec::new()));
    let rendered = factories.clone();
    assembly
        .subscribe(move |state| {
            if let Some(prompt) = &state.prompt {
                rendered.lock().push(prompt.tag().to_string());
            }
            click_first_button(state);
        })
        .unwrap();
    assembly.start().unwrap();

    let outcome = wait_for(&assembly);
    assert!(matches!(outcome, SessionOutcome::Finished { code: 0, .. }));
    assert_eq!(*seen.lock(), vec![Payload::boolean(true)]);
    assert_eq!(*factories.lock(), vec!["consent".to_string()]);
}

#[test]
fn test_unknown_tag_fails_session_without_pending_prompt() {
    let (worker, seen) = script("unknown", |ctx, seen| {
        let answer = ctx.prompt(Command::extension("unknown"));
        seen.lock().push(answer);
    });
    let assembly = Arc::new(Assembly::builder(worker).build());
    let states = Arc::new(Mutex::new(0usize));
    let counter = states.clone();
    assembly.subscribe(move |_| *counter.lock() += 1).unwrap();
    assembly.start().unwrap();

    match wait_for(&assembly) {
        SessionOutcome::Failed(HostError::UnmatchedCommand { tag }) => assert_eq!(tag, "unknown"),
        other => panic!("expected unmatched command, got {other:?}"),
    }
    assert_eq!(*states.lock(), 0);
    assert!(seen.lock().is_empty());
}

#[test]
fn test_second_resolution_sends_nothing() {
    let (worker, seen) = script("double", |ctx, seen| {
        let first = ctx.prompt(Command::confirm("Continue?", "Yes", "No"));
        seen.lock().push(first);
        let second = ctx.prompt(Command::retry("Once more", "OK"));
        seen.lock().push(second);
    });
    let assembly = Arc::new(Assembly::builder(worker).build());
    let repeats = Arc::new(Mutex::new(Vec::new()));
    let results = repeats.clone();
    assembly
        .subscribe(move |state| {
            if let Some(prompt) = state.prompt.as_ref().filter(|p| !p.is_resolved()) {
                let stale = prompt.clone();
                assert!(prompt.resolve(Payload::boolean(true)));
                results.lock().push(stale.resolve(Payload::boolean(false)));
            }
        })
        .unwrap();
    assembly.start().unwrap();

    assert!(matches!(wait_for(&assembly), SessionOutcome::Finished { .. }));
    assert_eq!(
        *seen.lock(),
        vec![Payload::boolean(true), Payload::boolean(true)]
    );
    assert_eq!(*repeats.lock(), vec![false, false]);
}

#[test]
fn test_standalone_echoes_system_commands_locally() {
    let (worker, seen) = script("donate", |ctx, seen| {
        let ack = ctx.prompt(Command::donate("posts", "[1,2]"));
        seen.lock().push(ack);
        ctx.exit(0, "donated");
    });
    let assembly = Arc::new(Assembly::builder(worker).standalone().build());
    assembly.start().unwrap();

    match wait_for(&assembly) {
        SessionOutcome::Finished { code, info } => {
            assert_eq!(code, 0);
            assert_eq!(info, "donated");
        }
        other => panic!("expected finish, got {other:?}"),
    }
    assert_eq!(*seen.lock(), vec![Payload::void()]);
    assert_eq!(
        assembly.host_messages(),
        vec![
            BridgeMessage::command(Command::donate("posts", "[1,2]")),
            BridgeMessage::command(Command::exit(0, "donated")),
        ]
    );
}

#[test]
fn test_progress_and_page_flow() {
    let (worker, seen) = script("extract", |ctx, seen| {
        let ack = ctx.prompt(Command::progress("Extracting", "posts.json", 50.0));
        seen.lock().push(ack);
        let answer = ctx.prompt(Command::page(
            "Instagram",
            vec![
                Command::text("Pick the export you downloaded."),
                Command::file_input("Export", "application/zip"),
            ],
        ));
        seen.lock().push(answer);
    });
    let assembly = Arc::new(Assembly::builder(worker).build());
    let headers = Arc::new(Mutex::new(Vec::new()));
    let shown = headers.clone();
    assembly
        .subscribe(move |state| {
            if state.is_awaiting() {
                if let Some(Element::Header { text }) = state.elements.first() {
                    shown.lock().push(text.clone());
                }
            }
            click_first_button(state);
        })
        .unwrap();
    assembly.start().unwrap();

    assert!(matches!(wait_for(&assembly), SessionOutcome::Finished { code: 0, .. }));
    assert_eq!(*seen.lock(), vec![Payload::void(), Payload::string("")]);
    assert_eq!(
        *headers.lock(),
        vec!["Extracting".to_string(), "Instagram".to_string()]
    );
}

#[test]
fn test_operator_answer_of_wrong_shape_fails_session() {
    let (worker, seen) = script("shape", |ctx, seen| {
        let answer = ctx.prompt(Command::consent("Share?"));
        seen.lock().push(answer);
    });
    let assembly = Arc::new(Assembly::builder(worker).build());
    assembly
        .subscribe(|state| {
            if let Some(prompt) = state.prompt.as_ref().filter(|p| !p.is_resolved()) {
                prompt.resolve(Payload::string("whatever"));
            }
        })
        .unwrap();
    assembly.start().unwrap();

    match wait_for(&assembly) {
        SessionOutcome::Failed(HostError::PayloadMismatch { prompt, payload }) => {
            assert_eq!(prompt, "consent");
            assert_eq!(payload, "string");
        }
        other => panic!("expected payload mismatch, got {other:?}"),
    }
    assert!(seen.lock().is_empty());
}

#[test]
fn test_script_panic_fails_session() {
    let (worker, _) = script("crash", |_, _| panic!("zip archive is corrupt"));
    let assembly = Arc::new(Assembly::builder(worker).build());
    assembly.start().unwrap();

    match wait_for(&assembly) {
        SessionOutcome::Failed(e @ HostError::WorkerFailed { .. }) => {
            assert_eq!(e.kind(), ErrorKind::Worker);
            assert!(e.to_string().contains("zip archive is corrupt"));
        }
        other => panic!("expected worker failure, got {other:?}"),
    }
}

#[test]
fn test_terminate_is_idempotent_and_abandons_script() {
    let resumed = Arc::new(AtomicBool::new(false));
    let flag = resumed.clone();
    let worker = ThreadWorker::new("blocked", move |ctx| {
        ctx.prompt(Command::consent("Waiting forever"));
        flag.store(true, Ordering::SeqCst);
    });
    let assembly = Arc::new(Assembly::builder(worker).build());

    let (shown_tx, shown_rx) = mpsc::channel();
    let shown_tx = Mutex::new(shown_tx);
    assembly
        .subscribe(move |state| {
            if state.is_awaiting() {
                let _ = shown_tx.lock().send(());
            }
        })
        .unwrap();
    assembly.start().unwrap();
    shown_rx.recv_timeout(WAIT).unwrap();

    assembly.terminate();
    assembly.terminate();
    assert!(assembly.subscribe(|_| {}).is_none());

    assert!(matches!(wait_for(&assembly), SessionOutcome::Terminated));
    assert!(!resumed.load(Ordering::SeqCst));
    assert!(!assembly.is_running());
    assembly.terminate();
    assert!(matches!(assembly.wait(), SessionOutcome::Terminated));
}

#[test]
fn test_terminate_from_inside_subscriber() {
    let (worker, _) = script("end", |ctx, _| {
        ctx.prompt(Command::end_page());
    });
    let assembly = Arc::new(Assembly::builder(worker).build());
    let handle = Arc::downgrade(&assembly);
    assembly
        .subscribe(move |state| {
            if state.is_awaiting() {
                if let Some(assembly) = handle.upgrade() {
                    assembly.terminate();
                }
            }
        })
        .unwrap();
    assembly.start().unwrap();
    assert!(matches!(wait_for(&assembly), SessionOutcome::Terminated));
}

#[test]
fn test_terminate_before_start() {
    let (worker, _) = script("never", |_, _| {});
    let assembly = Assembly::builder(worker).build();
    assembly.terminate();
    assert!(assembly.start().is_err());
    assert!(matches!(assembly.wait(), SessionOutcome::Terminated));
}

#[test]
fn test_outcome_exit_codes() {
    assert_eq!(SessionOutcome::Terminated.exit_code(), 0);
    assert_eq!(
        SessionOutcome::Finished {
            code: 3,
            info: String::new()
        }
        .exit_code(),
        3
    );
    let violation = SessionOutcome::Failed(HostError::OrphanPayload { tag: "void".into() });
    assert_eq!(violation.exit_code(), 4);
    assert!(!violation.is_success());
}

#[cfg(unix)]
mod host {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::net::UnixStream;

    /// Minimal embedding host: sends init, records every line it receives and
    /// optionally answers the first resize notice with a payload
    fn fake_host(
        stream: UnixStream,
        answer: Option<Payload>,
    ) -> thread::JoinHandle<Vec<serde_json::Value>> {
        thread::spawn(move || {
            let mut writer = stream.try_clone().unwrap();
            writeln!(writer, r#"{{"type":"init","protocol":1}}"#).unwrap();
            let mut answer = answer;
            let mut received = Vec::new();
            for line in BufReader::new(stream).lines() {
                let Ok(line) = line else { break };
                let value: serde_json::Value = serde_json::from_str(&line).unwrap();
                if value["action"] == "resize" {
                    if let Some(payload) = answer.take() {
                        let reply = json!({"type": "payload", "payload": payload});
                        writeln!(writer, "{reply}").unwrap();
                    }
                }
                received.push(value);
            }
            received
        })
    }

    fn host_assembly(worker: ThreadWorker, answer: Option<Payload>) -> (Arc<Assembly>, thread::JoinHandle<Vec<serde_json::Value>>) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let host = fake_host(theirs, answer);
        let assembly = Arc::new(
            Assembly::builder(worker)
                .host(HostTransport::unix(ours).unwrap())
                .channel_capacity(16)
                .build(),
        );
        (assembly, host)
    }

    fn donation_script() -> (ThreadWorker, Seen) {
        script("flow", |ctx, seen| {
            ctx.donate("posts", "[1]");
            let answer = ctx.prompt(Command::consent("Share these posts?"));
            seen.lock().push(answer);
            ctx.event("progress", json!({"percent": 100}));
            ctx.exit(0, "done");
        })
    }

    fn commands_of(values: Vec<serde_json::Value>) -> Vec<serde_json::Value> {
        values
            .into_iter()
            .filter(|v| v["type"] == "command")
            .map(|v| v["command"].clone())
            .collect()
    }

    #[test]
    fn test_loopback_and_host_are_equivalent() {
        let (worker, loopback_seen) = donation_script();
        let loopback = Arc::new(Assembly::builder(worker).standalone().build());
        loopback.subscribe(click_first_button).unwrap();
        loopback.start().unwrap();
        let loopback_outcome = wait_for(&loopback);

        let (worker, host_seen) = donation_script();
        let (assembly, host) = host_assembly(worker, None);
        assembly.subscribe(click_first_button).unwrap();
        assembly.start().unwrap();
        let host_outcome = wait_for(&assembly);
        let host_lines = host.join().unwrap();

        assert!(matches!(loopback_outcome, SessionOutcome::Finished { code: 0, .. }));
        assert!(matches!(host_outcome, SessionOutcome::Finished { code: 0, .. }));
        assert_eq!(*loopback_seen.lock(), *host_seen.lock());

        let echoed: Vec<serde_json::Value> = loopback
            .host_messages()
            .into_iter()
            .map(|m| serde_json::to_value(m).unwrap())
            .collect();
        assert_eq!(commands_of(echoed), commands_of(host_lines.clone()));
        assert_eq!(commands_of(host_lines).len(), 3);
    }

    #[test]
    fn test_host_payload_answers_pending_prompt() {
        let (worker, seen) = script("host-operated", |ctx, seen| {
            let answer = ctx.prompt(Command::consent("Agree?"));
            seen.lock().push(answer);
        });
        let (assembly, host) = host_assembly(worker, Some(Payload::boolean(false)));
        assembly.start().unwrap();

        assert!(matches!(wait_for(&assembly), SessionOutcome::Finished { .. }));
        assert_eq!(*seen.lock(), vec![Payload::boolean(false)]);
        assert_eq!(
            assembly.host_messages(),
            vec![BridgeMessage::payload(Payload::boolean(false))]
        );
        let lines = host.join().unwrap();
        assert!(lines.iter().any(|v| v["action"] == "resize"));
    }

    #[test]
    fn test_host_payload_of_wrong_shape_fails_session() {
        let (worker, seen) = script("consent", |ctx, seen| {
            let answer = ctx.prompt(Command::consent("Agree?"));
            seen.lock().push(answer);
        });
        let (assembly, host) = host_assembly(worker, Some(Payload::string("whatever")));
        assembly.start().unwrap();

        match wait_for(&assembly) {
            SessionOutcome::Failed(e @ HostError::PayloadMismatch { .. }) => {
                assert_eq!(e.kind(), ErrorKind::ProtocolViolation);
            }
            other => panic!("expected payload mismatch, got {other:?}"),
        }
        assert!(seen.lock().is_empty());
        host.join().unwrap();
    }

    #[test]
    fn test_host_payload_without_command_is_orphan() {
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let gate_rx = Mutex::new(gate_rx);
        let (worker, seen) = script("idle", move |ctx, seen| {
            // stays idle until the test releases it
            let _ = gate_rx.lock().recv();
            if !ctx.is_abandoned() {
                seen.lock().push(ctx.prompt(Command::consent("late")));
            }
        });

        let (ours, theirs) = UnixStream::pair().unwrap();
        let assembly = Arc::new(
            Assembly::builder(worker)
                .host(HostTransport::unix(ours).unwrap())
                .build(),
        );
        assembly.start().unwrap();
        let mut host = theirs;
        writeln!(host, r#"{{"type":"init"}}"#).unwrap();
        writeln!(
            host,
            r#"{{"type":"payload","payload":{{"type":"boolean","value":true}}}}"#
        )
        .unwrap();

        match wait_for(&assembly) {
            SessionOutcome::Failed(HostError::OrphanPayload { tag }) => assert_eq!(tag, "boolean"),
            other => panic!("expected orphan payload, got {other:?}"),
        }
        assert_eq!(
            assembly.host_messages(),
            vec![BridgeMessage::payload(Payload::boolean(true))]
        );
        drop(gate_tx);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_worker_waits_for_handshake() {
        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();
        let worker = ThreadWorker::new("gated", move |_| flag.store(true, Ordering::SeqCst));

        let (ours, theirs) = UnixStream::pair().unwrap();
        let assembly = Arc::new(
            Assembly::builder(worker)
                .host(HostTransport::unix(ours).unwrap())
                .build(),
        );
        assembly.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(!started.load(Ordering::SeqCst));

        let mut host = theirs;
        writeln!(host, r#"{{"type":"init"}}"#).unwrap();
        assert!(matches!(wait_for(&assembly), SessionOutcome::Finished { .. }));
        assert!(started.load(Ordering::SeqCst));
    }

    #[test]
    fn test_host_closing_before_init_fails_handshake() {
        let (worker, _) = script("unreached", |_, _| {});
        let (ours, theirs) = UnixStream::pair().unwrap();
        let assembly = Arc::new(
            Assembly::builder(worker)
                .host(HostTransport::unix(ours).unwrap())
                .build(),
        );
        assembly.start().unwrap();
        drop(theirs);

        match wait_for(&assembly) {
            SessionOutcome::Failed(e) => {
                assert!(matches!(e, HostError::HandshakeFailed(_)));
                assert_eq!(e.kind(), ErrorKind::Transport);
            }
            other => panic!("expected handshake failure, got {other:?}"),
        }
    }

    #[test]
    fn test_report_height_reaches_host_once() {
        let (worker, _) = script("sized", |ctx, _| {
            ctx.prompt(Command::end_page());
        });
        let (assembly, host) = host_assembly(worker, None);
        let (shown_tx, shown_rx) = mpsc::channel();
        let shown_tx = Mutex::new(shown_tx);
        assembly
            .subscribe(move |state| {
                if state.is_awaiting() {
                    let _ = shown_tx.lock().send(());
                }
            })
            .unwrap();
        assembly.start().unwrap();
        shown_rx.recv_timeout(WAIT).unwrap();

        assembly.report_height(640);
        assembly.report_height(640);
        thread::sleep(Duration::from_millis(100));
        assembly.terminate();
        assert!(matches!(wait_for(&assembly), SessionOutcome::Terminated));

        let heights: Vec<_> = host
            .join()
            .unwrap()
            .into_iter()
            .filter(|v| v["action"] == "resize")
            .map(|v| v["height"].as_u64().unwrap())
            .collect();
        assert_eq!(heights.last(), Some(&640));
        assert_eq!(heights.iter().filter(|h| **h == 640).count(), 1);
    }
}
