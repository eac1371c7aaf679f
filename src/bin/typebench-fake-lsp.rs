//! Scriptable stdio language server used to exercise typebench end to end.
//!
//! Answers `initialize`, `textDocument/definition` and
//! `textDocument/diagnostic` with well-formed results. Flags inject the
//! failure modes the benchmark has to survive: slow answers, a handshake
//! that never completes, a server that ignores `shutdown`/`exit`, and an
//! immediate crash.
//!
//! # Usage
//!
//! ```bash
//! typebench-fake-lsp --delay-ms 20 --ask-configuration
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{debug, info};
use typebench::adapters::lsp::codec::{read_message, write_message};

#[derive(Parser, Debug)]
#[command(name = "typebench-fake-lsp")]
#[command(about = "Fake language server for typebench tests")]
#[command(version = "1.2.3")]
struct Args {
    /// Delay before answering each definition or diagnostic request
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Only delay the first N definition or diagnostic requests
    #[arg(long)]
    slow_requests: Option<u32>,

    /// Never answer `initialize`
    #[arg(long)]
    never_initialize: bool,

    /// Keep running after `shutdown` and `exit`
    #[arg(long)]
    ignore_shutdown: bool,

    /// Answer definitions with `null`
    #[arg(long)]
    not_found: bool,

    /// Send a `workspace/configuration` request after `initialized`
    #[arg(long)]
    ask_configuration: bool,

    /// Exit with this status right after `initialize` is answered
    #[arg(long)]
    crash_after_initialize: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    info!(?args, "fake language server starting");

    let mut reader = BufReader::new(tokio::io::stdin());
    let (out, mut outgoing) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = outgoing.recv().await {
            write_message(&mut stdout, &message)
                .await
                .context("Failed to write message")?;
        }
        anyhow::Ok(())
    });
    let mut next_server_id = 1000_u64;
    let mut answered = 0_u32;

    while let Some(message) = read_message(&mut reader)
        .await
        .context("Failed to read message")?
    {
        let method = message.get("method").and_then(Value::as_str).unwrap_or("");
        let id = message.get("id").cloned();
        debug!(method, ?id, "received");

        match (method, id) {
            ("initialize", Some(id)) => {
                if args.never_initialize {
                    continue;
                }
                let capabilities = json!({
                    "capabilities": {
                        "textDocumentSync": 1,
                        "definitionProvider": true,
                        "diagnosticProvider": {"interFileDependencies": false, "workspaceDiagnostics": false}
                    },
                    "serverInfo": {"name": "typebench-fake-lsp", "version": "1.2.3"}
                });
                reply(&out, &id, capabilities);
                if let Some(code) = args.crash_after_initialize {
                    drop(out);
                    let _ = writer.await;
                    std::process::exit(code);
                }
            }
            ("initialized", None) if args.ask_configuration => {
                next_server_id += 1;
                let request = json!({
                    "jsonrpc": "2.0",
                    "id": next_server_id,
                    "method": "workspace/configuration",
                    "params": {"items": [{"section": "python"}, {"section": "python.analysis"}]}
                });
                let _ = out.send(request);
            }
            ("textDocument/definition", Some(id)) => {
                let delay = delay_for(&args, &mut answered);
                let result = if args.not_found {
                    Value::Null
                } else {
                    let uri = message
                        .pointer("/params/textDocument/uri")
                        .cloned()
                        .unwrap_or(Value::Null);
                    let position = message
                        .pointer("/params/position")
                        .cloned()
                        .unwrap_or_else(|| json!({"line": 0, "character": 0}));
                    json!([{"uri": uri, "range": {"start": position, "end": position}}])
                };
                answer_later(&out, id, result, delay);
            }
            ("textDocument/diagnostic", Some(id)) => {
                let delay = delay_for(&args, &mut answered);
                answer_later(&out, id, json!({"kind": "full", "items": []}), delay);
            }
            ("shutdown", Some(id)) => {
                if !args.ignore_shutdown {
                    reply(&out, &id, Value::Null);
                }
            }
            ("exit", None) => {
                if !args.ignore_shutdown {
                    info!("exiting");
                    drop(out);
                    return writer.await.context("Writer task failed")?;
                }
            }
            (_, Some(id)) if !method.is_empty() => {
                reply(&out, &id, Value::Null);
            }
            _ => {}
        }
    }

    if args.ignore_shutdown {
        // Stdin is gone but this server refuses to leave on its own.
        std::future::pending::<()>().await;
    }
    Ok(())
}

fn reply(out: &mpsc::UnboundedSender<Value>, id: &Value, result: Value) {
    let _ = out.send(json!({"jsonrpc": "2.0", "id": id, "result": result}));
}

/// Delay for the next answer, counting it against `--slow-requests`.
fn delay_for(args: &Args, answered: &mut u32) -> Duration {
    *answered += 1;
    match args.slow_requests {
        Some(slow) if *answered > slow => Duration::ZERO,
        _ => Duration::from_millis(args.delay_ms),
    }
}

/// Answer after `delay` without holding up later requests.
fn answer_later(out: &mpsc::UnboundedSender<Value>, id: Value, result: Value, delay: Duration) {
    if delay.is_zero() {
        reply(out, &id, result);
        return;
    }
    let out = out.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        debug!(?id, "late answer");
        reply(&out, &id, result);
    });
}
