//! Live mode: signal lines from a reader (stdin) feed the ports in real time
//! and every emitted event is printed as it arrives.
//!
//! Malformed lines are logged and skipped so a typo does not end the session.
//! End of input does not close the ports either; the session runs until it
//! is cancelled (Ctrl-C) or the engine stops.

use anyhow::{Context, Result};
use pocket_core::{LockScreenConfig, LockScreenEngine, LockScreenEvent, LockScreenPorts, Snapshot, ports};
use serde::Serialize;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::script::{Directive, parse_line};

#[derive(Serialize)]
struct LiveEvent {
    at: String,
    event: LockScreenEvent,
}

fn render(event: LockScreenEvent, json: bool) -> Result<String> {
    let now = chrono::Local::now();
    if json {
        Ok(serde_json::to_string(&LiveEvent {
            at: now.to_rfc3339(),
            event,
        })?)
    } else {
        Ok(format!("{} {}", now.format("%H:%M:%S%.3f"), event))
    }
}

struct LineSource<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: AsyncBufRead + Unpin> LineSource<R> {
    /// Next well-formed directive; `None` at end of input
    async fn next_directive(&mut self) -> Result<Option<(usize, Directive)>> {
        while let Some(raw) = self
            .lines
            .next_line()
            .await
            .context("Failed to read signal input")?
        {
            self.line_no += 1;
            match parse_line(&raw, self.line_no) {
                Ok(Some(directive)) => return Ok(Some((self.line_no, directive))),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Ignoring malformed line"),
            }
        }
        Ok(None)
    }
}

struct LiveSession {
    adapters: LockScreenPorts,
    resume_at: Option<Instant>,
}

impl LiveSession {
    fn apply(&mut self, line: usize, directive: Directive) -> Result<()> {
        match directive {
            Directive::Signal(signal) => {
                let sent = self
                    .adapters
                    .publish(signal)
                    .context("Engine stopped accepting signals")?;
                if !sent {
                    debug!(line, %signal, "Signal unchanged, not forwarded");
                }
            }
            Directive::Wait(duration) => {
                self.resume_at = Some(Instant::now() + duration);
            }
            Directive::Initial(_) => {
                warn!(line, "initial is only honoured on the first line, ignoring");
            }
        }
        Ok(())
    }
}

/// Feed directives from `reader` into a live engine and write events to `out`.
pub async fn run_live<R, W>(
    reader: R,
    mut out: W,
    config: LockScreenConfig,
    event_buffer: usize,
    json: bool,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut source = LineSource {
        lines: reader.lines(),
        line_no: 0,
    };

    // A leading `initial` line seeds the ports; anything else is applied
    // once the engine is up.
    let (initial, pending) = match source.next_directive().await? {
        Some((_, Directive::Initial(snapshot))) => (snapshot, None),
        other => (Snapshot::default(), other),
    };

    let (adapters, inputs) = ports(initial);
    let mut engine = LockScreenEngine::spawn(inputs, config, event_buffer);
    let mut session = LiveSession {
        adapters,
        resume_at: None,
    };
    info!(
        screen = %initial.screen,
        keyguard = %initial.keyguard,
        call = %initial.phone_call,
        proximity = %initial.proximity,
        "Live session started"
    );

    if let Some((line, directive)) = pending {
        session.apply(line, directive)?;
    }

    let mut input_done = false;
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Live session cancelled");
                break;
            }

            event = engine.recv() => {
                let Some(event) = event else {
                    // The engine only stops on its own after a defect
                    return engine.join().await.map(|_| ()).context("Lock-intent engine stopped");
                };
                writeln!(out, "{}", render(event, json)?)?;
                out.flush()?;
            }

            _ = sleep_until(session.resume_at.unwrap_or_else(Instant::now)), if session.resume_at.is_some() => {
                session.resume_at = None;
            }

            next = source.next_directive(), if !input_done && session.resume_at.is_none() => {
                match next? {
                    Some((line, directive)) => session.apply(line, directive)?,
                    None => {
                        info!("Input closed; holding current signals until interrupted");
                        input_done = true;
                    }
                }
            }
        }
    }

    // Anything the engine emitted before the cancel still gets printed
    while let Some(event) = engine.try_recv() {
        writeln!(out, "{}", render(event, json)?)?;
    }
    out.flush()?;

    let stats = engine.shutdown().await.context("Lock-intent engine failed")?;
    info!(
        signals = stats.signals_processed,
        events = stats.events_emitted(),
        episodes = stats.episodes_started,
        "Live session finished"
    );
    Ok(())
}
