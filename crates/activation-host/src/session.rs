//! Request session - one command per input line.
//!
//! ```text
//! event <name>      activate every extension declaring <name>
//! id <extension>    activate one extension and its dependencies
//! state <extension> print the lifecycle state
//! report            print the activation report
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use std::sync::Arc;

use activation_core::{
    ActivatedExtension, ActivationOutcome, ActivationReason, ActivationState, ExtensionActivator,
    ExtensionId,
};
use anyhow::{bail, Result};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Event(String),
    Id(String),
    State(String),
    Report,
}

impl Command {
    /// Parse one input line; `Ok(None)` for blank and comment lines.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (line, ""),
        };

        let command = match (verb, arg) {
            ("report", "") => Self::Report,
            ("report", _) => bail!("'report' takes no argument"),
            (_, "") if matches!(verb, "event" | "id" | "state") => {
                bail!("'{}' requires an argument", verb)
            }
            ("event", arg) => Self::Event(arg.to_string()),
            ("id", arg) => Self::Id(arg.to_string()),
            ("state", arg) => Self::State(arg.to_string()),
            (other, _) => bail!("unknown command '{}'", other),
        };
        Ok(Some(command))
    }
}

/// Final (or on-demand) summary of the activator's state
#[derive(Debug, Serialize)]
pub struct Report {
    pub activated: Vec<ActivatedExtension>,
    /// Registered extensions that never reached a terminal state
    pub pending: Vec<ExtensionId>,
    pub activated_events: Vec<String>,
}

impl Report {
    pub fn collect(activator: &ExtensionActivator) -> Self {
        let pending = activator
            .descriptors()
            .iter()
            .filter(|d| !activator.is_activated(&d.id))
            .map(|d| d.id.clone())
            .collect();
        Self {
            activated: activator.snapshot(),
            pending,
            activated_events: activator.activated_events(),
        }
    }

    pub fn render_text(&self) -> String {
        let ok = self.activated.iter().filter(|r| !r.activation_failed).count();
        let mut out = format!(
            "{} activated, {} failed, {} pending\n",
            ok,
            self.activated.len() - ok,
            self.pending.len()
        );
        for record in &self.activated {
            out.push_str(&format!("  {}\n", describe(record)));
        }
        for id in &self.pending {
            out.push_str(&format!("  {} pending\n", id));
        }
        if !self.activated_events.is_empty() {
            out.push_str(&format!("events: {}\n", self.activated_events.join(", ")));
        }
        out
    }
}

fn describe(record: &ActivatedExtension) -> String {
    let cause = match &record.reason {
        ActivationReason::Startup(event) => format!("startup {}", event),
        ActivationReason::Event(event) => format!("event {}", event),
        ActivationReason::ById => "by id".to_string(),
    };
    let timing = record
        .elapsed
        .map(|e| format!(", {:.1}ms", e.as_secs_f64() * 1000.0))
        .unwrap_or_default();
    match &record.failure {
        None => format!("{} activated ({}{})", record.id, cause, timing),
        Some(failure) => format!("{} failed: {} ({}{})", record.id, failure, cause, timing),
    }
}

fn state_label(state: ActivationState) -> &'static str {
    match state {
        ActivationState::NotStarted => "not_started",
        ActivationState::Activating => "activating",
        ActivationState::Activated => "activated",
        ActivationState::Failed => "failed",
    }
}

#[derive(Serialize)]
struct StateLine<'a> {
    id: &'a str,
    state: ActivationState,
}

pub struct Session {
    activator: Arc<ExtensionActivator>,
    json: bool,
}

impl Session {
    pub fn new(activator: Arc<ExtensionActivator>, json: bool) -> Self {
        Self { activator, json }
    }

    pub fn report(&self) -> Result<String> {
        let report = Report::collect(&self.activator);
        if self.json {
            Ok(format!("{}\n", serde_json::to_string_pretty(&report)?))
        } else {
            Ok(report.render_text())
        }
    }

    /// Serve one command and return its response text.
    pub async fn execute(&self, command: Command) -> Result<String> {
        match command {
            Command::Event(event) => {
                self.activator.activate_by_event(&event).await;
                let ids: Vec<String> = self
                    .activator
                    .descriptors_for_event(&event)
                    .iter()
                    .map(|d| d.id.clone())
                    .collect();

                if self.json {
                    let states: Vec<StateLine<'_>> = ids
                        .iter()
                        .map(|id| StateLine {
                            id,
                            state: self.activator.state(id),
                        })
                        .collect();
                    return Ok(format!(
                        "{}\n",
                        serde_json::json!({ "event": event, "extensions": states })
                    ));
                }

                let mut out = format!("event {}: {} extensions\n", event, ids.len());
                for id in &ids {
                    out.push_str(&format!(
                        "  {} {}\n",
                        id,
                        state_label(self.activator.state(id))
                    ));
                }
                Ok(out)
            }
            Command::Id(id) => match self.activator.activate_by_id(&id).await {
                Ok(outcome) if self.json => Ok(format!(
                    "{}\n",
                    serde_json::json!({ "id": id, "outcome": outcome })
                )),
                Ok(ActivationOutcome::Activated) => Ok(format!("{} activated\n", id)),
                Ok(ActivationOutcome::Failed { reason }) => {
                    Ok(format!("{} failed: {}\n", id, reason))
                }
                Err(e) if self.json => Ok(format!(
                    "{}\n",
                    serde_json::json!({ "id": id, "error": e.to_string() })
                )),
                Err(e) => Ok(format!("error: {}\n", e)),
            },
            Command::State(id) => {
                let state = self.activator.state(&id);
                if self.json {
                    Ok(format!(
                        "{}\n",
                        serde_json::to_string(&StateLine { id: &id, state })?
                    ))
                } else {
                    Ok(format!("{} {}\n", id, state_label(state)))
                }
            }
            Command::Report => self.report(),
        }
    }

    /// Serve commands until `input` is exhausted. Malformed lines are
    /// answered with an error and do not stop the session.
    pub async fn run<R, W>(&self, input: R, output: &mut W) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut served = 0;

        while let Some(line) = lines.next_line().await? {
            let response = match Command::parse(&line) {
                Ok(None) => continue,
                Ok(Some(command)) => {
                    served += 1;
                    self.execute(command).await?
                }
                Err(e) => {
                    tracing::warn!("Rejected request '{}': {}", line.trim(), e);
                    format!("error: {}\n", e)
                }
            };
            output.write_all(response.as_bytes()).await?;
            output.flush().await?;
        }
        Ok(served)
    }
}
