//! Structured failure reports for the operational log.

use std::error::Error as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::CommandError;

/// Everything an operator needs to chase one failed invocation.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub command_line: String,
    pub owner: Option<String>,
    pub registrar: Option<String>,
    pub causes: Vec<String>,
}

impl DiagnosticReport {
    pub fn new(
        command_line: impl Into<String>,
        owner: Option<&str>,
        registrar: Option<&str>,
        error: &CommandError,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            command_line: command_line.into(),
            owner: owner.map(str::to_string),
            registrar: registrar.map(str::to_string),
            causes: error_chain(error),
        }
    }

    /// Multi-line text form for log sinks.
    pub fn render(&self) -> String {
        let mut out = format!(
            "command failure {id} at {ts}\n  command:   {cmd}\n  owner:     {owner}\n  registrar: {registrar}\n",
            id = self.id,
            ts = self.timestamp.to_rfc3339(),
            cmd = self.command_line,
            owner = self.owner.as_deref().unwrap_or("-"),
            registrar = self.registrar.as_deref().unwrap_or("-"),
        );
        for (depth, cause) in self.causes.iter().enumerate() {
            let label = if depth == 0 { "error" } else { "caused by" };
            out.push_str(&format!("  {label}: {cause}\n"));
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Every message in the `source()` chain of `error`, outermost first.
pub fn error_chain(error: &CommandError) -> Vec<String> {
    let mut chain = vec![error.to_string()];
    let mut current = error.source();
    while let Some(cause) = current {
        let message = cause.to_string();
        // transparent wrappers repeat their inner message
        if chain.last() != Some(&message) {
            chain.push(message);
        }
        current = cause.source();
    }
    chain
}
