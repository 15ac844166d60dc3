//! Line protocol spoken on the control/transcript channel.
//!
//! Orchestrator -> leg: `PAUSE_LISTENING`, `RESUME_LISTENING`.
//! Leg -> orchestrator: `CONNECTED: ..`, `STATE: LISTENING|PAUSED`,
//! `ACK: <command>`, `ERROR: ..`, or a bare transcript line.

use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateState {
    Listening,
    Paused,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Listening => "LISTENING",
            GateState::Paused => "PAUSED",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateState {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LISTENING" => Ok(GateState::Listening),
            "PAUSED" => Ok(GateState::Paused),
            other => Err(PipelineError::Protocol(format!("unknown gate state '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    PauseListening,
    ResumeListening,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::PauseListening => "PAUSE_LISTENING",
            ControlCommand::ResumeListening => "RESUME_LISTENING",
        }
    }

    /// Gate state this command asks for.
    pub fn target(&self) -> GateState {
        match self {
            ControlCommand::PauseListening => GateState::Paused,
            ControlCommand::ResumeListening => GateState::Listening,
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlCommand {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PAUSE_LISTENING" => Ok(ControlCommand::PauseListening),
            "RESUME_LISTENING" => Ok(ControlCommand::ResumeListening),
            other => Err(PipelineError::Protocol(format!("unknown command '{}'", other))),
        }
    }
}

/// Everything the recognition leg can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegMessage {
    Connected(String),
    State(GateState),
    Ack(String),
    Error(String),
    Transcript(String),
}

impl LegMessage {
    /// Parse one text frame. Blank lines yield `Ok(None)`; a known prefix
    /// with an invalid payload is a protocol error.
    pub fn parse(line: &str) -> Result<Option<Self>, PipelineError> {
        let message = line.trim();
        if message.is_empty() {
            return Ok(None);
        }

        if let Some(rest) = strip_prefix_ci(message, "STATE:") {
            return rest.parse::<GateState>().map(|s| Some(LegMessage::State(s)));
        }
        if let Some(rest) = strip_prefix_ci(message, "ACK:") {
            return Ok(Some(LegMessage::Ack(rest.trim().to_string())));
        }
        if let Some(rest) = strip_prefix_ci(message, "ERROR:") {
            return Ok(Some(LegMessage::Error(rest.trim().to_string())));
        }
        if let Some(rest) = strip_prefix_ci(message, "CONNECTED:") {
            return Ok(Some(LegMessage::Connected(rest.trim().to_string())));
        }

        Ok(Some(LegMessage::Transcript(message.to_string())))
    }

    /// Whether `text`, sent as a bare line, would be read back as something
    /// other than a transcript.
    pub fn is_status_line(text: &str) -> bool {
        let message = text.trim();
        ["STATE:", "ACK:", "ERROR:", "CONNECTED:"]
            .iter()
            .any(|prefix| strip_prefix_ci(message, prefix).is_some())
    }

    pub fn to_line(&self) -> String {
        match self {
            LegMessage::Connected(info) => format!("CONNECTED: {}", info),
            LegMessage::State(state) => format!("STATE: {}", state),
            LegMessage::Ack(what) => format!("ACK: {}", what),
            LegMessage::Error(what) => format!("ERROR: {}", what),
            LegMessage::Transcript(text) => text.clone(),
        }
    }
}

fn strip_prefix_ci<'a>(message: &'a str, prefix: &str) -> Option<&'a str> {
    let head = message.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&message[prefix.len()..])
    } else {
        None
    }
}
