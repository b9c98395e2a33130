//! Typed IPC messages decoded at the boundary.
//!
//! ## Inbound (worker → master)
//! ```text
//! "liveness-ping"             → Inbound::LivenessPing
//! "error-report", data: str   → Inbound::ErrorReport(msg)
//! "directed-message:all"      → Inbound::Directed { target: All, .. }
//! "directed-message:<n>"      → Inbound::Directed { target: Sequence(n), .. }
//! "directed-message:<junk>"   → Inbound::Misaddressed(junk)
//! anything else               → Inbound::Unrecognized(cmd)
//! ```
//!
//! ## Outbound (master → worker)
//! ```text
//! Outbound::Shutdown          → "shutdown"
//! Outbound::SetLogLevel(lvl)  → "set-log-level", data: lvl
//! Outbound::Payload(env)      → env, verbatim
//! ```

use std::fmt;
use std::str::FromStr;

use super::envelope::Envelope;

/// Periodic heartbeat.
pub const LIVENESS_PING: &str = "liveness-ping";
/// Fatal error reported right before the worker exits.
pub const ERROR_REPORT: &str = "error-report";
/// Prefix of messages re-dispatched by the master to other workers.
pub const DIRECTED_PREFIX: &str = "directed-message:";
/// Asks a worker to disconnect and exit.
pub const SHUTDOWN: &str = "shutdown";
/// Changes a worker's log level.
pub const SET_LOG_LEVEL: &str = "set-log-level";

/// Recipient of a directed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every occupied slot.
    All,
    /// The slot with this sequence number.
    Sequence(usize),
}

impl Target {
    /// Returns the full `directed-message:<target>` command for this target.
    pub fn command(&self) -> String {
        format!("{DIRECTED_PREFIX}{self}")
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::All => f.write_str("all"),
            Target::Sequence(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for Target {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "all" {
            return Ok(Target::All);
        }
        s.parse::<usize>().map(Target::Sequence)
    }
}

/// Message received from a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Heartbeat.
    LivenessPing,
    /// Worker is about to exit because of this error.
    ErrorReport(String),
    /// Message to forward to other workers, verbatim.
    Directed {
        /// Recipients.
        target: Target,
        /// The original envelope.
        envelope: Envelope,
    },
    /// Directed message whose target could not be parsed.
    Misaddressed(String),
    /// Unknown command tag.
    Unrecognized(String),
}

impl Inbound {
    /// Classifies an envelope received from a worker.
    pub fn decode(envelope: Envelope) -> Self {
        if let Some(raw) = envelope.cmd.strip_prefix(DIRECTED_PREFIX) {
            return match raw.parse::<Target>() {
                Ok(target) => Inbound::Directed { target, envelope },
                Err(_) => Inbound::Misaddressed(raw.to_string()),
            };
        }
        match envelope.cmd.as_str() {
            LIVENESS_PING => Inbound::LivenessPing,
            ERROR_REPORT => Inbound::ErrorReport(error_text(&envelope)),
            _ => Inbound::Unrecognized(envelope.cmd),
        }
    }

    /// Encodes this message as an envelope (used by the worker runtime).
    pub fn to_envelope(&self) -> Envelope {
        match self {
            Inbound::LivenessPing => Envelope::new(LIVENESS_PING),
            Inbound::ErrorReport(msg) => Envelope::new(ERROR_REPORT).with_data(msg.as_str()),
            Inbound::Directed { envelope, .. } => envelope.clone(),
            Inbound::Misaddressed(raw) => Envelope::new(format!("{DIRECTED_PREFIX}{raw}")),
            Inbound::Unrecognized(cmd) => Envelope::new(cmd.as_str()),
        }
    }
}

fn error_text(envelope: &Envelope) -> String {
    match &envelope.data {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "unknown error".to_string(),
    }
}

/// Message sent from the master to a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Disconnect and exit.
    Shutdown,
    /// Change log level.
    SetLogLevel(String),
    /// Application payload, forwarded verbatim.
    Payload(Envelope),
}

impl Outbound {
    /// Encodes this message as an envelope.
    pub fn to_envelope(&self) -> Envelope {
        match self {
            Outbound::Shutdown => Envelope::new(SHUTDOWN),
            Outbound::SetLogLevel(level) => Envelope::new(SET_LOG_LEVEL).with_data(level.as_str()),
            Outbound::Payload(envelope) => envelope.clone(),
        }
    }

    /// Classifies an envelope received from the master (used by the worker runtime).
    pub fn decode(envelope: Envelope) -> Self {
        match envelope.cmd.as_str() {
            SHUTDOWN => Outbound::Shutdown,
            SET_LOG_LEVEL => match envelope.data_str() {
                Some(level) => Outbound::SetLogLevel(level.to_string()),
                None => Outbound::Payload(envelope),
            },
            _ => Outbound::Payload(envelope),
        }
    }
}

impl From<Envelope> for Outbound {
    fn from(envelope: Envelope) -> Self {
        Outbound::Payload(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_liveness_ping() {
        assert_eq!(Inbound::decode(Envelope::new("liveness-ping")), Inbound::LivenessPing);
        // Not part of the protocol: the transport reports startup itself.
        assert_eq!(
            Inbound::decode(Envelope::new("online")),
            Inbound::Unrecognized("online".into())
        );
    }

    #[test]
    fn error_report_keeps_message() {
        let env = Envelope::new("error-report").with_data("TypeError: x is undefined");
        assert_eq!(
            Inbound::decode(env),
            Inbound::ErrorReport("TypeError: x is undefined".into())
        );
        assert_eq!(
            Inbound::decode(Envelope::new("error-report")),
            Inbound::ErrorReport("unknown error".into())
        );
    }

    #[test]
    fn directed_targets() {
        let env = Envelope::new("directed-message:all").with_data(1);
        match Inbound::decode(env.clone()) {
            Inbound::Directed { target, envelope } => {
                assert_eq!(target, Target::All);
                assert_eq!(envelope, env);
            }
            other => panic!("unexpected {other:?}"),
        }

        let env = Envelope::new("directed-message:2");
        assert!(matches!(
            Inbound::decode(env),
            Inbound::Directed { target: Target::Sequence(2), .. }
        ));
    }

    #[test]
    fn bad_target_is_misaddressed() {
        assert_eq!(
            Inbound::decode(Envelope::new("directed-message:leader")),
            Inbound::Misaddressed("leader".into())
        );
        assert_eq!(
            Inbound::decode(Envelope::new("directed-message:-1")),
            Inbound::Misaddressed("-1".into())
        );
    }

    #[test]
    fn unknown_tag_is_unrecognized() {
        assert_eq!(
            Inbound::decode(Envelope::new("god:alive")),
            Inbound::Unrecognized("god:alive".into())
        );
    }

    #[test]
    fn targets_ignore_surrounding_whitespace() {
        assert_eq!(" all ".parse::<Target>(), Ok(Target::All));
        assert_eq!(" 1".parse::<Target>(), Ok(Target::Sequence(1)));
        assert!("a ll".parse::<Target>().is_err());
    }

    #[test]
    fn target_command_round_trips_through_decode() {
        let env = Envelope::new(Target::Sequence(5).command());
        assert!(matches!(
            Inbound::decode(env),
            Inbound::Directed { target: Target::Sequence(5), .. }
        ));
    }

    #[test]
    fn outbound_decoding_on_worker_side() {
        assert_eq!(Outbound::decode(Envelope::new("shutdown")), Outbound::Shutdown);
        assert_eq!(
            Outbound::decode(Envelope::new("set-log-level").with_data("debug")),
            Outbound::SetLogLevel("debug".into())
        );
        let custom = Envelope::new("reload").with_data(serde_json::json!({"k": 1}));
        assert_eq!(Outbound::decode(custom.clone()), Outbound::Payload(custom));
    }
}
