use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Opaque job identifier assigned by the analysis service on upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of the active analysis session.
///
/// `Idle` is the initial state. `Completed` and `Error` are terminal for the
/// current job; only a full reset returns the session to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Processing,
    Completed,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }

    /// A new submission is accepted from every state except `Processing`.
    pub fn accepts_submission(self) -> bool {
        !matches!(self, JobState::Processing)
    }
}

/// The fixed catalogue of detection modules the analysis service supports.
///
/// The client is agnostic to module semantics; it only forwards the wire tag
/// and uses the display descriptors for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionModule {
    Anpr,
    WrongSide,
    Helmet,
    #[serde(rename = "triple")]
    TripleRiding,
    WrongLane,
    Stalled,
    Seatbelt,
    Blacklist,
}

impl DetectionModule {
    pub const ALL: [DetectionModule; 8] = [
        DetectionModule::Anpr,
        DetectionModule::WrongSide,
        DetectionModule::Helmet,
        DetectionModule::TripleRiding,
        DetectionModule::WrongLane,
        DetectionModule::Stalled,
        DetectionModule::Seatbelt,
        DetectionModule::Blacklist,
    ];

    /// Stable identifier sent to the analysis service as `case_type`.
    pub fn wire_tag(self) -> &'static str {
        match self {
            DetectionModule::Anpr => "anpr",
            DetectionModule::WrongSide => "wrong_side",
            DetectionModule::Helmet => "helmet",
            DetectionModule::TripleRiding => "triple",
            DetectionModule::WrongLane => "wrong_lane",
            DetectionModule::Stalled => "stalled",
            DetectionModule::Seatbelt => "seatbelt",
            DetectionModule::Blacklist => "blacklist",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            DetectionModule::Anpr => "Number Plate",
            DetectionModule::WrongSide => "Wrong Side",
            DetectionModule::Helmet => "No Helmet",
            DetectionModule::TripleRiding => "Triple Riding",
            DetectionModule::WrongLane => "Wrong Lane",
            DetectionModule::Stalled => "Stalled Vehicle",
            DetectionModule::Seatbelt => "No Seatbelt",
            DetectionModule::Blacklist => "Security Alert",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DetectionModule::Anpr => "AI License Plate recognition",
            DetectionModule::WrongSide => "Illegal direction detection",
            DetectionModule::Helmet => "Two-wheeler safety check",
            DetectionModule::TripleRiding => "Overloading detection",
            DetectionModule::WrongLane => "Lane discipline monitoring",
            DetectionModule::Stalled => "Stationary traffic alert",
            DetectionModule::Seatbelt => "Occupant safety check",
            DetectionModule::Blacklist => "Blacklist/Theft detection",
        }
    }
}

impl fmt::Display for DetectionModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_tag())
    }
}

impl FromStr for DetectionModule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DetectionModule::ALL
            .into_iter()
            .find(|module| module.wire_tag() == s)
            .ok_or_else(|| format!("unknown detection module '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_parse_back_to_the_same_module() {
        for module in DetectionModule::ALL {
            assert_eq!(module.wire_tag().parse::<DetectionModule>(), Ok(module));
        }
    }

    #[test]
    fn unknown_wire_tag_is_rejected() {
        assert!("overspeed".parse::<DetectionModule>().is_err());
    }

    #[test]
    fn serde_tag_matches_wire_tag() {
        for module in DetectionModule::ALL {
            let json = serde_json::to_string(&module).expect("serialize");
            assert_eq!(json, format!("\"{}\"", module.wire_tag()));
        }
    }

    #[test]
    fn only_processing_blocks_submission() {
        assert!(JobState::Idle.accepts_submission());
        assert!(JobState::Completed.accepts_submission());
        assert!(JobState::Error.accepts_submission());
        assert!(!JobState::Processing.accepts_submission());
    }

    #[test]
    fn terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Error.is_terminal());
        assert!(!JobState::Idle.is_terminal());
        assert!(!JobState::Processing.is_terminal());
    }
}
