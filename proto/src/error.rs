#[derive(Debug)]
pub enum DecodeError {
    Empty,
    TooLong { max: usize },
    InvalidCharacter(char),
    MissingSuffix(&'static str),
    RelativeSegment,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "Empty value"),
            DecodeError::TooLong { max } => write!(f, "Longer than {} bytes", max),
            DecodeError::InvalidCharacter(c) => write!(f, "Invalid character {:?}", c),
            DecodeError::MissingSuffix(prefix) => write!(f, "Missing value after {:?}", prefix),
            DecodeError::RelativeSegment => write!(f, "Relative path segment"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Reasons a mutation refuses to produce a candidate record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record {0} is terminal and accepts no further modifications")]
    Terminal(String),
    #[error("actor {actor:?} has no valid wire form: {reason}")]
    InvalidActor { actor: String, reason: String },
    #[error("meeting ends before it starts")]
    InvalidMeetingWindow,
    #[error("mutation refused: {0}")]
    Refused(String),
}
