use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

pub const MAX_IDENTITY_LEN: usize = 256;

const FRONTEND: &str = "frontend";
const BACKEND_SYSTEM: &str = "backend-system";
const USER_PREFIX: &str = "user:";
const CUSTOMER_PROCESSOR_PREFIX: &str = "customer-processor:";

/// The logical actor that performed a write.
///
/// Used as the `actor_id` of modification entries and stamped on every store write so that
/// change notifications can be attributed to their producer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WriterIdentity {
    /// The portal acting on its own behalf
    Frontend,
    /// A write triggered by a human through the portal
    User(String),
    /// The shared backend
    BackendSystem,
    /// The per-tenant worker for the given tenant
    CustomerProcessor(String),
    /// A well-formed identity this build does not know about
    Unrecognized(String),
}

impl WriterIdentity {
    pub fn user(id: impl AsRef<str>) -> Result<Self, DecodeError> { Self::parse(&format!("{}{}", USER_PREFIX, id.as_ref())) }

    pub fn customer_processor(tenant: impl AsRef<str>) -> Result<Self, DecodeError> {
        Self::parse(&format!("{}{}", CUSTOMER_PROCESSOR_PREFIX, tenant.as_ref()))
    }

    /// Checks that the wire form parses back, which the variants built directly do not guarantee
    pub fn validate(&self) -> Result<(), DecodeError> { Self::parse(&self.to_string()).map(|_| ()) }

    pub fn parse(token: &str) -> Result<Self, DecodeError> {
        if token.is_empty() {
            return Err(DecodeError::Empty);
        }
        if token.len() > MAX_IDENTITY_LEN {
            return Err(DecodeError::TooLong { max: MAX_IDENTITY_LEN });
        }
        if let Some(c) = token.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(DecodeError::InvalidCharacter(c));
        }

        if token == FRONTEND {
            Ok(WriterIdentity::Frontend)
        } else if token == BACKEND_SYSTEM {
            Ok(WriterIdentity::BackendSystem)
        } else if let Some(user) = token.strip_prefix(USER_PREFIX) {
            if user.is_empty() {
                return Err(DecodeError::MissingSuffix(USER_PREFIX));
            }
            Ok(WriterIdentity::User(user.to_owned()))
        } else if let Some(tenant) = token.strip_prefix(CUSTOMER_PROCESSOR_PREFIX) {
            if tenant.is_empty() {
                return Err(DecodeError::MissingSuffix(CUSTOMER_PROCESSOR_PREFIX));
            }
            Ok(WriterIdentity::CustomerProcessor(tenant.to_owned()))
        } else {
            Ok(WriterIdentity::Unrecognized(token.to_owned()))
        }
    }
}

impl std::str::FromStr for WriterIdentity {
    type Err = DecodeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

impl TryFrom<String> for WriterIdentity {
    type Error = DecodeError;
    fn try_from(token: String) -> Result<Self, Self::Error> { Self::parse(&token) }
}

impl From<WriterIdentity> for String {
    fn from(identity: WriterIdentity) -> Self { identity.to_string() }
}

impl std::fmt::Display for WriterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterIdentity::Frontend => write!(f, "{}", FRONTEND),
            WriterIdentity::User(user) => write!(f, "{}{}", USER_PREFIX, user),
            WriterIdentity::BackendSystem => write!(f, "{}", BACKEND_SYSTEM),
            WriterIdentity::CustomerProcessor(tenant) => write!(f, "{}{}", CUSTOMER_PROCESSOR_PREFIX, tenant),
            WriterIdentity::Unrecognized(token) => write!(f, "{}", token),
        }
    }
}
