//! Tunables for the updater, the ingestor and the self-event filter.
//!
//! Everything has a default; `from_env` overrides individual values from `CHANGELANE_*`
//! variables.

use std::{str::FromStr, time::Duration};

use changelane_proto::{validate_component, WriterIdentity};

use crate::{backoff::Backoff, error::ConfigError};

pub const MAX_RETRIES_VAR: &str = "CHANGELANE_MAX_RETRIES";
pub const BASE_BACKOFF_MS_VAR: &str = "CHANGELANE_BASE_BACKOFF_MS";
pub const BACKOFF_FACTOR_VAR: &str = "CHANGELANE_BACKOFF_FACTOR";
pub const MAX_BACKOFF_MS_VAR: &str = "CHANGELANE_MAX_BACKOFF_MS";
pub const JITTER_RATIO_VAR: &str = "CHANGELANE_JITTER_RATIO";
pub const OVERALL_TIMEOUT_MS_VAR: &str = "CHANGELANE_OVERALL_TIMEOUT_MS";
pub const NAMESPACE_ROOT_VAR: &str = "CHANGELANE_NAMESPACE_ROOT";
pub const WRITER_IDENTITY_VAR: &str = "CHANGELANE_WRITER_IDENTITY";
pub const KNOWN_WRITERS_VAR: &str = "CHANGELANE_KNOWN_WRITERS";

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateConfig {
    /// Retries after the first attempt; the default of 3 allows four tries in total
    pub max_retries: u32,
    pub backoff: Backoff,
    /// Budget for the whole retry loop, on top of any caller deadline
    pub overall_timeout: Option<Duration>,
}

impl Default for UpdateConfig {
    fn default() -> Self { Self { max_retries: 3, backoff: Backoff::default(), overall_timeout: Some(Duration::from_secs(5)) } }
}

impl UpdateConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.backoff.jitter_ratio = 0.0;
        self
    }

    pub fn with_overall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.overall_timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|var| std::env::var(var).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(max_retries) = parse(&lookup, MAX_RETRIES_VAR, "retry count")? {
            config.max_retries = max_retries;
        }
        if let Some(ms) = parse::<u64>(&lookup, BASE_BACKOFF_MS_VAR, "millisecond count")? {
            config.backoff.base = Duration::from_millis(ms);
        }
        if let Some(factor) = parse::<u32>(&lookup, BACKOFF_FACTOR_VAR, "backoff factor")? {
            if factor == 0 {
                return Err(invalid(BACKOFF_FACTOR_VAR, "backoff factor", "0"));
            }
            config.backoff.factor = factor;
        }
        if let Some(ms) = parse::<u64>(&lookup, MAX_BACKOFF_MS_VAR, "millisecond count")? {
            config.backoff.max = Duration::from_millis(ms);
        }
        if let Some(ratio) = parse::<f64>(&lookup, JITTER_RATIO_VAR, "jitter ratio")? {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(invalid(JITTER_RATIO_VAR, "jitter ratio", &ratio.to_string()));
            }
            config.backoff.jitter_ratio = ratio;
        }
        if let Some(ms) = parse::<u64>(&lookup, OVERALL_TIMEOUT_MS_VAR, "millisecond count")? {
            config.overall_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// First path segment(s) of every artifact name
    pub namespace_root: String,
}

impl Default for IngestConfig {
    fn default() -> Self { Self { namespace_root: "surveys".to_owned() } }
}

impl IngestConfig {
    pub fn with_namespace_root(mut self, root: impl Into<String>) -> Self {
        self.namespace_root = root.into();
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|var| std::env::var(var).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(root) = lookup(NAMESPACE_ROOT_VAR) {
            for segment in root.trim_end_matches('/').split('/') {
                validate_component(segment).map_err(|source| ConfigError::Component { var: NAMESPACE_ROOT_VAR, source })?;
            }
            config.namespace_root = root.trim_end_matches('/').to_owned();
        }
        Ok(config)
    }
}

/// Which writer identities belong to this process and which other writers are expected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    pub own: Vec<WriterIdentity>,
    pub known_writers: Vec<WriterIdentity>,
}

impl Default for FilterConfig {
    fn default() -> Self { Self { own: vec![WriterIdentity::BackendSystem], known_writers: Vec::new() } }
}

impl FilterConfig {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|var| std::env::var(var).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(own) = lookup(WRITER_IDENTITY_VAR) {
            config.own = identities(WRITER_IDENTITY_VAR, &own)?;
        }
        if let Some(known) = lookup(KNOWN_WRITERS_VAR) {
            config.known_writers = identities(KNOWN_WRITERS_VAR, &known)?;
        }
        Ok(config)
    }
}

fn identities(var: &'static str, value: &str) -> Result<Vec<WriterIdentity>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| WriterIdentity::parse(token).map_err(|source| ConfigError::Component { var, source }))
        .collect()
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|_| invalid(var, expected, &value)),
    }
}

fn invalid(var: &'static str, expected: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid { var, expected, value: value.to_owned() }
}
