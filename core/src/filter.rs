//! Keeps a process from reacting to notifications of its own writes.
//!
//! The decision table fails open: a notification is only dropped when it positively names one
//! of this process's own identities. Anything doubtful is processed, and downstream idempotency
//! absorbs the occasional redundant pass.

use std::{collections::BTreeSet, future::Future};

use changelane_proto::{ChangeNotification, WriterIdentity};
use tracing::{debug, info, warn};

use crate::config::FilterConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Process,
    Discard,
    /// Identity missing or malformed; processed anyway
    ProcessWithWarning,
}

impl FilterDecision {
    pub fn should_process(&self) -> bool { !matches!(self, FilterDecision::Discard) }
}

#[derive(Debug, Clone)]
pub struct SelfEventFilter {
    own: BTreeSet<WriterIdentity>,
    known_writers: BTreeSet<WriterIdentity>,
}

impl SelfEventFilter {
    pub fn new(own: impl IntoIterator<Item = WriterIdentity>) -> Self { Self { own: own.into_iter().collect(), known_writers: BTreeSet::new() } }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self { own: config.own.iter().cloned().collect(), known_writers: config.known_writers.iter().cloned().collect() }
    }

    /// Register another legitimate writer beyond the portal and its users
    pub fn with_known_writer(mut self, writer: WriterIdentity) -> Self {
        self.known_writers.insert(writer);
        self
    }

    pub fn is_own(&self, writer: &WriterIdentity) -> bool { self.own.contains(writer) }

    pub fn is_known_writer(&self, writer: &WriterIdentity) -> bool {
        matches!(writer, WriterIdentity::Frontend | WriterIdentity::User(_)) || self.known_writers.contains(writer)
    }

    pub fn should_process(&self, notification: &ChangeNotification) -> FilterDecision {
        let Some(raw) = notification.writer_identity.as_deref() else {
            warn!("SelfEventFilter processing {} without a writer identity", notification);
            return FilterDecision::ProcessWithWarning;
        };

        let writer = match WriterIdentity::parse(raw) {
            Ok(writer) => writer,
            Err(err) => {
                warn!("SelfEventFilter processing {} with malformed writer identity: {}", notification, err);
                return FilterDecision::ProcessWithWarning;
            }
        };

        if self.is_own(&writer) {
            info!("SelfEventFilter discarding {}: written by this process", notification);
            FilterDecision::Discard
        } else if self.is_known_writer(&writer) {
            FilterDecision::Process
        } else {
            debug!("SelfEventFilter processing {} from unrecognized writer {}", notification, writer);
            FilterDecision::Process
        }
    }

    /// Run `handler` unless the notification is this process's own. Discarded notifications
    /// return `None` without touching `handler`.
    pub async fn gate<F, Fut, T>(&self, notification: &ChangeNotification, handler: F) -> Option<T>
    where
        F: FnOnce(FilterDecision) -> Fut,
        Fut: Future<Output = T>,
    {
        match self.should_process(notification) {
            FilterDecision::Discard => None,
            decision => Some(handler(decision).await),
        }
    }
}
