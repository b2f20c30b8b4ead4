use crate::exchange::{ExchangeStateListener, ExchangeStateSnapshot, ExchangeSummary};
use std::sync::Arc;

/// What the local exchange worker did, as observed by the application.
#[derive(Clone, Debug)]
pub enum ExchangeEvent {
    Completed(Arc<ExchangeSummary>),
    /// The node cannot take part in exchanges any more and is leaving the cluster.
    Halted(String),
}

/// Consuming this is subtle: it doesn't queue intermediate events. Several exchanges completing
/// between two calls to `next_event()` are observed as the most recent one only. The exchange
/// history admin request has the full record.
pub struct ExchangeEventListener {
    listener: ExchangeStateListener,
}

impl ExchangeEventListener {
    pub(crate) fn new(listener: ExchangeStateListener) -> Self {
        ExchangeEventListener { listener }
    }

    /// `None` once the node has shut down.
    pub async fn next_event(&mut self) -> Option<ExchangeEvent> {
        loop {
            let snapshot = self.listener.next().await?;
            if let Some(event) = ExchangeEvent::from_snapshot(snapshot) {
                return Some(event);
            }
        }
    }
}

impl ExchangeEvent {
    fn from_snapshot(snapshot: ExchangeStateSnapshot) -> Option<Self> {
        match (snapshot.halted, snapshot.last) {
            (Some(reason), _) => Some(ExchangeEvent::Halted(reason)),
            (None, Some(summary)) => Some(ExchangeEvent::Completed(summary)),
            (None, None) => None,
        }
    }
}
