use crate::exchange::future::ExchangeSummary;
use crate::topology::TopologyVersion;
use std::collections::VecDeque;
use std::sync::Arc;

/// Most recent exchanges, newest last.
pub(crate) struct ExchangeHistory {
    entries: VecDeque<Arc<ExchangeSummary>>,
    capacity: usize,
}

impl ExchangeHistory {
    pub(crate) fn new(capacity: usize) -> Self {
        ExchangeHistory {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn push(&mut self, summary: Arc<ExchangeSummary>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(summary);
    }

    pub(crate) fn last(&self) -> Option<&Arc<ExchangeSummary>> {
        self.entries.back()
    }

    pub(crate) fn to_vec(&self) -> Vec<Arc<ExchangeSummary>> {
        self.entries.iter().cloned().collect()
    }

    /// The exchange whose result covers `version`, or failing that, the first one past it.
    pub(crate) fn covering(&self, version: TopologyVersion) -> Option<&Arc<ExchangeSummary>> {
        self.entries
            .iter()
            .find(|summary| summary.covers(version))
            .or_else(|| self.entries.iter().find(|summary| summary.result_version >= version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::future::{ExchangeOutcome, ExchangePath, MessageCounters};
    use crate::exchange::messages::ExchangeId;
    use chrono::Utc;

    fn summary(id: u64, result: u64) -> Arc<ExchangeSummary> {
        Arc::new(ExchangeSummary {
            exchange_id: ExchangeId::new(TopologyVersion::new(id, 0)),
            result_version: TopologyVersion::new(result, 0),
            trigger: "NodeJoined",
            coordinator: None,
            path: ExchangePath::Full,
            rebalanced: true,
            exchange_free_switch: false,
            free_switch_rejection: None,
            messages: MessageCounters::default(),
            merged_versions: Vec::new(),
            lost_partitions: Vec::new(),
            participant_errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcome: ExchangeOutcome::Completed,
        })
    }

    #[test]
    fn bounded_and_answers_merged_ranges() {
        let mut history = ExchangeHistory::new(2);
        history.push(summary(1, 1));
        history.push(summary(2, 4));
        history.push(summary(5, 5));

        assert_eq!(history.to_vec().len(), 2);
        assert_eq!(history.last().map(|s| s.result_version), Some(TopologyVersion::new(5, 0)));
        assert_eq!(
            history.covering(TopologyVersion::new(3, 0)).map(|s| s.exchange_id.version()),
            Some(TopologyVersion::new(2, 0))
        );
        assert!(history.covering(TopologyVersion::new(6, 0)).is_none());
    }
}
