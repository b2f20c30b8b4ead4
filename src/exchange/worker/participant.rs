use super::ExchangeWorker;
use crate::exchange::future::{ExchangePath, ExchangePhase};
use crate::exchange::messages::{ExchangeId, ExchangeMessage, FullAck, FullMessage, SingleMessage, SingleRequest};
use crate::exchange::reconcile;
use crate::topology::{DiscoveryEvent, TopologySnapshot};
use std::sync::Arc;

impl ExchangeWorker {
    /// A discovery event arrived while an exchange is in flight: merge it, restart under a new
    /// coordinator, or queue it.
    pub(super) fn on_event_during_exchange(&mut self, event: DiscoveryEvent) {
        let departed = event
            .kind
            .departed_node()
            .filter(|node| node.is_server())
            .map(|node| node.id().clone());
        let departed = match departed {
            Some(departed) => departed,
            None => return self.deferred.push_back(event),
        };
        let nothing_queued = self.deferred.is_empty();
        let local = self.local.id.clone();

        let fut = match self.current.as_mut() {
            Some(fut) if fut.path() == ExchangePath::Full => fut,
            _ => return self.deferred.push_back(event),
        };
        if fut.coordinator() == &departed {
            return self.replace_coordinator(event);
        }
        if fut.coordinator() != &local {
            // Picked up from the full message's result version, or started after this exchange.
            return self.deferred.push_back(event);
        }

        match fut.phase() {
            ExchangePhase::CollectingSingle if nothing_queued => {
                fut.merge_event(&event);
                fut.expected.remove(&departed);
                fut.singles.remove(&departed);
                fut.retries.remove(&departed);
                self.maybe_finish_collecting();
            }
            ExchangePhase::BroadcastingFull => {
                let last_ack = fut.pending_acks.remove(&departed) && fut.pending_acks.is_empty();
                self.deferred.push_back(event);
                if last_ack {
                    self.complete_current();
                }
            }
            _ => self.deferred.push_back(event),
        }
    }

    /// The coordinator left. The next oldest server restarts collection with the same exchange id.
    fn replace_coordinator(&mut self, event: DiscoveryEvent) {
        let next = match event.topology.oldest_server() {
            Some(node) => node.id().clone(),
            None => return self.halt(format!("No server left to coordinate after {}", event.version)),
        };

        let restarted = match self.current.as_mut() {
            Some(fut) => {
                fut.merge_event(&event);
                fut.restart_collecting(next.clone()).map(|()| fut.result_version())
            }
            None => return,
        };
        let tag = match restarted {
            Ok(version) => ExchangeId::new(version),
            Err(e) => return self.halt(e.to_string()),
        };
        self.timer = None;

        if next == self.local.id {
            self.start_collecting();
        } else {
            self.send_single(tag);
        }
    }

    /// Reports local partition states to the current coordinator, once per coordinator.
    pub(super) fn send_single(&mut self, tag: ExchangeId) {
        let local = self.local.id.clone();
        let (topology, coordinator) = match self.current.as_mut() {
            Some(fut)
                if fut.coordinator() != &local && fut.phase() == ExchangePhase::CollectingSingle && !fut.single_sent =>
            {
                fut.single_sent = true;
                fut.counters.singles_sent += 1;
                (fut.topology().clone(), fut.coordinator().clone())
            }
            _ => return,
        };

        let single = self.single_message(tag);
        self.send(&topology, &coordinator, ExchangeMessage::Single(single));
    }

    fn single_message(&self, tag: ExchangeId) -> SingleMessage {
        SingleMessage {
            sender: self.local.id.clone(),
            exchange_id: tag,
            partitions: self.store.current().local_states(&self.local.id),
            errors: Vec::new(),
        }
    }

    pub(super) fn on_single_request(&mut self, request: SingleRequest) {
        if let Some(fut) = self.current.as_mut() {
            if fut.coordinator() == &request.sender && fut.accepts(request.exchange_id) {
                fut.single_sent = false;
                return self.send_single(request.exchange_id);
            }
            if request.exchange_id.version() > fut.result_version() {
                return self.buffer(ExchangeMessage::SingleRequest(request));
            }
        }

        if request.exchange_id.version() <= self.applied {
            // Finished here, but the requester still collects for it.
            let single = self.single_message(request.exchange_id);
            if let Some(topology) = self.latest_topology.clone() {
                self.send(&topology, &request.sender, ExchangeMessage::Single(single));
            }
            return;
        }
        self.buffer(ExchangeMessage::SingleRequest(request));
    }

    pub(super) fn on_full(&mut self, full: Arc<FullMessage>) {
        let result = full.result_version;
        if result <= self.applied {
            // Already applied; the coordinator missed our acknowledgement.
            if let Some(topology) = self.latest_topology.clone() {
                self.acknowledge(&topology, &full);
            }
            return;
        }
        if result > self.last_seen {
            return self.buffer(ExchangeMessage::Full(full));
        }

        let fut = match self.current.as_ref() {
            Some(fut) => fut,
            None => return self.buffer(ExchangeMessage::Full(full)),
        };
        if full.exchange_id.version() > fut.result_version() {
            return self.buffer(ExchangeMessage::Full(full));
        }
        if fut.id().version() > result || result < fut.result_version() || fut.coordinator() == &self.local.id {
            slog::debug!(fut.logger(), "Dropping stale full message for {} from {}", full.exchange_id, full.sender);
            return;
        }
        if &full.sender != fut.coordinator() {
            // Its sender may become our coordinator once the old one's departure arrives.
            return self.buffer(ExchangeMessage::Full(full));
        }

        let topology = if result == fut.result_version() {
            fut.topology().clone()
        } else {
            match self.deferred.iter().find(|event| event.version == result) {
                Some(event) => event.topology.clone(),
                None => return self.buffer(ExchangeMessage::Full(full)),
            }
        };
        self.apply_full(full, topology);
    }

    fn apply_full(&mut self, full: Arc<FullMessage>, topology: Arc<TopologySnapshot>) {
        let reconciled = reconcile::reconcile_full(&self.local.id, &self.groups, &topology, self.store.current(), &full);
        let snapshot = match reconciled {
            Ok(snapshot) => snapshot,
            Err(e) => return self.halt(format!("Cannot apply full message from {}: {}", full.sender, e)),
        };
        if let Err(e) = self.commit(snapshot) {
            return self.halt(e.to_string());
        }

        let result = full.result_version;
        let merged: Vec<DiscoveryEvent> = match self.current.as_ref() {
            Some(fut) => self
                .deferred
                .iter()
                .filter(|event| fut.result_version() < event.version && event.version <= result)
                .cloned()
                .collect(),
            None => return,
        };
        self.deferred.retain(|event| event.version > result);

        if let Some(fut) = self.current.as_mut() {
            for event in merged.iter() {
                fut.merge_event(event);
            }
            fut.counters.fulls_received += 1;
            fut.rebalanced = full.rebalanced;
            fut.lost = full.lost.clone();
            fut.full = Some(full.clone());
        }

        self.acknowledge(&topology, &full);
        self.complete_current();
    }

    fn acknowledge(&self, topology: &TopologySnapshot, full: &FullMessage) {
        let ack = FullAck {
            sender: self.local.id.clone(),
            exchange_id: full.exchange_id,
        };
        self.send(topology, &full.sender, ExchangeMessage::FullAck(ack));
    }
}
