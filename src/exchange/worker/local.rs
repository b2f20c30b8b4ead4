use super::ExchangeWorker;
use crate::affinity::{ideal_assignment, late_assignment, AssignmentSet};
use crate::api::NodeRequestError;
use crate::exchange::free_switch;
use crate::exchange::future::{ExchangeFuture, ExchangePath};
use crate::exchange::messages::{ExchangeMessage, PartitionsUpdate};
use crate::partition::{PartitionFullMap, PartitionKey, PartitionSnapshot, PartitionState};
use crate::topology::{DiscoveryEvent, DiscoveryEventKind, TopologyVersion};
use std::sync::Arc;

impl ExchangeWorker {
    /// Advances the version without talking to anyone: client nodes, inactive clusters, and
    /// client joins or departures.
    pub(super) fn apply_local_only(&mut self, event: DiscoveryEvent) {
        let current = self.store.current().clone();
        let version = event.version;

        let snapshot = if matches!(event.kind, DiscoveryEventKind::ActivationChanged { active: false }) {
            // Data stays on disk; nothing is owned until the next activation.
            PartitionSnapshot::new(
                version,
                AssignmentSet::new(),
                AssignmentSet::new(),
                current.partitions().clone(),
                false,
            )
        } else if self.local.is_client && event.topology.is_active() {
            // Routing view only. Clients never hold partitions.
            let ideal: AssignmentSet = self
                .groups
                .iter()
                .map(|group| (group.id.clone(), Arc::new(ideal_assignment(group, &event.topology, version))))
                .collect();
            PartitionSnapshot::new(version, ideal.clone(), ideal, PartitionFullMap::new(), true)
        } else {
            retagged(&current, version)
        };

        let mut fut = ExchangeFuture::new(&self.logger, &event, self.local.id.clone(), ExchangePath::LocalOnly, None);
        fut.rebalanced = snapshot.is_rebalanced();
        self.finish_locally(fut, snapshot);
    }

    /// Every survivor drops the departed node from the ownership lists on its own.
    pub(super) fn apply_free_switch(&mut self, event: DiscoveryEvent) {
        let departed = match event.kind.departed_node() {
            Some(node) => node.id().clone(),
            None => return self.begin_full_exchange(event, None),
        };

        let outcome = free_switch::apply(self.store.current(), &departed, event.version);
        for (key, successor) in outcome.promoted.iter() {
            slog::debug!(self.logger, "{} promoted to primary of {}", successor, key);
        }
        if !outcome.lost.is_empty() {
            slog::warn!(
                self.logger,
                "{} left as the only holder of {} partitions",
                departed,
                outcome.lost.len()
            );
        }
        slog::info!(
            self.logger,
            "Exchange-free switch at {}: {} primaries promoted",
            event.version,
            outcome.promoted.len()
        );

        let mut fut = ExchangeFuture::new(
            &self.logger,
            &event,
            self.local.id.clone(),
            ExchangePath::ExchangeFree,
            None,
        );
        fut.exchange_free_switch = true;
        fut.rebalanced = outcome.snapshot.is_rebalanced();
        fut.lost = outcome.lost;
        self.finish_locally(fut, outcome.snapshot);
    }

    /// Switches every group to its ideal assignment at a minor version.
    pub(super) fn apply_late_affinity(&mut self, event: DiscoveryEvent) {
        let current = self.store.current().clone();
        let version = event.version;

        let incomplete = self.groups.iter().find(|group| {
            !current.ideal_assignments().contains_key(&group.id) || !current.partitions().contains_key(&group.id)
        });
        if let Some(group) = incomplete.map(|group| group.id.clone()) {
            slog::warn!(self.logger, "No ideal assignment for {}, keeping the current one", group);
            return self.apply_local_only(event);
        }

        let mut assignments = AssignmentSet::new();
        let mut ideal = AssignmentSet::new();
        let mut partitions = PartitionFullMap::new();
        for group in self.groups.iter() {
            let group_ideal = &current.ideal_assignments()[&group.id];
            let plan = late_assignment(group_ideal, &current.partitions()[&group.id], version);
            assignments.insert(group.id.clone(), Arc::new(plan.actual));
            ideal.insert(group.id.clone(), Arc::new(plan.ideal));
            partitions.insert(group.id.clone(), plan.states);
        }

        slog::info!(self.logger, "Late affinity assignment at {}", version);
        let mut fut = ExchangeFuture::new(
            &self.logger,
            &event,
            self.local.id.clone(),
            ExchangePath::LateAffinity,
            None,
        );
        fut.rebalanced = true;
        self.finish_locally(fut, PartitionSnapshot::new(version, assignments, ideal, partitions, true));
    }

    fn finish_locally(&mut self, fut: ExchangeFuture, snapshot: PartitionSnapshot) {
        if let Err(e) = self.commit(snapshot) {
            self.history.push(fut.fail(e.to_string()));
            return self.halt(e.to_string());
        }
        self.current = Some(fut);
        self.complete_current();
    }

    /// Replicas this node no longer owns are dropped once the exchange that unassigned them is done.
    pub(super) fn evict_renting(&mut self) {
        let current = self.store.current().clone();
        let mut partitions = current.partitions().clone();
        let mut evicted = 0;
        for map in partitions.values_mut() {
            for (partition, state) in map.local_partitions(&self.local.id) {
                if state == PartitionState::Renting {
                    map.set(partition, self.local.id.clone(), PartitionState::Evicted);
                    evicted += 1;
                }
            }
        }
        if evicted == 0 {
            return;
        }

        slog::debug!(self.logger, "Evicting {} renting partitions", evicted);
        let snapshot = PartitionSnapshot::new(
            current.version(),
            current.assignments().clone(),
            current.ideal_assignments().clone(),
            partitions,
            current.is_rebalanced(),
        );
        if let Err(e) = self.commit(snapshot) {
            self.halt(e.to_string());
        }
    }

    /// Local data movement for `key` finished: the replica becomes OWNING.
    pub(super) fn mark_rebalanced(&mut self, key: PartitionKey) -> Result<TopologyVersion, NodeRequestError> {
        if let Some(reason) = &self.halted {
            return Err(NodeRequestError::Halted(reason.clone()));
        }
        if let Some(fut) = self.current.as_ref() {
            return Err(NodeRequestError::ExchangeInProgress(fut.id().version()));
        }

        let current = self.store.current().clone();
        let state = current.state(&key, &self.local.id);
        if state != Some(PartitionState::Moving) {
            return Err(NodeRequestError::NotMoving { key, state });
        }

        let mut partitions = current.partitions().clone();
        if let Some(map) = partitions.get_mut(&key.group) {
            map.set(key.partition, self.local.id.clone(), PartitionState::Owning);
        }
        let snapshot = PartitionSnapshot::new(
            current.version(),
            current.assignments().clone(),
            current.ideal_assignments().clone(),
            partitions,
            current.is_rebalanced(),
        );
        let committed = match self.commit(snapshot) {
            Ok(committed) => committed,
            Err(e) => {
                self.halt(e.to_string());
                return Err(NodeRequestError::Halted(e.to_string()));
            }
        };
        slog::debug!(self.logger, "{} now owned at {}", key, committed.version());

        if self.is_oldest_server() {
            self.check_late_affinity();
        } else if let (Some(topology), Some(coordinator)) = (self.latest_topology.clone(), self.oldest_server()) {
            let update = PartitionsUpdate {
                sender: self.local.id.clone(),
                version: committed.version(),
                partitions: committed.local_states(&self.local.id),
            };
            self.send(&topology, &coordinator, ExchangeMessage::PartitionsUpdate(update));
        }

        Ok(committed.version())
    }
}

fn retagged(current: &PartitionSnapshot, version: TopologyVersion) -> PartitionSnapshot {
    let retag = |set: &AssignmentSet| -> AssignmentSet {
        set.iter()
            .map(|(group, assignment)| (group.clone(), Arc::new(assignment.retag(version))))
            .collect()
    };

    PartitionSnapshot::new(
        version,
        retag(current.assignments()),
        retag(current.ideal_assignments()),
        current.partitions().clone(),
        current.is_rebalanced(),
    )
}
