use super::{ExchangeWorker, FullResend};
use crate::affinity::{is_rebalanced, plan_group, ready_for_late_assignment, AffinityAssignment, GroupPlan, PlanInput};
use crate::exchange::future::{ExchangeFuture, ExchangePath, ExchangePhase};
use crate::exchange::merge::{self, MergedPartitions};
use crate::exchange::messages::{
    ExchangeId, ExchangeMessage, FullAck, FullMessage, GroupFullState, PartitionsUpdate, SingleMessage, SingleRequest,
};
use crate::exchange::reconcile;
use crate::exchange::timers::{ExchangeTimerHandle, ExchangeTimerTick, TimeoutKind};
use crate::partition::{GroupPartitionMap, PartitionKey, PartitionSnapshot, PartitionState};
use crate::topology::{DiscoveryEvent, NodeId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

impl ExchangeWorker {
    pub(super) fn begin_full_exchange(&mut self, event: DiscoveryEvent, rejection: Option<String>) {
        let coordinator = match event.topology.oldest_server() {
            Some(node) => node.id().clone(),
            None => return self.apply_local_only(event),
        };

        let fut = ExchangeFuture::new(&self.logger, &event, coordinator.clone(), ExchangePath::Full, rejection);
        self.current = Some(fut);
        if !self.transition(ExchangePhase::CollectingSingle) {
            return;
        }

        if coordinator == self.local.id {
            self.start_collecting();
        } else {
            // A full result may already be waiting for us.
            self.drain_early_messages();
            let tag = self.current.as_ref().map(|fut| fut.id());
            if let Some(tag) = tag {
                self.send_single(tag);
            }
        }
    }

    /// Local node is the coordinator: expect a single message from every other server.
    pub(super) fn start_collecting(&mut self) {
        let local = self.local.id.clone();
        match self.current.as_mut() {
            Some(fut) => {
                let expected: BTreeSet<NodeId> = fut
                    .topology()
                    .server_nodes()
                    .map(|node| node.id().clone())
                    .filter(|id| *id != local)
                    .collect();
                slog::info!(fut.logger(), "Coordinating, expecting {} single messages", expected.len());
                fut.expected = expected;
            }
            None => return,
        }

        self.arm_exchange_timer(TimeoutKind::SingleMessages, self.config.single_message_timeout);
        self.drain_early_messages();
        self.maybe_finish_collecting();
    }

    pub(super) fn on_single(&mut self, single: SingleMessage) {
        let id = single.exchange_id;

        if let Some(fut) = self.current.as_mut() {
            if fut.accepts(id) {
                if fut.coordinator() != &self.local.id {
                    // We may take over as coordinator once the current one's departure arrives.
                    if fut.phase() == ExchangePhase::CollectingSingle {
                        self.buffer(ExchangeMessage::Single(single));
                    }
                    return;
                }

                match fut.phase() {
                    ExchangePhase::CollectingSingle if fut.expected.contains(&single.sender) => {
                        fut.counters.singles_received += 1;
                        fut.singles.insert(single.sender.clone(), single);
                        self.maybe_finish_collecting();
                    }
                    ExchangePhase::BroadcastingFull if fut.pending_acks.contains(&single.sender) => {
                        // The participant restarted collection and missed the full message.
                        if let Some(full) = fut.full.clone() {
                            let topology = fut.topology().clone();
                            self.send(&topology, &single.sender, ExchangeMessage::Full(full));
                        }
                    }
                    phase => {
                        slog::debug!(fut.logger(), "Ignoring single from {} in {:?}", single.sender, phase);
                    }
                }
                return;
            }

            if id.version() > fut.result_version() {
                self.buffer(ExchangeMessage::Single(single));
                return;
            }
        } else if id.version() > self.applied {
            self.buffer(ExchangeMessage::Single(single));
            return;
        }

        // The exchange finished here without the sender, which still waits for a result.
        if self.is_oldest_server() && id.version() <= self.applied {
            slog::info!(
                self.logger,
                "Late single from {} for {}, answering with the applied state",
                single.sender,
                id
            );
            let full = Arc::new(self.snapshot_full(id));
            if let Some(topology) = self.latest_topology.clone() {
                self.send(&topology, &single.sender, ExchangeMessage::Full(full));
            }
            return;
        }

        slog::debug!(self.logger, "Dropping single from {} for {}", single.sender, id);
    }

    pub(super) fn maybe_finish_collecting(&mut self) {
        let ready = match self.current.as_ref() {
            Some(fut) => {
                fut.coordinator() == &self.local.id
                    && fut.phase() == ExchangePhase::CollectingSingle
                    && fut.all_singles_received()
            }
            None => false,
        };

        if ready {
            self.finish_collecting();
        }
    }

    fn finish_collecting(&mut self) {
        self.timer = None;

        if !self.transition(ExchangePhase::Merging) {
            return;
        }
        let merged = match self.merge_current() {
            Some(Ok(merged)) => merged,
            Some(Err(e)) => return self.halt(format!("Cannot merge single messages: {}", e)),
            None => return,
        };
        for conflict in merged.conflicts.iter() {
            slog::warn!(
                self.logger,
                "Primary conflict on {} between {:?}, {} wins",
                conflict.key,
                conflict.contenders,
                conflict.winner
            );
        }

        if !self.transition(ExchangePhase::ComputingAffinity) {
            return;
        }
        let full = match self.plan_current(&merged) {
            Some(full) => Arc::new(full),
            None => return,
        };

        if !self.transition(ExchangePhase::BroadcastingFull) {
            return;
        }
        self.broadcast_full(full, merged.errors);
    }

    fn merge_current(&self) -> Option<Result<MergedPartitions, merge::MergeError>> {
        let fut = self.current.as_ref()?;
        let local_states = self.store.current().local_states(&self.local.id);
        let reports = fut
            .singles
            .iter()
            .map(|(node, single)| (node, &single.partitions))
            .chain(std::iter::once((&self.local.id, &local_states)));

        Some(merge::merge_single_messages(&self.groups, fut.topology(), reports))
    }

    fn plan_current(&self, merged: &MergedPartitions) -> Option<FullMessage> {
        let fut = self.current.as_ref()?;
        let previous = self.store.current();
        let topology = fut.topology();
        let version = fut.result_version();
        let no_claims = BTreeMap::new();

        let mut groups = BTreeMap::new();
        let mut rebalanced = true;
        let mut lost = Vec::new();
        for group in self.groups.iter() {
            let empty;
            let merged_map = match merged.partitions.get(&group.id) {
                Some(map) => map,
                None => {
                    empty = GroupPartitionMap::new(group.partitions());
                    &empty
                }
            };

            let mut plan = plan_group(
                group,
                PlanInput {
                    topology,
                    merged: merged_map,
                    previous: previous.assignments().get(&group.id).map(Arc::as_ref),
                    primary_claims: merged.primary_claims.get(&group.id).unwrap_or(&no_claims),
                    version,
                },
            );
            if topology.baseline().is_some() {
                plan = without_lost_owners(plan);
            }
            if !plan.lost.is_empty() {
                slog::warn!(fut.logger(), "{} partitions of {} lost", plan.lost.len(), group.id);
            }

            rebalanced &= plan.rebalanced;
            lost.extend(plan.lost.iter().map(|p| PartitionKey::new(group.id.clone(), *p)));
            groups.insert(
                group.id.clone(),
                GroupFullState {
                    owners: plan.actual.all_owners().to_vec(),
                    ideal_digest: plan.ideal.digest(),
                    partitions: plan.states,
                },
            );
        }

        Some(FullMessage {
            sender: self.local.id.clone(),
            exchange_id: fut.id(),
            result_version: version,
            groups,
            rebalanced,
            lost,
        })
    }

    fn broadcast_full(&mut self, full: Arc<FullMessage>, errors: Vec<(NodeId, String)>) {
        let reconciled = match self.current.as_ref() {
            Some(fut) => reconcile::reconcile_full(&self.local.id, &self.groups, fut.topology(), self.store.current(), &full),
            None => return,
        };
        let snapshot = match reconciled {
            Ok(snapshot) => snapshot,
            Err(e) => return self.halt(format!("Cannot apply own full message: {}", e)),
        };
        if let Err(e) = self.commit(snapshot) {
            return self.halt(e.to_string());
        }

        let (topology, participants) = match self.current.as_mut() {
            Some(fut) => {
                let participants: Vec<NodeId> = fut.expected.iter().cloned().collect();
                for (node, single) in fut.singles.iter() {
                    for error in single.errors.iter() {
                        fut.participant_errors.push((node.clone(), error.clone()));
                    }
                }
                fut.participant_errors.extend(errors);
                fut.full = Some(full.clone());
                fut.rebalanced = full.rebalanced;
                fut.lost = full.lost.clone();
                fut.counters.fulls_sent += participants.len() as u32;
                fut.pending_acks = participants.iter().cloned().collect();
                (fut.topology().clone(), participants)
            }
            None => return,
        };

        for node in participants.iter() {
            self.send(&topology, node, ExchangeMessage::Full(full.clone()));
        }

        if participants.is_empty() {
            self.complete_current();
        } else {
            self.arm_exchange_timer(TimeoutKind::FullAcks, self.config.full_ack_timeout);
        }
    }

    pub(super) fn on_full_ack(&mut self, ack: FullAck) {
        if let Some(fut) = self.current.as_mut() {
            if fut.coordinator() == &self.local.id
                && fut.phase() == ExchangePhase::BroadcastingFull
                && fut.accepts(ack.exchange_id)
            {
                if fut.pending_acks.remove(&ack.sender) && fut.pending_acks.is_empty() {
                    self.complete_current();
                }
                return;
            }
        }

        let settled = match self.resend.as_mut() {
            Some(resend) if resend.full.covers(ack.exchange_id) => {
                resend.attempts.remove(&ack.sender);
                resend.attempts.is_empty()
            }
            _ => false,
        };
        if settled {
            slog::debug!(self.logger, "Every slow node acknowledged the resent full message");
            self.resend = None;
        }
    }

    pub(super) fn on_single_timeout(&mut self) {
        let max_retries = self.config.max_message_retries;
        let (topology, id, requested, exhausted) = match self.current.as_mut() {
            Some(fut) if fut.coordinator() == &self.local.id && fut.phase() == ExchangePhase::CollectingSingle => {
                let mut requested = Vec::new();
                let mut exhausted = Vec::new();
                for node in fut.missing_singles() {
                    let retries = fut.retries.entry(node.clone()).or_insert(0);
                    *retries += 1;
                    if *retries > max_retries {
                        exhausted.push(node);
                    } else {
                        requested.push(node);
                    }
                }
                (fut.topology().clone(), fut.id(), requested, exhausted)
            }
            _ => return,
        };

        slog::warn!(
            self.logger,
            "Single messages missing at {}: re-requesting from {:?}, giving up on {:?}",
            id,
            requested,
            exhausted
        );
        for node in requested.iter() {
            let request = SingleRequest {
                sender: self.local.id.clone(),
                exchange_id: id,
            };
            self.send(&topology, node, ExchangeMessage::SingleRequest(request));
        }
        for node in exhausted {
            self.report_failed(node);
        }

        self.arm_exchange_timer(TimeoutKind::SingleMessages, self.config.single_message_timeout);
    }

    /// Finishes the exchange without the slow nodes and keeps resending them the result.
    pub(super) fn on_full_ack_timeout(&mut self) {
        let (full, topology, slow) = match self.current.as_ref() {
            Some(fut) if fut.coordinator() == &self.local.id && fut.phase() == ExchangePhase::BroadcastingFull => {
                match fut.full.clone() {
                    Some(full) => (full, fut.topology().clone(), fut.pending_acks.clone()),
                    None => return,
                }
            }
            _ => return,
        };

        slog::warn!(self.logger, "No full acknowledgement from {:?}, completing without them", slow);
        self.complete_current();

        for node in slow.iter() {
            self.send(&topology, node, ExchangeMessage::Full(full.clone()));
        }
        self.resend = Some(FullResend {
            full,
            topology,
            attempts: slow.into_iter().map(|node| (node, 1)).collect(),
            timer: None,
            generation: 0,
        });
        self.arm_resend_timer();
    }

    pub(super) fn on_full_resend_timeout(&mut self, tick: ExchangeTimerTick) {
        let max_retries = self.config.max_message_retries;
        let (full, topology, resent, exhausted) = match self.resend.as_mut() {
            Some(resend) if resend.timer.as_ref().map(ExchangeTimerHandle::tick) == Some(tick) => {
                let mut resent = Vec::new();
                let mut exhausted = Vec::new();
                for (node, attempts) in resend.attempts.iter_mut() {
                    *attempts += 1;
                    if *attempts > max_retries {
                        exhausted.push(node.clone());
                    } else {
                        resent.push(node.clone());
                    }
                }
                for node in exhausted.iter() {
                    resend.attempts.remove(node);
                }
                (resend.full.clone(), resend.topology.clone(), resent, exhausted)
            }
            _ => return,
        };

        for node in resent.iter() {
            self.send(&topology, node, ExchangeMessage::Full(full.clone()));
        }
        for node in exhausted {
            self.report_failed(node);
        }

        if resent.is_empty() {
            self.resend = None;
        } else {
            self.arm_resend_timer();
        }
    }

    fn arm_resend_timer(&mut self) {
        let resend = match self.resend.as_mut() {
            Some(resend) => resend,
            None => return,
        };
        resend.generation += 1;

        let tick = ExchangeTimerTick {
            exchange_id: resend.full.exchange_id,
            kind: TimeoutKind::FullResend,
            attempt: resend.generation,
        };
        resend.timer = Some(ExchangeTimerHandle::spawn_timer_task(
            self.config.full_ack_timeout,
            self.config.retry_jitter,
            tick,
            self.actor_client.clone(),
        ));
    }

    /// A participant finished moving data in. Only the coordinator tracks this between exchanges.
    pub(super) fn on_partitions_update(&mut self, update: PartitionsUpdate) {
        if self.current.is_some() || !self.is_oldest_server() {
            slog::debug!(self.logger, "Ignoring partitions update from {}", update.sender);
            return;
        }

        let current = self.store.current().clone();
        if update.version != current.version() {
            slog::debug!(
                self.logger,
                "Ignoring partitions update from {} at {}, table is at {}",
                update.sender,
                update.version,
                current.version()
            );
            return;
        }

        let mut partitions = current.partitions().clone();
        for (group, locals) in update.partitions.groups.iter() {
            if let Some(map) = partitions.get_mut(group) {
                for local in locals {
                    if local.partition >= map.partitions() {
                        continue;
                    }
                    // Updates may arrive out of order. Within a version a replica only moves to OWNING.
                    let known = map.state(local.partition, &update.sender);
                    if known == Some(PartitionState::Owning) && local.state == PartitionState::Moving {
                        continue;
                    }
                    map.set(local.partition, update.sender.clone(), local.state);
                }
            }
        }

        let snapshot = PartitionSnapshot::new(
            current.version(),
            current.assignments().clone(),
            current.ideal_assignments().clone(),
            partitions,
            current.is_rebalanced(),
        );
        if let Err(e) = self.commit(snapshot) {
            return self.halt(e.to_string());
        }
        self.check_late_affinity();
    }

    /// Coordinator only: once every ideal owner holds its data, ask discovery for an affinity change.
    pub(super) fn check_late_affinity(&mut self) {
        if self.current.is_some() || self.halted.is_some() || !self.is_oldest_server() {
            return;
        }

        let snapshot = self.store.current();
        let version = snapshot.version();
        if snapshot.is_rebalanced() || snapshot.assignments().is_empty() || version != self.last_seen {
            return;
        }
        if self.laa_requested == Some(version) {
            return;
        }

        let ready = self.groups.iter().all(|group| {
            match (
                snapshot.ideal_assignments().get(&group.id),
                snapshot.partitions().get(&group.id),
            ) {
                (Some(ideal), Some(states)) => ready_for_late_assignment(ideal, states),
                _ => false,
            }
        });
        if !ready {
            return;
        }

        slog::info!(self.logger, "Every ideal owner caught up at {}, requesting affinity change", version);
        self.laa_requested = Some(version);
        let discovery = self.discovery.clone();
        tokio::spawn(async move {
            discovery.request_affinity_change(version).await;
        });
    }

    /// The applied table as a full message, for a participant that missed the real one.
    fn snapshot_full(&self, id: ExchangeId) -> FullMessage {
        let snapshot = self.store.current();
        let groups = snapshot
            .assignments()
            .iter()
            .filter_map(|(group, assignment)| {
                let partitions = snapshot.partitions().get(group)?.clone();
                let ideal_digest = snapshot.ideal_assignments().get(group)?.digest();
                Some((
                    group.clone(),
                    GroupFullState {
                        partitions,
                        owners: assignment.all_owners().to_vec(),
                        ideal_digest,
                    },
                ))
            })
            .collect();

        FullMessage {
            sender: self.local.id.clone(),
            exchange_id: id,
            result_version: snapshot.version(),
            groups,
            rebalanced: snapshot.is_rebalanced(),
            lost: Vec::new(),
        }
    }
}

/// With a baseline, a partition nobody holds stays without owner until a holder comes back.
fn without_lost_owners(mut plan: GroupPlan) -> GroupPlan {
    if plan.lost.is_empty() {
        return plan;
    }

    let mut owners = plan.actual.all_owners().to_vec();
    for partition in plan.lost.iter() {
        if let Some(list) = owners.get_mut(*partition as usize) {
            for node in list.drain(..) {
                plan.states.remove(*partition, &node);
            }
        }
    }
    plan.actual = AffinityAssignment::new(plan.actual.version(), owners);
    // Offline baseline members keep their slots, so an ownerless partition can still match the ideal.
    plan.rebalanced = is_rebalanced(&plan.ideal, &plan.actual, &plan.states);
    plan
}
