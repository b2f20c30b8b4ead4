use crate::affinity::{AffinityFunction, CacheGroupConfig};
use crate::partition::{CacheGroupId, PartitionKey, PartitionSnapshot, PartitionStateReader};
use crate::topology::{NodeId, TopologyVersion};
use crate::txn::types::{
    AbortReason, CommitOutcome, Enlistment, GuardError, LeaveReport, PartitionReady, TxDecision, TxError, TxId,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Clone, Debug, Default)]
struct Readiness {
    blocked: Arc<BTreeSet<PartitionKey>>,
    halted: bool,
}

enum TxStatus {
    Active,
    MarkedRollback(AbortReason),
}

struct TxRecord {
    status: TxStatus,
    enlistments: Vec<Enlistment>,
}

#[derive(Default)]
struct GuardState {
    next_tx: u64,
    transactions: BTreeMap<TxId, TxRecord>,
    /// Partitions whose primary departed, keyed to the version of the departure.
    blocked: BTreeMap<PartitionKey, TopologyVersion>,
    halted: bool,
}

/// Keeps transactions started on this node consistent across node departures.
///
/// A transaction that only lost a backup keeps going with the remaining replicas. One that lost
/// the primary of an enlisted partition is marked for rollback and fails at commit with a
/// retryable error. New work on a partition whose primary departed waits until the exchange
/// worker installs the next primary.
pub struct TransactionContinuityGuard {
    logger: slog::Logger,
    store: PartitionStateReader,
    functions: BTreeMap<CacheGroupId, Arc<dyn AffinityFunction>>,
    state: Mutex<GuardState>,
    readiness: watch::Sender<Readiness>,
    readiness_rx: watch::Receiver<Readiness>,
}

impl TransactionContinuityGuard {
    pub(crate) fn new(logger: slog::Logger, store: PartitionStateReader, groups: &[CacheGroupConfig]) -> Self {
        let (readiness, readiness_rx) = watch::channel(Readiness::default());
        let functions = groups
            .iter()
            .map(|group| (group.id.clone(), group.affinity.clone()))
            .collect();

        TransactionContinuityGuard {
            logger,
            store,
            functions,
            state: Mutex::new(GuardState::default()),
            readiness,
            readiness_rx,
        }
    }

    pub fn begin(&self) -> TxId {
        let mut state = self.lock();
        state.next_tx += 1;
        let tx = TxId::new(state.next_tx);
        state.transactions.insert(
            tx,
            TxRecord {
                status: TxStatus::Active,
                enlistments: Vec::new(),
            },
        );
        tx
    }

    /// Enlists the partition `key` maps to in `group`. Waits while that partition is blocked.
    pub async fn enlist(&self, tx: TxId, group: &CacheGroupId, key: &[u8]) -> Result<Enlistment, TxError> {
        let partition = self
            .functions
            .get(group)
            .map(|function| function.partition(key))
            .ok_or_else(|| TxError::UnknownCacheGroup(group.clone()))?;

        self.enlist_partition(tx, PartitionKey::new(group.clone(), partition)).await
    }

    pub async fn enlist_partition(&self, tx: TxId, key: PartitionKey) -> Result<Enlistment, TxError> {
        loop {
            self.check_active(tx)?;
            let ready = self.await_partition_ready(&key).await?;
            if let Some(enlistment) = self.try_record(tx, ready)? {
                return Ok(enlistment);
            }
        }
    }

    pub fn commit(&self, tx: TxId) -> Result<CommitOutcome, TxError> {
        let record = self
            .lock()
            .transactions
            .remove(&tx)
            .ok_or(TxError::UnknownTransaction(tx))?;

        match record.status {
            TxStatus::Active => Ok(CommitOutcome {
                tx,
                enlistments: record.enlistments,
            }),
            TxStatus::MarkedRollback(reason) => {
                slog::info!(self.logger, "Rolling back {} at commit: {}", tx, reason);
                Err(TxError::RolledBack {
                    tx,
                    reason,
                    retryable: true,
                })
            }
        }
    }

    pub fn rollback(&self, tx: TxId) -> Result<(), TxError> {
        self.lock()
            .transactions
            .remove(&tx)
            .map(|_| ())
            .ok_or(TxError::UnknownTransaction(tx))
    }

    /// Resolves once `key` has a live primary at the current version.
    pub async fn await_partition_ready(&self, key: &PartitionKey) -> Result<PartitionReady, GuardError> {
        let mut readiness = self.readiness_rx.clone();
        loop {
            let blocked = {
                let current = readiness.borrow();
                if current.halted {
                    return Err(GuardError::NodeHalted);
                }
                current.blocked.contains(key)
            };

            if !blocked {
                return ready_at(&self.store.snapshot(), key);
            }
            if readiness.changed().await.is_err() {
                return Err(GuardError::NodeHalted);
            }
        }
    }

    pub fn active_transactions(&self) -> usize {
        self.lock().transactions.len()
    }

    pub fn blocked_partitions(&self) -> Vec<PartitionKey> {
        self.lock().blocked.keys().cloned().collect()
    }

    /// Classifies every in-flight transaction against the departure of `departed` and blocks
    /// the partitions it was primary for in `snapshot`.
    pub(crate) fn on_node_left(
        &self,
        departed: &NodeId,
        version: TopologyVersion,
        snapshot: &PartitionSnapshot,
    ) -> LeaveReport {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut report = LeaveReport::default();

        for (group, assignment) in snapshot.assignments().iter() {
            for partition in assignment.primary_partitions(departed) {
                let key = PartitionKey::new(group.clone(), partition);
                state.blocked.insert(key.clone(), version);
                report.blocked.push(key);
            }
        }

        for (tx, record) in state.transactions.iter_mut() {
            if let TxStatus::MarkedRollback(_) = record.status {
                continue;
            }

            let lost_primary = record
                .enlistments
                .iter()
                .find(|enlistment| &enlistment.primary == departed)
                .map(|enlistment| enlistment.key.clone());

            match lost_primary {
                Some(key) => {
                    let reason = AbortReason::PrimaryLeft {
                        node: departed.clone(),
                        key,
                        version,
                    };
                    record.status = TxStatus::MarkedRollback(reason.clone());
                    report.decisions.push((*tx, TxDecision::Abort(reason)));
                }
                None => {
                    let mut dropped_backups = Vec::new();
                    for enlistment in record.enlistments.iter_mut() {
                        let before = enlistment.backups.len();
                        enlistment.backups.retain(|backup| backup != departed);
                        if enlistment.backups.len() != before {
                            dropped_backups.push(enlistment.key.clone());
                        }
                    }
                    if !dropped_backups.is_empty() {
                        report.decisions.push((*tx, TxDecision::Continue { dropped_backups }));
                    }
                }
            }
        }

        self.publish(state);
        slog::info!(
            self.logger,
            "Node {} left at {}: {} partitions blocked, {} transactions affected",
            departed,
            version,
            report.blocked.len(),
            report.decisions.len()
        );

        report
    }

    /// A primary is installed for everything blocked at or before `version`.
    pub(crate) fn release(&self, version: TopologyVersion) {
        let mut guard = self.lock();
        let before = guard.blocked.len();
        guard.blocked.retain(|_, blocked_at| *blocked_at > version);
        if guard.blocked.len() != before {
            slog::debug!(
                self.logger,
                "Released {} partitions at {}",
                before - guard.blocked.len(),
                version
            );
            self.publish(&guard);
        }
    }

    pub(crate) fn halt(&self) {
        let mut guard = self.lock();
        guard.halted = true;
        for record in guard.transactions.values_mut() {
            if let TxStatus::Active = record.status {
                record.status = TxStatus::MarkedRollback(AbortReason::NodeHalted);
            }
        }
        self.publish(&guard);
    }

    fn check_active(&self, tx: TxId) -> Result<(), TxError> {
        let state = self.lock();
        match state.transactions.get(&tx) {
            None => Err(TxError::UnknownTransaction(tx)),
            Some(TxRecord {
                status: TxStatus::MarkedRollback(reason),
                ..
            }) => Err(TxError::RolledBack {
                tx,
                reason: reason.clone(),
                retryable: true,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Records the enlistment unless the partition was blocked or reassigned since `ready` was
    /// observed, in which case the caller waits again.
    fn try_record(&self, tx: TxId, ready: PartitionReady) -> Result<Option<Enlistment>, TxError> {
        let mut state = self.lock();
        if state.blocked.contains_key(&ready.key) || self.store.version() != ready.version {
            return Ok(None);
        }

        let record = state
            .transactions
            .get_mut(&tx)
            .ok_or(TxError::UnknownTransaction(tx))?;
        if let TxStatus::MarkedRollback(reason) = &record.status {
            return Err(TxError::RolledBack {
                tx,
                reason: reason.clone(),
                retryable: true,
            });
        }

        if let Some(existing) = record.enlistments.iter().find(|e| e.key == ready.key) {
            return Ok(Some(existing.clone()));
        }

        let enlistment = Enlistment {
            key: ready.key,
            primary: ready.primary,
            backups: ready.backups,
            version: ready.version,
        };
        record.enlistments.push(enlistment.clone());
        Ok(Some(enlistment))
    }

    fn publish(&self, state: &GuardState) {
        let _ = self.readiness.send(Readiness {
            blocked: Arc::new(state.blocked.keys().cloned().collect()),
            halted: state.halted,
        });
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state
            .lock()
            .expect("TransactionContinuityGuard mutex guard poison")
    }
}

fn ready_at(snapshot: &PartitionSnapshot, key: &PartitionKey) -> Result<PartitionReady, GuardError> {
    let owners = snapshot
        .owners(key)
        .ok_or_else(|| GuardError::NotAssigned(key.clone()))?;
    let (primary, backups) = owners
        .split_first()
        .ok_or_else(|| GuardError::PartitionLost(key.clone()))?;

    Ok(PartitionReady {
        key: key.clone(),
        primary: primary.clone(),
        backups: backups.to_vec(),
        version: snapshot.version(),
    })
}
