use crate::affinity::{AffinityAssignment, AssignmentSet};
use crate::partition::{LocalPartition, LocalPartitionStates, PartitionFullMap, PartitionKey, PartitionState};
use crate::topology::{NodeId, TopologyVersion};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Immutable view of the local partition table at one topology version.
#[derive(Clone, Debug)]
pub struct PartitionSnapshot {
    version: TopologyVersion,
    revision: u64,
    assignments: AssignmentSet,
    ideal: AssignmentSet,
    partitions: PartitionFullMap,
    rebalanced: bool,
}

impl PartitionSnapshot {
    pub(crate) fn empty() -> Self {
        PartitionSnapshot {
            version: TopologyVersion::ZERO,
            revision: 0,
            assignments: AssignmentSet::new(),
            ideal: AssignmentSet::new(),
            partitions: PartitionFullMap::new(),
            rebalanced: true,
        }
    }

    pub(crate) fn new(
        version: TopologyVersion,
        assignments: AssignmentSet,
        ideal: AssignmentSet,
        partitions: PartitionFullMap,
        rebalanced: bool,
    ) -> Self {
        PartitionSnapshot {
            version,
            revision: 0,
            assignments,
            ideal,
            partitions,
            rebalanced,
        }
    }

    pub fn version(&self) -> TopologyVersion {
        self.version
    }

    /// Bumped on every commit, including commits that keep the version.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn assignments(&self) -> &AssignmentSet {
        &self.assignments
    }

    pub fn ideal_assignments(&self) -> &AssignmentSet {
        &self.ideal
    }

    pub fn partitions(&self) -> &PartitionFullMap {
        &self.partitions
    }

    pub fn is_rebalanced(&self) -> bool {
        self.rebalanced
    }

    pub fn assignment(&self, key: &PartitionKey) -> Option<&Arc<AffinityAssignment>> {
        self.assignments.get(&key.group)
    }

    pub fn owners(&self, key: &PartitionKey) -> Option<&[NodeId]> {
        self.assignment(key).and_then(|assignment| assignment.owners(key.partition))
    }

    pub fn primary(&self, key: &PartitionKey) -> Option<&NodeId> {
        self.owners(key).and_then(|owners| owners.first())
    }

    pub fn state(&self, key: &PartitionKey, node: &NodeId) -> Option<PartitionState> {
        self.partitions
            .get(&key.group)
            .and_then(|map| map.state(key.partition, node))
    }

    /// What `node` holds, in the shape of a single message payload. Evicted replicas are omitted.
    pub fn local_states(&self, node: &NodeId) -> LocalPartitionStates {
        let mut groups = BTreeMap::new();
        for (group, map) in self.partitions.iter() {
            let assignment = self.assignments.get(group);
            let local = map
                .local_partitions(node)
                .into_iter()
                .filter(|(_, state)| *state != PartitionState::Evicted)
                .map(|(partition, state)| LocalPartition {
                    partition,
                    state,
                    primary: state.has_data()
                        && assignment
                            .and_then(|a| a.primary(partition))
                            .map(|primary| primary == node)
                            .unwrap_or(false),
                })
                .collect();
            groups.insert(group.clone(), local);
        }

        LocalPartitionStates { groups }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Version {attempted} is older than the applied version {applied}")]
    VersionRegression {
        applied: TopologyVersion,
        attempted: TopologyVersion,
    },
}

struct AssignmentHistory {
    entries: BTreeMap<TopologyVersion, AssignmentSet>,
    capacity: usize,
}

impl AssignmentHistory {
    fn record(&mut self, version: TopologyVersion, assignments: AssignmentSet) {
        self.entries.insert(version, assignments);
        while self.entries.len() > self.capacity {
            let oldest = match self.entries.keys().next() {
                Some(version) => *version,
                None => break,
            };
            self.entries.remove(&oldest);
        }
    }

    fn at(&self, version: TopologyVersion) -> Option<AssignmentSet> {
        self.entries
            .range(..=version)
            .next_back()
            .map(|(_, assignments)| assignments.clone())
    }
}

pub(crate) fn new(history_size: usize) -> (PartitionStateWriter, PartitionStateReader) {
    let initial = Arc::new(PartitionSnapshot::empty());
    let (sender, receiver) = watch::channel(initial.clone());
    let history = Arc::new(Mutex::new(AssignmentHistory {
        entries: BTreeMap::new(),
        capacity: history_size,
    }));

    let writer = PartitionStateWriter {
        sender,
        current: initial,
        history: history.clone(),
        _keep_open: receiver.clone(),
    };
    let reader = PartitionStateReader { receiver, history };

    (writer, reader)
}

/// The only handle allowed to change the partition table. Owned by the exchange worker.
pub(crate) struct PartitionStateWriter {
    sender: watch::Sender<Arc<PartitionSnapshot>>,
    current: Arc<PartitionSnapshot>,
    history: Arc<Mutex<AssignmentHistory>>,
    _keep_open: watch::Receiver<Arc<PartitionSnapshot>>,
}

impl PartitionStateWriter {
    pub(crate) fn current(&self) -> &Arc<PartitionSnapshot> {
        &self.current
    }

    /// Publishes `snapshot` atomically. A snapshot older than the applied one is rejected.
    pub(crate) fn commit(&mut self, mut snapshot: PartitionSnapshot) -> Result<Arc<PartitionSnapshot>, StoreError> {
        if snapshot.version < self.current.version {
            return Err(StoreError::VersionRegression {
                applied: self.current.version,
                attempted: snapshot.version,
            });
        }

        snapshot.revision = self.current.revision + 1;
        let snapshot = Arc::new(snapshot);

        if snapshot.version > self.current.version || self.current.assignments != snapshot.assignments {
            self.history
                .lock()
                .expect("PartitionStateWriter.commit() mutex guard poison")
                .record(snapshot.version, snapshot.assignments.clone());
        }

        self.current = snapshot.clone();
        let _ = self.sender.send(snapshot.clone());

        Ok(snapshot)
    }
}

/// Cheap, cloneable read handle for cache operation threads.
#[derive(Clone)]
pub struct PartitionStateReader {
    receiver: watch::Receiver<Arc<PartitionSnapshot>>,
    history: Arc<Mutex<AssignmentHistory>>,
}

impl PartitionStateReader {
    pub fn snapshot(&self) -> Arc<PartitionSnapshot> {
        self.receiver.borrow().clone()
    }

    pub fn version(&self) -> TopologyVersion {
        self.receiver.borrow().version
    }

    /// Runs `read` against a snapshot and retries if the table moved underneath it.
    pub fn read_validated<T, F>(&self, read: F) -> (Arc<PartitionSnapshot>, T)
    where
        F: Fn(&PartitionSnapshot) -> T,
    {
        loop {
            let snapshot = self.snapshot();
            let output = read(&snapshot);
            if self.is_current(&snapshot) {
                return (snapshot, output);
            }
        }
    }

    pub fn is_current(&self, snapshot: &PartitionSnapshot) -> bool {
        let current = self.receiver.borrow();
        current.version == snapshot.version && current.revision == snapshot.revision
    }

    /// Assignment in effect at `version`, if it is still within the retained history.
    pub fn assignment_at(&self, version: TopologyVersion) -> Option<AssignmentSet> {
        if version > self.version() {
            return None;
        }

        self.history
            .lock()
            .expect("PartitionStateReader.assignment_at() mutex guard poison")
            .at(version)
    }
}
