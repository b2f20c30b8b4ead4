use crate::affinity::{AffinityContext, AffinityFunction};
use crate::topology::ConsistentId;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x1000_0000_01b3;

pub(crate) fn stable_hash(bytes: &[u8]) -> u64 {
    fnv1a(FNV_OFFSET, bytes)
}

fn fnv1a(seed: u64, bytes: &[u8]) -> u64 {
    bytes.iter().fold(seed, |hash, byte| {
        let hash = hash ^ u64::from(*byte);
        hash.wrapping_mul(FNV_PRIME)
    })
}

fn rendezvous_score(partition_hash: u64, candidate: &ConsistentId) -> u64 {
    let mut hash = partition_hash ^ 0x9e37_79b9_7f4a_7c15;
    for byte in candidate.as_str().as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0xff51_afd7_ed55_8ccd);
    }
    // Final avalanche so candidates sharing a prefix do not cluster.
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    hash ^ (hash >> 33)
}

/// Highest-random-weight affinity. Removing a candidate never reorders the others, so the
/// backups of a departed owner are exactly the next entries of its list.
#[derive(Clone, Debug)]
pub struct RendezvousAffinity {
    partitions: u32,
}

impl RendezvousAffinity {
    pub const DEFAULT_PARTITIONS: u32 = 1024;

    pub fn new(partitions: u32) -> Self {
        RendezvousAffinity {
            partitions: partitions.max(1),
        }
    }
}

impl Default for RendezvousAffinity {
    fn default() -> Self {
        RendezvousAffinity::new(Self::DEFAULT_PARTITIONS)
    }
}

impl AffinityFunction for RendezvousAffinity {
    fn partitions(&self) -> u32 {
        self.partitions
    }

    fn partition(&self, key: &[u8]) -> u32 {
        (stable_hash(key) % u64::from(self.partitions)) as u32
    }

    fn assign_partitions(&self, context: &AffinityContext<'_>) -> Vec<Vec<ConsistentId>> {
        let group_hash = stable_hash(context.group.as_str().as_bytes());
        let copies = context.backups + 1;

        (0..self.partitions)
            .map(|partition| {
                let partition_hash = fnv1a(group_hash, &partition.to_be_bytes());
                let mut scored: Vec<(u64, &ConsistentId)> = context
                    .candidates
                    .iter()
                    .map(|candidate| (rendezvous_score(partition_hash, candidate), candidate))
                    .collect();
                scored.sort_by(|(score_a, id_a), (score_b, id_b)| score_b.cmp(score_a).then_with(|| id_a.cmp(id_b)));
                scored
                    .into_iter()
                    .take(copies)
                    .map(|(_, candidate)| candidate.clone())
                    .collect()
            })
            .collect()
    }
}
