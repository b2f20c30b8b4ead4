use crate::exchange::{
    ExchangeId, ExchangeMessage, FullAck, FullMessage, GroupFullState, PartitionsUpdate, SingleMessage, SingleRequest,
};
use crate::grpc::proto_envelope::Payload;
use crate::grpc::{
    ProtoEnvelope, ProtoFullAck, ProtoFullMessage, ProtoGroupFull, ProtoLocalGroup, ProtoLocalPartition, ProtoOwners,
    ProtoPartitionKey, ProtoPartitionReplicas, ProtoPartitionState, ProtoPartitionsUpdate, ProtoReplica,
    ProtoSingleMessage, ProtoSingleRequest, ProtoVersion,
};
use crate::partition::{
    CacheGroupId, GroupPartitionMap, LocalPartition, LocalPartitionStates, PartitionKey, PartitionState,
};
use crate::topology::{NodeId, TopologyVersion};
use std::collections::BTreeMap;
use std::sync::Arc;
use tonic::Status;

pub(super) fn to_envelope(message: &ExchangeMessage) -> ProtoEnvelope {
    let payload = match message {
        ExchangeMessage::Single(single) => Payload::Single(ProtoSingleMessage {
            sender: single.sender.as_str().to_string(),
            exchange_id: Some(version_to_proto(single.exchange_id.version())),
            groups: local_states_to_proto(&single.partitions),
            errors: single.errors.clone(),
        }),
        ExchangeMessage::Full(full) => Payload::Full(full_to_proto(full)),
        ExchangeMessage::FullAck(ack) => Payload::FullAck(ProtoFullAck {
            sender: ack.sender.as_str().to_string(),
            exchange_id: Some(version_to_proto(ack.exchange_id.version())),
        }),
        ExchangeMessage::SingleRequest(request) => Payload::SingleRequest(ProtoSingleRequest {
            sender: request.sender.as_str().to_string(),
            exchange_id: Some(version_to_proto(request.exchange_id.version())),
        }),
        ExchangeMessage::PartitionsUpdate(update) => Payload::PartitionsUpdate(ProtoPartitionsUpdate {
            sender: update.sender.as_str().to_string(),
            version: Some(version_to_proto(update.version)),
            groups: local_states_to_proto(&update.partitions),
        }),
    };

    ProtoEnvelope { payload: Some(payload) }
}

pub(super) fn from_envelope(envelope: ProtoEnvelope) -> Result<ExchangeMessage, Status> {
    let payload = envelope
        .payload
        .ok_or_else(|| Status::invalid_argument("Envelope without payload"))?;

    let message = match payload {
        Payload::Single(single) => ExchangeMessage::Single(SingleMessage {
            sender: node_from_proto(single.sender)?,
            exchange_id: ExchangeId::new(version_from_proto(single.exchange_id)?),
            partitions: local_states_from_proto(single.groups)?,
            errors: single.errors,
        }),
        Payload::Full(full) => ExchangeMessage::Full(Arc::new(full_from_proto(full)?)),
        Payload::FullAck(ack) => ExchangeMessage::FullAck(FullAck {
            sender: node_from_proto(ack.sender)?,
            exchange_id: ExchangeId::new(version_from_proto(ack.exchange_id)?),
        }),
        Payload::SingleRequest(request) => ExchangeMessage::SingleRequest(SingleRequest {
            sender: node_from_proto(request.sender)?,
            exchange_id: ExchangeId::new(version_from_proto(request.exchange_id)?),
        }),
        Payload::PartitionsUpdate(update) => ExchangeMessage::PartitionsUpdate(PartitionsUpdate {
            sender: node_from_proto(update.sender)?,
            version: version_from_proto(update.version)?,
            partitions: local_states_from_proto(update.groups)?,
        }),
    };

    Ok(message)
}

fn full_to_proto(full: &FullMessage) -> ProtoFullMessage {
    let groups = full
        .groups
        .iter()
        .map(|(group, state)| ProtoGroupFull {
            group: group.as_str().to_string(),
            partitions: state
                .partitions
                .iter()
                .map(|(_, replicas)| ProtoPartitionReplicas {
                    replicas: replicas
                        .iter()
                        .map(|(node, state)| ProtoReplica {
                            node_id: node.as_str().to_string(),
                            state: state_to_proto(*state) as i32,
                        })
                        .collect(),
                })
                .collect(),
            owners: state
                .owners
                .iter()
                .map(|owners| ProtoOwners {
                    node_ids: owners.iter().map(|node| node.as_str().to_string()).collect(),
                })
                .collect(),
            ideal_digest: state.ideal_digest,
        })
        .collect();

    ProtoFullMessage {
        sender: full.sender.as_str().to_string(),
        exchange_id: Some(version_to_proto(full.exchange_id.version())),
        result_version: Some(version_to_proto(full.result_version)),
        groups,
        rebalanced: full.rebalanced,
        lost: full
            .lost
            .iter()
            .map(|key| ProtoPartitionKey {
                group: key.group.as_str().to_string(),
                partition: key.partition,
            })
            .collect(),
    }
}

fn full_from_proto(full: ProtoFullMessage) -> Result<FullMessage, Status> {
    let mut groups = BTreeMap::new();
    for group in full.groups {
        let mut partitions = Vec::with_capacity(group.partitions.len());
        for proto_replicas in group.partitions {
            let mut replicas = BTreeMap::new();
            for replica in proto_replicas.replicas {
                replicas.insert(node_from_proto(replica.node_id)?, state_from_proto(replica.state)?);
            }
            partitions.push(replicas);
        }

        let owners = group
            .owners
            .into_iter()
            .map(|owners| owners.node_ids.into_iter().map(node_from_proto).collect())
            .collect::<Result<Vec<Vec<NodeId>>, Status>>()?;

        groups.insert(
            CacheGroupId::new(group.group),
            GroupFullState {
                partitions: GroupPartitionMap::from_replicas(partitions),
                owners,
                ideal_digest: group.ideal_digest,
            },
        );
    }

    Ok(FullMessage {
        sender: node_from_proto(full.sender)?,
        exchange_id: ExchangeId::new(version_from_proto(full.exchange_id)?),
        result_version: version_from_proto(full.result_version)?,
        groups,
        rebalanced: full.rebalanced,
        lost: full
            .lost
            .into_iter()
            .map(|key| PartitionKey::new(CacheGroupId::new(key.group), key.partition))
            .collect(),
    })
}

fn local_states_to_proto(states: &LocalPartitionStates) -> Vec<ProtoLocalGroup> {
    states
        .groups
        .iter()
        .map(|(group, partitions)| ProtoLocalGroup {
            group: group.as_str().to_string(),
            partitions: partitions
                .iter()
                .map(|local| ProtoLocalPartition {
                    partition: local.partition,
                    state: state_to_proto(local.state) as i32,
                    primary: local.primary,
                })
                .collect(),
        })
        .collect()
}

fn local_states_from_proto(groups: Vec<ProtoLocalGroup>) -> Result<LocalPartitionStates, Status> {
    let mut states = LocalPartitionStates::default();
    for group in groups {
        let mut partitions = Vec::with_capacity(group.partitions.len());
        for local in group.partitions {
            partitions.push(LocalPartition {
                partition: local.partition,
                state: state_from_proto(local.state)?,
                primary: local.primary,
            });
        }
        states.groups.insert(CacheGroupId::new(group.group), partitions);
    }
    Ok(states)
}

fn version_to_proto(version: TopologyVersion) -> ProtoVersion {
    ProtoVersion {
        major: version.major(),
        minor: version.minor(),
    }
}

fn version_from_proto(version: Option<ProtoVersion>) -> Result<TopologyVersion, Status> {
    version
        .map(|v| TopologyVersion::new(v.major, v.minor))
        .ok_or_else(|| Status::invalid_argument("Missing topology version"))
}

fn node_from_proto(id: String) -> Result<NodeId, Status> {
    if id.is_empty() {
        return Err(Status::invalid_argument("Empty node id"));
    }
    Ok(NodeId::new(id))
}

fn state_to_proto(state: PartitionState) -> ProtoPartitionState {
    match state {
        PartitionState::Owning => ProtoPartitionState::Owning,
        PartitionState::Moving => ProtoPartitionState::Moving,
        PartitionState::Renting => ProtoPartitionState::Renting,
        PartitionState::Evicted => ProtoPartitionState::Evicted,
    }
}

fn state_from_proto(state: i32) -> Result<PartitionState, Status> {
    match ProtoPartitionState::from_i32(state) {
        Some(ProtoPartitionState::Owning) => Ok(PartitionState::Owning),
        Some(ProtoPartitionState::Moving) => Ok(PartitionState::Moving),
        Some(ProtoPartitionState::Renting) => Ok(PartitionState::Renting),
        Some(ProtoPartitionState::Evicted) => Ok(PartitionState::Evicted),
        Some(ProtoPartitionState::Unknown) | None => {
            Err(Status::invalid_argument(format!("Unknown partition state {}", state)))
        }
    }
}
