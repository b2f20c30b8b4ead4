use crate::api::{AdminRequest, AdminResponse, NodeRequestError};
use crate::exchange::{AwaitExchangeError, ExchangeMessage, ExchangeSummary, ExchangeTimerTick, ExchangeWorker};
use crate::partition::PartitionKey;
use crate::topology::{DiscoveryEvent, TopologyVersion};
use std::error::Error;
use std::fmt::Debug;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};

// The worker handles every event synchronously and in arrival order. Anything slow (sends,
// timers, discovery calls) is spawned and reports back through this queue.
#[derive(Debug)]
pub(crate) enum Event {
    // All nodes: start an exchange, merge it into the in-flight one, or queue it.
    Discovery(DiscoveryEvent),

    // Coordinator: single messages, acks, partition updates.
    // Participant: full messages, single requests.
    Message(ExchangeMessage),

    // Coordinator: re-request singles, resend fulls, report unresponsive nodes.
    ExchangeTimeout(ExchangeTimerTick),

    // Local data movement finished for one partition.
    RebalanceCompleted(PartitionKey, Callback<TopologyVersion, NodeRequestError>),

    AwaitExchange(TopologyVersion, Callback<Arc<ExchangeSummary>, AwaitExchangeError>),

    Admin(AdminRequest, Callback<AdminResponse, NodeRequestError>),
}

#[derive(Debug)]
pub(crate) struct Callback<O: Debug, E: Error>(pub(crate) oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Error> Callback<O, E> {
    pub(crate) fn send(self, message: Result<O, E>) {
        let _ = self.0.send(message);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Exchange worker has exited")]
pub(crate) struct ActorExited;

#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: Arc<mpsc::Sender<Event>>,
}

impl ActorClient {
    pub(crate) fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer_size);

        (ActorClient { sender: Arc::new(tx) }, rx)
    }

    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: Arc::downgrade(&self.sender),
        }
    }

    pub(crate) async fn discovery_event(&self, event: DiscoveryEvent) -> Result<(), ActorExited> {
        self.send(Event::Discovery(event)).await
    }

    pub(crate) async fn deliver(&self, message: ExchangeMessage) -> Result<(), ActorExited> {
        self.send(Event::Message(message)).await
    }

    pub(crate) async fn exchange_timeout(&self, tick: ExchangeTimerTick) -> Result<(), ActorExited> {
        self.send(Event::ExchangeTimeout(tick)).await
    }

    pub(crate) async fn rebalance_completed(&self, key: PartitionKey) -> Result<TopologyVersion, NodeRequestError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::RebalanceCompleted(key, Callback(tx)))
            .await
            .map_err(|_| NodeRequestError::NodeStopped)?;

        rx.await.map_err(|_| NodeRequestError::NodeStopped)?
    }

    pub(crate) async fn await_exchange(
        &self,
        version: TopologyVersion,
    ) -> Result<Arc<ExchangeSummary>, AwaitExchangeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::AwaitExchange(version, Callback(tx)))
            .await
            .map_err(|_| AwaitExchangeError::NodeStopped)?;

        rx.await.map_err(|_| AwaitExchangeError::NodeStopped)?
    }

    pub(crate) async fn admin(&self, request: AdminRequest) -> Result<AdminResponse, NodeRequestError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Admin(request, Callback(tx)))
            .await
            .map_err(|_| NodeRequestError::NodeStopped)?;

        rx.await.map_err(|_| NodeRequestError::NodeStopped)?
    }

    async fn send(&self, event: Event) -> Result<(), ActorExited> {
        self.sender.send(event).await.map_err(|_| ActorExited)
    }
}

/// Handle for tasks the worker spawns. Does not keep the worker alive.
#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: Weak<mpsc::Sender<Event>>,
}

impl WeakActorClient {
    pub(crate) async fn discovery_event(&self, event: DiscoveryEvent) -> Result<(), ActorExited> {
        self.upgrade()?.discovery_event(event).await
    }

    pub(crate) async fn deliver(&self, message: ExchangeMessage) -> Result<(), ActorExited> {
        self.upgrade()?.deliver(message).await
    }

    pub(crate) async fn exchange_timeout(&self, tick: ExchangeTimerTick) -> Result<(), ActorExited> {
        self.upgrade()?.exchange_timeout(tick).await
    }

    fn upgrade(&self) -> Result<ActorClient, ActorExited> {
        self.sender
            .upgrade()
            .map(|sender| ActorClient { sender })
            .ok_or(ActorExited)
    }
}

/// ExchangeActor runs the exchange worker as an actor.
pub(crate) struct ExchangeActor {
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    worker: ExchangeWorker,
}

impl ExchangeActor {
    pub(crate) fn new(logger: slog::Logger, receiver: mpsc::Receiver<Event>, worker: ExchangeWorker) -> Self {
        ExchangeActor {
            logger,
            receiver,
            worker,
        }
    }

    pub(crate) async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            self.handle_event(event);
        }
        slog::info!(self.logger, "Exchange worker event loop exited");
    }

    // This must NOT be async. Sends and timers are spawned and call back into this actor.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Discovery(event) => {
                self.worker.on_discovery_event(event);
            }
            Event::Message(message) => {
                self.worker.on_message(message);
            }
            Event::ExchangeTimeout(tick) => {
                self.worker.on_exchange_timeout(tick);
            }
            Event::RebalanceCompleted(key, callback) => {
                let result = self.worker.complete_rebalance(key);
                callback.send(result);
            }
            Event::AwaitExchange(version, callback) => {
                self.worker.await_exchange(version, callback);
            }
            Event::Admin(request, callback) => {
                let result = self.worker.admin(request);
                callback.send(result);
            }
        }
    }
}
