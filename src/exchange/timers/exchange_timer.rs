use crate::actor::WeakActorClient;
use crate::exchange::messages::ExchangeId;
use crate::exchange::timers::stop_signal;
use crate::exchange::timers::time::{Clock, RealClock};
use rand::Rng;
use tokio::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum TimeoutKind {
    /// Coordinator is still missing single messages.
    SingleMessages,
    /// Coordinator is still missing full message acknowledgements.
    FullAcks,
    /// Slow nodes from a finished exchange still have not acknowledged the resent full message.
    FullResend,
}

/// Delivered to the worker when a timer fires. Stale ticks are recognized by `attempt`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct ExchangeTimerTick {
    pub exchange_id: ExchangeId,
    pub kind: TimeoutKind,
    pub attempt: u32,
}

/// One-shot timer. Dropping the handle cancels it.
pub(crate) struct ExchangeTimerHandle {
    tick: ExchangeTimerTick,
    _to_drop: stop_signal::CancelOnDrop,
}

struct ExchangeTimerTask<C: Clock> {
    deadline: Instant,
    tick: ExchangeTimerTick,
    actor_client: WeakActorClient,
    clock: C,
    cancel_check: stop_signal::CancelCheck,
}

impl ExchangeTimerHandle {
    pub(crate) fn spawn_timer_task(
        timeout: Duration,
        max_jitter: Duration,
        tick: ExchangeTimerTick,
        actor_client: WeakActorClient,
    ) -> Self {
        let delay = timeout + random_jitter(max_jitter);
        let (task, handle) = ExchangeTimerTask::new(delay, tick, actor_client, RealClock);
        tokio::task::spawn(task.run());

        handle
    }

    pub(crate) fn tick(&self) -> ExchangeTimerTick {
        self.tick
    }
}

fn random_jitter(max_jitter: Duration) -> Duration {
    if max_jitter == Duration::from_millis(0) {
        return max_jitter;
    }
    rand::thread_rng().gen_range(Duration::from_millis(0)..=max_jitter)
}

impl<C: Clock + Send + Sync + 'static> ExchangeTimerTask<C> {
    fn new(
        delay: Duration,
        tick: ExchangeTimerTick,
        actor_client: WeakActorClient,
        clock: C,
    ) -> (Self, ExchangeTimerHandle) {
        let (cancel_on_drop, cancel_check) = stop_signal::new();

        let task = ExchangeTimerTask {
            deadline: clock.now() + delay,
            tick,
            actor_client,
            clock,
            cancel_check,
        };
        let handle = ExchangeTimerHandle {
            tick,
            _to_drop: cancel_on_drop,
        };

        (task, handle)
    }

    async fn run(mut self) {
        self.clock.sleep_until(self.deadline).await;

        // Exchange moved on (or the worker re-armed) while we slept.
        if self.cancel_check.is_cancelled() {
            return;
        }
        let _ = self.actor_client.exchange_timeout(self.tick).await;
    }
}
