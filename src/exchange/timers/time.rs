#[cfg(test)]
use tokio::sync::watch;
use tokio::time::Instant;

/// Time source for exchange timers, swappable for a hand-driven one in tests.
#[async_trait::async_trait]
pub(crate) trait Clock: Clone {
    fn now(&self) -> Instant;
    async fn sleep_until(&mut self, deadline: Instant);
}

#[derive(Copy, Clone)]
pub(crate) struct RealClock;

#[async_trait::async_trait]
impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

/// A clock that only moves when its `ManualTime` is advanced.
#[cfg(test)]
pub(crate) fn manual_clock() -> (ManualClock, ManualTime) {
    let (tx, rx) = watch::channel(Instant::now());
    (ManualClock { now: rx }, ManualTime { now: tx })
}

#[cfg(test)]
#[derive(Clone)]
pub(crate) struct ManualClock {
    now: watch::Receiver<Instant>,
}

#[cfg(test)]
#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.borrow()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        while *self.now.borrow() < deadline {
            if self.now.changed().await.is_err() {
                // Nobody can advance time anymore.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
pub(crate) struct ManualTime {
    now: watch::Sender<Instant>,
}

#[cfg(test)]
impl ManualTime {
    pub(crate) fn advance(&mut self, by: tokio::time::Duration) {
        let next = *self.now.borrow() + by;
        let _ = self.now.send(next);
    }
}
