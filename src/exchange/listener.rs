use crate::exchange::future::ExchangeSummary;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Debug, Default)]
pub(crate) struct ExchangeStateSnapshot {
    pub last: Option<Arc<ExchangeSummary>>,
    pub halted: Option<String>,
}

pub(crate) fn new() -> (ExchangeStateNotifier, ExchangeStateListener) {
    let (snd, rcv) = watch::channel(ExchangeStateSnapshot::default());

    (ExchangeStateNotifier { snd }, ExchangeStateListener { rcv })
}

pub(crate) struct ExchangeStateNotifier {
    snd: watch::Sender<ExchangeStateSnapshot>,
}

impl ExchangeStateNotifier {
    pub(crate) fn notify_completed(&self, summary: Arc<ExchangeSummary>) {
        let halted = self.snd.borrow().halted.clone();
        let _ = self.snd.send(ExchangeStateSnapshot {
            last: Some(summary),
            halted,
        });
    }

    pub(crate) fn notify_halted(&self, reason: String) {
        let last = self.snd.borrow().last.clone();
        let _ = self.snd.send(ExchangeStateSnapshot {
            last,
            halted: Some(reason),
        });
    }
}

#[derive(Clone)]
pub(crate) struct ExchangeStateListener {
    rcv: watch::Receiver<ExchangeStateSnapshot>,
}

impl ExchangeStateListener {
    pub(crate) fn current(&self) -> ExchangeStateSnapshot {
        self.rcv.borrow().clone()
    }

    pub(crate) async fn next(&mut self) -> Option<ExchangeStateSnapshot> {
        match self.rcv.changed().await {
            Ok(_) => Some(self.rcv.borrow().clone()),
            Err(_) => None,
        }
    }
}
