use std::convert::TryFrom;
use tokio::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct ExchangeOptions {
    /// How long the coordinator waits for single messages before re-requesting them.
    pub single_message_timeout: Option<Duration>,
    pub full_ack_timeout: Option<Duration>,
    /// Re-requests (and full message resends) before a silent node is reported as failed.
    pub max_message_retries: Option<u32>,
    pub retry_jitter: Option<Duration>,
    pub history_size: Option<usize>,
    pub actor_queue_size: Option<usize>,
}

pub(super) struct ExchangeOptionsValidated {
    pub single_message_timeout: Duration,
    pub full_ack_timeout: Duration,
    pub max_message_retries: u32,
    pub retry_jitter: Duration,
    pub history_size: usize,
    pub actor_queue_size: usize,
}

impl ExchangeOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        let zero = Duration::from_millis(0);
        if self.single_message_timeout == zero {
            return Err("Single message timeout must be greater than zero");
        }
        if self.full_ack_timeout == zero {
            return Err("Full message acknowledgement timeout must be greater than zero");
        }
        if self.history_size == 0 {
            return Err("Exchange history must keep at least one exchange");
        }
        if self.actor_queue_size == 0 {
            return Err("Actor queue size must be greater than zero");
        }

        Ok(())
    }
}

impl TryFrom<ExchangeOptions> for ExchangeOptionsValidated {
    type Error = &'static str;

    fn try_from(options: ExchangeOptions) -> Result<Self, Self::Error> {
        let values = ExchangeOptionsValidated {
            single_message_timeout: options.single_message_timeout.unwrap_or(Duration::from_secs(10)),
            full_ack_timeout: options.full_ack_timeout.unwrap_or(Duration::from_secs(10)),
            max_message_retries: options.max_message_retries.unwrap_or(3),
            retry_jitter: options.retry_jitter.unwrap_or(Duration::from_millis(50)),
            history_size: options.history_size.unwrap_or(32),
            actor_queue_size: options.actor_queue_size.unwrap_or(64),
        };

        values.validate()?;
        Ok(values)
    }
}
