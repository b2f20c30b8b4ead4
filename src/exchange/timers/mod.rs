mod exchange_timer;
mod stop_signal;
mod time;

#[cfg(test)]
mod test_utils;

pub(crate) use exchange_timer::ExchangeTimerHandle;
pub(crate) use exchange_timer::ExchangeTimerTick;
pub(crate) use exchange_timer::TimeoutKind;
