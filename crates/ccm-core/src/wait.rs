//! Bounded, cancellable status polling

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embedded_hal_async::delay::DelayNs;
use log::{debug, info};

use crate::client::AtClient;
use crate::config::WaitPolicy;
use crate::error::CcmError;

/// Signal that aborts any wait observing it
pub type CancelSignal = Signal<CriticalSectionRawMutex, ()>;

static NEVER: CancelSignal = Signal::new();

/// Borrowed handle on a [`CancelSignal`].
#[derive(Clone, Copy)]
pub struct CancelToken<'a> {
    signal: &'a CancelSignal,
}

impl<'a> CancelToken<'a> {
    pub const fn new(signal: &'a CancelSignal) -> Self {
        Self { signal }
    }

    /// Request cancellation. Sticky until the signal is reset.
    pub fn cancel(&self) {
        self.signal.signal(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.signaled()
    }
}

impl CancelToken<'static> {
    /// A token nobody can cancel
    pub fn never() -> Self {
        Self::new(&NEVER)
    }
}

/// Module state a wait can block on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    WifiConnected,
    CloudConnected,
}

impl Condition {
    pub const fn label(self) -> &'static str {
        match self {
            Self::WifiConnected => "Wi-Fi connection",
            Self::CloudConnected => "cloud connection",
        }
    }

    async fn holds<C: AtClient>(self, client: &mut C) -> Result<bool, CcmError> {
        match self {
            Self::WifiConnected => client.is_wifi_connected().await,
            Self::CloudConnected => client.is_aws_connected().await,
        }
    }
}

/// Poll `condition` until it holds.
///
/// The budget counts sleep time between polls only. Returns the number
/// of polls it took. Fails with [`CcmError::WaitTimedOut`] once
/// `policy.timeout_ms` has been slept away, or [`CcmError::Cancelled`]
/// as soon as `cancel` fires.
pub async fn wait_until<C, D>(
    client: &mut C,
    delay: &mut D,
    condition: Condition,
    policy: &WaitPolicy,
    cancel: &CancelToken<'_>,
) -> Result<u32, CcmError>
where
    C: AtClient,
    D: DelayNs,
{
    let interval = policy.poll_interval_ms.max(1);
    let mut waited_ms: u32 = 0;
    let mut polls: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            info!("Wait for {} cancelled", condition.label());
            return Err(CcmError::Cancelled);
        }

        polls = polls.saturating_add(1);
        if condition.holds(client).await? {
            debug!("{} up after {} poll(s)", condition.label(), polls);
            return Ok(polls);
        }

        let step = if policy.is_unbounded() {
            interval
        } else {
            let left = policy.timeout_ms.saturating_sub(waited_ms);
            if left == 0 {
                return Err(CcmError::WaitTimedOut {
                    condition: condition.label(),
                });
            }
            interval.min(left)
        };

        delay.delay_ms(step).await;
        waited_ms = waited_ms.saturating_add(step);
    }
}
