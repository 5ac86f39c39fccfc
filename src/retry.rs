//! Rate-limit recovery: a cancellable countdown that resends the last user
//! message exactly once when it expires.
//!
//! The countdown state is a pure machine ([`RetryState`]) guarded by one
//! mutex. The ticker and `cancel` both take that lock, and the ticker only
//! acts for its own generation, so a tick can never fire after a cancel and
//! a resend can never happen twice.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::model::ChatMessage;
use crate::notify::{Notification, Notifier};

const RATE_LIMIT_PHRASES: [&str; 3] = ["rate limit", "rate_limit", "too many requests"];

const TOO_MANY_REQUESTS: u16 = 429;

/// Waits implied by the quota period named in an error message. The hour
/// and day values carry a one-minute margin past the window boundary.
const PERIOD_WAITS: [(&str, u64); 3] = [("per minute", 60), ("per hour", 3_660), ("per day", 86_700)];

const TICK: Duration = Duration::from_secs(1);

// ============================================================================
// FUNCTIONAL CORE
// ============================================================================

/// A transport failure recognised as upstream rate limiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    pub retry_after_secs: Option<u64>,
    pub message: String,
}

impl RateLimit {
    /// Seconds to wait: the explicit hint, else a period named in the
    /// message, else `default_secs`.
    pub fn wait_secs(&self, default_secs: u64) -> u64 {
        if let Some(secs) = self.retry_after_secs {
            return secs;
        }
        let message = self.message.to_lowercase();
        PERIOD_WAITS
            .iter()
            .find(|(phrase, _)| message.contains(phrase))
            .map_or(default_secs, |(_, secs)| *secs)
    }
}

/// Recognise a rate-limit failure, looking at the error itself and one
/// level inside a retries-exhausted wrapper.
pub fn classify_rate_limit(error: &TransportError) -> Option<RateLimit> {
    direct_rate_limit(error).or_else(|| match error {
        TransportError::RetriesExhausted { last_error, .. } => direct_rate_limit(last_error),
        _ => None,
    })
}

fn direct_rate_limit(error: &TransportError) -> Option<RateLimit> {
    match error {
        TransportError::Http {
            status,
            message,
            retry_after_secs,
        } if *status == TOO_MANY_REQUESTS || mentions_rate_limit(message) => Some(RateLimit {
            retry_after_secs: *retry_after_secs,
            message: message.clone(),
        }),
        TransportError::Other(message) if mentions_rate_limit(message) => Some(RateLimit {
            retry_after_secs: None,
            message: message.clone(),
        }),
        _ => None,
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let message = message.to_lowercase();
    RATE_LIMIT_PHRASES.iter().any(|phrase| message.contains(phrase))
}

/// Countdown state: `Idle`, or waiting to resend `pending`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RetryState {
    #[default]
    Idle,
    Waiting {
        countdown: u64,
        pending: ChatMessage,
        generation: u64,
    },
}

/// Outcome of one countdown tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Still waiting; seconds remaining
    Continue(u64),
    /// Countdown expired; resend this message. State is now `Idle`.
    Fire(ChatMessage),
    /// The tick belongs to a cancelled or superseded countdown
    Stale,
}

impl RetryState {
    pub fn start(&mut self, countdown: u64, pending: ChatMessage, generation: u64) {
        *self = RetryState::Waiting {
            countdown,
            pending,
            generation,
        };
    }

    pub fn tick(&mut self, generation: u64) -> Tick {
        match self {
            RetryState::Waiting {
                countdown,
                generation: active,
                ..
            } if *active == generation => {
                if *countdown > 1 {
                    *countdown -= 1;
                    return Tick::Continue(*countdown);
                }
            }
            _ => return Tick::Stale,
        }

        match std::mem::take(self) {
            RetryState::Waiting { pending, .. } => Tick::Fire(pending),
            RetryState::Idle => Tick::Stale,
        }
    }

    /// Abandon any pending resend. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        matches!(std::mem::take(self), RetryState::Waiting { .. })
    }

    pub fn countdown(&self) -> Option<u64> {
        match self {
            RetryState::Waiting { countdown, .. } => Some(*countdown),
            RetryState::Idle => None,
        }
    }
}

// ============================================================================
// IMPERATIVE SHELL
// ============================================================================

/// What the controller did with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Rate limited; the message will be resent after `countdown` seconds
    Waiting { countdown: u64 },
    /// Not a rate limit; surface the error normally
    PassThrough,
}

/// Transport send primitive used for the resend.
pub type ResendFn = Arc<dyn Fn(ChatMessage) + Send + Sync>;

#[derive(Default)]
struct Shared {
    state: RetryState,
    generation: u64,
    ticker: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct RetryController {
    shared: Arc<Mutex<Shared>>,
    resend: ResendFn,
    notifier: Notifier,
    default_wait_secs: u64,
}

impl std::fmt::Debug for RetryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryController")
            .field("countdown", &self.countdown())
            .field("default_wait_secs", &self.default_wait_secs)
            .finish()
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RetryController {
    pub fn new(resend: ResendFn, notifier: Notifier, default_wait: Duration) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            resend,
            notifier,
            default_wait_secs: default_wait.as_secs(),
        }
    }

    /// Seconds left before the resend, if waiting.
    pub fn countdown(&self) -> Option<u64> {
        lock(&self.shared).state.countdown()
    }

    pub fn is_waiting(&self) -> bool {
        self.countdown().is_some()
    }

    /// React to a transport failure of the request carrying
    /// `last_user_message`.
    ///
    /// A rate limit (re)starts the countdown; the ticker runs on the current
    /// tokio runtime. Anything else passes through untouched.
    pub fn handle_failure(&self, error: &TransportError, last_user_message: ChatMessage) -> RetryDecision {
        let Some(rate_limit) = classify_rate_limit(error) else {
            return RetryDecision::PassThrough;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime for the retry countdown; not retrying");
            return RetryDecision::PassThrough;
        };

        let countdown = rate_limit.wait_secs(self.default_wait_secs);

        let mut shared = lock(&self.shared);
        shared.generation += 1;
        let generation = shared.generation;
        shared.state.start(countdown, last_user_message, generation);
        if let Some(previous) = shared.ticker.take() {
            previous.abort();
        }
        shared.ticker = Some(runtime.spawn(run_ticker(
            Arc::clone(&self.shared),
            Arc::clone(&self.resend),
            generation,
        )));
        drop(shared);

        warn!(countdown, error = %error, "rate limited; scheduling resend");
        self.notifier.emit(Notification::RateLimitExceeded {
            countdown,
            message: rate_limit.message,
        });
        RetryDecision::Waiting { countdown }
    }

    /// Abandon the pending resend. Safe to call at any time.
    pub fn cancel(&self) -> bool {
        let mut shared = lock(&self.shared);
        let was_waiting = shared.state.cancel();
        if let Some(ticker) = shared.ticker.take() {
            ticker.abort();
        }
        if was_waiting {
            info!("retry countdown cancelled");
        }
        was_waiting
    }
}

async fn run_ticker(shared: Arc<Mutex<Shared>>, resend: ResendFn, generation: u64) {
    let mut interval = interval_at(Instant::now() + TICK, TICK);
    loop {
        interval.tick().await;
        // The lock is released before resending.
        let tick = lock(&shared).state.tick(generation);
        match tick {
            Tick::Continue(remaining) => debug!(remaining, "retry countdown"),
            Tick::Fire(message) => {
                info!(message_id = %message.id, "countdown expired; resending");
                resend(message);
                return;
            }
            Tick::Stale => return,
        }
    }
}
