//! Throttled, rate-limit-aware page analysis.
//!
//! Every call to the vision model is preceded by a pause of the page's
//! current delay. The delay starts at [`RetryPolicy::initial_delay`] for
//! each page and grows additively on every rate-limit signal:
//!
//! ```text
//! pause 5s → call → 429 → pause 10s → call → 429 → pause 15s → call → ok
//! ```
//!
//! The arithmetic lives in [`RetryState::transition`], a pure function, so
//! the backoff sequence can be tested without a clock. Only rate-limit
//! signals are retried; schema violations, transport failures and timeouts
//! surface immediately as a [`PageError`].
//!
//! Both the pause and the model call race the caller's [`CancelFlag`]. A
//! raised flag ends the page with [`PageError::Cancelled`] before any
//! further call is issued.

use crate::config::{CancelFlag, RetryPolicy};
use crate::error::{OracleError, PageError};
use crate::model::PageAnalysis;
use crate::pipeline::oracle::LayoutOracle;
use crate::pipeline::render::PageImage;
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Something that can wait. Production uses the Tokio clock; tests record
/// the requested pauses instead of sleeping.
#[async_trait]
pub trait Throttle: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// [`Throttle`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioThrottle;

#[async_trait]
impl Throttle for TokioThrottle {
    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Classification of one oracle call for the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Accepted,
    RateLimited,
    Rejected,
}

impl AttemptOutcome {
    pub fn of<T>(result: &Result<T, OracleError>) -> Self {
        match result {
            Ok(_) => AttemptOutcome::Accepted,
            Err(OracleError::RateLimited) => AttemptOutcome::RateLimited,
            Err(_) => AttemptOutcome::Rejected,
        }
    }
}

/// What the analyzer does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// The analysis was accepted.
    Finish,
    /// Wait `delay`, then call again for the same page.
    Retry { delay: Duration },
    /// A non-retried failure; hand it to the caller.
    Propagate,
    /// The attempt ceiling was reached while still rate limited.
    GiveUp { attempts: u32 },
}

/// Per-page backoff state. Created fresh for every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub current_delay: Duration,
    /// Oracle calls made so far for this page.
    pub attempt_count: u32,
}

impl RetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            current_delay: policy.initial_delay,
            attempt_count: 0,
        }
    }

    /// Advance the state after one oracle call.
    pub fn transition(self, outcome: AttemptOutcome, policy: &RetryPolicy) -> (Self, RetryAction) {
        let attempt_count = self.attempt_count.saturating_add(1);
        match outcome {
            AttemptOutcome::Accepted => (
                Self {
                    attempt_count,
                    ..self
                },
                RetryAction::Finish,
            ),
            AttemptOutcome::Rejected => (
                Self {
                    attempt_count,
                    ..self
                },
                RetryAction::Propagate,
            ),
            AttemptOutcome::RateLimited => {
                if policy.max_attempts.is_some_and(|max| attempt_count >= max) {
                    return (
                        Self {
                            attempt_count,
                            ..self
                        },
                        RetryAction::GiveUp {
                            attempts: attempt_count,
                        },
                    );
                }
                let mut next = self.current_delay.saturating_add(policy.increment);
                if let Some(max) = policy.max_delay {
                    next = next.min(max).max(self.current_delay);
                }
                (
                    Self {
                        current_delay: next,
                        attempt_count,
                    },
                    RetryAction::Retry { delay: next },
                )
            }
        }
    }
}

/// A validated analysis plus how often the page was rate limited.
#[derive(Debug, Clone)]
pub struct AnalyzedPage {
    pub analysis: PageAnalysis,
    pub rate_limited: u32,
}

async fn until_cancelled(cancel: Option<&CancelFlag>) {
    match cancel {
        Some(flag) => flag.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Analyze one page, pausing before every call and retrying on rate limits.
pub async fn analyze_with_retry(
    oracle: &dyn LayoutOracle,
    throttle: &dyn Throttle,
    page: &PageImage,
    policy: &RetryPolicy,
    progress: Option<&ProgressCallback>,
    cancel: Option<&CancelFlag>,
) -> Result<AnalyzedPage, PageError> {
    let page_num = page.page_num;
    let mut state = RetryState::new(policy);
    let mut rate_limited = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = until_cancelled(cancel) => {
                debug!(page = page_num, attempts = state.attempt_count, "Cancelled before model call");
                return Err(PageError::Cancelled { page: page_num });
            }
            _ = throttle.pause(state.current_delay) => {}
        }
        let result = tokio::select! {
            biased;
            _ = until_cancelled(cancel) => {
                debug!(page = page_num, attempts = state.attempt_count, "Cancelled during model call");
                return Err(PageError::Cancelled { page: page_num });
            }
            result = oracle.analyze(page) => result,
        };
        let (next, action) = state.transition(AttemptOutcome::of(&result), policy);
        state = next;

        match action {
            RetryAction::Retry { delay } => {
                rate_limited += 1;
                warn!(
                    page = page_num,
                    attempt = state.attempt_count,
                    next_delay_ms = delay.as_millis() as u64,
                    "Rate limited; backing off"
                );
                if let Some(cb) = progress {
                    cb.on_page_rate_limited(page_num, state.attempt_count, delay);
                }
            }
            RetryAction::GiveUp { attempts } => {
                warn!(page = page_num, attempts, "Giving up: still rate limited");
                return Err(PageError::RetryExhausted {
                    page: page_num,
                    attempts,
                });
            }
            RetryAction::Finish | RetryAction::Propagate => {
                debug!(page = page_num, attempts = state.attempt_count, "Oracle settled");
                return result
                    .map(|analysis| AnalyzedPage {
                        analysis,
                        rate_limited,
                    })
                    .map_err(|e| PageError::from_oracle(page_num, e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LayoutCategory;
    use image::DynamicImage;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn unbounded(initial: u64, increment: u64) -> RetryPolicy {
        RetryPolicy {
            initial_delay: secs(initial),
            increment: secs(increment),
            max_delay: None,
            max_attempts: None,
        }
    }

    fn analysis() -> PageAnalysis {
        PageAnalysis {
            layout: LayoutCategory::TitleOnly,
            title: "Intro".into(),
            body_lines: vec![],
            speaker_notes: String::new(),
            figures: vec![],
        }
    }

    struct ScriptedOracle {
        replies: Mutex<VecDeque<Result<PageAnalysis, OracleError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedOracle {
        fn new(replies: Vec<Result<PageAnalysis, OracleError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl LayoutOracle for ScriptedOracle {
        async fn analyze(&self, _page: &PageImage) -> Result<PageAnalysis, OracleError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(OracleError::RateLimited))
        }
    }

    #[derive(Default)]
    struct RecordingThrottle(Mutex<Vec<Duration>>);

    #[async_trait]
    impl Throttle for RecordingThrottle {
        async fn pause(&self, delay: Duration) {
            self.0.lock().unwrap().push(delay);
        }
    }

    fn page() -> PageImage {
        PageImage {
            page_num: 1,
            image: DynamicImage::new_rgb8(4, 4),
        }
    }

    #[test]
    fn rate_limit_adds_increment() {
        let policy = unbounded(5, 5);
        let (state, action) = RetryState::new(&policy).transition(AttemptOutcome::RateLimited, &policy);
        assert_eq!(action, RetryAction::Retry { delay: secs(10) });
        assert_eq!(state.attempt_count, 1);
    }

    #[test]
    fn delay_is_clamped_to_max() {
        let policy = RetryPolicy {
            max_delay: Some(secs(12)),
            ..unbounded(5, 5)
        };
        let s = RetryState::new(&policy);
        let (s, _) = s.transition(AttemptOutcome::RateLimited, &policy);
        let (s, a) = s.transition(AttemptOutcome::RateLimited, &policy);
        assert_eq!(a, RetryAction::Retry { delay: secs(12) });
        let (_, a) = s.transition(AttemptOutcome::RateLimited, &policy);
        assert_eq!(a, RetryAction::Retry { delay: secs(12) });
    }

    #[test]
    fn attempt_ceiling_gives_up() {
        let policy = RetryPolicy {
            max_attempts: Some(2),
            ..unbounded(1, 1)
        };
        let s = RetryState::new(&policy);
        let (s, a) = s.transition(AttemptOutcome::RateLimited, &policy);
        assert!(matches!(a, RetryAction::Retry { .. }));
        let (_, a) = s.transition(AttemptOutcome::RateLimited, &policy);
        assert_eq!(a, RetryAction::GiveUp { attempts: 2 });
    }

    #[test]
    fn rejection_and_acceptance_keep_delay() {
        let policy = unbounded(5, 5);
        let (s, a) = RetryState::new(&policy).transition(AttemptOutcome::Rejected, &policy);
        assert_eq!(a, RetryAction::Propagate);
        assert_eq!(s.current_delay, secs(5));
        let (_, a) = s.transition(AttemptOutcome::Accepted, &policy);
        assert_eq!(a, RetryAction::Finish);
    }

    #[tokio::test]
    async fn three_rate_limits_then_success_pauses_5_10_15_20() {
        let oracle = ScriptedOracle::new(vec![
            Err(OracleError::RateLimited),
            Err(OracleError::RateLimited),
            Err(OracleError::RateLimited),
            Ok(analysis()),
        ]);
        let throttle = RecordingThrottle::default();

        let out = analyze_with_retry(&oracle, &throttle, &page(), &unbounded(5, 5), None, None)
            .await
            .unwrap();

        assert_eq!(out.rate_limited, 3);
        assert_eq!(*oracle.calls.lock().unwrap(), 4);
        assert_eq!(
            *throttle.0.lock().unwrap(),
            vec![secs(5), secs(10), secs(15), secs(20)]
        );
    }

    #[tokio::test]
    async fn invalid_analysis_is_not_retried() {
        let oracle = ScriptedOracle::new(vec![Err(OracleError::InvalidAnalysis(
            "missing field 'title'".into(),
        ))]);
        let throttle = RecordingThrottle::default();

        let err = analyze_with_retry(&oracle, &throttle, &page(), &unbounded(5, 5), None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, PageError::InvalidAnalysis { page: 1, .. }));
        assert_eq!(*oracle.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_report_attempts() {
        let oracle = ScriptedOracle::new(vec![]);
        let throttle = RecordingThrottle::default();
        let policy = RetryPolicy {
            max_attempts: Some(3),
            ..unbounded(0, 1)
        };

        let err = analyze_with_retry(&oracle, &throttle, &page(), &policy, None, None)
            .await
            .unwrap_err();

        assert_eq!(err, PageError::RetryExhausted { page: 1, attempts: 3 });
        assert_eq!(*oracle.calls.lock().unwrap(), 3);
    }

    /// Raises the flag from inside the first pause.
    struct CancellingThrottle(CancelFlag);

    #[async_trait]
    impl Throttle for CancellingThrottle {
        async fn pause(&self, _delay: Duration) {
            self.0.cancel();
        }
    }

    #[tokio::test]
    async fn cancel_during_pause_skips_the_call() {
        let oracle = ScriptedOracle::new(vec![]);
        let flag = CancelFlag::new();
        let throttle = CancellingThrottle(flag.clone());

        let err = analyze_with_retry(&oracle, &throttle, &page(), &unbounded(5, 5), None, Some(&flag))
            .await
            .unwrap_err();

        assert_eq!(err, PageError::Cancelled { page: 1 });
        assert_eq!(*oracle.calls.lock().unwrap(), 0);
    }

    struct StuckThrottle;

    #[async_trait]
    impl Throttle for StuckThrottle {
        async fn pause(&self, _delay: Duration) {
            std::future::pending::<()>().await
        }
    }

    #[tokio::test]
    async fn cancel_interrupts_a_long_backoff() {
        let oracle = ScriptedOracle::new(vec![]);
        let flag = CancelFlag::new();
        tokio::spawn({
            let flag = flag.clone();
            async move {
                tokio::task::yield_now().await;
                flag.cancel();
            }
        });

        let err = tokio::time::timeout(
            secs(5),
            analyze_with_retry(&oracle, &StuckThrottle, &page(), &unbounded(60, 5), None, Some(&flag)),
        )
        .await
        .expect("cancel should end the pause")
        .unwrap_err();

        assert_eq!(err, PageError::Cancelled { page: 1 });
        assert_eq!(*oracle.calls.lock().unwrap(), 0);
    }
}
