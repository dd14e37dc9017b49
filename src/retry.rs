//! Retry policy wrapped around every outbound API call.
//!
//! Each call gets its own [`RetryState`]; nothing is shared between two
//! independent calls, so an exhausted counter from one request can never
//! starve the next one.

use std::future::Future;
use std::time::Duration;

use log::{error, info, warn};

use crate::error::{ApiError, ErrorKind};

/// How the wait between attempts evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Wait `delay_ms` before every retry.
    #[default]
    Fixed,
    /// Double the wait after every failed attempt.
    Exponential,
}

/// Retry settings for one kind of call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Base wait between attempts in milliseconds.
    pub delay_ms: u64,
    pub backoff: Backoff,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
            backoff: Backoff::Fixed,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(10, 10_000)
    }
}

/// Bookkeeping for a single wrapped call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Failed attempts so far.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Wait applied before the next attempt.
    pub delay_ms: u64,
}

impl RetryState {
    fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts.max(1),
            delay_ms: config.delay_ms,
        }
    }

    /// Records a failure and reports whether another attempt is allowed.
    fn record_failure(&mut self) -> bool {
        self.attempt += 1;
        self.attempt < self.max_attempts
    }

    fn escalate(&mut self, backoff: Backoff) {
        if backoff == Backoff::Exponential {
            self.delay_ms = self.delay_ms.saturating_mul(2);
        }
    }

    /// Number of retries performed, i.e. attempts beyond the first.
    pub fn retries(&self, succeeded: bool) -> u32 {
        if succeeded {
            self.attempt
        } else {
            self.attempt.saturating_sub(1)
        }
    }
}

/// Result of a wrapped call together with the state it finished in.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, ApiError>,
    pub state: RetryState,
}

/// Uniform retry/backoff policy for API calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    dry_run: bool,
}

impl RetryPolicy {
    /// In dry-run mode the waits between attempts are logged but not slept.
    pub fn new(config: RetryConfig, dry_run: bool) -> Self {
        Self { config, dry_run }
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts. The last failure is returned on exhaustion.
    pub async fn call<T, F, Fut>(&self, endpoint: &str, operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.call_traced(endpoint, operation).await.result
    }

    /// Like [`RetryPolicy::call`] but also hands back the final [`RetryState`].
    pub async fn call_traced<T, F, Fut>(&self, endpoint: &str, mut operation: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut state = RetryState::new(&self.config);

        loop {
            let err = match operation().await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        state,
                    }
                }
                Err(err) => err,
            };

            self.log_failure(endpoint, &err, &state);

            if !err.is_retryable() {
                return Attempted {
                    result: Err(err),
                    state,
                };
            }

            if !state.record_failure() {
                error!(
                    "Unable to process request to {} after {} attempts",
                    endpoint, state.attempt
                );
                return Attempted {
                    result: Err(err),
                    state,
                };
            }

            info!(
                "Retrying {}... ({}/{})",
                endpoint, state.attempt, state.max_attempts
            );
            if self.dry_run {
                info!("Dry run, skipping {}ms wait", state.delay_ms);
            } else {
                tokio::time::sleep(Duration::from_millis(state.delay_ms)).await;
            }
            state.escalate(self.config.backoff);
        }
    }

    fn log_failure(&self, endpoint: &str, err: &ApiError, state: &RetryState) {
        match err.kind {
            ErrorKind::Network => {
                error!("No response status from server for {}", endpoint);
            }
            ErrorKind::Auth => {
                error!(
                    "Unable to process request to {}, please check your API key",
                    endpoint
                );
            }
            ErrorKind::RateLimit => {
                warn!(
                    "Too many requests to {}, trying again in {}ms",
                    endpoint, state.delay_ms
                );
            }
            ErrorKind::Server => match err.status {
                Some(status) => error!("{}: request to {} failed", status, endpoint),
                None => error!("Request to {} failed", endpoint),
            },
            ErrorKind::Data => {
                error!("Unusable response from {}", endpoint);
            }
        }
        if let Some(message) = &err.message {
            error!("{}", message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicU32, Ordering};

    thread_local! {
        static LOGGED: RefCell<Vec<String>> = RefCell::new(Vec::new());
    }

    /// Collects log lines per thread; each current-thread test reads only its own.
    struct ThreadLogger;

    impl log::Log for ThreadLogger {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            LOGGED.with(|lines| lines.borrow_mut().push(record.args().to_string()));
        }

        fn flush(&self) {}
    }

    static LOGGER: ThreadLogger = ThreadLogger;

    fn capture_logs() {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Info);
        LOGGED.with(|lines| lines.borrow_mut().clear());
    }

    fn retry_lines(endpoint: &str) -> Vec<String> {
        let prefix = format!("Retrying {}...", endpoint);
        LOGGED.with(|lines| {
            lines
                .borrow()
                .iter()
                .filter(|line| line.starts_with(&prefix))
                .cloned()
                .collect()
        })
    }

    fn rate_limited() -> ApiError {
        ApiError::from_status("statuses", 429, "")
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_ceiling_is_respected() {
        let policy = RetryPolicy::new(RetryConfig::new(3, 1000), false);
        let calls = AtomicU32::new(0);

        let attempted = policy
            .call_traced("statuses", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ApiError::from_status("statuses", 503, "")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = attempted.result.unwrap_err();
        assert_eq!(err.status, Some(503));
        assert_eq!(attempted.state.attempt, 3);
        assert_eq!(attempted.state.retries(false), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_two_failures() {
        capture_logs();
        let policy = RetryPolicy::new(RetryConfig::new(3, 1000), false);
        let calls = AtomicU32::new(0);

        let attempted = policy
            .call_traced("chat", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n <= 2 {
                        Err(ApiError::new(ErrorKind::Network, "chat"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(attempted.result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(attempted.state.retries(true), 2);
        assert_eq!(retry_lines("chat"), vec!["Retrying chat... (1/3)", "Retrying chat... (2/3)"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_lines_belong_to_their_call() {
        capture_logs();
        let policy = RetryPolicy::new(RetryConfig::new(5, 1000), false);
        let calls = AtomicU32::new(0);

        let statuses = policy
            .call_traced("statuses", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n <= 3 {
                        Err(rate_limited())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        let media = policy.call("media", || async { Ok::<_, ApiError>("m1") }).await;

        assert_eq!(statuses.result.unwrap(), 4);
        assert_eq!(statuses.state.retries(true), 3);
        assert_eq!(retry_lines("statuses").len(), 3);
        assert_eq!(retry_lines("statuses")[2], "Retrying statuses... (3/5)");
        assert_eq!(media.unwrap(), "m1");
        assert!(retry_lines("media").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_is_not_retried() {
        let policy = RetryPolicy::new(RetryConfig::new(5, 1000), false);
        let calls = AtomicU32::new(0);

        let err = policy
            .call("chat", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ApiError::from_status("chat", 401, "")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_error_is_not_retried() {
        let policy = RetryPolicy::new(RetryConfig::new(5, 1000), false);
        let calls = AtomicU32::new(0);

        let err = policy
            .call("chat", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ApiError::data("chat", "no choices")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind, ErrorKind::Data);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_between_attempts() {
        let policy = RetryPolicy::new(RetryConfig::new(3, 1000), false);
        let start = tokio::time::Instant::now();

        let _ = policy
            .call("statuses", || async { Err::<(), _>(rate_limited()) })
            .await;

        assert_eq!(start.elapsed(), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_delay_doubles() {
        let config = RetryConfig::new(4, 100).with_backoff(Backoff::Exponential);
        let policy = RetryPolicy::new(config, false);
        let start = tokio::time::Instant::now();

        let _ = policy
            .call("statuses", || async { Err::<(), _>(rate_limited()) })
            .await;

        // 100 + 200 + 400
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_skips_waiting() {
        let policy = RetryPolicy::new(RetryConfig::new(3, 10_000), true);
        let start = tokio::time::Instant::now();

        let _ = policy
            .call("statuses", || async { Err::<(), _>(rate_limited()) })
            .await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_calls_do_not_share_counters() {
        let policy = RetryPolicy::new(RetryConfig::new(2, 10), false);
        let calls = AtomicU32::new(0);

        let first = policy
            .call("statuses", || async { Err::<(), _>(rate_limited()) })
            .await;
        assert!(first.is_err());

        let second = policy
            .call_traced("statuses", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n == 1 {
                        Err(rate_limited())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(second.result.unwrap(), 2);
        assert_eq!(second.state.attempt, 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let policy = RetryPolicy::new(RetryConfig::new(0, 0), false);
        let calls = AtomicU32::new(0);

        let _ = policy
            .call("statuses", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(rate_limited()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
