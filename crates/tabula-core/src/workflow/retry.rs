//! Bounded retry policy for the Execute step.
//!
//! Parse failures, generator outages, execution errors and timeouts all
//! count against one shared bound. The controller holds no per-session
//! state; the failure count lives in the session.

// ---------------------------------------------------------------------------
// RetryDecision
// ---------------------------------------------------------------------------

/// What to do after a failed Execute attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run Execute again without user input.
    Retry {
        /// 1-based number of the attempt about to run.
        next_attempt: u32,
    },
    /// Give control back to the user with this message.
    Exhausted { message: String },
}

// ---------------------------------------------------------------------------
// RetryController
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryController {
    max_retries: u32,
}

impl RetryController {
    /// Default bound on consecutive failed attempts.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// A bound of zero is treated as one: every request gets one attempt.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether another attempt may run after `failures` consecutive failures.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_retries
    }

    /// Decide the outcome after `failures` consecutive failures, the latest
    /// of which reported `error`.
    pub fn on_failure(&self, failures: u32, error: &str) -> RetryDecision {
        if self.should_retry(failures) {
            RetryDecision::Retry {
                next_attempt: failures + 1,
            }
        } else {
            RetryDecision::Exhausted {
                message: self.exhausted_message(error),
            }
        }
    }

    /// User-facing message once the bound is reached.
    pub fn exhausted_message(&self, error: &str) -> String {
        format!(
            "❌ Failed after {} attempts. Last error: {error}",
            self.max_retries
        )
    }
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES)
    }
}
