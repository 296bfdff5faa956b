//! Usage accounting and limits.
//!
//! [`RunUsage`] is a plain value snapshot of consumed resources.
//! [`SharedUsage`] is the accumulation primitive: atomic counters behind an
//! `Arc`, shared across every agent in a delegation tree so the whole tree
//! is metered against a single budget. [`UsageLimits`] expresses that budget;
//! the run controller checks it before every model request and re-checks
//! token ceilings after each recorded response.

use std::fmt;
use std::ops::{Add, AddAssign};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A snapshot of resources consumed by model requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunUsage {
    /// Number of model requests made.
    #[serde(default)]
    pub requests: u64,
    /// Tokens consumed by request payloads.
    #[serde(default)]
    pub input_tokens: u64,
    /// Tokens produced in responses.
    #[serde(default)]
    pub output_tokens: u64,
}

impl RunUsage {
    /// Usage for a single model request with the given token counts.
    #[must_use]
    pub const fn request(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            requests: 1,
            input_tokens,
            output_tokens,
        }
    }

    /// Combined input and output tokens.
    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.requests == 0 && self.input_tokens == 0 && self.output_tokens == 0
    }
}

impl Add for RunUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            requests: self.requests + rhs.requests,
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl AddAssign for RunUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl fmt::Display for RunUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requests, {} input tokens, {} output tokens",
            self.requests, self.input_tokens, self.output_tokens
        )
    }
}

#[derive(Debug, Default)]
struct UsageCounters {
    requests: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

/// Atomic usage counters shared across a delegation tree.
///
/// Cloning is cheap and every clone observes the same counters. A parent
/// agent hands its `SharedUsage` to delegate runs so that every model request
/// in the tree counts against one budget.
#[derive(Debug, Clone, Default)]
pub struct SharedUsage {
    inner: Arc<UsageCounters>,
}

impl SharedUsage {
    /// Create a fresh, zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a usage snapshot to the shared counters.
    pub fn record(&self, usage: RunUsage) {
        self.inner.requests.fetch_add(usage.requests, Ordering::Relaxed);
        self.inner
            .input_tokens
            .fetch_add(usage.input_tokens, Ordering::Relaxed);
        self.inner
            .output_tokens
            .fetch_add(usage.output_tokens, Ordering::Relaxed);
    }

    /// Read the current totals.
    #[must_use]
    pub fn snapshot(&self) -> RunUsage {
        RunUsage {
            requests: self.inner.requests.load(Ordering::Relaxed),
            input_tokens: self.inner.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.inner.output_tokens.load(Ordering::Relaxed),
        }
    }

    /// Check whether another model request is permitted.
    ///
    /// Called before every model request; one more request on top of the
    /// current count must not exceed the request limit.
    pub fn check_before_request(&self, limits: &UsageLimits) -> Result<(), UsageLimitError> {
        if let Some(limit) = limits.request_limit {
            let used = self.inner.requests.load(Ordering::Relaxed);
            if used >= limit {
                return Err(UsageLimitError::Requests { limit });
            }
        }
        Ok(())
    }

    /// Check token ceilings against the current totals.
    ///
    /// Called after each response is recorded.
    pub fn check_tokens(&self, limits: &UsageLimits) -> Result<(), UsageLimitError> {
        let usage = self.snapshot();
        if let Some(limit) = limits.input_tokens_limit {
            if usage.input_tokens > limit {
                return Err(UsageLimitError::InputTokens {
                    limit,
                    used: usage.input_tokens,
                });
            }
        }
        if let Some(limit) = limits.output_tokens_limit {
            if usage.output_tokens > limit {
                return Err(UsageLimitError::OutputTokens {
                    limit,
                    used: usage.output_tokens,
                });
            }
        }
        if let Some(limit) = limits.total_tokens_limit {
            if usage.total_tokens() > limit {
                return Err(UsageLimitError::TotalTokens {
                    limit,
                    used: usage.total_tokens(),
                });
            }
        }
        Ok(())
    }
}

/// Ceilings on the resources a run (or delegation tree) may consume.
///
/// All limits default to unbounded. Violations are fatal and never retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLimits {
    /// Maximum number of model requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_limit: Option<u64>,
    /// Maximum input tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens_limit: Option<u64>,
    /// Maximum output tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens_limit: Option<u64>,
    /// Maximum combined tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens_limit: Option<u64>,
}

impl UsageLimits {
    /// No limits.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            request_limit: None,
            input_tokens_limit: None,
            output_tokens_limit: None,
            total_tokens_limit: None,
        }
    }

    /// Set the maximum number of model requests.
    #[must_use]
    pub const fn with_request_limit(mut self, limit: u64) -> Self {
        self.request_limit = Some(limit);
        self
    }

    /// Set the maximum input tokens.
    #[must_use]
    pub const fn with_input_tokens_limit(mut self, limit: u64) -> Self {
        self.input_tokens_limit = Some(limit);
        self
    }

    /// Set the maximum output tokens.
    #[must_use]
    pub const fn with_output_tokens_limit(mut self, limit: u64) -> Self {
        self.output_tokens_limit = Some(limit);
        self
    }

    /// Set the maximum combined tokens.
    #[must_use]
    pub const fn with_total_tokens_limit(mut self, limit: u64) -> Self {
        self.total_tokens_limit = Some(limit);
        self
    }
}

/// A usage ceiling was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UsageLimitError {
    /// The next request would exceed the request limit.
    #[error("the next request would exceed the request limit of {limit}")]
    Requests {
        /// The configured limit.
        limit: u64,
    },
    /// Input tokens exceeded the limit.
    #[error("exceeded the input tokens limit of {limit} ({used} used)")]
    InputTokens {
        /// The configured limit.
        limit: u64,
        /// Tokens consumed.
        used: u64,
    },
    /// Output tokens exceeded the limit.
    #[error("exceeded the output tokens limit of {limit} ({used} used)")]
    OutputTokens {
        /// The configured limit.
        limit: u64,
        /// Tokens consumed.
        used: u64,
    },
    /// Combined tokens exceeded the limit.
    #[error("exceeded the total tokens limit of {limit} ({used} used)")]
    TotalTokens {
        /// The configured limit.
        limit: u64,
        /// Tokens consumed.
        used: u64,
    },
}
