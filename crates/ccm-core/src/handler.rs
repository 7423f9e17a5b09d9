//! Policy for a failed `AT+CONNECT`
//!
//! The connect command is the only step whose failure is acted on. What
//! happens next is up to the integrator: the handler returns a decision
//! and the sequencer carries it out, so there is no hidden non-local exit.

use log::{error, warn};

use crate::client::Reply;

/// What the sequencer does after a failed connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDecision {
    /// Stop the run with [`CcmError::Aborted`](crate::CcmError::Aborted)
    Abort,
    /// Send `AT+CONNECT` again
    Retry,
    /// Carry on with the rest of the sequence as if connected
    Continue,
}

/// Details of one failed connect attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectFailure {
    /// 1-based attempt number
    pub attempt: u8,
    /// The reply that missed the connect token, `None` if nothing arrived in time
    pub reply: Option<Reply>,
}

impl ConnectFailure {
    /// Short description for logs
    pub fn reason(&self) -> &str {
        match &self.reply {
            Some(reply) => reply.text(),
            None => "no reply",
        }
    }
}

pub trait ErrorHandler {
    /// Called exactly once per failed connect attempt.
    fn on_connect_failure(&mut self, failure: &ConnectFailure) -> ErrorDecision;
}

impl<F> ErrorHandler for F
where
    F: FnMut(&ConnectFailure) -> ErrorDecision,
{
    fn on_connect_failure(&mut self, failure: &ConnectFailure) -> ErrorDecision {
        self(failure)
    }
}

/// Stop at the first failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortOnError;

impl ErrorHandler for AbortOnError {
    fn on_connect_failure(&mut self, failure: &ConnectFailure) -> ErrorDecision {
        error!(
            "AT+CONNECT failed on attempt {}: {}",
            failure.attempt,
            failure.reason()
        );
        ErrorDecision::Abort
    }
}

/// Log the failure and go on publishing anyway.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContinueOnError;

impl ErrorHandler for ContinueOnError {
    fn on_connect_failure(&mut self, failure: &ConnectFailure) -> ErrorDecision {
        warn!(
            "AT+CONNECT failed on attempt {}: {}, continuing",
            failure.attempt,
            failure.reason()
        );
        ErrorDecision::Continue
    }
}

/// Retry up to `max_retries` times, then abort.
#[derive(Debug, Clone, Copy)]
pub struct RetryThenAbort {
    pub max_retries: u8,
}

impl RetryThenAbort {
    pub const fn new(max_retries: u8) -> Self {
        Self { max_retries }
    }
}

impl ErrorHandler for RetryThenAbort {
    fn on_connect_failure(&mut self, failure: &ConnectFailure) -> ErrorDecision {
        // attempt 1 is the first try, so retries so far = attempt - 1
        if failure.attempt <= self.max_retries {
            warn!(
                "AT+CONNECT failed on attempt {}: {}, retrying",
                failure.attempt,
                failure.reason()
            );
            ErrorDecision::Retry
        } else {
            error!(
                "AT+CONNECT failed after {} attempt(s): {}",
                failure.attempt,
                failure.reason()
            );
            ErrorDecision::Abort
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(attempt: u8) -> ConnectFailure {
        ConnectFailure {
            attempt,
            reply: None,
        }
    }

    #[test]
    fn retry_then_abort_counts_retries() {
        let mut handler = RetryThenAbort::new(2);
        assert_eq!(handler.on_connect_failure(&failure(1)), ErrorDecision::Retry);
        assert_eq!(handler.on_connect_failure(&failure(2)), ErrorDecision::Retry);
        assert_eq!(handler.on_connect_failure(&failure(3)), ErrorDecision::Abort);
    }

    #[test]
    fn zero_retries_aborts_immediately() {
        let mut handler = RetryThenAbort::new(0);
        assert_eq!(handler.on_connect_failure(&failure(1)), ErrorDecision::Abort);
    }

    #[test]
    fn closures_are_handlers() {
        let mut seen = 0;
        let mut handler = |f: &ConnectFailure| {
            seen = f.attempt;
            ErrorDecision::Continue
        };
        assert_eq!(handler.on_connect_failure(&failure(4)), ErrorDecision::Continue);
        assert_eq!(seen, 4);
    }

    #[test]
    fn reason_falls_back_without_reply() {
        assert_eq!(failure(1).reason(), "no reply");
    }
}
