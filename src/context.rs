use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::Error;

/// Caller-side cancellation scope for a request.
///
/// A context ends when its token is cancelled or its deadline passes,
/// whichever comes first. Every suspension point of a request (the send
/// itself and the backoff between attempts) observes it.
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that never ends on its own.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that ends `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that ends at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A context paired with the token that cancels it.
    pub fn with_cancel() -> (Self, CancellationToken) {
        let ctx = Self::background();
        let token = ctx.token.clone();
        (ctx, token)
    }

    /// Derives a context that is cancelled with this one and whose deadline
    /// is the earlier of the parent's and `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels this context and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Reports why the context ended, or `None` while it is still live.
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            return Some(Error::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context ends, yielding the reason.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => Error::Canceled,
                    _ = sleep_until(deadline) => Error::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Error::Canceled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Context;
    use crate::Error;

    #[tokio::test]
    async fn background_context_stays_live() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test]
    async fn cancel_ends_context_and_children() {
        let (ctx, token) = Context::with_cancel();
        let child = ctx.child_with_timeout(Duration::from_secs(60));
        token.cancel();

        assert!(matches!(ctx.err(), Some(Error::Canceled)));
        assert!(matches!(child.done().await, Error::Canceled));
    }

    #[tokio::test]
    async fn deadline_ends_context() {
        let ctx = Context::with_timeout(Duration::from_millis(10));
        assert!(matches!(ctx.done().await, Error::DeadlineExceeded));
        assert!(matches!(ctx.err(), Some(Error::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn child_keeps_earlier_parent_deadline() {
        let parent = Context::with_timeout(Duration::from_millis(5));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
