use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{DiscoveryError, Result};

/// Carries a deadline and a cancellation signal through every public
/// operation, the way a caller-supplied context threads timeouts and
/// cancellation through a call chain without each layer needing its own
/// timeout plumbing.
#[derive(Clone)]
pub struct Context {
    deadline: Option<Instant>,
    cancel_rx: watch::Receiver<bool>,
    /// Keeps the paired `watch::Sender` alive for contexts with no
    /// `CancelHandle` of their own (`background`), so the channel never
    /// closes and `run` doesn't mistake a closed channel for cancellation.
    _keepalive: Option<watch::Sender<bool>>,
}

/// Owning half of a [`Context`]; dropping or calling [`cancel`] signals
/// cancellation to every clone of the paired `Context`.
pub struct CancelHandle {
    cancel_tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

impl Context {
    /// A context with no deadline and no cancellation source. Suitable for
    /// background/internal calls that are not driven by a caller request.
    pub fn background() -> Self {
        let (tx, rx) = watch::channel(false);
        Context {
            deadline: None,
            cancel_rx: rx,
            _keepalive: Some(tx),
        }
    }

    /// A context bound to a deadline, paired with a [`CancelHandle`] the
    /// owner can use to cancel early.
    pub fn with_timeout(timeout: Duration) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Context {
            deadline: Some(Instant::now() + timeout),
            cancel_rx: rx,
            _keepalive: None,
        };
        (ctx, CancelHandle { cancel_tx: tx })
    }

    /// A context with a cancel handle but no deadline.
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Context {
            deadline: None,
            cancel_rx: rx,
            _keepalive: None,
        };
        (ctx, CancelHandle { cancel_tx: tx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Remaining time until the deadline, or `None` if there is none.
    /// Returns `Some(Duration::ZERO)` if the deadline has already passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns an error if the context is already cancelled or past its
    /// deadline. Called at suspension points before blocking work.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }
        if let Some(remaining) = self.remaining() {
            if remaining.is_zero() {
                return Err(DiscoveryError::Timeout);
            }
        }
        Ok(())
    }

    /// Races `fut` against cancellation and the deadline, returning
    /// whichever resolves first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = T>,
    {
        let mut cancel_rx = self.cancel_rx.clone();
        tokio::select! {
            biased;
            _ = cancel_rx.wait_for(|c| *c) => Err(DiscoveryError::Cancelled),
            res = Self::with_deadline(self.deadline, fut) => res,
        }
    }

    async fn with_deadline<F, T>(deadline: Option<Instant>, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = T>,
    {
        match deadline {
            Some(d) => match tokio::time::timeout_at(d, fut).await {
                Ok(v) => Ok(v),
                Err(_) => Err(DiscoveryError::Timeout),
            },
            None => Ok(fut.await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_never_cancels_or_times_out() {
        let ctx = Context::background();
        assert!(ctx.check().is_ok());
        let v = ctx.run(async { 42 }).await.unwrap();
        assert_eq!(v, 42);
    }

    #[tokio::test]
    async fn cancel_handle_cancels_paired_contexts() {
        let (ctx, handle) = Context::cancellable();
        let ctx2 = ctx.clone();
        assert!(ctx.check().is_ok());
        handle.cancel();
        assert!(ctx.check().is_err());
        assert!(ctx2.check().is_err());
    }

    #[tokio::test]
    async fn timeout_context_expires() {
        let (ctx, _handle) = Context::with_timeout(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(matches!(ctx.check(), Err(DiscoveryError::Timeout)));
    }

    #[tokio::test]
    async fn run_returns_timeout_when_future_outlives_deadline() {
        let (ctx, _handle) = Context::with_timeout(Duration::from_millis(10));
        let res: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
            })
            .await;
        assert!(matches!(res, Err(DiscoveryError::Timeout)));
    }
}
