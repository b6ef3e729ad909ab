//! Storage-level access mirroring.
//!
//! The permission table is the source of truth. Each change to it is queued
//! here and applied to an [`AccessMirror`] by a background worker, retried
//! with exponential backoff, and dropped with a warning once the attempts
//! run out. Callers never wait on the mirror and never see its failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Permission;

/// Capacity of the change queue; changes beyond it are dropped.
const QUEUE_CAPACITY: usize = 256;

/// Whatever actually enforces access to the backing store.
#[async_trait]
pub trait AccessMirror: Send + Sync {
    async fn grant(&self, email: &str, permission: Permission) -> anyhow::Result<()>;

    async fn revoke(&self, email: &str) -> anyhow::Result<()>;
}

// Compile-time assertion: AccessMirror must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn AccessMirror) {}
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessChange {
    Grant { email: String, permission: Permission },
    Revoke { email: String },
}

impl AccessChange {
    fn email(&self) -> &str {
        match self {
            Self::Grant { email, .. } | Self::Revoke { email } => email,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based): `base * 2^(n-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

enum Message {
    Change(AccessChange),
    Flush(oneshot::Sender<()>),
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Change(change) => f.debug_tuple("Change").field(change).finish(),
            Self::Flush(_) => f.write_str("Flush"),
        }
    }
}

/// Handle to the mirror worker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AccessSync {
    tx: Option<mpsc::Sender<Message>>,
}

impl AccessSync {
    /// Start the worker. It stops when `cancel` fires or every handle is
    /// dropped.
    pub fn spawn(
        mirror: Arc<dyn AccessMirror>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let handle = tokio::spawn(run_worker(mirror, policy, rx, cancel));
        (Self { tx: Some(tx) }, handle)
    }

    /// A handle that discards every change, for deployments with no mirror.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue a change. Never fails; a full or closed queue drops it.
    pub fn enqueue(&self, change: AccessChange) {
        let Some(tx) = &self.tx else {
            tracing::debug!(?change, "access mirroring disabled");
            return;
        };
        if let Err(e) = tx.try_send(Message::Change(change)) {
            let change = match e {
                mpsc::error::TrySendError::Full(m) | mpsc::error::TrySendError::Closed(m) => m,
            };
            tracing::warn!(?change, "access sync queue unavailable, change dropped");
        }
    }

    /// Wait until every change queued before this call has been handled.
    pub async fn flush(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let (done, wait) = oneshot::channel();
        if tx.send(Message::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }
}

async fn run_worker(
    mirror: Arc<dyn AccessMirror>,
    policy: RetryPolicy,
    mut rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };

        match message {
            Message::Change(change) => apply(mirror.as_ref(), &policy, &change, &cancel).await,
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("access sync worker stopped");
}

async fn apply(
    mirror: &dyn AccessMirror,
    policy: &RetryPolicy,
    change: &AccessChange,
    cancel: &CancellationToken,
) {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let result = match change {
            AccessChange::Grant { email, permission } => mirror.grant(email, *permission).await,
            AccessChange::Revoke { email } => mirror.revoke(email).await,
        };

        match result {
            Ok(()) => {
                tracing::debug!(email = change.email(), attempt, "access change applied");
                return;
            }
            Err(e) if attempt < attempts => {
                let delay = policy.delay_after(attempt);
                tracing::debug!(
                    email = change.email(),
                    attempt,
                    ?delay,
                    error = %format!("{e:#}"),
                    "access change failed, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return,
                }
            }
            Err(e) => {
                tracing::warn!(
                    ?change,
                    attempts,
                    error = %format!("{e:#}"),
                    "access change dropped after retries"
                );
            }
        }
    }
}
