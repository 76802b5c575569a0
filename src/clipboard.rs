// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Clipboard runner: a bounded queue fronting a [`ClipboardBackend`], with
//! a single consumer task that serializes backend calls so two copies
//! never overlap on the same TTY (spec §5 "Clipboard runner").
//!
//! The system-clipboard and terminal-escape-fallback backends themselves
//! are external collaborators (§1 Non-goals); this module ships the
//! trait, the serializing runner, and a test-only in-memory backend.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::CoreError;

/// A copy backend. Implementations plug in the real system clipboard
/// (OSC52, X11/Wayland) or a terminal-escape fallback.
#[async_trait]
pub trait ClipboardBackend: Send + Sync {
    async fn copy(&self, text: &str) -> Result<(), CoreError>;

    /// Human-readable name of the environment this backend needs, used to
    /// build the combined "neither is available" diagnostic.
    fn requirement(&self) -> &'static str;
}

/// Combines a system-backend failure and a fallback-backend failure into
/// one diagnostic (spec §9 "Clipboard fallback"). When neither a GUI nor
/// a TTY is available, names the missing environment explicitly.
fn combine_errors(system: CoreError, fallback: CoreError, system_req: &str, fallback_req: &str) -> CoreError {
    CoreError::Unavailable(format!(
        "clipboard copy failed: no {system_req} ({system}) and no {fallback_req} ({fallback})"
    ))
}

struct CopyRequest {
    text: String,
    reply: oneshot::Sender<Result<(), CoreError>>,
}

/// The bounded, serializing clipboard queue. Cloning shares the same
/// underlying channel and worker task.
#[derive(Clone)]
pub struct ClipboardRunner {
    tx: mpsc::Sender<CopyRequest>,
}

impl ClipboardRunner {
    /// Spawns the single consumer task that serializes calls to `system`
    /// then `fallback` (system first, fallback on system failure).
    pub fn spawn(
        queue_bound: usize,
        system: std::sync::Arc<dyn ClipboardBackend>,
        fallback: std::sync::Arc<dyn ClipboardBackend>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<CopyRequest>(queue_bound.max(1));
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let outcome = match system.copy(&request.text).await {
                    Ok(()) => Ok(()),
                    Err(system_err) => match fallback.copy(&request.text).await {
                        Ok(()) => Ok(()),
                        Err(fallback_err) => Err(combine_errors(
                            system_err,
                            fallback_err,
                            system.requirement(),
                            fallback.requirement(),
                        )),
                    },
                };
                let _ = request.reply.send(outcome);
            }
        });
        Self { tx }
    }

    /// Enqueue a copy, observing `deadline`. If the deadline fires before
    /// the request is dequeued or before the backend returns, the context
    /// error is surfaced immediately; the worker may still run the copy to
    /// completion in the background, but its result is discarded (spec §5
    /// "Cancellation semantics" (b)/(c)).
    pub async fn copy(&self, text: impl Into<String>, deadline: Duration) -> Result<(), CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = CopyRequest { text: text.into(), reply: reply_tx };

        tokio::time::timeout(deadline, self.tx.send(request))
            .await
            .map_err(|_| CoreError::Timeout(deadline))?
            .map_err(|_| CoreError::Unavailable("clipboard runner has shut down".to_string()))?;

        match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CoreError::Unavailable("clipboard runner dropped the request".to_string())),
            Err(_) => Err(CoreError::Timeout(deadline)),
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// In-memory backend recording every copy, for tests. `fail_with`
    /// makes every call fail with the given error instead of succeeding.
    pub struct InMemoryBackend {
        pub requirement: &'static str,
        pub copies: Mutex<Vec<String>>,
        pub fail_with: Option<CoreError>,
        pub delay: Duration,
    }

    impl InMemoryBackend {
        pub fn new(requirement: &'static str) -> Self {
            Self { requirement, copies: Mutex::new(Vec::new()), fail_with: None, delay: Duration::ZERO }
        }

        pub fn failing(requirement: &'static str, err: CoreError) -> Self {
            Self { requirement, copies: Mutex::new(Vec::new()), fail_with: Some(err), delay: Duration::ZERO }
        }
    }

    #[async_trait]
    impl ClipboardBackend for InMemoryBackend {
        async fn copy(&self, text: &str) -> Result<(), CoreError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(err) = &self.fail_with {
                return Err(clone_error(err));
            }
            self.copies.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn requirement(&self) -> &'static str {
            self.requirement
        }
    }

    fn clone_error(err: &CoreError) -> CoreError {
        match err {
            CoreError::Transport(s) => CoreError::Transport(s.clone()),
            CoreError::Timeout(d) => CoreError::Timeout(*d),
            CoreError::Validation(s) => CoreError::Validation(s.clone()),
            CoreError::Conflict(s) => CoreError::Conflict(s.clone()),
            CoreError::Unavailable(s) => CoreError::Unavailable(s.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::InMemoryBackend;
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn successful_system_copy_never_touches_fallback() {
        let system = Arc::new(InMemoryBackend::new("a GUI clipboard"));
        let fallback = Arc::new(InMemoryBackend::new("a TTY"));
        let runner = ClipboardRunner::spawn(8, system.clone(), fallback.clone());

        runner.copy("hello", Duration::from_secs(1)).await.unwrap();
        assert_eq!(system.copies.lock().unwrap().as_slice(), ["hello".to_string()]);
        assert!(fallback.copies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn falls_back_when_system_backend_fails() {
        let system = Arc::new(InMemoryBackend::failing(
            "a GUI clipboard",
            CoreError::Unavailable("no display".to_string()),
        ));
        let fallback = Arc::new(InMemoryBackend::new("a TTY"));
        let runner = ClipboardRunner::spawn(8, system.clone(), fallback.clone());

        runner.copy("hello", Duration::from_secs(1)).await.unwrap();
        assert_eq!(fallback.copies.lock().unwrap().as_slice(), ["hello".to_string()]);
    }

    #[tokio::test]
    async fn combines_errors_when_both_backends_fail() {
        let system = Arc::new(InMemoryBackend::failing(
            "a GUI clipboard",
            CoreError::Unavailable("no display".to_string()),
        ));
        let fallback = Arc::new(InMemoryBackend::failing("a TTY", CoreError::Unavailable("no tty".to_string())));
        let runner = ClipboardRunner::spawn(8, system, fallback);

        let err = runner.copy("hello", Duration::from_secs(1)).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("GUI clipboard"));
        assert!(message.contains("TTY"));
    }

    #[tokio::test]
    async fn copies_are_serialized_one_at_a_time() {
        let system = Arc::new(InMemoryBackend { delay: Duration::from_millis(30), ..InMemoryBackend::new("a GUI clipboard") });
        let fallback = Arc::new(InMemoryBackend::new("a TTY"));
        let runner = ClipboardRunner::spawn(8, system.clone(), fallback);

        let r1 = runner.clone();
        let r2 = runner.clone();
        let (a, b) = tokio::join!(r1.copy("first", Duration::from_secs(1)), r2.copy("second", Duration::from_secs(1)));
        a.unwrap();
        b.unwrap();
        assert_eq!(system.copies.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deadline_firing_before_completion_surfaces_timeout() {
        let system = Arc::new(InMemoryBackend { delay: Duration::from_millis(200), ..InMemoryBackend::new("a GUI clipboard") });
        let fallback = Arc::new(InMemoryBackend::new("a TTY"));
        let runner = ClipboardRunner::spawn(8, system, fallback);

        let err = runner.copy("hello", Duration::from_millis(10)).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
