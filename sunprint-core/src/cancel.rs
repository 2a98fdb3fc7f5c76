//! Cooperative cancellation for in-flight requests.
//!
//! Each request kind (preview, HQ, mockups, checkout, catalog) owns one
//! [`RequestSlot`]. Beginning a request cancels whatever the slot held before
//! and hands out a fresh [`CancelToken`] tagged with a new generation. Results
//! are only accepted while their generation is still current.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::watch;

use crate::error::{Result, SunprintError};

/// Handle observed by a running task.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    generation: u64,
}

impl CancelToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the owning slot cancels this token.
    ///
    /// Never resolves if the slot completes the request normally.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Drive `fut` to completion unless the token is cancelled first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(SunprintError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(SunprintError::Cancelled),
            result = fut => result,
        }
    }
}

/// Single-in-flight request slot.
#[derive(Debug, Default)]
pub struct RequestSlot {
    generation: u64,
    active: Option<watch::Sender<bool>>,
}

impl RequestSlot {
    /// Cancel the current request, if any, and start a new one.
    pub fn begin(&mut self) -> CancelToken {
        self.cancel();
        self.generation += 1;
        let (tx, rx) = watch::channel(false);
        self.active = Some(tx);
        CancelToken {
            rx,
            generation: self.generation,
        }
    }

    pub fn cancel(&mut self) {
        if let Some(tx) = self.active.take() {
            // No receivers left just means the task already finished.
            let _ = tx.send(true);
        }
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.active.is_some() && self.generation == generation
    }

    /// Close the slot if `generation` is still current.
    ///
    /// Returns `false` for a superseded or cancelled request, whose result
    /// must then be discarded.
    pub fn complete(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.active = None;
        true
    }
}

impl Drop for RequestSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

type BoxedResult<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// Detached unit of work handed out by a `begin_*` command.
///
/// Awaiting [`run`](Self::run) yields a [`Completed`] to pass back to the
/// matching `finish_*` command, which decides whether the result still
/// applies.
pub struct Task<T> {
    token: CancelToken,
    source_generation: u64,
    fut: BoxedResult<T>,
}

impl<T> Task<T> {
    pub fn new<F>(token: CancelToken, source_generation: u64, fut: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            token,
            source_generation,
            fut: Box::pin(fut),
        }
    }

    pub fn generation(&self) -> u64 {
        self.token.generation()
    }

    pub async fn run(self) -> Completed<T> {
        let result = self.token.run(self.fut).await;
        Completed {
            generation: self.token.generation(),
            source_generation: self.source_generation,
            result,
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("generation", &self.token.generation())
            .field("source_generation", &self.source_generation)
            .finish_non_exhaustive()
    }
}

/// Outcome of a [`Task`], tagged with the generations it was started under.
#[derive(Debug)]
pub struct Completed<T> {
    pub generation: u64,
    pub source_generation: u64,
    pub result: Result<T>,
}
