//! Single-owner query loop around a [`LogStore`].
//!
//! The [`QueryActor`] owns the store and processes one [`LogRequest`] at a
//! time. Callers talk to it through a cloneable [`QueryHandle`]; every
//! request carries its own oneshot reply channel. Store operations run on
//! the blocking pool, with the store moved in and back out.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{LogError, Result};
use crate::store::LogStore;
use crate::types::{LogLevel, Page};

/// Requests queued in front of the actor.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Default polling interval of [`QueryHandle::follow`].
pub const DEFAULT_FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

/// Shutdown signal receiver.
pub type ShutdownRx = broadcast::Receiver<()>;

/// Shutdown signal sender.
pub type ShutdownTx = broadcast::Sender<()>;

/// A request to the query actor.
#[derive(Debug)]
pub enum LogRequest {
    /// Open a file, replacing any open one.
    Open {
        /// File to open
        path: PathBuf,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },
    /// Read a page.
    Get {
        /// Lines of `level` to skip back from the newest one
        offset_from_end: i64,
        /// Lines per page
        line_count: i64,
        /// Minimum severity
        level: LogLevel,
        /// Reply channel
        response: oneshot::Sender<Result<Page>>,
    },
    /// Read the newest records of a level.
    Tail {
        /// Records of `level` to return
        line_count: usize,
        /// Minimum severity
        level: LogLevel,
        /// Reply channel
        response: oneshot::Sender<Result<Page>>,
    },
    /// Index appended lines and count those at or above `level`.
    Refresh {
        /// Minimum severity to count
        level: LogLevel,
        /// Reply channel
        response: oneshot::Sender<Result<usize>>,
    },
}

/// The processing loop that owns a [`LogStore`].
pub struct QueryActor {
    store: LogStore,
    requests: mpsc::Receiver<LogRequest>,
    shutdown_rx: ShutdownRx,
}

impl QueryActor {
    /// Spawns the actor on the current runtime.
    ///
    /// The actor stops on [`QueryHandle::shutdown`] or once every handle is
    /// dropped, closing the store on the way out.
    #[must_use]
    pub fn spawn(store: LogStore) -> (QueryHandle, JoinHandle<()>) {
        Self::spawn_with_capacity(store, DEFAULT_QUEUE_CAPACITY)
    }

    /// Spawns the actor with a custom request queue capacity.
    #[must_use]
    pub fn spawn_with_capacity(store: LogStore, capacity: usize) -> (QueryHandle, JoinHandle<()>) {
        let (request_tx, request_rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let actor = Self {
            store,
            requests: request_rx,
            shutdown_rx,
        };
        let handle = QueryHandle {
            requests: request_tx,
            shutdown_tx,
        };

        (handle, tokio::spawn(actor.run()))
    }

    async fn run(mut self) {
        let mut store = self.store;
        info!("query actor started");

        loop {
            let request = tokio::select! {
                request = self.requests.recv() => {
                    if let Some(request) = request {
                        request
                    } else {
                        debug!("all query handles dropped");
                        break;
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping query actor");
                    break;
                }
            };

            if let Some(next) = process(store, request).await {
                store = next;
            } else {
                self.requests.close();
                return;
            }
        }

        self.requests.close();
        store.close();
        info!("query actor stopped");
    }
}

/// Runs one request against the store. Returns `None` if the store was lost.
async fn process(store: LogStore, request: LogRequest) -> Option<LogStore> {
    match request {
        LogRequest::Open { path, response } => {
            let (store, result) = on_blocking_pool(store, move |s| s.open(&path)).await?;
            if let Err(e) = &result {
                warn!(error = %e, "failed to open log file");
            }
            let _ = response.send(result);
            Some(store)
        }
        LogRequest::Get {
            offset_from_end,
            line_count,
            level,
            response,
        } => {
            let (store, result) =
                on_blocking_pool(store, move |s| s.get(offset_from_end, line_count, level)).await?;
            let _ = response.send(result);
            Some(store)
        }
        LogRequest::Tail {
            line_count,
            level,
            response,
        } => {
            let (store, result) = on_blocking_pool(store, move |s| s.tail(line_count, level)).await?;
            let _ = response.send(result);
            Some(store)
        }
        LogRequest::Refresh { level, response } => {
            let (store, result) = on_blocking_pool(store, move |s| s.refresh(level)).await?;
            let _ = response.send(result);
            Some(store)
        }
    }
}

/// Moves the store onto the blocking pool for one operation and back.
///
/// A panic inside `op` loses the store; the reply channel is dropped with it
/// and the caller sees [`LogError::ActorStopped`].
async fn on_blocking_pool<T, F>(mut store: LogStore, op: F) -> Option<(LogStore, Result<T>)>
where
    T: Send + 'static,
    F: FnOnce(&mut LogStore) -> Result<T> + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || {
        let result = op(&mut store);
        (store, result)
    })
    .await;

    match joined {
        Ok(done) => Some(done),
        Err(e) => {
            error!(error = %e, "store operation panicked, stopping query actor");
            None
        }
    }
}

/// Cloneable handle to a running [`QueryActor`].
#[derive(Debug, Clone)]
pub struct QueryHandle {
    requests: mpsc::Sender<LogRequest>,
    shutdown_tx: ShutdownTx,
}

impl QueryHandle {
    /// Opens a log file in the actor's store.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Io`] if the file cannot be opened, or
    /// [`LogError::ActorStopped`] if the actor is gone.
    pub async fn open(&self, path: impl Into<PathBuf>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(LogRequest::Open {
            path: path.into(),
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| LogError::ActorStopped)?
    }

    /// Reads a page; see [`LogStore::get`].
    ///
    /// # Errors
    ///
    /// Returns the store's error, or [`LogError::ActorStopped`] if the actor
    /// is gone.
    pub async fn get(&self, offset_from_end: i64, line_count: i64, level: LogLevel) -> Result<Page> {
        let (tx, rx) = oneshot::channel();
        self.send(LogRequest::Get {
            offset_from_end,
            line_count,
            level,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| LogError::ActorStopped)?
    }

    /// Reads the newest records; see [`LogStore::tail`].
    ///
    /// # Errors
    ///
    /// Returns the store's error, or [`LogError::ActorStopped`] if the actor
    /// is gone.
    pub async fn tail(&self, level: LogLevel, line_count: usize) -> Result<Page> {
        let (tx, rx) = oneshot::channel();
        self.send(LogRequest::Tail {
            line_count,
            level,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| LogError::ActorStopped)?
    }

    /// Indexes appended lines; see [`LogStore::refresh`].
    ///
    /// # Errors
    ///
    /// Returns the store's error, or [`LogError::ActorStopped`] if the actor
    /// is gone.
    pub async fn refresh(&self, level: LogLevel) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(LogRequest::Refresh { level, response: tx }).await?;
        rx.await.map_err(|_| LogError::ActorStopped)?
    }

    /// Streams lines of at least `level` as they are appended.
    ///
    /// Every `interval` a background task asks the actor for new lines and
    /// forwards them as a [`Page`] whose `new_lines` is the number of lines
    /// in it. At most `max_lines` are sent per page. Errors are forwarded
    /// too. The task stops when the receiver is dropped or the actor stops.
    #[must_use]
    pub fn follow(
        &self,
        level: LogLevel,
        max_lines: usize,
        interval: Duration,
    ) -> mpsc::Receiver<Result<Page>> {
        let (tx, rx) = mpsc::channel(16);
        let handle = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Lines indexed by the previous page read but not yet sent.
            let mut pending = 0usize;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = tx.closed() => break,
                }

                let page = match handle.refresh(level).await {
                    Ok(fresh) => {
                        let count = (pending + fresh).min(max_lines);
                        pending = 0;
                        if count == 0 {
                            continue;
                        }
                        handle.tail(level, count).await.map(|page| {
                            pending = page.new_lines;
                            Page {
                                body: page.body,
                                new_lines: count,
                            }
                        })
                    }
                    Err(e) => Err(e),
                };

                let stopped = matches!(page, Err(LogError::ActorStopped));
                if tx.send(page).await.is_err() || stopped {
                    break;
                }
            }
            debug!(%level, "follow task finished");
        });

        rx
    }

    /// Signals the actor to stop. Later requests fail with
    /// [`LogError::ActorStopped`].
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Returns true once the actor no longer accepts requests.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.requests.is_closed()
    }

    // ========== Internal Methods ==========

    async fn send(&self, request: LogRequest) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| LogError::ActorStopped)
    }
}
