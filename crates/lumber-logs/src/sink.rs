//! Asynchronous, bounded log writer.
//!
//! [`AsyncSink`] puts a bounded queue in front of any [`Write`] target. One
//! worker thread drains it in arrival order. Producers either wait for room
//! ([`SinkPolicy::Blocking`]) or discard the payload
//! ([`SinkPolicy::Dropping`]).
//!
//! After [`AsyncSink::fatal_shutdown`], a payload carrying the fatal marker
//! makes the producer pause for the grace period while the worker writes
//! it, flushes the target and runs the exit action. If the worker has not
//! run it by the end of the pause (the payload was dropped, the sink was
//! already finalized, or the target stalls), the producer runs it. The exit
//! action runs at most once per sink.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::error::Result;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default pause of a producer after submitting a fatal record.
pub const DEFAULT_FATAL_GRACE: Duration = Duration::from_secs(5);

/// Exit code used by the default exit action.
pub const FATAL_EXIT_CODE: i32 = 10;

/// Tracing target of the sink's own events.
///
/// A layer that writes into a sink must skip this target, or a failing
/// target would feed its own error reports back into the queue.
pub const TARGET: &str = module_path!();

/// Marker identifying a fatal record in a serialized payload.
const FATAL_MARKER: &[u8] = b"\"level\":\"fatal\"";

/// What a producer does when the queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SinkPolicy {
    /// Wait for room; nothing is lost.
    #[default]
    Blocking,
    /// Discard the payload without an error.
    Dropping,
}

/// Configuration for an [`AsyncSink`].
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Queue capacity, at least 1.
    pub capacity: usize,
    /// Full-queue behaviour.
    pub policy: SinkPolicy,
    /// How long a producer pauses after a fatal record once armed.
    pub fatal_grace: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            policy: SinkPolicy::Blocking,
            fatal_grace: DEFAULT_FATAL_GRACE,
        }
    }
}

impl SinkConfig {
    /// Creates the default config for a policy.
    #[must_use]
    pub fn new(policy: SinkPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Sets the queue capacity.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the fatal grace period.
    #[must_use]
    pub const fn with_fatal_grace(mut self, grace: Duration) -> Self {
        self.fatal_grace = grace;
        self
    }
}

/// Outcome of [`AsyncSink::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The payload is queued and will be written.
    Queued,
    /// The queue was full and the payload was discarded.
    Dropped,
    /// The sink is finalized; nothing was queued.
    Closed,
}

/// Counters of an [`AsyncSink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Payloads accepted into the queue.
    pub queued: u64,
    /// Payloads discarded on a full queue.
    pub dropped: u64,
    /// Payloads written to the target.
    pub written: u64,
    /// Payloads the target failed to write.
    pub failed: u64,
}

/// Action run by the worker after a fatal record is written.
pub type ExitAction = Arc<dyn Fn(i32) + Send + Sync>;

/// How submitted payloads are enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnqueueStrategy {
    Plain,
    FatalChecking,
}

struct SinkState {
    /// `None` once finalized.
    sender: Option<SyncSender<Vec<u8>>>,
    strategy: EnqueueStrategy,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

/// A bounded, single-worker writer.
pub struct AsyncSink {
    state: RwLock<SinkState>,
    policy: SinkPolicy,
    fatal_grace: Duration,
    fatal_armed: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
    exit: ExitAction,
    counters: Arc<Counters>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for AsyncSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSink")
            .field("policy", &self.policy)
            .field("fatal_grace", &self.fatal_grace)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl AsyncSink {
    /// Starts a sink over `target` that exits the process on fatal records.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn new<W>(target: W, config: SinkConfig) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        Self::with_exit_action(target, config, Arc::new(|code| std::process::exit(code)))
    }

    /// Starts a sink with a custom action for fatal records.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn with_exit_action<W>(target: W, config: SinkConfig, exit: ExitAction) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(config.capacity.max(1));
        let fatal_armed = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        let worker = Worker {
            target,
            fatal_armed: Arc::clone(&fatal_armed),
            exited: Arc::clone(&exited),
            counters: Arc::clone(&counters),
            exit: Arc::clone(&exit),
        };
        let handle = thread::Builder::new()
            .name("lumber-sink".to_owned())
            .spawn(move || worker.run(&rx))?;

        debug!(capacity = config.capacity, policy = ?config.policy, "sink started");

        Ok(Self {
            state: RwLock::new(SinkState {
                sender: Some(tx),
                strategy: EnqueueStrategy::Plain,
            }),
            policy: config.policy,
            fatal_grace: config.fatal_grace,
            fatal_armed,
            exited,
            exit,
            counters,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Queues a copy of `payload` for the worker.
    ///
    /// Never fails: a full dropping queue yields [`Delivery::Dropped`] and a
    /// finalized sink yields [`Delivery::Closed`]. Once the fatal path is
    /// armed, a fatal payload does not return before the exit action ran.
    pub fn submit(&self, payload: &[u8]) -> Delivery {
        let state = self.state.read();
        let delivery = match state.sender.as_ref() {
            Some(sender) => self.enqueue(sender, payload),
            None => Delivery::Closed,
        };
        let fatal = state.strategy == EnqueueStrategy::FatalChecking && is_fatal(payload);
        drop(state);

        if fatal {
            if delivery != Delivery::Closed {
                warn!(grace = ?self.fatal_grace, "fatal record submitted, waiting for shutdown");
                thread::sleep(self.fatal_grace);
            }
            self.fatal_exit();
        }
        delivery
    }

    /// Arms the fatal path: the next fatal record ends the process.
    pub fn fatal_shutdown(&self) {
        let mut state = self.state.write();
        state.strategy = EnqueueStrategy::FatalChecking;
        self.fatal_armed.store(true, Ordering::SeqCst);
    }

    /// Closes the queue and waits for the worker to write everything queued.
    ///
    /// Later submits return [`Delivery::Closed`]. Calling it again is a no-op.
    pub fn finalize(&self) {
        let sender = self.state.write().sender.take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!("sink worker panicked");
            }
        }
        debug!(stats = ?self.stats(), "sink finalized");
    }

    /// Returns true once [`Self::finalize`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.read().sender.is_none()
    }

    /// Runs the exit action with [`FATAL_EXIT_CODE`] unless it already ran.
    pub fn fatal_exit(&self) {
        if !self.exited.swap(true, Ordering::SeqCst) {
            (self.exit)(FATAL_EXIT_CODE);
        }
    }

    /// Returns true once the exit action has run.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> SinkStats {
        SinkStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl AsyncSink {
    fn enqueue(&self, sender: &SyncSender<Vec<u8>>, payload: &[u8]) -> Delivery {
        let delivery = match self.policy {
            SinkPolicy::Blocking => match sender.send(payload.to_vec()) {
                Ok(()) => Delivery::Queued,
                Err(_) => Delivery::Closed,
            },
            SinkPolicy::Dropping => match sender.try_send(payload.to_vec()) {
                Ok(()) => Delivery::Queued,
                Err(TrySendError::Full(_)) => Delivery::Dropped,
                Err(TrySendError::Disconnected(_)) => Delivery::Closed,
            },
        };

        match delivery {
            Delivery::Queued => self.counters.queued.fetch_add(1, Ordering::Relaxed),
            Delivery::Dropped => self.counters.dropped.fetch_add(1, Ordering::Relaxed),
            Delivery::Closed => 0,
        };
        delivery
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl Write for &AsyncSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.submit(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn is_fatal(payload: &[u8]) -> bool {
    payload
        .windows(FATAL_MARKER.len())
        .any(|window| window == FATAL_MARKER)
}

struct Worker<W> {
    target: W,
    fatal_armed: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
    counters: Arc<Counters>,
    exit: ExitAction,
}

impl<W: Write> Worker<W> {
    fn run(mut self, rx: &Receiver<Vec<u8>>) {
        while let Ok(payload) = rx.recv() {
            match self.target.write_all(&payload) {
                Ok(()) => {
                    self.counters.written.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, bytes = payload.len(), "sink target write failed");
                }
            }

            if self.fatal_armed.load(Ordering::SeqCst)
                && is_fatal(&payload)
                && !self.exited.swap(true, Ordering::SeqCst)
            {
                if let Err(e) = self.target.flush() {
                    error!(error = %e, "sink target flush failed");
                }
                (self.exit)(FATAL_EXIT_CODE);
            }
        }

        if let Err(e) = self.target.flush() {
            error!(error = %e, "sink target flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Condvar;
    use std::time::Instant;

    /// In-memory target shared with the test.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Target that stalls every write until the gate opens.
    #[derive(Clone, Default)]
    struct GatedWriter {
        gate: Arc<(Mutex<bool>, Condvar)>,
        entered: Arc<AtomicBool>,
        out: SharedBuf,
    }

    impl GatedWriter {
        /// Waits until the worker is stuck inside a write.
        fn wait_entered(&self) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !self.entered.load(Ordering::SeqCst) {
                assert!(Instant::now() < deadline, "worker never started writing");
                thread::sleep(Duration::from_millis(1));
            }
        }

        fn open(&self) {
            let (lock, cvar) = &*self.gate;
            *lock.lock() = true;
            cvar.notify_all();
        }
    }

    impl Write for GatedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.entered.store(true, Ordering::SeqCst);
            let (lock, cvar) = &*self.gate;
            let mut open = lock.lock();
            while !*open {
                cvar.wait(&mut open);
            }
            drop(open);
            self.out.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn no_exit() -> ExitAction {
        Arc::new(|_| {})
    }

    /// Exit action that records every exit code it is called with.
    fn recording_exit() -> (ExitAction, Arc<Mutex<Vec<i32>>>) {
        let codes = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&codes);
        (Arc::new(move |code| seen.lock().push(code)), codes)
    }

    const FATAL_LINE: &[u8] = b"{\"level\":\"fatal\",\"message\":\"disk gone\"}\n";

    fn numbered(i: usize) -> Vec<u8> {
        format!("{{\"level\":\"info\",\"message\":\"{i}\"}}\n").into_bytes()
    }

    #[test]
    fn dropping_sink_never_blocks_on_full_queue() {
        let target = GatedWriter::default();
        let config = SinkConfig::new(SinkPolicy::Dropping);
        let sink = AsyncSink::with_exit_action(target.clone(), config, no_exit()).expect("sink");

        let deliveries: Vec<Delivery> = (0..150).map(|i| sink.submit(&numbered(i))).collect();
        let stats = sink.stats();

        assert!(deliveries.iter().all(|d| *d != Delivery::Closed));
        assert_eq!(stats.queued + stats.dropped, 150);
        // queue capacity plus the one payload stalled inside the worker
        assert!(stats.queued >= 100 && stats.queued <= 101, "queued {}", stats.queued);

        target.open();
        sink.finalize();
        assert_eq!(sink.stats().written, stats.queued);
        assert!(target.out.contents().starts_with("{\"level\":\"info\",\"message\":\"0\"}"));
    }

    #[test]
    fn blocking_sink_waits_and_delivers_everything() {
        let target = GatedWriter::default();
        let sink = Arc::new(
            AsyncSink::with_exit_action(target.clone(), SinkConfig::default(), no_exit())
                .expect("sink"),
        );

        let producer = {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                for i in 0..150 {
                    assert_eq!(sink.submit(&numbered(i)), Delivery::Queued);
                }
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!producer.is_finished());
        assert!(sink.stats().queued <= 101);

        target.open();
        producer.join().expect("producer");
        sink.finalize();

        let stats = sink.stats();
        assert_eq!(stats.written, 150);
        assert_eq!(stats.dropped, 0);
        let expected: String = (0..150)
            .map(|i| String::from_utf8_lossy(&numbered(i)).into_owned())
            .collect();
        assert_eq!(target.out.contents(), expected);
    }

    #[test]
    fn finalize_delivers_queued_then_closes() {
        let out = SharedBuf::default();
        let sink = AsyncSink::with_exit_action(out.clone(), SinkConfig::default(), no_exit())
            .expect("sink");

        for i in 0..500 {
            sink.submit(&numbered(i));
        }
        sink.finalize();
        assert_eq!(out.contents().lines().count(), 500);
        assert!(sink.is_closed());

        assert_eq!(sink.submit(b"late\n"), Delivery::Closed);
        sink.finalize();
        assert_eq!(out.contents().lines().count(), 500);
        assert_eq!(sink.stats().written, 500);
    }

    #[test]
    fn write_reports_full_length_even_when_closed() {
        let out = SharedBuf::default();
        let sink = AsyncSink::with_exit_action(out.clone(), SinkConfig::default(), no_exit())
            .expect("sink");

        assert_eq!((&sink).write(b"one\n").expect("write"), 4);
        sink.finalize();
        assert_eq!((&sink).write(b"two\n").expect("write"), 4);
        assert_eq!(out.contents(), "one\n");
    }

    #[test]
    fn target_failures_are_counted_not_fatal() {
        let sink = AsyncSink::with_exit_action(FailingWriter, SinkConfig::default(), no_exit())
            .expect("sink");
        sink.submit(b"a\n");
        sink.submit(b"b\n");
        sink.finalize();

        let stats = sink.stats();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.written, 0);
    }

    #[test]
    fn fatal_record_without_arming_does_not_exit() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);
        let exit: ExitAction = Arc::new(move |_| flag.store(true, Ordering::SeqCst));

        let sink = AsyncSink::with_exit_action(SharedBuf::default(), SinkConfig::default(), exit)
            .expect("sink");
        sink.submit(b"{\"level\":\"fatal\",\"message\":\"x\"}\n");
        sink.finalize();
        assert!(!exited.load(Ordering::SeqCst));
    }

    #[test]
    fn fatal_shutdown_pauses_producer_and_runs_exit_action() {
        let (exit, codes) = recording_exit();
        let out = SharedBuf::default();
        let grace = Duration::from_millis(300);
        let config = SinkConfig::default().with_fatal_grace(grace);
        let sink = AsyncSink::with_exit_action(out.clone(), config, exit).expect("sink");

        sink.fatal_shutdown();

        let started = Instant::now();
        sink.submit(b"{\"level\":\"info\",\"message\":\"before\"}\n");
        assert!(started.elapsed() < grace);
        assert!(codes.lock().is_empty());

        let started = Instant::now();
        assert_eq!(sink.submit(FATAL_LINE), Delivery::Queued);
        assert!(started.elapsed() >= grace);
        assert!(out.contents().contains("disk gone"));

        sink.finalize();
        // the worker ran it; the producer must not run it again
        assert_eq!(*codes.lock(), vec![FATAL_EXIT_CODE]);
        assert!(sink.has_exited());
    }

    #[test]
    fn dropped_fatal_record_still_exits_after_grace() {
        let (exit, codes) = recording_exit();
        let target = GatedWriter::default();
        let grace = Duration::from_millis(100);
        let config = SinkConfig::new(SinkPolicy::Dropping)
            .with_capacity(1)
            .with_fatal_grace(grace);
        let sink = AsyncSink::with_exit_action(target.clone(), config, exit).expect("sink");

        // one payload stuck in the worker, one filling the queue
        assert_eq!(sink.submit(&numbered(0)), Delivery::Queued);
        target.wait_entered();
        assert_eq!(sink.submit(&numbered(1)), Delivery::Queued);
        assert_eq!(sink.submit(&numbered(2)), Delivery::Dropped);

        sink.fatal_shutdown();
        let started = Instant::now();
        assert_eq!(sink.submit(FATAL_LINE), Delivery::Dropped);
        assert!(started.elapsed() >= grace);
        assert_eq!(*codes.lock(), vec![FATAL_EXIT_CODE]);

        target.open();
        sink.finalize();
        assert_eq!(*codes.lock(), vec![FATAL_EXIT_CODE]);
        assert!(!target.out.contents().contains("disk gone"));
    }

    #[test]
    fn stalled_target_exits_once_after_grace() {
        let (exit, codes) = recording_exit();
        let target = GatedWriter::default();
        let grace = Duration::from_millis(100);
        let config = SinkConfig::default().with_fatal_grace(grace);
        let sink = AsyncSink::with_exit_action(target.clone(), config, exit).expect("sink");

        sink.fatal_shutdown();
        assert_eq!(sink.submit(FATAL_LINE), Delivery::Queued);
        assert_eq!(*codes.lock(), vec![FATAL_EXIT_CODE]);

        // the worker writes it later but does not exit a second time
        target.open();
        sink.finalize();
        assert!(target.out.contents().contains("disk gone"));
        assert_eq!(*codes.lock(), vec![FATAL_EXIT_CODE]);
    }

    #[test]
    fn fatal_record_on_finalized_sink_exits_without_pause() {
        let (exit, codes) = recording_exit();
        let config = SinkConfig::default().with_fatal_grace(Duration::from_secs(30));
        let sink = AsyncSink::with_exit_action(SharedBuf::default(), config, exit).expect("sink");
        sink.finalize();

        sink.fatal_shutdown();
        let started = Instant::now();
        assert_eq!(sink.submit(FATAL_LINE), Delivery::Closed);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(*codes.lock(), vec![FATAL_EXIT_CODE]);
    }

    #[test]
    fn fatal_marker_detection() {
        assert!(is_fatal(b"{\"level\":\"fatal\",\"message\":\"x\"}"));
        assert!(is_fatal(b"{\"time\":\"t\",\"level\":\"fatal\"}"));
        assert!(!is_fatal(b"{\"level\":\"error\",\"message\":\"fatal\"}"));
        assert!(!is_fatal(b""));
    }
}
