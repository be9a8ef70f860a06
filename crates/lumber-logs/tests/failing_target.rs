//! A sink whose target always fails, installed behind the global
//! `JsonLineLayer`, as `lumber --log-file` does on a full disk.
//!
//! Kept in its own test binary because it installs a global subscriber.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use lumber_logs::{AsyncSink, JsonLineLayer, SinkConfig};
use tracing_subscriber::prelude::*;

struct FullDisk;

impl Write for FullDisk {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("no space left on device"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn write_failures_do_not_feed_back_into_the_sink() {
    let sink = Arc::new(
        AsyncSink::with_exit_action(FullDisk, SinkConfig::default(), Arc::new(|_| {}))
            .expect("sink"),
    );
    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(JsonLineLayer::new("lumber", Arc::clone(&sink))),
    )
    .expect("global subscriber");

    tracing::info!("first");
    thread::sleep(Duration::from_millis(300));
    let stats = sink.stats();
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.failed, 1);

    // a burst larger than the queue must still drain and finalize
    for i in 0..200u64 {
        tracing::info!(i, "burst");
    }
    let (done_tx, done_rx) = mpsc::channel();
    let finisher = {
        let sink = Arc::clone(&sink);
        thread::spawn(move || {
            sink.finalize();
            let _ = done_tx.send(());
        })
    };
    done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("finalize returns");
    finisher.join().expect("finisher");

    let stats = sink.stats();
    assert_eq!(stats.queued, 201);
    assert_eq!(stats.failed, 201);
    assert_eq!(stats.written, 0);
}
