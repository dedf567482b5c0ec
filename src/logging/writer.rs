//! Log sinks.
//!
//! The async writer drains a bounded channel on a dedicated thread.
//! When the queue is full the caller writes synchronously instead: the
//! logger never blocks on the channel and never drops a record.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender, TrySendError};

type SharedSink = Arc<Mutex<Box<dyn Write + Send>>>;

fn write_line(sink: &SharedSink, line: &str) {
    let mut writer = match sink.lock() {
        Ok(writer) => writer,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Err(err) = writeln!(writer, "{line}") {
        eprintln!("log write error: {err}");
    }
}

enum Message {
    Line(String),
    Shutdown,
}

/// Bounded-queue writer with a single worker thread.
pub struct AsyncLogWriter {
    tx: Sender<Message>,
    sink: SharedSink,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl AsyncLogWriter {
    pub fn new(writer: Box<dyn Write + Send>, capacity: usize) -> Self {
        let sink: SharedSink = Arc::new(Mutex::new(writer));
        let (tx, rx) = bounded(capacity.max(1));
        let worker_sink = Arc::clone(&sink);
        let handle = std::thread::spawn(move || {
            while let Ok(message) = rx.recv() {
                match message {
                    Message::Line(line) => write_line(&worker_sink, &line),
                    Message::Shutdown => break,
                }
            }
            // Drain anything that raced in behind the shutdown signal.
            while let Ok(Message::Line(line)) = rx.try_recv() {
                write_line(&worker_sink, &line);
            }
        });
        Self {
            tx,
            sink,
            worker: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a line; fall back to a synchronous write when the queue
    /// is full or the writer is closed.
    pub fn write(&self, line: String) {
        if self.closed.load(Ordering::Acquire) {
            write_line(&self.sink, &line);
            return;
        }
        match self.tx.try_send(Message::Line(line)) {
            Ok(()) => {}
            Err(TrySendError::Full(Message::Line(line)))
            | Err(TrySendError::Disconnected(Message::Line(line))) => {
                write_line(&self.sink, &line);
            }
            Err(_) => {}
        }
    }

    /// Signal the worker, wait for the queue to drain, and join it.
    /// Idempotent: later calls are no-ops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.tx.send(Message::Shutdown);
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for AsyncLogWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// An in-memory sink that can be inspected after logging; test support.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().unwrap()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_drained_by_the_worker() {
        let buffer = SharedBuffer::new();
        let writer = AsyncLogWriter::new(Box::new(buffer.clone()), 64);
        for i in 0..10 {
            writer.write(format!("line {i}"));
        }
        writer.close();

        let lines = buffer.lines();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "line 0");
        assert_eq!(lines[9], "line 9");
    }

    #[test]
    fn full_queue_falls_back_to_sync_write() {
        let buffer = SharedBuffer::new();
        let writer = AsyncLogWriter::new(Box::new(buffer.clone()), 1);
        // Flood well past the capacity; nothing may be lost.
        for i in 0..100 {
            writer.write(format!("line {i}"));
        }
        writer.close();
        assert_eq!(buffer.lines().len(), 100);
    }

    #[test]
    fn close_is_idempotent_and_later_writes_go_sync() {
        let buffer = SharedBuffer::new();
        let writer = AsyncLogWriter::new(Box::new(buffer.clone()), 8);
        writer.write("before".to_string());
        writer.close();
        writer.close();
        writer.write("after".to_string());

        let lines = buffer.lines();
        assert_eq!(lines, vec!["before", "after"]);
    }
}
