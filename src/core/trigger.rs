//! Hardware trigger pulses on a dedicated worker thread.
//!
//! The presentation loop only ever pushes codes into a FIFO channel; the
//! worker asserts each code, holds it, resets the line and holds again before
//! taking the next message, so pulses keep `send` order and never overlap.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek as _, SeekFrom, Write as _};
use std::path::Path;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

pub type TriggerCode = u16;

/// Idle level of the trigger line.
pub const RESET_PINS: TriggerCode = 0;
/// Sent once when the run starts.
pub const START_LISTENING: TriggerCode = 255;
/// Sent once when the run ends.
pub const STOP_LISTENING: TriggerCode = 256;

/// Something that can put an integer code on the trigger line.
pub trait TriggerSink: Send + 'static {
    fn emit(&mut self, code: TriggerCode) -> io::Result<()>;
}

impl<F> TriggerSink for F
where
    F: FnMut(TriggerCode) -> io::Result<()> + Send + 'static,
{
    fn emit(&mut self, code: TriggerCode) -> io::Result<()> {
        self(code)
    }
}

/// Writes codes as single bytes at `address` of a port device (e.g. `/dev/port`).
#[derive(Debug)]
pub struct PortSink {
    file: File,
    address: u64,
}

impl PortSink {
    pub fn open(device: &Path, address: u64) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).open(device)?;
        Ok(Self { file, address })
    }
}

impl TriggerSink for PortSink {
    fn emit(&mut self, code: TriggerCode) -> io::Result<()> {
        let byte = (code & 0xff) as u8;
        if TriggerCode::from(byte) != code {
            warn!("Trigger code {} does not fit the port; sending {}", code, byte);
        }
        self.file.seek(SeekFrom::Start(self.address))?;
        self.file.write_all(&[byte])?;
        self.file.flush()
    }
}

/// Dry-run sink: only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TriggerSink for LogSink {
    fn emit(&mut self, code: TriggerCode) -> io::Result<()> {
        info!("trigger {}", code);
        Ok(())
    }
}

#[derive(Debug)]
enum Message {
    Code(TriggerCode),
    Shutdown,
}

pub struct TriggerDispatcher {
    tx: Option<mpsc::Sender<Message>>,
    worker: Option<JoinHandle<()>>,
}

impl TriggerDispatcher {
    /// A dispatcher that drops every code and owns no thread.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            worker: None,
        }
    }

    pub fn spawn(sink: impl TriggerSink, half_width: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Message>();

        let worker = thread::Builder::new()
            .name("schizoid-trigger".to_string())
            .spawn(move || run_worker(rx, sink, half_width))?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Identifier of the worker thread, for the `sys` block of the record.
    pub fn worker_id(&self) -> Option<String> {
        self.worker.as_ref().map(|w| format!("{:?}", w.thread().id()))
    }

    /// Queues `code` and returns immediately.
    pub fn send(&self, code: TriggerCode) -> Result<()> {
        match &self.tx {
            Some(tx) => tx.send(Message::Code(code)).map_err(|_| Error::DispatcherChannel),
            None => Ok(()),
        }
    }

    /// Queues the shutdown sentinel behind any pending codes and waits for
    /// the worker to exit. Calling it again is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        let sent = match self.tx.take() {
            Some(tx) => tx.send(Message::Shutdown).map_err(|_| Error::DispatcherChannel),
            None => Ok(()),
        };
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| Error::DispatcherChannel)?;
        }
        sent
    }
}

impl Drop for TriggerDispatcher {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Trigger worker shutdown failed: {}", e);
        }
    }
}

fn run_worker(rx: mpsc::Receiver<Message>, mut sink: impl TriggerSink, half_width: Duration) {
    while let Ok(msg) = rx.recv() {
        let code = match msg {
            Message::Code(code) => code,
            Message::Shutdown => break,
        };
        if let Err(e) = sink.emit(code) {
            error!("Failed to assert trigger {}: {}", code, e);
        }
        thread::sleep(half_width);
        if let Err(e) = sink.emit(RESET_PINS) {
            error!("Failed to reset trigger line: {}", e);
        }
        thread::sleep(half_width);
    }
    debug!("Trigger worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    type Log = Arc<Mutex<Vec<(TriggerCode, Instant)>>>;

    fn recording_sink() -> (Log, impl TriggerSink) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&log);
        let sink = move |code: TriggerCode| -> io::Result<()> {
            sink_log.lock().unwrap().push((code, Instant::now()));
            Ok(())
        };
        (log, sink)
    }

    #[test]
    fn pulses_keep_order_and_do_not_overlap() {
        let half = Duration::from_millis(10);
        let (log, sink) = recording_sink();
        let mut dispatcher = TriggerDispatcher::spawn(sink, half).unwrap();
        assert!(dispatcher.worker_id().is_some());

        let started = Instant::now();
        for code in [11, 12, 13] {
            dispatcher.send(code).unwrap();
        }
        // Sending never waits on the hardware.
        assert!(started.elapsed() < half);

        dispatcher.shutdown().unwrap();

        let events = log.lock().unwrap().clone();
        let codes: Vec<TriggerCode> = events.iter().map(|(c, _)| *c).collect();
        assert_eq!(codes, vec![11, RESET_PINS, 12, RESET_PINS, 13, RESET_PINS]);
        for pair in events.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= half);
        }

        thread::sleep(half * 3);
        assert_eq!(log.lock().unwrap().len(), 6);
    }

    #[test]
    fn shutdown_is_idempotent_and_later_sends_are_dropped() {
        let (_log, sink) = recording_sink();
        let mut dispatcher = TriggerDispatcher::spawn(sink, Duration::from_millis(1)).unwrap();
        dispatcher.shutdown().unwrap();
        dispatcher.shutdown().unwrap();
        assert!(!dispatcher.is_enabled());
        // Once shut down the dispatcher behaves like a disabled one.
        assert!(dispatcher.send(1).is_ok());
    }

    #[test]
    fn disabled_dispatcher_is_a_no_op() {
        let mut dispatcher = TriggerDispatcher::disabled();
        assert!(!dispatcher.is_enabled());
        assert!(dispatcher.worker_id().is_none());
        dispatcher.send(42).unwrap();
        dispatcher.shutdown().unwrap();
    }

    #[test]
    fn sink_errors_do_not_stop_the_worker() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&log);
        let sink = move |code: TriggerCode| -> io::Result<()> {
            if code == 7 {
                return Err(io::Error::other("line busy"));
            }
            sink_log.lock().unwrap().push((code, Instant::now()));
            Ok(())
        };
        let mut dispatcher = TriggerDispatcher::spawn(sink, Duration::from_millis(1)).unwrap();
        dispatcher.send(7).unwrap();
        dispatcher.send(8).unwrap();
        dispatcher.shutdown().unwrap();

        let codes: Vec<TriggerCode> = log.lock().unwrap().iter().map(|(c, _)| *c).collect();
        assert_eq!(codes, vec![RESET_PINS, 8, RESET_PINS]);
    }

    #[test]
    fn port_sink_writes_low_byte_at_address() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("port");
        std::fs::write(&device, [0u8; 8]).unwrap();

        let mut sink = PortSink::open(&device, 3).unwrap();
        sink.emit(STOP_LISTENING + 5).unwrap();
        sink.emit(START_LISTENING).unwrap();
        let bytes = std::fs::read(&device).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 255, 0, 0, 0, 0]);
    }
}
