//! Process-wide logging setup. During the round loop the controller enables
//! buffering so that hot-path log lines accumulate in memory and are flushed
//! wholesale during cleanup.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

static BUFFERING: AtomicBool = AtomicBool::new(false);
static BUFFER: Mutex<Vec<u8>> = Mutex::new(Vec::new());

/// Installs the global subscriber: `RUST_LOG` wins, otherwise the configured
/// level. Safe to call more than once; later calls are no-ops.
pub fn init(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(|| LogWriter)
        .try_init();
}

/// Toggles in-memory buffering of log output. Turning buffering off flushes
/// everything accumulated so far.
pub fn set_buffering(enabled: bool) {
    let was_enabled = BUFFERING.swap(enabled, Ordering::SeqCst);
    if was_enabled && !enabled {
        // the lock is never poisoned: no code panics while holding it
        let mut buffer = BUFFER.lock().unwrap();
        if !buffer.is_empty() {
            let mut stderr = io::stderr().lock();
            let _ = stderr.write_all(&buffer);
            let _ = stderr.flush();
            buffer.clear();
        }
    }
}

#[derive(Debug)]
struct LogWriter;

impl Write for LogWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        if BUFFERING.load(Ordering::Relaxed) {
            BUFFER.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        } else {
            io::stderr().write(bytes)
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if BUFFERING.load(Ordering::Relaxed) {
            Ok(())
        } else {
            io::stderr().flush()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // single test: the buffering switch and its backing buffer are global
    #[test]
    fn buffered_writes_are_held_then_flushed() {
        set_buffering(true);
        LogWriter.write_all(b"round 1 done\n").unwrap();
        assert!(!BUFFER.lock().unwrap().is_empty());
        set_buffering(false);
        assert!(BUFFER.lock().unwrap().is_empty());
    }
}
