//! Log sinks, resolved from URI-style output paths.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::Error;

const MEMORY_SCHEME: &str = "memory://";

/// Process-wide name registry for in-memory sinks, so that configuration
/// strings like `memory://requests` can refer to a buffer a test holds.
static MEMORY_SINKS: Lazy<Mutex<HashMap<String, MemorySink>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// An in-memory log sink for tests.
///
/// Records are written as newline-separated JSON objects into a shared
/// buffer. Register a sink under a name, point a
/// [`LoggerConfig`](crate::LoggerConfig) output path at `memory://<name>`,
/// and read back what was emitted with [`records`](Self::records).
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    /// Register a sink under `name` and return it. Registering the same name
    /// again returns a handle to the same buffer.
    pub fn register(name: &str) -> MemorySink {
        let mut sinks = MEMORY_SINKS
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sinks.entry(name.to_owned()).or_default().clone()
    }

    fn lookup(name: &str) -> Option<MemorySink> {
        let sinks = MEMORY_SINKS
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sinks.get(name).cloned()
    }

    /// Parse the buffered records.
    ///
    /// # Panics
    ///
    /// Panics on malformed JSON; this type exists for test assertions, and a
    /// malformed record is a failure worth surfacing loudly.
    pub fn records(&self) -> Vec<Value> {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        let text = String::from_utf8(buf.clone()).expect("memory sink holds invalid utf-8");
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .unwrap_or_else(|_| panic!("bad JSON in log line: {line}"))
            })
            .collect()
    }

    /// Discard everything buffered so far.
    pub fn clear(&self) {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn append(&self, bytes: &[u8]) {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
    }
}

/// A resolved destination for encoded log records.
#[derive(Clone, Debug)]
pub(crate) enum Sink {
    Stdout,
    Stderr,
    Memory(MemorySink),
}

impl Sink {
    /// Resolve an output path into a sink. Fails on unknown schemes and on
    /// `memory://` names nobody has registered; both are startup-time
    /// configuration mistakes.
    pub(crate) fn resolve(path: &str) -> Result<Sink, Error> {
        match path {
            "stdout" => Ok(Sink::Stdout),
            "stderr" => Ok(Sink::Stderr),
            other => match other.strip_prefix(MEMORY_SCHEME) {
                Some(name) => {
                    MemorySink::lookup(name)
                        .map(Sink::Memory)
                        .ok_or_else(|| Error::SinkConstruction {
                            path: other.to_owned(),
                            reason: format!("no memory sink registered under `{name}`"),
                        })
                }
                None => Err(Error::SinkConstruction {
                    path: other.to_owned(),
                    reason: "unsupported sink scheme; expected `stdout`, `stderr` or `memory://<name>`"
                        .to_owned(),
                }),
            },
        }
    }

    /// Write one encoded record plus a trailing newline.
    pub(crate) fn write_record(&self, mut line: Vec<u8>) -> std::io::Result<()> {
        line.push(b'\n');
        match self {
            Sink::Stdout => std::io::stdout().lock().write_all(&line),
            Sink::Stderr => std::io::stderr().lock().write_all(&line),
            Sink::Memory(sink) => {
                sink.append(&line);
                Ok(())
            }
        }
    }

    /// Report a write failure from another sink. Errors here are discarded;
    /// there is nowhere further to report them.
    pub(crate) fn write_diagnostic(&self, message: &str) {
        self.write_record(message.as_bytes().to_vec()).ok();
    }
}
