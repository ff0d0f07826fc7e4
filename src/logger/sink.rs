//! Log sinks and the fan-out writer.

use std::io::{self, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

use crate::error::Error;

type Sink = Box<dyn Write + Send>;

/// Every destination a [`Logger`](super::Logger) writes to.
///
/// One line is one `write_all` to each sink in registration order, all under
/// a single lock: lines never interleave, and records from one thread keep
/// their order in every sink. There is no buffering; a slow sink stalls the
/// caller and a failing sink fails the call.
#[derive(Clone, Default)]
pub struct Sinks {
    inner: Arc<Mutex<Vec<Sink>>>,
}

impl Sinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sink: impl Write + Send + 'static) -> io::Result<()> {
        self.lock()?.push(Box::new(sink));
        Ok(())
    }

    /// Connects to a remote log server at `addr` (`host:port`).
    pub(crate) fn connect(addr: &str) -> Result<TcpStream, Error> {
        let init = |source| Error::LoggerInit { addr: addr.to_owned(), source };
        let stream = TcpStream::connect(addr).map_err(init)?;
        stream.set_nodelay(true).map_err(init)?;
        Ok(stream)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|sinks| sinks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `line` plus a newline to every sink.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut sinks = self.lock()?;
        for sink in sinks.iter_mut() {
            sink.write_all(line.as_bytes())?;
            sink.write_all(b"\n")?;
            sink.flush()?;
        }
        Ok(())
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, Vec<Sink>>> {
        self.inner.lock().map_err(|_| io::Error::other("log sink lock poisoned"))
    }
}

impl Write for Sinks {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut sinks = self.lock()?;
        for sink in sinks.iter_mut() {
            sink.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut sinks = self.lock()?;
        for sink in sinks.iter_mut() {
            sink.flush()?;
        }
        Ok(())
    }
}

/// An in-memory sink, for capturing log output in tests.
#[derive(Clone, Default)]
pub struct MemorySink(Arc<Mutex<Vec<u8>>>);

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.lock().map_err(|_| io::Error::other("memory sink lock poisoned"))?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Lets the process-wide `tracing` subscriber share the kernel's sinks.
impl<'a> MakeWriter<'a> for Sinks {
    type Writer = Sinks;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
