//! Values defined by behaviour rather than by layout.

use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use crate::error::ValueError;
use crate::iter::ValueIterator;
use crate::sync::lock;
use crate::value::Value;

/// An associative collection reachable through lookups.
pub trait MapValue: fmt::Debug + Send + Sync {
    /// Looks up `key`. A missing key is `Ok(Value::Null)`.
    fn value_for_key(&self, key: &Value) -> Result<Value, ValueError>;

    /// Iterates the map's values.
    fn iterate(&self) -> Box<dyn ValueIterator>;
}

/// An ordered collection reachable only through iteration.
pub trait ArrayValue: fmt::Debug + Send + Sync {
    fn iterate(&self) -> Box<dyn ValueIterator>;
}

/// A readable, closable source of bytes.
pub trait ByteSource: Read + Send {
    fn close(&mut self) -> io::Result<()>;
}

/// Adapts any reader into a [`ByteSource`]. Closing drops the reader.
pub struct ReaderSource<R> {
    reader: Option<R>,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader: Some(reader) }
    }
}

impl<R: Read + Send> Read for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader.as_mut() {
            Some(r) => r.read(buf),
            None => Ok(0),
        }
    }
}

impl<R: Read + Send> ByteSource for ReaderSource<R> {
    fn close(&mut self) -> io::Result<()> {
        self.reader = None;
        Ok(())
    }
}

struct ByteStreamState {
    source: Box<dyn ByteSource>,
    closed: bool,
}

/// A shared handle to a [`ByteSource`], as carried by [`Value::Bytestream`].
///
/// Reads are destructive and the stream cannot seek. After
/// [`close`](ByteStreamHandle::close) every read returns no bytes.
#[derive(Clone)]
pub struct ByteStreamHandle {
    state: Arc<Mutex<ByteStreamState>>,
}

impl ByteStreamHandle {
    pub fn new(source: impl ByteSource + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(ByteStreamState {
                source: Box::new(source),
                closed: false,
            })),
        }
    }

    /// Wraps a plain reader.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self::new(ReaderSource::new(reader))
    }

    /// Reads up to `n` bytes, stopping early only at end of stream.
    pub fn read_up_to(&self, n: usize) -> io::Result<Vec<u8>> {
        let mut state = lock(&self.state);
        if state.closed {
            return Ok(Vec::new());
        }
        let mut buf = Vec::with_capacity(n.min(64 * 1024));
        (&mut state.source).take(n as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Reads everything that remains.
    pub fn read_to_end(&self) -> io::Result<Vec<u8>> {
        let mut state = lock(&self.state);
        if state.closed {
            return Ok(Vec::new());
        }
        let mut buf = Vec::new();
        state.source.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Closes the stream, discarding unread bytes. Only the first call
    /// reaches the source.
    pub fn close(&self) -> io::Result<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.source.close()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub(crate) fn same(&self, other: &ByteStreamHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for ByteStreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStreamHandle")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
