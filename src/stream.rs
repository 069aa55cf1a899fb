//! Streaming example intake.
//!
//! A [`RecordSource`] yields raw example lines one at a time;
//! [`ExampleStream`] sits between a source and the example store, keeping
//! a bounded FIFO of parsed-but-unconsumed examples. The queue refills in
//! bursts of at most its capacity, so at no point do more than
//! `ring_size` streamed examples exist that the caller has not yet seen;
//! that bound is the pipeline's only backpressure.
//!
//! Pulls are synchronous: a pull blocks exactly as long as the underlying
//! `next_record` call does. A malformed record is skipped with a warning
//! and counted, never fatal; an I/O failure from the source propagates as
//! [`SourceUnavailable`](crate::HopperError::SourceUnavailable) and leaves
//! the stream resumable.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::warn;

use crate::error::Result;
use crate::example::{ExampleHandle, ExampleRecord, ExampleStore};
use crate::hash::HashContext;
use crate::text::parse_text_example;

// =============================================================================
// Record Sources
// =============================================================================

/// Anything that can hand out example lines in order.
pub trait RecordSource {
    /// The next raw record, or `Ok(None)` once the source is exhausted.
    /// Not called again after it reports exhaustion.
    fn next_record(&mut self) -> io::Result<Option<String>>;
}

/// In-memory source over a fixed list of lines.
pub struct MemorySource {
    records: VecDeque<String>,
}

impl MemorySource {
    pub fn new<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            records: records.into_iter().map(Into::into).collect(),
        }
    }
}

impl RecordSource for MemorySource {
    fn next_record(&mut self) -> io::Result<Option<String>> {
        Ok(self.records.pop_front())
    }
}

/// Line-oriented file source; several files stream back to back.
pub struct LineFileSource {
    readers: VecDeque<BufReader<File>>,
}

impl LineFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::open_many([path])
    }

    /// Open every file up front so a bad path fails at stream start, not
    /// somewhere mid-stream.
    pub fn open_many<P, I>(paths: I) -> io::Result<Self>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = P>,
    {
        let mut readers = VecDeque::new();
        for path in paths {
            readers.push_back(BufReader::new(File::open(path)?));
        }
        Ok(Self { readers })
    }
}

impl RecordSource for LineFileSource {
    fn next_record(&mut self) -> io::Result<Option<String>> {
        while let Some(reader) = self.readers.front_mut() {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                self.readers.pop_front();
                continue;
            }
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            return Ok(Some(line));
        }
        Ok(None)
    }
}

// =============================================================================
// Example Stream
// =============================================================================

/// Counts reported when a stream ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Examples handed to the caller. Records parsed ahead into the queue
    /// but never pulled are released at finish and not counted here.
    pub produced: u64,
    /// Malformed records skipped.
    pub skipped: u64,
}

/// A started stream: source, prefetch queue, and cursor counters.
///
/// The source is `Send`-bounded so a session carrying a live stream can
/// still move between threads along with the engine it wraps.
pub struct ExampleStream {
    source: Box<dyn RecordSource + Send>,
    queue: VecDeque<ExampleHandle>,
    capacity: usize,
    source_done: bool,
    position: u64,
    produced: u64,
    skipped: u64,
}

impl ExampleStream {
    pub fn new(source: Box<dyn RecordSource + Send>, capacity: usize) -> Self {
        Self {
            source,
            queue: VecDeque::with_capacity(capacity),
            capacity,
            source_done: false,
            position: 0,
            produced: 0,
            skipped: 0,
        }
    }

    /// Pull the next example, refilling the queue from the source when it
    /// runs dry. `Ok(None)` is the terminal answer once the source is
    /// exhausted and the queue drained; asking again keeps answering
    /// `Ok(None)`.
    pub fn next(
        &mut self,
        store: &mut ExampleStore,
        ctx: &HashContext,
    ) -> Result<Option<ExampleHandle>> {
        if self.queue.is_empty() && !self.source_done {
            self.refill(store, ctx)?;
        }
        let handle = self.queue.pop_front();
        if handle.is_some() {
            self.produced += 1;
        }
        Ok(handle)
    }

    /// End the stream, releasing every queued example the caller never
    /// pulled. The source does not have to be exhausted.
    pub fn finish(mut self, store: &mut ExampleStore) -> Result<StreamSummary> {
        while let Some(handle) = self.queue.pop_front() {
            store.release(handle)?;
        }
        Ok(StreamSummary {
            produced: self.produced,
            skipped: self.skipped,
        })
    }

    fn refill(&mut self, store: &mut ExampleStore, ctx: &HashContext) -> Result<()> {
        while self.queue.len() < self.capacity && !self.source_done {
            let Some(line) = self.source.next_record()? else {
                self.source_done = true;
                break;
            };
            self.position += 1;

            match parse_text_example(&line) {
                Ok(parsed) => {
                    let record = ExampleRecord::from_parsed(&parsed, ctx);
                    self.queue.push_back(store.insert(record));
                }
                Err(err) => {
                    warn!(record = self.position, error = %err, "skipping malformed record");
                    self.skipped += 1;
                }
            }
        }
        Ok(())
    }
}
