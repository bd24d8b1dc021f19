//! Folding the inference byte stream into diagnosis snapshots.
//!
//! [`StreamAggregator`] is the synchronous core: feed it chunks, read
//! snapshots. [`consume_stream`] drives it from an async byte stream and
//! yields a snapshot every time the accumulated text grows, plus a final
//! snapshot (with `is_complete` set) when the stream ends.

use ctlens_core::types::{AccumulatedDiagnosis, JobHandle};
use futures::{Stream, StreamExt};

use crate::api::InferenceError;
use crate::decoder::{LineSplitter, Utf8Decoder};
use crate::fragment::{classify_line, Fragment};

/// Incremental aggregator for one analysis session.
///
/// Text only grows: nothing is ever removed from the accumulated document.
#[derive(Debug)]
pub struct StreamAggregator {
    decoder: Utf8Decoder,
    lines: LineSplitter,
    diagnosis: AccumulatedDiagnosis,
    skipped: usize,
}

impl StreamAggregator {
    pub fn new(job: JobHandle) -> Self {
        Self {
            decoder: Utf8Decoder::new(),
            lines: LineSplitter::new(),
            diagnosis: AccumulatedDiagnosis::new(job),
            skipped: 0,
        }
    }

    /// Feed one chunk. Returns `true` when the accumulated text grew.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> bool {
        let text = self.decoder.decode(chunk);
        let before = self.diagnosis.text.len();

        for line in self.lines.push(&text) {
            self.ingest_line(&line);
        }

        self.refresh_if_grown(before)
    }

    /// Flush buffered bytes and the last unterminated line, and mark the
    /// diagnosis complete. Returns the final snapshot.
    pub fn finish(&mut self) -> AccumulatedDiagnosis {
        let before = self.diagnosis.text.len();

        let tail = self.decoder.finish();
        let mut pending = self.lines.push(&tail);
        pending.extend(self.lines.finish());
        for line in pending {
            self.ingest_line(&line);
        }

        self.refresh_if_grown(before);
        if self.diagnosis.findings.is_empty() {
            self.diagnosis.refresh_findings();
        }
        self.diagnosis.is_complete = true;
        self.diagnosis.clone()
    }

    /// Current state of the document.
    pub fn snapshot(&self) -> AccumulatedDiagnosis {
        self.diagnosis.clone()
    }

    /// Number of fragments dropped as unparseable so far.
    pub fn skipped_fragments(&self) -> usize {
        self.skipped
    }

    fn ingest_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        let fragment = classify_line(line);
        match fragment.delta() {
            Some(delta) => self.diagnosis.append(&delta),
            None => {
                if let Fragment::Unparseable { line, reason } = &fragment {
                    self.skipped += 1;
                    tracing::warn!(
                        job_id = %self.diagnosis.job_handle,
                        error = %reason,
                        raw_fragment = %line,
                        "Skipping unparseable stream fragment",
                    );
                }
            }
        }
    }

    fn refresh_if_grown(&mut self, before: usize) -> bool {
        let grown = self.diagnosis.text.len() > before;
        if grown {
            self.diagnosis.refresh_findings();
        }
        grown
    }
}

/// Consume a byte stream into a lazy sequence of diagnosis snapshots.
///
/// Yields `Ok(snapshot)` whenever a chunk grows the text and one final
/// `Ok` snapshot with `is_complete == true` at end of stream. A failing
/// chunk yields its error once and ends the sequence;
/// the last `Ok` snapshot before it holds everything received. The
/// returned stream is not restartable.
pub fn consume_stream<S, B, E>(
    job: JobHandle,
    stream: S,
) -> impl Stream<Item = Result<AccumulatedDiagnosis, InferenceError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<InferenceError>,
{
    let initial = Some((stream, StreamAggregator::new(job)));

    futures::stream::unfold(initial, |state| async move {
        let (mut stream, mut aggregator) = state?;
        loop {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    if aggregator.push_chunk(chunk.as_ref()) {
                        let snapshot = aggregator.snapshot();
                        return Some((Ok(snapshot), Some((stream, aggregator))));
                    }
                }
                Some(Err(e)) => {
                    let e: InferenceError = e.into();
                    tracing::warn!(
                        job_id = %aggregator.snapshot().job_handle,
                        error = %e,
                        skipped_fragments = aggregator.skipped_fragments(),
                        "Analysis stream failed",
                    );
                    return Some((Err(e), None));
                }
                None => {
                    let snapshot = aggregator.finish();
                    tracing::debug!(
                        job_id = %snapshot.job_handle,
                        text_len = snapshot.text.len(),
                        skipped_fragments = aggregator.skipped_fragments(),
                        "Analysis stream finished",
                    );
                    return Some((Ok(snapshot), None));
                }
            }
        }
    })
}
