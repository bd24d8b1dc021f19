//! Incremental UTF-8 decoding and newline framing for chunked bodies.
//!
//! Chunk boundaries fall anywhere: inside a multi-byte character or in
//! the middle of a line. [`Utf8Decoder`] carries an incomplete trailing
//! byte sequence over to the next chunk, and [`LineSplitter`] carries an
//! unterminated line over to the next piece of text.

/// Streaming UTF-8 decoder.
///
/// Invalid byte sequences decode to U+FFFD; an incomplete sequence at the
/// end of a chunk is held back until more bytes arrive or
/// [`finish`](Self::finish) is called.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, prefixed by any bytes held back from the last call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;

        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    // The prefix up to `valid_up_to` is valid, so this never substitutes.
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + bad;
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Number of bytes held back waiting for the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flush held-back bytes at end of stream, replacing them with U+FFFD.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Splits decoded text into `\n`-terminated lines across pushes.
///
/// A trailing `\r` is stripped so CRLF bodies frame the same as LF bodies.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` and return every line it completes.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.partial.push_str(text);

        let Some(last_newline) = self.partial.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        complete
            .split_terminator('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }

    /// Return the unterminated last line, if any, at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.partial);
        let rest = rest.strip_suffix('\r').unwrap_or(&rest).to_string();
        (!rest.is_empty()).then_some(rest)
    }
}
