//! Incremental newline framing over raw response bytes.
//!
//! Chunks may split a multi-byte character, a JSON object, or a `\r\n` pair at
//! any byte. The assembler decodes UTF-8 statefully, carrying an incomplete
//! trailing sequence into the next [`LineAssembler::feed`] call, and holds back
//! the unterminated last line until more data (or [`LineAssembler::flush`])
//! arrives.

use memchr::memchr_iter;

const COMPACT_THRESHOLD_BYTES: usize = 8 * 1024;

/// Buffers raw chunks and yields complete `\n`-terminated records.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: String,
    read_offset: usize,
    /// Undecoded bytes of a character split across chunks.
    remainder: Vec<u8>,
}

impl LineAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completes.
    ///
    /// Lines are returned without the terminator; a trailing `\r` is stripped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed one chunk and append completed lines into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        self.push_decoded(chunk);
        self.drain_lines_into(out);
    }

    /// Take the final unterminated line once the source is exhausted.
    ///
    /// An incomplete multi-byte tail is decoded lossily. Returns `None` when
    /// nothing but whitespace is pending.
    pub fn flush(&mut self) -> Option<String> {
        if !self.remainder.is_empty() {
            let tail = std::mem::take(&mut self.remainder);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }

        let pending = &self.buffer[self.read_offset..];
        let pending = pending.strip_suffix('\r').unwrap_or(pending);
        let line = if pending.trim().is_empty() {
            None
        } else {
            Some(pending.to_owned())
        };
        self.buffer.clear();
        self.read_offset = 0;
        line
    }

    /// Bytes held back: the partial line plus any undecoded character tail.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len() - self.read_offset + self.remainder.len()
    }

    fn push_decoded(&mut self, chunk: &[u8]) {
        if self.remainder.is_empty() {
            let decoded = decode_utf8_into(chunk, &mut self.buffer);
            self.remainder.extend_from_slice(&chunk[decoded..]);
            return;
        }

        self.remainder.extend_from_slice(chunk);
        let pending = std::mem::take(&mut self.remainder);
        let decoded = decode_utf8_into(&pending, &mut self.buffer);
        self.remainder.extend_from_slice(&pending[decoded..]);
    }

    fn drain_lines_into(&mut self, out: &mut Vec<String>) {
        let mut processed_up_to = self.read_offset;
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &self.buffer.as_bytes()[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let line = &self.buffer[processed_up_to..line_end];
            out.push(line.strip_suffix('\r').unwrap_or(line).to_owned());
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2
                || self.read_offset >= COMPACT_THRESHOLD_BYTES);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }
}

/// Append the decodable part of `bytes` to `out`.
///
/// Invalid sequences become U+FFFD. Returns the offset where an incomplete
/// trailing sequence starts, or `bytes.len()` when everything was consumed.
fn decode_utf8_into(bytes: &[u8], out: &mut String) -> usize {
    let mut offset = 0;
    loop {
        let rest = &bytes[offset..];
        match std::str::from_utf8(rest) {
            Ok(text) => {
                out.push_str(text);
                return bytes.len();
            }
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                let text = unsafe { std::str::from_utf8_unchecked(&rest[..valid_up_to]) };
                out.push_str(text);
                match err.error_len() {
                    Some(invalid_len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        offset += valid_up_to + invalid_len;
                    }
                    None => return offset + valid_up_to,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(chunks: &[&[u8]]) -> (Vec<String>, Option<String>) {
        let mut assembler = LineAssembler::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            assembler.feed_into(chunk, &mut lines);
        }
        (lines, assembler.flush())
    }

    #[test]
    fn test_split_line_reassembles() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.feed(b"ab").is_empty());
        assert_eq!(assembler.feed(b"c\n"), vec!["abc".to_string()]);
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_every_split_point_matches_single_chunk() {
        let input = "data: {\"a\":1}\n0:\"héllo\"\nf:x\n".as_bytes();
        let (whole, _) = feed_all(&[input]);
        for split in 0..=input.len() {
            let (head, tail) = input.split_at(split);
            let (lines, rest) = feed_all(&[head, tail]);
            assert_eq!(lines, whole, "split at {split}");
            assert!(rest.is_none());
        }
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let encoded = "你好\n".as_bytes();
        let mut assembler = LineAssembler::new();
        assert!(assembler.feed(&encoded[..1]).is_empty());
        assert!(assembler.feed(&encoded[1..4]).is_empty());
        assert_eq!(assembler.pending_len(), 4);
        assert_eq!(assembler.feed(&encoded[4..]), vec!["你好".to_string()]);
    }

    #[test]
    fn test_four_byte_character_one_byte_at_a_time() {
        let encoded = "🤖 ok\n".as_bytes();
        let chunks: Vec<&[u8]> = encoded.chunks(1).collect();
        let (lines, rest) = feed_all(&chunks);
        assert_eq!(lines, vec!["🤖 ok".to_string()]);
        assert!(rest.is_none());
    }

    #[test]
    fn test_multiple_lines_in_one_chunk_keep_order() {
        let mut assembler = LineAssembler::new();
        let lines = assembler.feed(b"one\ntwo\n\nthree");
        assert_eq!(lines, vec!["one", "two", ""]);
        assert_eq!(assembler.flush().as_deref(), Some("three"));
    }

    #[test]
    fn test_crlf_terminators_are_stripped() {
        let (lines, rest) = feed_all(&[b"a\r".as_slice(), b"\nb\r\n".as_slice()]);
        assert_eq!(lines, vec!["a", "b"]);
        assert!(rest.is_none());
    }

    #[test]
    fn test_flush_discards_whitespace_tail() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.feed(b"x\n  \t").len() == 1);
        assert!(assembler.flush().is_none());
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_flush_returns_partial_line_once() {
        let mut assembler = LineAssembler::new();
        assembler.feed(b"0:\"tail\"");
        assert_eq!(assembler.flush().as_deref(), Some("0:\"tail\""));
        assert!(assembler.flush().is_none());
    }

    #[test]
    fn test_flush_decodes_incomplete_tail_lossily() {
        let encoded = "ok é".as_bytes();
        let mut assembler = LineAssembler::new();
        assembler.feed(&encoded[..encoded.len() - 1]);
        assert_eq!(assembler.flush().as_deref(), Some("ok \u{fffd}"));
    }

    #[test]
    fn test_invalid_bytes_are_replaced_without_losing_sync() {
        let (lines, _) = feed_all(&[b"a\xffb\n".as_slice(), b"c\n".as_slice()]);
        assert_eq!(lines, vec!["a\u{fffd}b", "c"]);
    }

    #[test]
    fn test_long_stream_compacts_buffer() {
        let mut assembler = LineAssembler::new();
        let mut total = 0;
        for _ in 0..2_000 {
            total += assembler.feed(b"0:\"token\"\n0:\"to").len();
            total += assembler.feed(b"ken\"\n").len();
        }
        assert_eq!(total, 4_000);
        assert_eq!(assembler.pending_len(), 0);
    }
}
