/// Maximum bytes held for a line that has not seen its newline yet.
///
/// Past this the partial buffer is released as a line of its own so a stream
/// that never sends a newline cannot grow memory without bound.
pub const MAX_PARTIAL_LINE_BYTES: usize = 1024 * 1024;

/// Splits a byte stream into complete lines across arbitrary read boundaries.
#[derive(Debug, Default)]
pub struct LineDecoder {
    partial: Vec<u8>,
    max_partial: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::with_limit(MAX_PARTIAL_LINE_BYTES)
    }

    pub fn with_limit(max_partial: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_partial,
        }
    }

    /// Feed one chunk and return every line it completed, without newlines.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            lines.push(self.take_partial());
            rest = &rest[pos + 1..];
        }

        self.partial.extend_from_slice(rest);
        if self.partial.len() > self.max_partial {
            tracing::warn!(
                bytes = self.partial.len(),
                "Partial line exceeded limit, releasing it unterminated"
            );
            lines.push(self.take_partial());
        }

        lines
    }

    /// Release whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(self.take_partial())
        }
    }

    /// Bytes currently waiting for a newline
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    fn take_partial(&mut self) -> String {
        let bytes = std::mem::take(&mut self.partial);
        let text = String::from_utf8_lossy(&bytes);
        text.trim_end_matches('\r').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines_in_one_chunk() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.feed(b"one\ntwo\n");
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(decoder.pending(), 0);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"2025-12-04T10:00").is_empty());
        assert!(decoder.feed(b":00Z par").is_empty());
        let lines = decoder.feed(b"tial\nnext");
        assert_eq!(lines, vec!["2025-12-04T10:00:00Z partial"]);
        assert_eq!(decoder.finish().as_deref(), Some("next"));
    }

    #[test]
    fn test_crlf_stripped() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.feed(b"a\r\nb\r");
        assert_eq!(lines, vec!["a"]);
        assert_eq!(decoder.feed(b"\n"), vec!["b"]);
    }

    #[test]
    fn test_empty_lines_preserved() {
        let mut decoder = LineDecoder::new();
        assert_eq!(decoder.feed(b"\n\nx\n"), vec!["", "", "x"]);
    }

    #[test]
    fn test_partial_limit_releases_line() {
        let mut decoder = LineDecoder::with_limit(4);
        let lines = decoder.feed(b"abcdefg");
        assert_eq!(lines, vec!["abcdefg"]);
        assert_eq!(decoder.pending(), 0);
    }
}
