/// Incremental parser for the chat endpoint's event stream.
///
/// Format: one record per line, `data: <json>` or the terminal `data: [DONE]`.
/// Blank lines and other fields (`event:`, `id:`, `:` comments) are skipped.

/// Stateful UTF-8 decoder that carries an incomplete trailing sequence over
/// to the next chunk, so a character split across chunk boundaries decodes
/// exactly as it would from the whole byte sequence. Invalid bytes become
/// U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut input = &bytes[..];
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        out.push_str(text);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes
                            self.pending = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush at end of stream. A dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}

/// A single `data:` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseRecord {
    Data(String),
    Done,
}

/// Line parser that buffers an incomplete trailing record across chunks.
#[derive(Debug, Default)]
pub struct SseParser {
    decoder: Utf8Decoder,
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the HTTP response. Returns any complete records found.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseRecord> {
        let text = self.decoder.decode(chunk);
        self.buffer.push_str(&text);

        let mut records = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = self.buffer[consumed..].find('\n') {
            let end = consumed + pos;
            if let Some(record) = parse_line(&self.buffer[consumed..end]) {
                records.push(record);
            }
            consumed = end + 1;
        }
        self.buffer.drain(..consumed);
        records
    }

    /// Flush the decoder and parse whatever unterminated record remains.
    pub fn finish(&mut self) -> Vec<SseRecord> {
        let tail = self.decoder.finish();
        self.buffer.push_str(&tail);
        let rest = std::mem::take(&mut self.buffer);
        rest.lines().filter_map(parse_line).collect()
    }
}

fn parse_line(line: &str) -> Option<SseRecord> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim().is_empty() {
        return None;
    }
    if data.trim() == "[DONE]" {
        return Some(SseRecord::Done);
    }
    Some(SseRecord::Data(data.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(s: &str) -> SseRecord {
        SseRecord::Data(s.to_string())
    }

    #[test]
    fn test_basic_records() {
        let mut parser = SseParser::new();
        let records = parser.feed(b"data: hello\n\ndata: world\n\ndata: [DONE]\n\n");
        assert_eq!(records, vec![data("hello"), data("world"), SseRecord::Done]);
    }

    #[test]
    fn test_other_fields_ignored() {
        let mut parser = SseParser::new();
        let records = parser.feed(b": keepalive\nevent: message\nid: 7\ndata:{\"a\":1}\r\n\r\n");
        assert_eq!(records, vec![data("{\"a\":1}")]);
    }

    #[test]
    fn test_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: hel").is_empty());
        assert_eq!(parser.feed(b"lo\n\n"), vec![data("hello")]);
    }

    #[test]
    fn test_multibyte_split_at_chunk_boundary() {
        let full = "data: {\"content\":\"héllo ✓ 🦀\"}\n".as_bytes();
        let expected = String::from_utf8(full.to_vec()).unwrap();

        for split in 0..full.len() {
            let mut decoder = Utf8Decoder::new();
            let mut text = decoder.decode(&full[..split]);
            text.push_str(&decoder.decode(&full[split..]));
            text.push_str(&decoder.finish());
            assert_eq!(text, expected, "split at byte {}", split);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let full = "data: {\"content\":\"日本語\"}\n".as_bytes();
        let mut parser = SseParser::new();
        let mut records = Vec::new();
        for b in full {
            records.extend(parser.feed(std::slice::from_ref(b)));
        }
        assert_eq!(records, vec![data("{\"content\":\"日本語\"}")]);
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_dangling_sequence_flushed_as_replacement() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"ok\xe2\x9c"), "ok");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_finish_parses_unterminated_record() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"content\":\"tail\"}").is_empty());
        assert_eq!(parser.finish(), vec![data("{\"content\":\"tail\"}")]);
    }
}
