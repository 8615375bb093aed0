use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::Decoder;

const MAX_LINE_SIZE: usize = 1024 * 1024 * 16; // 16MB, far above any card

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("line too long: {size} bytes")]
    LineTooLong { size: usize },
    #[error("payload is not valid utf-8")]
    InvalidUtf8,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Splits the subscription body into text payloads.
///
/// Understands event-stream framing (`data:` lines joined until a blank line; `event:`, `id:`,
/// `retry:` and `:` comment lines ignored) and also accepts bare newline-delimited payloads, which
/// are yielded one per line.
#[derive(Debug, Default)]
pub struct EventStreamCodec {
    data: Option<String>,
    /// Bytes of the buffer already known to contain no newline
    scanned: usize,
}

impl EventStreamCodec {
    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.data.take();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => {
                match &mut self.data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => self.data = Some(value.to_string()),
                }
                None
            }
            "event" | "id" | "retry" => None,
            _ => Some(line.to_string()),
        }
    }

    fn take_line(src: &mut BytesMut, len: usize) -> Result<String, CodecError> {
        let raw = src.split_to(len);
        let line = std::str::from_utf8(&raw).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(line.trim_end_matches(|c| c == '\n' || c == '\r').to_string())
    }
}

impl Decoder for EventStreamCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(offset) = src[self.scanned..].iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_LINE_SIZE {
                    return Err(CodecError::LineTooLong { size: src.len() });
                }
                self.scanned = src.len();
                return Ok(None);
            };
            let line = Self::take_line(src, self.scanned + offset + 1)?;
            self.scanned = 0;
            if let Some(payload) = self.feed_line(&line) {
                return Ok(Some(payload));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload) = self.decode(src)? {
            return Ok(Some(payload));
        }
        if !src.is_empty() {
            let line = Self::take_line(src, src.len())?;
            self.scanned = 0;
            if let Some(payload) = self.feed_line(&line) {
                return Ok(Some(payload));
            }
        }
        Ok(self.data.take())
    }
}
