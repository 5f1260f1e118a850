//! DAP wire framing: `Content-Length: <N>\r\n\r\n<N bytes of UTF-8 JSON>`.

use std::io::{BufRead, Write};
use std::string::FromUtf8Error;

const HEADER: &str = "Content-Length:";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("message body is not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// Scanning frame reader. Bytes before the `Content-Length` header are
/// discarded, so the stream resynchronizes after garbage.
pub struct MessageReader<R> {
    reader: R,
}

impl<R: BufRead> MessageReader<R> {
    pub fn new(reader: R) -> MessageReader<R> {
        MessageReader { reader }
    }

    /// Read one framed message body.
    pub fn read_message(&mut self) -> Result<String, TransportError> {
        let mut content_length: Option<usize> = None;
        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line)?;
            if read == 0 {
                return Err(TransportError::Closed);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if content_length.is_some() {
                    break;
                }
                // Blank line before any header: still resynchronizing.
                continue;
            }
            if let Some(at) = line.find(HEADER)
                && let Ok(length) = line[at + HEADER.len()..].trim().parse::<usize>()
            {
                content_length = Some(length);
            }
        }

        let length = content_length.unwrap_or(0);
        let mut body = vec![0u8; length];
        self.reader.read_exact(&mut body)?;
        Ok(String::from_utf8(body)?)
    }
}

/// Write one framed message. The caller serializes concurrent writers.
pub fn write_message(writer: &mut impl Write, body: &[u8]) -> std::io::Result<()> {
    write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
    writer.write_all(body)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: &[u8]) -> MessageReader<Cursor<Vec<u8>>> {
        MessageReader::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn reads_a_plain_frame() {
        let mut r = reader(b"Content-Length: 2\r\n\r\n{}");
        assert_eq!(r.read_message().unwrap(), "{}");
    }

    #[test]
    fn resynchronizes_past_garbage() {
        let mut r = reader(b"garbage\r\nContent-Length: 2\r\n\r\n{}");
        assert_eq!(r.read_message().unwrap(), "{}");
        assert!(matches!(r.read_message(), Err(TransportError::Closed)));
    }

    #[test]
    fn garbage_prefix_on_the_header_line_is_discarded() {
        let mut r = reader(b"noiseContent-Length: 2\r\n\r\n{}");
        assert_eq!(r.read_message().unwrap(), "{}");
    }

    #[test]
    fn whitespace_after_the_colon_is_tolerated() {
        let mut r = reader(b"Content-Length: \t 4\r\n\r\ntrue");
        assert_eq!(r.read_message().unwrap(), "true");
    }

    #[test]
    fn other_headers_are_ignored() {
        let mut r = reader(b"Content-Type: application/json\r\nContent-Length: 2\r\n\r\n[]");
        assert_eq!(r.read_message().unwrap(), "[]");
    }

    #[test]
    fn consecutive_frames() {
        let mut r = reader(b"Content-Length: 2\r\n\r\n{}Content-Length: 4\r\n\r\nnull");
        assert_eq!(r.read_message().unwrap(), "{}");
        assert_eq!(r.read_message().unwrap(), "null");
    }

    #[test]
    fn eof_reports_closed() {
        let mut r = reader(b"");
        assert!(matches!(r.read_message(), Err(TransportError::Closed)));
    }

    #[test]
    fn truncated_body_is_an_io_error() {
        let mut r = reader(b"Content-Length: 10\r\n\r\n{}");
        assert!(matches!(r.read_message(), Err(TransportError::Io(_))));
    }

    #[test]
    fn write_emits_header_and_body() {
        let mut out = Vec::new();
        write_message(&mut out, b"{\"a\":1}").unwrap();
        assert_eq!(out, b"Content-Length: 7\r\n\r\n{\"a\":1}");
    }
}
