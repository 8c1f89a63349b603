//! Concatenated-JSON framing.
//!
//! The stream is a plain sequence of JSON values: no length prefix and no required
//! delimiter. Writers still terminate each value with `\n`, which readers treat as
//! ordinary whitespace.
//!
//! Objects, arrays and strings are delimited by a byte scanner that only looks at
//! bytes it has not seen before, so a value is parsed once, after its last byte
//! arrives.

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::{DecodeError, Envelope, RpcError, RpcResult};

/// Bytes requested from the stream per read.
pub const READ_CHUNK: usize = 4096;

/// Finds where the first top-level container or string in a buffer ends.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Scanner {
    /// Bytes of the buffer already examined.
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Scanner {
    /// Continue over bytes not yet examined. Returns the end offset of the value once it closes.
    fn advance(&mut self, buf: &[u8]) -> Option<usize> {
        while self.pos < buf.len() {
            let byte = buf[self.pos];
            self.pos += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        return Some(self.pos);
                    }
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    // An unbalanced closer also ends the value; parsing reports it.
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some(self.pos);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Pulls one JSON value at a time off an async byte stream.
pub struct FrameReader<R> {
    reader: R,
    buf: Vec<u8>,
    scan: Scanner,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_CHUNK),
            scan: Scanner::default(),
        }
    }

    /// Read the next envelope. `Ok(None)` is a clean end of stream.
    pub async fn next_envelope(&mut self) -> Result<Option<Envelope>, DecodeError> {
        self.next_value().await
    }

    /// Read the next value of any deserializable type.
    pub async fn next_value<T: DeserializeOwned>(&mut self) -> Result<Option<T>, DecodeError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(value) = self.take_buffered()? {
                return Ok(Some(value));
            }

            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                return self.end_of_stream();
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Bytes read from the stream but not yet consumed by a decoded value.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn take_buffered<T: DeserializeOwned>(&mut self) -> Result<Option<T>, DecodeError> {
        let Some(start) = self.buf.iter().position(|b| !b.is_ascii_whitespace()) else {
            self.buf.clear();
            self.scan = Scanner::default();
            return Ok(None);
        };

        match self.buf[start] {
            b'{' | b'[' | b'"' => {
                let Some(end) = self.scan.advance(&self.buf) else {
                    return Ok(None);
                };
                let value = serde_json::from_slice(&self.buf[..end])?;
                self.buf.drain(..end);
                self.scan = Scanner::default();
                Ok(Some(value))
            }
            _ => self.take_scalar(),
        }
    }

    /// Numbers, literals and stray bytes: let serde_json find the boundary.
    fn take_scalar<T: DeserializeOwned>(&mut self) -> Result<Option<T>, DecodeError> {
        let (outcome, consumed) = {
            let mut values = serde_json::Deserializer::from_slice(&self.buf).into_iter::<T>();
            let outcome = values.next();
            (outcome, values.byte_offset())
        };

        match outcome {
            Some(Ok(value)) => {
                self.buf.drain(..consumed);
                Ok(Some(value))
            }
            // Incomplete value: wait for more bytes.
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => Err(DecodeError::Json(e)),
            None => {
                self.buf.clear();
                Ok(None)
            }
        }
    }

    /// Whatever is left when the stream ends is either nothing, a syntax error, or cut off.
    fn end_of_stream<T>(&self) -> Result<Option<T>, DecodeError> {
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        match serde_json::from_slice::<IgnoredAny>(&self.buf) {
            Err(e) if !e.is_eof() => Err(DecodeError::Json(e)),
            _ => Err(DecodeError::Truncated {
                buffered: self.buf.len(),
            }),
        }
    }
}

/// Writes newline-terminated JSON frames and flushes after each one.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write an already-encoded frame.
    pub async fn write_frame(&mut self, frame: &[u8]) -> RpcResult<()> {
        self.writer.write_all(frame).await.map_err(RpcError::Transport)?;
        self.writer.flush().await.map_err(RpcError::Transport)?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> RpcResult<()> {
        self.writer.shutdown().await.map_err(RpcError::Transport)
    }
}

/// Serialize a value to a frame (with trailing newline).
pub fn encode_frame<T: Serialize>(value: &T) -> RpcResult<Vec<u8>> {
    let mut frame = serde_json::to_vec(value).map_err(RpcError::Encode)?;
    frame.push(b'\n');
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_reads_back_to_back_values() {
        let bytes: &[u8] =
            br#"{"method":"A.B","params":[1],"id":1}{"id":1,"result":2,"error":null}"#;
        let mut reader = FrameReader::new(bytes);

        let first = reader.next_envelope().await.unwrap().unwrap();
        assert!(first.is_request());
        let second = reader.next_envelope().await.unwrap().unwrap();
        assert!(second.is_response());
        assert!(reader.next_envelope().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tolerates_whitespace_between_values() {
        let bytes: &[u8] = b"  {\"id\":3,\"result\":\"ok\"}\n\n\t{\"id\":4,\"error\":\"no\"}  \n";
        let mut reader = FrameReader::new(bytes);

        let a = reader.next_envelope().await.unwrap().unwrap();
        assert_eq!(a.id, Some(json!(3)));
        let b = reader.next_envelope().await.unwrap().unwrap();
        assert_eq!(b.error, Some(json!("no")));
        assert!(reader.next_envelope().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_value_split_across_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(br#"{"method":"Servable.Pi"#)
            .read(br#"ng","params":["X"],"#)
            .read(br#""id":12}"#)
            .build();
        let mut reader = FrameReader::new(mock);

        let env = reader.next_envelope().await.unwrap().unwrap();
        assert_eq!(env.method.as_deref(), Some("Servable.Ping"));
        assert_eq!(env.id, Some(json!(12)));
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_value_larger_than_one_chunk() {
        let big = "x".repeat(READ_CHUNK * 3);
        let text = serde_json::to_string(&json!({"id": 1, "result": big})).unwrap();
        let mut reader = FrameReader::new(text.as_bytes());

        let env = reader.next_envelope().await.unwrap().unwrap();
        assert_eq!(env.result, Some(json!(big)));
    }

    #[tokio::test]
    async fn test_truncated_stream() {
        let bytes: &[u8] = br#"{"method":"A.B","params":["#;
        let mut reader = FrameReader::new(bytes);

        match reader.next_envelope().await {
            Err(DecodeError::Truncated { buffered }) => assert_eq!(buffered, bytes.len()),
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_syntax_error() {
        let bytes: &[u8] = b"{\"id\": 1,, }";
        let mut reader = FrameReader::new(bytes);
        assert!(matches!(
            reader.next_envelope().await,
            Err(DecodeError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_writer_appends_newline() {
        let mut out = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut out);
            writer.write_frame(&encode_frame(&json!({"id": 1})).unwrap()).await.unwrap();
            writer.write_frame(&encode_frame(&json!({"id": 2})).unwrap()).await.unwrap();
        }
        assert_eq!(out, b"{\"id\":1}\n{\"id\":2}\n");
    }

    #[test]
    fn test_scanner_resumes_where_it_stopped() {
        let text = br#"{"a":"} \" ]","b":[{"c":"\\"}]}  {"next":1}"#;

        let mut scan = Scanner::default();
        let first_close = br#"{"a":"} \" ]","b":[{"c":"\\"}]}"#.len();
        for cut in [3, 9, 17, first_close - 1] {
            assert_eq!(scan.advance(&text[..cut]), None);
            assert_eq!(scan.pos, cut);
        }
        assert_eq!(scan.advance(text), Some(first_close));
    }

    #[test]
    fn test_scanner_top_level_string() {
        let mut scan = Scanner::default();
        assert_eq!(scan.advance(br#"  "ab\"c" {"#), Some(9));
    }

    #[tokio::test]
    async fn test_large_value_parsed_once() {
        // 8 MiB in 4 KiB reads. Re-parsing the buffer on every read would take minutes.
        let big = "x".repeat(8 * 1024 * 1024);
        let text = serde_json::to_string(&json!({"id": 1, "result": big})).unwrap();
        let mut reader = FrameReader::new(text.as_bytes());

        let started = std::time::Instant::now();
        let env = reader.next_envelope().await.unwrap().unwrap();
        let elapsed = started.elapsed();

        assert_eq!(env.result.as_ref().and_then(Value::as_str).map(str::len), Some(big.len()));
        assert!(elapsed < std::time::Duration::from_secs(5), "took {elapsed:?}");
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_scalars_between_objects() {
        let bytes: &[u8] = br#"12 true {"id":1} "s""#;
        let mut reader = FrameReader::new(bytes);
        assert_eq!(reader.next_value::<Value>().await.unwrap(), Some(json!(12)));
        assert_eq!(reader.next_value::<Value>().await.unwrap(), Some(json!(true)));
        assert_eq!(reader.next_value::<Value>().await.unwrap(), Some(json!({"id": 1})));
        assert_eq!(reader.next_value::<Value>().await.unwrap(), Some(json!("s")));
        assert_eq!(reader.next_value::<Value>().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_positional_array_rejected() {
        let bytes: &[u8] = br#"["Servable.Ping",["X"],null,null,5]"#;
        let mut reader = FrameReader::new(bytes);
        assert!(matches!(
            reader.next_envelope().await,
            Err(DecodeError::Json(_))
        ));
    }
}
