//! The response transport.
//!
//! [`Transport`] is the full operation surface of an outgoing response:
//! status line, headers, trailers, chunked flag, the write/end family, the
//! send-file shortcut, and write-queue backpressure. Anything that wraps a
//! response (see [`HookedResponse`](crate::middleware::HookedResponse))
//! implements the same trait so it can stand in for the original.
//!
//! [`ServerResponse`] is the implementation the server gives every exchange.
//! It buffers what is written and is turned into a hyper response once the
//! pipeline is done with it.

use std::convert::Infallible;
use std::fmt;
use std::future;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Body type of every response leaving the server.
pub type Body = BoxBody<Bytes, Infallible>;

/// Completion callback for the `*_then` write variants. Invoked once the
/// chunk has been handed to the connection, or with an error if the response
/// is dropped first.
pub type Done = Box<dyn FnOnce(io::Result<()>) + Send>;

/// Drain and close notifications.
pub type Callback = Box<dyn FnMut() + Send>;

/// Receives errors the transport hits after the pipeline has let go of it.
pub type ErrorCallback = Box<dyn FnMut(&Error) + Send>;

pub const DEFAULT_WRITE_QUEUE_MAX_SIZE: usize = 64 * 1024;

// ── Charset ───────────────────────────────────────────────────────────────────

/// Character encodings accepted by the encoded write variants.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Charset {
    Utf8,
    /// ISO-8859-1. Characters outside the range are written as `?`.
    Latin1,
    Utf16Be,
    Utf16Le,
}

impl Charset {
    pub fn encode(self, s: &str) -> Bytes {
        match self {
            Self::Utf8    => Bytes::copy_from_slice(s.as_bytes()),
            Self::Latin1  => s.chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect::<Vec<u8>>()
                .into(),
            Self::Utf16Be => s.encode_utf16().flat_map(u16::to_be_bytes).collect::<Vec<u8>>().into(),
            Self::Utf16Le => s.encode_utf16().flat_map(u16::to_le_bytes).collect::<Vec<u8>>().into(),
        }
    }
}

/// Parses an encoding label such as `"UTF-8"` or `"iso-8859-1"`, ignoring case.
impl FromStr for Charset {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8"                  => Ok(Self::Utf8),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Self::Latin1),
            "utf-16be"                        => Ok(Self::Utf16Be),
            "utf-16le"                        => Ok(Self::Utf16Le),
            _                                 => Err(()),
        }
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// Operations every outgoing response supports.
///
/// The required methods are the primitives. The provided ones are
/// conveniences built on them; wrappers that need to observe every write
/// should still override all of them and forward to the inner transport's
/// own variant.
pub trait Transport {
    fn status(&self) -> StatusCode;
    fn set_status(&mut self, status: StatusCode);
    fn status_message(&self) -> Option<&str>;
    fn set_status_message(&mut self, message: String);

    fn headers(&self) -> &HeaderMap;
    fn headers_mut(&mut self) -> &mut HeaderMap;
    fn trailers(&self) -> &HeaderMap;
    fn trailers_mut(&mut self) -> &mut HeaderMap;

    fn is_chunked(&self) -> bool;
    fn set_chunked(&mut self, chunked: bool);

    /// `true` once any end variant or `send_file` has completed.
    fn is_ended(&self) -> bool;

    fn write(&mut self, chunk: Bytes) -> Result<()>;
    fn write_then(&mut self, chunk: Bytes, done: Done) -> Result<()>;
    fn end_with(&mut self, chunk: Bytes) -> Result<()>;

    /// Sends the file at `path` as the body and ends the response.
    fn send_file(&mut self, path: &Path) -> Result<()>;

    fn close(&mut self);

    fn set_write_queue_max_size(&mut self, max: usize);
    fn write_queue_full(&self) -> bool;
    fn on_drain(&mut self, callback: Callback);
    fn on_close(&mut self, callback: Callback);
    fn on_exception(&mut self, callback: ErrorCallback);

    /// Sets a header, replacing any existing values.
    fn put_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers_mut().insert(name, value);
        Ok(())
    }

    fn put_trailer(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.trailers_mut().insert(name, value);
        Ok(())
    }

    fn write_str(&mut self, chunk: &str) -> Result<()> {
        self.write(Bytes::copy_from_slice(chunk.as_bytes()))
    }

    fn write_str_then(&mut self, chunk: &str, done: Done) -> Result<()> {
        self.write_then(Bytes::copy_from_slice(chunk.as_bytes()), done)
    }

    fn write_encoded(&mut self, chunk: &str, charset: Charset) -> Result<()> {
        self.write(charset.encode(chunk))
    }

    fn write_encoded_then(&mut self, chunk: &str, charset: Charset, done: Done) -> Result<()> {
        self.write_then(charset.encode(chunk), done)
    }

    fn end(&mut self) -> Result<()> {
        self.end_with(Bytes::new())
    }

    fn end_str(&mut self, chunk: &str) -> Result<()> {
        self.end_with(Bytes::copy_from_slice(chunk.as_bytes()))
    }

    fn end_encoded(&mut self, chunk: &str, charset: Charset) -> Result<()> {
        self.end_with(charset.encode(chunk))
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header = HeaderName::try_from(name).map_err(|_| Error::InvalidHeader(name.to_owned()))?;
    let value = HeaderValue::try_from(value).map_err(|_| Error::InvalidHeader(name.to_owned()))?;
    Ok((header, value))
}

// ── ServerResponse ────────────────────────────────────────────────────────────

/// Buffered response owned by one exchange.
///
/// Written bytes stay queued until [`finish`](ServerResponse::finish) hands
/// them to hyper, which is also when `*_then` callbacks run. The drain
/// callback runs then too, but only if the write queue filled up.
pub struct ServerResponse {
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap,
    trailers: HeaderMap,
    chunked: bool,
    body: BytesMut,
    file: Option<PathBuf>,
    ended: bool,
    closed: bool,
    queue_max: usize,
    saturated: bool,
    pending: Vec<Done>,
    drain: Option<Callback>,
    close_handler: Option<Callback>,
    exception: Option<ErrorCallback>,
}

impl ServerResponse {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            reason: None,
            headers: HeaderMap::new(),
            trailers: HeaderMap::new(),
            chunked: false,
            body: BytesMut::new(),
            file: None,
            ended: false,
            closed: false,
            queue_max: DEFAULT_WRITE_QUEUE_MAX_SIZE,
            saturated: false,
            pending: Vec::new(),
            drain: None,
            close_handler: None,
            exception: None,
        }
    }

    /// Bytes written so far.
    pub fn body(&self) -> &[u8] { &self.body }

    /// The path recorded by `send_file`, if any.
    pub fn file(&self) -> Option<&Path> { self.file.as_deref() }

    pub fn is_closed(&self) -> bool { self.closed }

    fn writable(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.ended {
            return Err(Error::Ended);
        }
        Ok(())
    }

    fn buffer(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
        self.saturated |= self.write_queue_full();
    }

    fn report(&mut self, err: &Error) {
        match self.exception.as_mut() {
            Some(callback) => callback(err),
            None => warn!(error = %err, "unhandled response error"),
        }
    }

    /// Converts the buffered state into the response hyper sends.
    ///
    /// A `send_file` path is read here. If it cannot be read the error goes
    /// to the exception callback and the client gets an empty `404`.
    pub async fn finish(mut self) -> http::Response<Body> {
        if !self.ended && !self.closed {
            debug!(status = %self.status, "response finished without end");
        }

        let mut body = self.body.split().freeze();
        if let Some(path) = self.file.take() {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    body = Bytes::from(bytes);
                    if !self.headers.contains_key(CONTENT_TYPE) {
                        self.headers.insert(
                            CONTENT_TYPE,
                            HeaderValue::from_static("application/octet-stream"),
                        );
                    }
                }
                Err(e) => {
                    self.report(&Error::Io(e));
                    self.status = StatusCode::NOT_FOUND;
                    self.headers.remove(CONTENT_TYPE);
                    body = Bytes::new();
                }
            }
        }

        let mut headers = std::mem::take(&mut self.headers);
        if self.chunked {
            headers.remove(CONTENT_LENGTH);
        } else {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
        if self.closed {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
        }

        let trailers = std::mem::take(&mut self.trailers);
        let full = Full::new(body);
        let body: Body = if trailers.is_empty() {
            full.boxed()
        } else {
            full.with_trailers(future::ready(Some(Ok(trailers)))).boxed()
        };

        let mut response = http::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        if let Some(reason) = self.reason.take() {
            if let Ok(phrase) = hyper::ext::ReasonPhrase::try_from(reason) {
                response.extensions_mut().insert(phrase);
            }
        }

        for done in std::mem::take(&mut self.pending) {
            done(Ok(()));
        }
        if self.saturated {
            if let Some(drain) = self.drain.as_mut() {
                drain();
            }
        }
        response
    }
}

impl Default for ServerResponse {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for ServerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("buffered", &self.body.len())
            .field("file", &self.file)
            .field("ended", &self.ended)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for ServerResponse {
    fn drop(&mut self) {
        for done in self.pending.drain(..) {
            done(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "response dropped before it was flushed",
            )));
        }
    }
}

impl Transport for ServerResponse {
    fn status(&self) -> StatusCode { self.status }
    fn set_status(&mut self, status: StatusCode) { self.status = status; }
    fn status_message(&self) -> Option<&str> { self.reason.as_deref() }
    fn set_status_message(&mut self, message: String) { self.reason = Some(message); }

    fn headers(&self) -> &HeaderMap { &self.headers }
    fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    fn trailers(&self) -> &HeaderMap { &self.trailers }
    fn trailers_mut(&mut self) -> &mut HeaderMap { &mut self.trailers }

    fn is_chunked(&self) -> bool { self.chunked }
    fn set_chunked(&mut self, chunked: bool) { self.chunked = chunked; }
    fn is_ended(&self) -> bool { self.ended }

    fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.writable()?;
        self.buffer(&chunk);
        Ok(())
    }

    fn write_then(&mut self, chunk: Bytes, done: Done) -> Result<()> {
        self.write(chunk)?;
        self.pending.push(done);
        Ok(())
    }

    fn end_with(&mut self, chunk: Bytes) -> Result<()> {
        self.writable()?;
        self.buffer(&chunk);
        self.ended = true;
        trace!(status = %self.status, len = self.body.len(), "response ended");
        Ok(())
    }

    fn send_file(&mut self, path: &Path) -> Result<()> {
        self.writable()?;
        self.file = Some(path.to_path_buf());
        self.ended = true;
        trace!(path = %path.display(), "response ended with file");
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(callback) = self.close_handler.as_mut() {
            callback();
        }
    }

    fn set_write_queue_max_size(&mut self, max: usize) { self.queue_max = max; }
    fn write_queue_full(&self) -> bool { self.body.len() >= self.queue_max }

    fn on_drain(&mut self, callback: Callback) { self.drain = Some(callback); }
    fn on_close(&mut self, callback: Callback) { self.close_handler = Some(callback); }
    fn on_exception(&mut self, callback: ErrorCallback) { self.exception = Some(callback); }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    async fn collect(response: http::Response<Body>) -> http_body_util::Collected<Bytes> {
        match response.into_body().collect().await {
            Ok(collected) => collected,
            Err(never) => match never {},
        }
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let c = Arc::new(AtomicUsize::new(0));
        (Arc::clone(&c), c)
    }

    #[test]
    fn writes_after_end_are_rejected() {
        let mut res = ServerResponse::new();
        res.write_str("a").unwrap();
        res.end().unwrap();
        assert!(matches!(res.write_str("b"), Err(Error::Ended)));
        assert!(matches!(res.end(), Err(Error::Ended)));
        assert!(matches!(res.send_file(Path::new("x")), Err(Error::Ended)));
        assert_eq!(res.body(), b"a");
    }

    #[test]
    fn close_fires_handler_once_and_blocks_writes() {
        let (seen, c) = counter();
        let mut res = ServerResponse::new();
        res.on_close(Box::new(move || { c.fetch_add(1, Ordering::SeqCst); }));
        res.close();
        res.close();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(matches!(res.write_str("x"), Err(Error::Closed)));
    }

    #[test]
    fn write_queue_fills_at_max_size() {
        let mut res = ServerResponse::new();
        res.set_write_queue_max_size(4);
        res.write_str("abc").unwrap();
        assert!(!res.write_queue_full());
        res.write_str("d").unwrap();
        assert!(res.write_queue_full());
    }

    #[test]
    fn invalid_header_is_an_error() {
        let mut res = ServerResponse::new();
        assert!(matches!(res.put_header("bad header", "v"), Err(Error::InvalidHeader(_))));
        assert!(matches!(res.put_header("x-ok", "line\nbreak"), Err(Error::InvalidHeader(_))));
        res.put_header("X-Ok", "1").unwrap();
        res.put_header("x-ok", "2").unwrap();
        assert_eq!(res.headers().get_all("x-ok").iter().count(), 1);
    }

    #[test]
    fn charsets_encode() {
        assert_eq!(&Charset::Latin1.encode("é")[..], &[0xE9]);
        assert_eq!(&Charset::Latin1.encode("€")[..], b"?");
        assert_eq!(&Charset::Utf16Be.encode("A")[..], &[0x00, 0x41]);
        assert_eq!(&Charset::Utf16Le.encode("A")[..], &[0x41, 0x00]);
        assert_eq!("ISO-8859-1".parse::<Charset>(), Ok(Charset::Latin1));
        assert!("ebcdic".parse::<Charset>().is_err());
    }

    #[tokio::test]
    async fn finish_emits_status_headers_and_body() {
        let mut res = ServerResponse::new();
        res.set_status(StatusCode::CREATED);
        res.set_status_message("Made It".to_owned());
        res.put_header("location", "/things/1").unwrap();
        res.write_str("ab").unwrap();
        res.end_str("c").unwrap();

        let response = res.finish().await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["location"], "/things/1");
        assert_eq!(response.headers()[CONTENT_LENGTH], "3");
        assert!(response.extensions().get::<hyper::ext::ReasonPhrase>().is_some());
        assert_eq!(collect(response).await.to_bytes(), "abc");
    }

    #[tokio::test]
    async fn chunked_response_carries_trailers() {
        let mut res = ServerResponse::new();
        res.set_chunked(true);
        res.put_trailer("x-checksum", "abc").unwrap();
        res.end_str("body").unwrap();

        let response = res.finish().await;
        assert!(response.headers().get(CONTENT_LENGTH).is_none());
        let collected = collect(response).await;
        assert_eq!(collected.trailers().unwrap()["x-checksum"], "abc");
        assert_eq!(collected.to_bytes(), "body");
    }

    #[tokio::test]
    async fn completion_callbacks_run_on_finish() {
        let (seen, c) = counter();
        let (drained, d) = counter();
        let mut res = ServerResponse::new();
        res.set_write_queue_max_size(1);
        res.on_drain(Box::new(move || { d.fetch_add(1, Ordering::SeqCst); }));
        res.write_str_then("a", Box::new(move |r| {
            assert!(r.is_ok());
            c.fetch_add(1, Ordering::SeqCst);
        })).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        res.end().unwrap();
        let _ = res.finish().await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(drained.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drain_waits_for_a_full_queue() {
        let (drained, d) = counter();
        let mut res = ServerResponse::new();
        res.set_write_queue_max_size(4);
        res.on_drain(Box::new(move || { d.fetch_add(1, Ordering::SeqCst); }));
        res.end_str("abc").unwrap();
        assert!(!res.write_queue_full());
        let _ = res.finish().await;
        assert_eq!(drained.load(Ordering::SeqCst), 0);

        let (drained, d) = counter();
        let mut res = ServerResponse::new();
        res.set_write_queue_max_size(4);
        res.on_drain(Box::new(move || { d.fetch_add(1, Ordering::SeqCst); }));
        res.write_str("abcd").unwrap();
        assert!(res.write_queue_full());
        res.end().unwrap();
        let _ = res.finish().await;
        assert_eq!(drained.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_response_fails_pending_callbacks() {
        let (failed, c) = counter();
        let mut res = ServerResponse::new();
        res.write_then(Bytes::from_static(b"a"), Box::new(move |r| {
            assert!(r.is_err());
            c.fetch_add(1, Ordering::SeqCst);
        })).unwrap();
        drop(res);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_file_reads_the_file() {
        let path = std::env::temp_dir()
            .join(format!("tsu-guard-send-file-{}.txt", std::process::id()));
        tokio::fs::write(&path, b"from disk").await.unwrap();

        let mut res = ServerResponse::new();
        res.send_file(&path).unwrap();
        assert!(res.is_ended());

        let response = res.finish().await;
        tokio::fs::remove_file(&path).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/octet-stream");
        assert_eq!(collect(response).await.to_bytes(), "from disk");
    }

    #[tokio::test]
    async fn unreadable_file_reports_and_404s() {
        let (reported, c) = counter();
        let mut res = ServerResponse::new();
        res.on_exception(Box::new(move |err| {
            assert!(matches!(err, Error::Io(_)));
            c.fetch_add(1, Ordering::SeqCst);
        }));
        res.send_file(Path::new("/definitely/not/here.bin")).unwrap();

        let response = res.finish().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(reported.load(Ordering::SeqCst), 1);
        assert!(collect(response).await.to_bytes().is_empty());
    }
}
