//! Response lifecycle hooks.
//!
//! A plain transport gives no signal when its headers are about to go out
//! or when it has finished. [`HookedResponse`] decorates any [`Transport`]
//! and adds two:
//!
//! - **first write**: runs once, immediately before the first byte-producing
//!   call (any write variant, any end variant, or `send_file`) reaches the
//!   inner transport. The last moment headers can still change.
//! - **end**: runs after an end variant has finished the inner transport.
//!
//! Hooks run synchronously on the calling task and receive the inner
//! transport. An error from a hook is returned from the call that triggered
//! it; for a first-write hook the inner call is then not made.
//!
//! ```rust
//! use tsu_guard::middleware::HookedResponse;
//! use tsu_guard::{ServerResponse, Transport};
//!
//! let mut res = HookedResponse::new(ServerResponse::new());
//! res.on_first_write(|inner: &mut ServerResponse| inner.put_header("x-rendered-by", "tsu"));
//! res.end_str("hello").unwrap();
//! assert_eq!(res.headers()["x-rendered-by"], "tsu");
//! ```

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tracing::trace;

use crate::error::Result;
use crate::transport::{Callback, Charset, Done, ErrorCallback, Transport};

/// A lifecycle hook. Receives the wrapped transport.
pub type Hook<T> = Box<dyn FnOnce(&mut T) -> Result<()> + Send>;

struct FirstWrite<T> {
    hook: Option<Hook<T>>,
    fired: bool,
}

/// A [`Transport`] decorator exposing first-write and end hooks.
pub struct HookedResponse<T> {
    inner: T,
    first_write: FirstWrite<T>,
    end: Option<Hook<T>>,
}

impl<T: Transport> HookedResponse<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            first_write: FirstWrite { hook: None, fired: false },
            end: None,
        }
    }

    /// Registers the first-write hook, replacing any previous one, and arms
    /// it again even if an earlier hook already fired.
    pub fn on_first_write<F>(&mut self, hook: F)
    where
        F: FnOnce(&mut T) -> Result<()> + Send + 'static,
    {
        self.first_write = FirstWrite { hook: Some(Box::new(hook)), fired: false };
    }

    /// Registers the end hook, replacing any previous one.
    pub fn on_end<F>(&mut self, hook: F)
    where
        F: FnOnce(&mut T) -> Result<()> + Send + 'static,
    {
        self.end = Some(Box::new(hook));
    }

    pub fn get_ref(&self) -> &T { &self.inner }
    pub fn get_mut(&mut self) -> &mut T { &mut self.inner }
    pub fn into_inner(self) -> T { self.inner }

    fn first_write(&mut self) -> Result<()> {
        if self.first_write.fired {
            return Ok(());
        }
        if let Some(hook) = self.first_write.hook.take() {
            self.first_write.fired = true;
            trace!("firing first-write hook");
            hook(&mut self.inner)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match self.end.take() {
            Some(hook) => {
                trace!("firing end hook");
                hook(&mut self.inner)
            }
            None => Ok(()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for HookedResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookedResponse")
            .field("inner", &self.inner)
            .field("first_write_armed", &self.first_write.hook.is_some())
            .field("first_write_fired", &self.first_write.fired)
            .field("end_armed", &self.end.is_some())
            .finish()
    }
}

impl<T: Transport> Transport for HookedResponse<T> {
    fn status(&self) -> StatusCode { self.inner.status() }
    fn set_status(&mut self, status: StatusCode) { self.inner.set_status(status) }
    fn status_message(&self) -> Option<&str> { self.inner.status_message() }
    fn set_status_message(&mut self, message: String) { self.inner.set_status_message(message) }

    fn headers(&self) -> &HeaderMap { self.inner.headers() }
    fn headers_mut(&mut self) -> &mut HeaderMap { self.inner.headers_mut() }
    fn trailers(&self) -> &HeaderMap { self.inner.trailers() }
    fn trailers_mut(&mut self) -> &mut HeaderMap { self.inner.trailers_mut() }
    fn put_header(&mut self, name: &str, value: &str) -> Result<()> { self.inner.put_header(name, value) }
    fn put_trailer(&mut self, name: &str, value: &str) -> Result<()> { self.inner.put_trailer(name, value) }

    fn is_chunked(&self) -> bool { self.inner.is_chunked() }
    fn set_chunked(&mut self, chunked: bool) { self.inner.set_chunked(chunked) }
    fn is_ended(&self) -> bool { self.inner.is_ended() }

    fn close(&mut self) { self.inner.close() }
    fn set_write_queue_max_size(&mut self, max: usize) { self.inner.set_write_queue_max_size(max) }
    fn write_queue_full(&self) -> bool { self.inner.write_queue_full() }
    fn on_drain(&mut self, callback: Callback) { self.inner.on_drain(callback) }
    fn on_close(&mut self, callback: Callback) { self.inner.on_close(callback) }
    fn on_exception(&mut self, callback: ErrorCallback) { self.inner.on_exception(callback) }

    // ── byte-producing calls ──────────────────────────────────────────────────

    fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.first_write()?;
        self.inner.write(chunk)
    }

    fn write_then(&mut self, chunk: Bytes, done: Done) -> Result<()> {
        self.first_write()?;
        self.inner.write_then(chunk, done)
    }

    fn write_str(&mut self, chunk: &str) -> Result<()> {
        self.first_write()?;
        self.inner.write_str(chunk)
    }

    fn write_str_then(&mut self, chunk: &str, done: Done) -> Result<()> {
        self.first_write()?;
        self.inner.write_str_then(chunk, done)
    }

    fn write_encoded(&mut self, chunk: &str, charset: Charset) -> Result<()> {
        self.first_write()?;
        self.inner.write_encoded(chunk, charset)
    }

    fn write_encoded_then(&mut self, chunk: &str, charset: Charset, done: Done) -> Result<()> {
        self.first_write()?;
        self.inner.write_encoded_then(chunk, charset, done)
    }

    fn send_file(&mut self, path: &Path) -> Result<()> {
        self.first_write()?;
        self.inner.send_file(path)
    }

    // ── terminating calls ─────────────────────────────────────────────────────

    fn end(&mut self) -> Result<()> {
        self.first_write()?;
        self.inner.end()?;
        self.finish()
    }

    fn end_with(&mut self, chunk: Bytes) -> Result<()> {
        self.first_write()?;
        self.inner.end_with(chunk)?;
        self.finish()
    }

    fn end_str(&mut self, chunk: &str) -> Result<()> {
        self.first_write()?;
        self.inner.end_str(chunk)?;
        self.finish()
    }

    fn end_encoded(&mut self, chunk: &str, charset: Charset) -> Result<()> {
        self.first_write()?;
        self.inner.end_encoded(chunk, charset)?;
        self.finish()
    }
}
