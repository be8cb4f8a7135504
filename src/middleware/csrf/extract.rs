//! Locating the token a client submitted.
//!
//! An [`Extract`] maps a request to the token it carries, if any. The
//! default strategy is an ordered [`FirstOf`] over three locations:
//!
//! 1. [`FormField`]: the parsed request body
//! 2. [`QueryParam`]: the query string
//! 3. [`Header`]: `x-csrf-token`
//!
//! Replace it wholesale with [`Csrf::extractor`](super::Csrf::extractor).
//! Closures work directly:
//!
//! ```rust
//! use tsu_guard::Request;
//! use tsu_guard::middleware::Csrf;
//!
//! let csrf = Csrf::new().extractor(|req: &Request| {
//!     req.header("x-xsrf-token").map(str::to_owned)
//! });
//! ```

use std::fmt;

use crate::request::Request;

/// Header consulted by the default strategy.
pub const TOKEN_HEADER: &str = "x-csrf-token";

/// Recovers a submitted token from a request.
///
/// `None` means the request carries no token at all, which is distinct from
/// an empty one; both fail validation.
pub trait Extract: Send + Sync + 'static {
    fn extract(&self, req: &Request) -> Option<String>;
}

impl<F> Extract for F
where
    F: Fn(&Request) -> Option<String> + Send + Sync + 'static,
{
    fn extract(&self, req: &Request) -> Option<String> {
        self(req)
    }
}

/// A parsed form attribute.
#[derive(Clone, Debug)]
pub struct FormField(pub String);

impl Extract for FormField {
    fn extract(&self, req: &Request) -> Option<String> {
        req.form(&self.0).map(str::to_owned)
    }
}

/// A query-string parameter.
#[derive(Clone, Debug)]
pub struct QueryParam(pub String);

impl Extract for QueryParam {
    fn extract(&self, req: &Request) -> Option<String> {
        req.query(&self.0).map(str::to_owned)
    }
}

/// A request header, matched case-insensitively.
#[derive(Clone, Debug)]
pub struct Header(pub String);

impl Extract for Header {
    fn extract(&self, req: &Request) -> Option<String> {
        req.header(&self.0).map(str::to_owned)
    }
}

/// Tries each strategy in order and returns the first hit.
#[derive(Default)]
pub struct FirstOf(Vec<Box<dyn Extract>>);

impl FirstOf {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a lower-priority strategy.
    pub fn or(mut self, next: impl Extract) -> Self {
        self.0.push(Box::new(next));
        self
    }

    /// The default lookup for `key`: form field, then query parameter, then
    /// the `x-csrf-token` header.
    pub fn standard(key: &str) -> Self {
        Self::new()
            .or(FormField(key.to_owned()))
            .or(QueryParam(key.to_owned()))
            .or(Header(TOKEN_HEADER.to_owned()))
    }
}

impl Extract for FirstOf {
    fn extract(&self, req: &Request) -> Option<String> {
        self.0.iter().find_map(|e| e.extract(req))
    }
}

impl fmt::Debug for FirstOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirstOf").field("strategies", &self.0.len()).finish()
    }
}
