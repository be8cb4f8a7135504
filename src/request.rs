//! Incoming HTTP request type and its per-exchange property bag.

use std::collections::HashMap;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, Uri, Version};

use crate::form;

/// Mutable string-keyed values scoped to one exchange.
///
/// Middleware uses the bag to hand state to later stages and to the handler,
/// e.g. the CSRF token a form template must embed.
#[derive(Clone, Debug, Default)]
pub struct Props(HashMap<String, String>);

impl Props {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Stores `value` under `key`, returning the value it replaced.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

/// An incoming HTTP request with its body already collected.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    query: HashMap<String, String>,
    form: Option<HashMap<String, String>>,
    props: Props,
    expect_multipart: bool,
}

impl Request {
    pub(crate) fn new(parts: http::request::Parts, body: Bytes) -> Self {
        let query = parts.uri.query()
            .map(|q| form::urlencoded(q.as_bytes()))
            .unwrap_or_default();

        let mut req = Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            query,
            form: None,
            props: Props::default(),
            expect_multipart: false,
        };

        if req.content_type().is_some_and(|ct| {
            ct.split(';').next().unwrap_or("").trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        }) {
            req.form = Some(form::urlencoded(&req.body));
        }
        req
    }

    /// The effective method. May differ from the wire method after
    /// [`set_method`](Request::set_method).
    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Overrides the effective method seen by later stages and the router.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// First value of a query-string parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// A parsed form attribute. Url-encoded bodies are parsed up front;
    /// multipart text fields become available once
    /// [`expect_multipart`](Request::expect_multipart) has been declared.
    pub fn form(&self, key: &str) -> Option<&str> {
        self.form.as_ref()?.get(key).map(String::as_str)
    }

    pub fn props(&self) -> &Props { &self.props }
    pub fn props_mut(&mut self) -> &mut Props { &mut self.props }

    pub fn is_expecting_multipart(&self) -> bool { self.expect_multipart }

    /// Declares that the body may be `multipart/form-data` and that its text
    /// fields should be exposed through [`form`](Request::form).
    pub fn expect_multipart(&mut self, expect: bool) {
        self.expect_multipart = expect;
        if !expect || self.form.is_some() {
            return;
        }
        let fields = self.content_type()
            .and_then(form::boundary)
            .map(|b| form::multipart_fields(&self.body, b));
        if fields.is_some() {
            self.form = fields;
        }
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

/// Builds a request from an `http` request whose body is already in memory.
impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts, body)
    }
}
