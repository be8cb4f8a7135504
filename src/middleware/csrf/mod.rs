//! Cross-site request forgery protection.
//!
//! [`Csrf`] makes sure every exchange carries a token in its property bag
//! and, for state-changing methods, that the client sent the same token
//! back.
//!
//! Per exchange:
//!
//! ```text
//! no token ──issue──▶ token ──GET/HEAD/OPTIONS──▶ exempt     (continue)
//!                       │
//!                       └──other methods──▶ compare ──equal──▶ validated (continue)
//!                                              └──otherwise──▶ rejected  (403)
//! ```
//!
//! A token already in the bag, e.g. restored from a session by an earlier
//! stage, is reused. Safe methods still get a token so the handler can embed
//! it in a rendered form. Nothing here persists the token past the exchange;
//! that is the session layer's job.
//!
//! For form-field lookup to work the body must already be parsed when this
//! stage runs. Before extracting, the stage declares that the body may be
//! multipart so its text fields are parsed too.

use http::{Method, StatusCode};
use tracing::{debug, error, trace, warn};

use crate::exchange::Exchange;
use crate::middleware::{Middleware, Outcome};

mod extract;
mod token;

pub use extract::{Extract, FirstOf, FormField, Header, QueryParam, TOKEN_HEADER};
pub use token::{RngTokens, TOKEN_BYTES, TokenSource};

use token::tokens_match;

/// Property-bag key used when none is configured.
pub const DEFAULT_KEY: &str = "_csrf";

/// CSRF middleware.
///
/// ```rust
/// use tsu_guard::middleware::Csrf;
/// use tsu_guard::{App, Router};
///
/// let app = App::new(Router::new()).layer(Csrf::new());
/// ```
pub struct Csrf {
    key: String,
    extractor: Box<dyn Extract>,
    tokens: Box<dyn TokenSource>,
}

impl Csrf {
    /// Stores the token under `"_csrf"` and uses the standard lookup.
    pub fn new() -> Self {
        Self::with_key(DEFAULT_KEY)
    }

    /// Stores the token under `key`. The standard lookup uses the same name
    /// for the form field and query parameter. An empty key means
    /// [`DEFAULT_KEY`].
    pub fn with_key(key: impl Into<String>) -> Self {
        let mut key = key.into();
        if key.is_empty() {
            key = DEFAULT_KEY.to_owned();
        }
        Self {
            extractor: Box::new(FirstOf::standard(&key)),
            tokens: Box::new(RngTokens::os()),
            key,
        }
    }

    /// Replaces the lookup of the submitted token.
    pub fn extractor(mut self, extractor: impl Extract) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Replaces where fresh tokens come from.
    pub fn token_source(mut self, tokens: impl TokenSource) -> Self {
        self.tokens = Box::new(tokens);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn is_exempt(method: &Method) -> bool {
        matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
    }
}

impl Default for Csrf {
    fn default() -> Self { Self::new() }
}

impl Middleware for Csrf {
    fn handle(&self, exchange: &mut Exchange) -> Outcome {
        let req = exchange.request_mut();

        if !req.props().contains(&self.key) {
            let token = self.tokens.generate();
            trace!(key = %self.key, "issued csrf token");
            req.props_mut().put(self.key.as_str(), token);
        }

        if Self::is_exempt(req.method()) {
            return Ok(());
        }

        req.expect_multipart(true);
        let submitted = self.extractor.extract(req);

        // Issued on entry; never compare against a missing token.
        debug_assert!(req.props().contains(&self.key), "csrf token missing from property bag");
        let Some(expected) = req.props().get(&self.key) else {
            error!(key = %self.key, "csrf token missing from property bag");
            return Err(StatusCode::FORBIDDEN);
        };

        match submitted {
            Some(ref value) if tokens_match(expected, value) => {
                debug!(method = %req.method(), path = req.path(), "csrf token accepted");
                Ok(())
            }
            Some(_) => {
                warn!(method = %req.method(), path = req.path(), "csrf token mismatch");
                Err(StatusCode::FORBIDDEN)
            }
            None => {
                warn!(method = %req.method(), path = req.path(), "csrf token missing");
                Err(StatusCode::FORBIDDEN)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use proptest::prelude::*;
    use rand::rngs::StdRng;

    use super::*;
    use crate::request::Request;

    fn exchange(builder: http::request::Builder, body: &'static str) -> Exchange {
        let req = builder.body(Bytes::from_static(body.as_bytes())).unwrap();
        Exchange::new(Request::from(req))
    }

    fn with_token(mut ex: Exchange, token: &str) -> Exchange {
        ex.request_mut().props_mut().put(DEFAULT_KEY, token);
        ex
    }

    fn fixed(token: &'static str) -> impl TokenSource {
        move || token.to_owned()
    }

    #[test]
    fn safe_methods_are_exempt_and_never_extract() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let csrf = Csrf::new().extractor(move |_: &Request| -> Option<String> {
            seen.fetch_add(1, Ordering::SeqCst);
            None
        });

        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            let mut ex = exchange(http::Request::builder().method(method), "");
            assert_eq!(csrf.handle(&mut ex), Ok(()));
            assert!(ex.request().props().contains(DEFAULT_KEY));
            assert!(!ex.request().is_expecting_multipart());

            let mut ex = with_token(exchange(http::Request::get("/"), ""), "preset");
            assert_eq!(csrf.handle(&mut ex), Ok(()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn token_is_issued_once_and_reused() {
        let csrf = Csrf::new().token_source(RngTokens::<StdRng>::seeded(1));
        let mut ex = exchange(http::Request::get("/"), "");
        csrf.handle(&mut ex).unwrap();
        let first = ex.request().props().get(DEFAULT_KEY).unwrap().to_owned();
        csrf.handle(&mut ex).unwrap();
        assert_eq!(ex.request().props().get(DEFAULT_KEY), Some(first.as_str()));
    }

    #[test]
    fn existing_token_is_not_regenerated() {
        let csrf = Csrf::new().token_source(fixed("fresh"));
        let mut ex = with_token(
            exchange(http::Request::post("/").header("x-csrf-token", "restored"), ""),
            "restored",
        );
        assert_eq!(csrf.handle(&mut ex), Ok(()));
        assert_eq!(ex.request().props().get(DEFAULT_KEY), Some("restored"));
    }

    #[test]
    fn mutating_request_compares_against_the_token_issued_on_entry() {
        let csrf = Csrf::new()
            .token_source(fixed("fresh"))
            .extractor(|req: &Request| -> Option<String> {
                assert_eq!(req.props().get(DEFAULT_KEY), Some("fresh"));
                Some("fresh".to_owned())
            });
        let mut ex = exchange(http::Request::post("/"), "");
        assert_eq!(csrf.handle(&mut ex), Ok(()));
    }

    #[test]
    fn header_match_and_mismatch() {
        let csrf = Csrf::with_key("");
        assert_eq!(csrf.key(), "_csrf");

        let mut ok = with_token(
            exchange(http::Request::post("/").header("x-csrf-token", "abc123"), ""),
            "abc123",
        );
        assert_eq!(csrf.handle(&mut ok), Ok(()));

        let mut bad = with_token(
            exchange(http::Request::post("/").header("x-csrf-token", "xyz999"), ""),
            "abc123",
        );
        assert_eq!(csrf.handle(&mut bad), Err(StatusCode::FORBIDDEN));
    }

    #[test]
    fn absent_token_is_rejected() {
        let csrf = Csrf::new();
        let mut ex = exchange(http::Request::post("/"), "");
        assert_eq!(csrf.handle(&mut ex), Err(StatusCode::FORBIDDEN));
        // Issued even on rejection.
        assert!(ex.request().props().contains(DEFAULT_KEY));
    }

    #[test]
    fn empty_submission_is_rejected() {
        let csrf = Csrf::new();
        let mut ex = with_token(exchange(http::Request::delete("/?_csrf="), ""), "abc");
        assert_eq!(csrf.handle(&mut ex), Err(StatusCode::FORBIDDEN));
    }

    #[test]
    fn form_field_and_query_are_accepted() {
        let csrf = Csrf::new();

        let mut form = with_token(
            exchange(
                http::Request::put("/")
                    .header("content-type", "application/x-www-form-urlencoded"),
                "name=x&_csrf=tok",
            ),
            "tok",
        );
        assert_eq!(csrf.handle(&mut form), Ok(()));

        let mut query = with_token(exchange(http::Request::patch("/?_csrf=tok"), ""), "tok");
        assert_eq!(csrf.handle(&mut query), Ok(()));
    }

    #[test]
    fn multipart_field_is_accepted() {
        let csrf = Csrf::new();
        let mut ex = with_token(
            exchange(
                http::Request::post("/upload")
                    .header("content-type", "multipart/form-data; boundary=zz"),
                "--zz\r\nContent-Disposition: form-data; name=\"_csrf\"\r\n\r\ntok\r\n--zz--\r\n",
            ),
            "tok",
        );
        assert_eq!(csrf.handle(&mut ex), Ok(()));
        assert!(ex.request().is_expecting_multipart());
    }

    #[test]
    fn custom_key_and_extractor() {
        let csrf = Csrf::with_key("xsrf")
            .extractor(|req: &Request| req.header("x-xsrf").map(str::to_owned));

        let mut ex = exchange(http::Request::post("/").header("x-xsrf", "t"), "");
        ex.request_mut().props_mut().put("xsrf", "t");
        assert_eq!(csrf.handle(&mut ex), Ok(()));

        // The default header is no longer consulted.
        let mut ex = exchange(http::Request::post("/").header("x-csrf-token", "t"), "");
        ex.request_mut().props_mut().put("xsrf", "t");
        assert_eq!(csrf.handle(&mut ex), Err(StatusCode::FORBIDDEN));
    }

    #[test]
    fn issued_token_validates_on_the_same_exchange() {
        let csrf = Csrf::new().token_source(fixed("issued"));
        let mut ex = exchange(http::Request::post("/?_csrf=issued"), "");
        assert_eq!(csrf.handle(&mut ex), Ok(()));
    }

    proptest! {
        #[test]
        fn any_different_submission_is_rejected(stored in "[A-Za-z0-9_-]{1,32}", other in "\\PC{0,40}") {
            prop_assume!(stored != other);
            let csrf = Csrf::new().extractor(move |_: &Request| Some(other.clone()));
            let mut ex = with_token(exchange(http::Request::post("/"), ""), &stored);
            prop_assert_eq!(csrf.handle(&mut ex), Err(StatusCode::FORBIDDEN));
        }

        #[test]
        fn equal_submission_is_accepted(stored in "[A-Za-z0-9_-]{1,32}") {
            let echoed = stored.clone();
            let csrf = Csrf::new().extractor(move |_: &Request| Some(echoed.clone()));
            let mut ex = with_token(exchange(http::Request::post("/"), ""), &stored);
            prop_assert_eq!(csrf.handle(&mut ex), Ok(()));
        }
    }
}
