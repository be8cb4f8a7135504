//! Middleware layer.
//!
//! A middleware is a pipeline stage that runs before the terminal handler.
//! It may read and mutate the [`Exchange`] and then either lets the pipeline
//! continue (`Ok(())`) or stops it with a status (`Err(status)`). On a
//! stop, later stages and the handler are skipped and the server sends an
//! empty response with that status.
//!
//! Built-in stages:
//! - [`csrf`]: token issuance and validation for state-changing requests
//! - [`hooks`]: first-write and end hooks on the response
//!
//! Any `Fn(&mut Exchange) -> Outcome` is a middleware:
//!
//! ```rust
//! use tsu_guard::middleware::Outcome;
//! use tsu_guard::{App, Exchange, Router};
//!
//! fn request_id(ex: &mut Exchange) -> Outcome {
//!     ex.response_mut().on_first_write(|res| {
//!         use tsu_guard::Transport;
//!         res.put_header("x-request-id", "42")
//!     });
//!     Ok(())
//! }
//!
//! let app = App::new(Router::new()).layer(request_id);
//! ```

use http::StatusCode;

use crate::exchange::Exchange;

pub mod csrf;
pub mod hooks;

pub use csrf::Csrf;
pub use hooks::{Hook, HookedResponse};

/// Result of one pipeline stage.
pub type Outcome = Result<(), StatusCode>;

/// A pipeline stage.
///
/// Stages run one after another on the exchange's task. They are
/// synchronous: anything a stage needs from the network must already be on
/// the request by the time it runs.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, exchange: &mut Exchange) -> Outcome;
}

impl<F> Middleware for F
where
    F: Fn(&mut Exchange) -> Outcome + Send + Sync + 'static,
{
    fn handle(&self, exchange: &mut Exchange) -> Outcome {
        self(exchange)
    }
}
