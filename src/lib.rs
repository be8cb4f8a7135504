//! # tsu-guard
//!
//! Pipeline stages for the tsu HTTP framework: things that run between the
//! socket and your handler.
//!
//! - [`middleware::HookedResponse`]: first-write and end hooks on any
//!   response, for stages that need to touch headers at the last moment or
//!   react once the response is out.
//! - [`middleware::Csrf`]: issues a per-exchange token and rejects
//!   state-changing requests that do not send it back.
//!
//! Around them sits a thin server: a [`Request`] with a per-exchange
//! property bag, a buffered [`ServerResponse`] behind the [`Transport`]
//! trait, a radix-tree [`Router`], and [`App`], which runs the middleware
//! stack in front of the router.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tsu_guard::middleware::Csrf;
//! use tsu_guard::{App, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = Router::new()
//!         .get("/form",  show_form)
//!         .post("/form", submit);
//!
//!     let app = App::new(router).layer(Csrf::new());
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn show_form(req: Request) -> Response {
//!     let token = req.props().get("_csrf").unwrap_or_default();
//!     Response::html(format!(
//!         r#"<form method="post"><input type="hidden" name="_csrf" value="{token}"></form>"#
//!     ))
//! }
//!
//! async fn submit(_req: Request) -> Response {
//!     Response::text("saved")
//! }
//! ```

mod app;
mod error;
mod exchange;
mod form;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod transport;

pub mod middleware;

pub use app::App;
pub use error::{Error, Result};
pub use exchange::Exchange;
pub use handler::Handler;
pub use request::{Props, Request};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use transport::{
    Body, Callback, Charset, DEFAULT_WRITE_QUEUE_MAX_SIZE, Done, ErrorCallback, ServerResponse,
    Transport,
};
