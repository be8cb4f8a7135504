//! The request pipeline: middleware stack in front of the router.

use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use tracing::{debug, error};

use crate::exchange::Exchange;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::Router;
use crate::transport::{Body, ServerResponse, Transport};

/// Middleware stack plus router. Build once at startup, then hand to
/// [`Server::serve`](crate::Server::serve).
///
/// For each request:
/// 1. every layer runs in registration order;
/// 2. a layer returning `Err(status)` stops the pipeline and an empty
///    response with that status is sent;
/// 3. a layer that ends the response itself also stops the pipeline;
/// 4. otherwise the routed handler runs and its [`Response`] is sent.
///
/// Responses are always sent through the exchange's hooked response, so
/// hooks registered by layers fire for handler output and rejections alike.
pub struct App {
    layers: Vec<Arc<dyn Middleware>>,
    router: Router,
}

impl App {
    pub fn new(router: Router) -> Self {
        Self { layers: Vec::new(), router }
    }

    /// Appends a layer. Layers run in the order they are added.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Runs one request through the pipeline.
    ///
    /// Used by the server for every connection, and usable directly in
    /// tests without opening a socket.
    pub async fn dispatch(&self, req: http::Request<Bytes>) -> http::Response<Body> {
        let mut exchange = Exchange::new(Request::from(req));

        let stopped = self.run_layers(&mut exchange);
        let (request, mut response) = exchange.into_parts();

        let sent = match stopped {
            Some(Err(status)) => Response::status(status).send(&mut response),
            Some(Ok(())) => Ok(()),
            None => self.route(request).await.send(&mut response),
        };

        match sent {
            Ok(()) => response.into_inner().finish().await,
            Err(e) => {
                // Hooks may have left the exchange's response half written.
                error!(error = %e, "failed to send response");
                drop(response);
                Self::internal_error().await
            }
        }
    }

    /// `Some` if a layer stopped the pipeline: `Err` with the status to
    /// send, or `Ok` when the layer already ended the response.
    fn run_layers(&self, exchange: &mut Exchange) -> Option<Result<(), StatusCode>> {
        for layer in &self.layers {
            if let Err(status) = layer.handle(exchange) {
                debug!(%status, path = exchange.request().path(), "pipeline stopped");
                return Some(Err(status));
            }
            if exchange.response().is_ended() {
                return Some(Ok(()));
            }
        }
        None
    }

    async fn route(&self, mut request: Request) -> Response {
        match self.router.lookup(request.method(), request.path()) {
            Some((handler, params)) => {
                request.set_params(params);
                handler.call(request).await
            }
            None => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn internal_error() -> http::Response<Body> {
        let mut fresh = ServerResponse::new();
        fresh.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        if let Err(e) = fresh.end() {
            error!(error = %e, "failed to end error response");
        }
        fresh.finish().await
    }
}
