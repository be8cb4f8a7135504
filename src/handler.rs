//! Handler trait and type erasure.
//!
//! # Storing handlers of different types
//!
//! Every `async fn` is its own type, yet the router keeps all of them in one
//! `matchit` tree per method. A tree holds a single value type, so each
//! handler is wrapped in `FnHandler` and stored as `Arc<dyn ErasedHandler>`.
//! The concrete type disappears behind the vtable.
//!
//! After the middleware stack has run, the path from a registered function
//! to the future the server awaits is:
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ router.on(Method::GET, "/", hello)
//! Arc::new(FnHandler(hello))                       ← BoxedHandler
//!        ↓ handler.call(req)
//! Box::pin(async { hello(req).await.into_response() })
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// The future returned by an erased handler.
///
/// Boxed because every handler's future has a different, unnameable type.
/// Pinned because an `async` block may hold references into itself and must
/// stay put once polled. `Send + 'static` lets tokio move it to any worker.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Object-safe call interface the router dispatches through.
///
/// `pub` only because it appears in [`Handler::into_boxed_handler`]'s
/// signature; hidden from docs since nothing outside the crate calls it.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A handler shared by every request that matches its route.
///
/// One atomic increment per request, no copy of the handler itself.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid terminal handler.
///
/// Satisfied automatically by any `async fn(Request) -> impl IntoResponse`.
/// Sealed through the private `Sealed` supertrait: only the blanket impl
/// below can provide it. Callers cannot implement it by hand, so the
/// signature accepted by [`Router::get`](crate::Router::get) and friends can
/// change without breaking anyone.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

// Not reachable from outside the crate, which is what seals `Handler`.
mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Adapts a plain `Fn(Request) -> Future` to [`ErasedHandler`].
///
/// The user future is awaited inside a fresh `async` block so its output can
/// be turned into a [`Response`] before the whole thing is boxed.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}
