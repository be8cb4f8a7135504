//! Minimal example: a CSRF-protected form and a late header via hooks.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/notes                     # form with a fresh token
//!   curl -i -X POST http://localhost:3000/notes -d 'text=hi' # 403, no token
//!   curl -i -X POST http://localhost:3000/notes \
//!        -H 'x-csrf-token: demo-token' -d 'text=hi'         # 201

use std::time::Instant;

use tracing::info;
use tsu_guard::middleware::{Csrf, Outcome};
use tsu_guard::{App, Exchange, Request, Response, Router, Server, Transport};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let router = Router::new()
        .get("/notes",  show_form)
        .post("/notes", create_note);

    let app = App::new(router)
        .layer(timing)
        .layer(demo_session)
        .layer(Csrf::new());

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

// Adds `x-response-time` just before the first byte goes out and logs once
// the response has ended.
fn timing(ex: &mut Exchange) -> Outcome {
    let started = Instant::now();
    let path = ex.request().path().to_owned();
    let res = ex.response_mut();
    res.on_first_write(move |inner| {
        let micros = started.elapsed().as_micros().to_string();
        inner.put_header("x-response-time", &format!("{micros}us"))
    });
    res.on_end(move |inner| {
        info!(%path, status = %inner.status(), "response sent");
        Ok(())
    });
    Ok(())
}

// A real app would restore the token from its session store here.
fn demo_session(ex: &mut Exchange) -> Outcome {
    if ex.request().header("x-csrf-token").is_some() {
        ex.request_mut().props_mut().put("_csrf", "demo-token");
    }
    Ok(())
}

// GET /notes
async fn show_form(req: Request) -> Response {
    let token = req.props().get("_csrf").unwrap_or_default();
    Response::html(format!(
        r#"<form method="post" action="/notes">
  <input type="hidden" name="_csrf" value="{token}">
  <input name="text">
  <button>save</button>
</form>
"#
    ))
}

// POST /notes: only reached when the token matched.
async fn create_note(req: Request) -> Response {
    let text = req.form("text").unwrap_or("");
    Response::builder()
        .status(http::StatusCode::CREATED)
        .text(format!("saved: {text}\n"))
}
