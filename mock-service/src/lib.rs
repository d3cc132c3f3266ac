//! A small web application used as the load-test target in tests and
//! demos: a cookie-based login flow, a few authenticated pages, and
//! endpoints with configurable delay and failure behavior.

use axum::extract::{Form, Path};
use axum::http::header::{HeaderMap, COOKIE, SET_COOKIE};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use rand::Rng;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

pub const PASSWORD: &str = "nC_AJbc4Cmia_7S";
pub const PHONE: &str = "652347819";

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

pub fn app() -> Router {
    Router::new()
        .route("/index.html", get(login_page))
        .route("/php/traitementIndex.php", post(login))
        .route("/home.php", get(dashboard))
        .route("/users-profile.php", get(profile))
        .route("/tasks.php", get(tasks))
        .route("/whoami", get(whoami))
        .route("/delay/ms/:delay_ms", get(delay))
        .route("/flaky/:fail_percent", get(flaky))
}

pub async fn run(addr: SocketAddr) {
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app()).await.unwrap();
}

/// Bind an ephemeral local port and serve in the background; returns
/// the bound address. Lets tests and demos run against a hermetic
/// in-process target.
pub async fn spawn() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app()).await.unwrap();
    });
    addr
}

async fn login_page() -> Html<&'static str> {
    Html(
        "<html><body><form method=post action=/php/traitementIndex.php>\
         <input name=phone><input name=password type=password>\
         <button>login</button></form></body></html>",
    )
}

#[derive(Deserialize)]
struct LoginForm {
    password: String,
    phone: String,
}

async fn login(Form(form): Form<LoginForm>) -> Response {
    if form.password == PASSWORD && form.phone == PHONE {
        let session = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        debug!(session, "login ok");
        (
            StatusCode::OK,
            [(SET_COOKIE, format!("session={session}; Path=/"))],
            "welcome",
        )
            .into_response()
    } else {
        debug!("login rejected");
        (StatusCode::UNAUTHORIZED, "bad credentials").into_response()
    }
}

async fn dashboard(headers: HeaderMap) -> Response {
    authenticated_page(&headers, "<html><body><h1>Dashboard</h1></body></html>")
}

async fn profile(headers: HeaderMap) -> Response {
    authenticated_page(&headers, "<html><body><h1>Profile</h1></body></html>")
}

async fn tasks(headers: HeaderMap) -> Response {
    authenticated_page(&headers, "<html><body><h1>Tasks</h1></body></html>")
}

async fn whoami(headers: HeaderMap) -> String {
    match session_from(&headers) {
        Some(session) => format!("session:{session}"),
        None => "anon".to_string(),
    }
}

async fn delay(Path(delay_ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    "ok"
}

async fn flaky(Path(fail_percent): Path<u8>) -> Result<&'static str, StatusCode> {
    let roll: u8 = rand::thread_rng().gen_range(0..100);
    if roll < fail_percent {
        Err(StatusCode::INTERNAL_SERVER_ERROR)
    } else {
        Ok("ok")
    }
}

fn authenticated_page(headers: &HeaderMap, body: &'static str) -> Response {
    match session_from(headers) {
        Some(_) => Html(body).into_response(),
        None => (StatusCode::FORBIDDEN, "login required").into_response(),
    }
}

fn session_from(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name.trim() == "session").then(|| value.trim().to_string())
    })
}
