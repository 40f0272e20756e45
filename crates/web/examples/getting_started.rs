//! Builds an app and drives a few in-memory requests through it.
//!
//! run with `cargo run --example getting_started`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use micro_event::router::{get, post, Router};
use micro_event::session::SessionConfig;
use micro_event::{handler_fn, App, Event, EventHandler, HttpError, IntoReply, Reply, ResponseBody};
use micro_event_http::codec::multipart::{MultipartEncoder, Part};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Deserialize, Debug)]
struct Paging {
    page: Option<u32>,
}

async fn index(_event: &mut Event) -> &'static str {
    "<h1>micro event</h1>"
}

async fn show_user(event: &mut Event) -> Result<Value, HttpError> {
    let id = event.param("id").ok_or_else(|| HttpError::new(400))?.to_string();
    let paging: Paging = event.query()?;
    Ok(json!({ "id": id, "page": paging.page.unwrap_or(1) }))
}

async fn upload(event: &mut Event) -> Result<Value, HttpError> {
    let parts = event.read_multipart_form_data().await?.unwrap_or_default();
    let files = parts
        .iter()
        .map(|part| json!({ "name": part.name(), "filename": part.filename(), "size": part.payload().len() }))
        .collect::<Vec<_>>();
    Ok(json!({ "files": files }))
}

struct Visits {
    config: Arc<SessionConfig>,
}

#[async_trait]
impl EventHandler for Visits {
    async fn handle(&self, event: &mut Event) -> Result<Reply, HttpError> {
        let mut session = event.session(&self.config)?;
        let visits = session.data().get("visits").and_then(Value::as_u64).unwrap_or(0) + 1;

        let mut patch = Map::new();
        patch.insert("visits".to_string(), json!(visits));
        session.update(patch)?;

        format!("visit #{visits} of session {}", session.id()).into_reply()
    }
}

async fn send(app: &App, request: Request<Full<Bytes>>) -> Response<ResponseBody> {
    let uri = request.uri().clone();
    let response = app.handle_request(request).await;
    info!(%uri, status = %response.status(), "handled");
    response
}

async fn print_body(response: Response<ResponseBody>) {
    match response.into_body().collect().await {
        Ok(collected) => println!("{}\n", String::from_utf8_lossy(&collected.to_bytes())),
        Err(e) => println!("body error: {e}\n"),
    }
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let sessions = Arc::new(
        SessionConfig::builder("please use a real secret of at least 32 bytes")
            .name("demo")
            .max_age(Duration::from_secs(3600))
            .build(),
    );

    let api = Router::builder()
        .strict(true)
        .route("/users/:id", get(handler_fn(show_user)))
        .route("/upload", post(handler_fn(upload)))
        .route("/visits", get(Visits { config: Arc::clone(&sessions) }))
        .build()
        .expect("routes should be valid");

    let app = App::builder().debug(true).layer("/api", api).layer("/", handler_fn(index)).build();

    let response = send(&app, Request::get("/api/users/7?page=2").body(Full::default()).unwrap()).await;
    print_body(response).await;

    let encoder = MultipartEncoder::new("demo-boundary")
        .part(Part::new().with_name("title").with_payload("holiday"))
        .part(Part::new().with_name("photo").with_filename("beach.jpg").with_content_type("image/jpeg").with_payload(vec![0xff, 0xd8, 0xff]));
    let content_type = encoder.content_type();
    let body = encoder.finish();
    let request = Request::post("/api/upload")
        .header("content-type", content_type)
        .header("content-length", body.len())
        .body(Full::new(body))
        .unwrap();
    print_body(send(&app, request).await).await;

    let response = send(&app, Request::get("/api/visits").body(Full::default()).unwrap()).await;
    let cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .unwrap_or_default()
        .to_string();
    print_body(response).await;

    let response = send(&app, Request::get("/api/visits").header("cookie", cookie).body(Full::default()).unwrap()).await;
    print_body(response).await;

    print_body(send(&app, Request::delete("/api/users/7").body(Full::default()).unwrap()).await).await;
    print_body(send(&app, Request::get("/").body(Full::default()).unwrap()).await).await;
}
