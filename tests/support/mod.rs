use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use extproc_filters::{app, AppConfig, AppState, ProcessingOptions, ProcessingResponse};
use http_body_util::BodyExt;
use tower::ServiceExt; // for oneshot

/// State with both filters enabled and the given startup arguments.
pub fn state_with(args: &[&str], options: ProcessingOptions) -> AppState {
    AppState::new(AppConfig {
        filter_order: vec!["xml-json-conv".into(), "payload-limit".into()],
        options,
        max_request_bytes: None,
        startup_args: args.iter().map(|s| s.to_string()).collect(),
    })
}

#[allow(dead_code)]
pub fn router(args: &[&str]) -> Router {
    app(state_with(args, ProcessingOptions::default()))
}

/// POST a processing message and return the HTTP status with the raw body.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

/// POST a processing message that must succeed and decode the outcome.
#[allow(dead_code)]
pub async fn process(app: Router, filter: &str, message: serde_json::Value) -> ProcessingResponse {
    let (status, body) = post_json(app, &format!("/process/{}", filter), message).await;
    assert_eq!(status, StatusCode::OK, "body: {}", String::from_utf8_lossy(&body));
    serde_json::from_slice(&body).unwrap()
}
