use std::sync::Arc;

use axum::body::{ to_bytes, Body };
use axum::http::{ Request, StatusCode };
use brand_tone_chat::app::AppContext;
use brand_tone_chat::cli::Args;
use brand_tone_chat::server::api::router;
use clap::Parser;
use mockito::{ Matcher, ServerGuard };
use serde_json::{ json, Value };
use tower::ServiceExt;

const MODEL_PATH: &str = "/serving-endpoints/databricks-meta-llama-3-1-70b-instruct/invocations";

async fn context(server: &ServerGuard, api_key: Option<&str>) -> Arc<AppContext> {
    let url = server.url();
    let config_path = concat!(env!("CARGO_MANIFEST_DIR"), "/json/chain_config.json");
    let mut argv = vec![
        "brand-tone-chat",
        "--serving-endpoint",
        "brand-tone-bot",
        "--full-databricks-host",
        url.as_str(),
        "--databricks-token",
        "pat",
        "--serve-chain",
        "--chain-config-path",
        config_path,
        "--log-method",
        "supabase",
        "--chat-log-table",
        "feedback_log",
        "--supabase-url",
        url.as_str(),
        "--supabase-key",
        "anon",
    ];
    if let Some(key) = api_key {
        argv.extend(["--server-api-key", key]);
    }
    Arc::new(AppContext::new(&Args::parse_from(argv)).await.unwrap())
}

fn invocation(name: &str, body: Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/serving-endpoints/{}/invocations", name))
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn single_turn_runs_one_model_call() {
    let mut server = mockito::Server::new_async().await;
    let model = server
        .mock("POST", MODEL_PATH)
        .match_body(Matcher::PartialJson(json!({"max_tokens": 5000})))
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"On-brand copy."}}]}"#)
        .expect(1)
        .create_async().await;

    let app = router(context(&server, None).await);
    let resp = app
        .oneshot(invocation(
            "brand-tone-bot",
            json!({"messages": [{"role": "user", "content": "our product is good"}]}),
            None
        )).await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!(["On-brand copy."]));
    model.assert_async().await;
}

#[tokio::test]
async fn history_runs_rewrite_then_generation() {
    let mut server = mockito::Server::new_async().await;
    let model = server
        .mock("POST", MODEL_PATH)
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"text"}}]}"#)
        .expect(2)
        .create_async().await;

    let app = router(context(&server, None).await);
    let resp = app
        .oneshot(invocation(
            "brand-tone-bot",
            json!({"messages": [
                {"role": "user", "content": "first draft"},
                {"role": "assistant", "content": "first answer"},
                {"role": "user", "content": "shorter please"}
            ]}),
            None
        )).await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    model.assert_async().await;
}

#[tokio::test]
async fn unknown_endpoint_is_not_found() {
    let server = mockito::Server::new_async().await;
    let app = router(context(&server, None).await);
    let resp = app
        .oneshot(invocation("other-bot", json!({"messages": [{"role": "user", "content": "x"}]}), None)).await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_messages_is_bad_request() {
    let server = mockito::Server::new_async().await;
    let app = router(context(&server, None).await);
    let resp = app
        .oneshot(invocation("brand-tone-bot", json!({"messages": []}), None)).await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn model_failure_is_bad_gateway() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", MODEL_PATH).with_status(429).with_body("rate limited").create_async().await;

    let app = router(context(&server, None).await);
    let resp = app
        .oneshot(invocation("brand-tone-bot", json!({"messages": [{"role": "user", "content": "x"}]}), None)).await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("rate limited"));
}

#[tokio::test]
async fn api_key_requires_bearer_token() {
    let server = mockito::Server::new_async().await;
    let ctx = context(&server, Some("secret")).await;
    let body = json!({"messages": [{"role": "user", "content": "x"}]});

    let resp = router(ctx.clone())
        .oneshot(invocation("brand-tone-bot", body.clone(), None)).await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = router(ctx)
        .oneshot(invocation("brand-tone-bot", body, Some("wrong"))).await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unauthorized_caller_is_rejected_before_body_parsing() {
    let server = mockito::Server::new_async().await;
    let app = router(context(&server, Some("secret")).await);
    let request = Request::builder()
        .method("POST")
        .uri("/serving-endpoints/brand-tone-bot/invocations")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let resp = app.oneshot(request).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let server = mockito::Server::new_async().await;
    let app = router(context(&server, Some("secret")).await);
    let request = Request::builder()
        .method("POST")
        .uri("/serving-endpoints/brand-tone-bot/invocations")
        .header("authorization", "Bearer secret")
        .body(Body::from(r#"{"messages": "nope"}"#))
        .unwrap();

    let resp = app.oneshot(request).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(resp).await["error"].as_str().unwrap().starts_with("Invalid request body"));
}

#[tokio::test]
async fn health_reports_configuration() {
    let server = mockito::Server::new_async().await;
    let app = router(context(&server, None).await);
    let resp = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap()).await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body_json(resp).await,
        json!({
            "status": "ok",
            "serving_endpoint": "brand-tone-bot",
            "feedback_method": "hosted table",
            "chain_served": true
        })
    );
}
