use crate::app::AppContext;
use crate::chain::ChainRequest;
use crate::cli::Args;
use crate::config::chain::ChainError;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    body::Bytes,
    routing::{ get, post },
    Router,
    extract::{ Path, State },
    response::{ Html, IntoResponse, Response },
    http::{ header::AUTHORIZATION, HeaderMap, StatusCode },
    Json,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error, warn };

const CHAT_PAGE: &str = include_str!("../../static/index.html");

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    serving_endpoint: String,
    feedback_method: String,
    chain_served: bool,
}

#[derive(Clone)]
struct AppState {
    ctx: Arc<AppContext>,
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/", get(chat_page_handler))
        .route("/api/health", get(health_handler));

    if ctx.chain.is_some() {
        app = app.route("/serving-endpoints/{name}/invocations", post(invoke_chain_handler));
    }

    app.layer(cors).with_state(AppState { ctx })
}

pub async fn start_http_server(
    http_port: u16,
    ctx: Arc<AppContext>,
    args: Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(ctx);

    if let (true, Some(cert_path), Some(key_path)) =
        (args.enable_tls, args.tls_cert_path.as_ref(), args.tls_key_path.as_ref())
    {
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        tokio::spawn(async move {
            let result = axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await;

            if let Err(e) = result {
                error!("HTTPS server error: {}", e);
            }
        });

        info!("HTTPS server started with TLS enabled");
    } else {
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                        error!("HTTP server error: {}", e);
                    }
                },
                Err(e) => {
                    error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                }
            }
        });

        info!("HTTP server started");
    }

    Ok(())
}

async fn chat_page_handler() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        serving_endpoint: state.ctx.frontend.serving_endpoint.clone(),
        feedback_method: state.ctx.feedback.method().to_string(),
        chain_served: state.ctx.chain.is_some(),
    })
}

fn authorized(headers: &HeaderMap, api_key: Option<&str>) -> bool {
    let Some(required) = api_key else {
        return true;
    };
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        == Some(required)
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Runs the chain for the endpoint this process serves. The reply is wrapped in a one-element array.
/// The body is only parsed once the caller is authorized.
async fn invoke_chain_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers, state.ctx.api_key.as_deref()) {
        warn!("Rejected chain invocation for '{}': bad or missing bearer token", name);
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized".into());
    }

    let req: ChainRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e));
        }
    };

    let Some(chain) = state.ctx.chain.as_ref() else {
        return error_response(StatusCode::NOT_FOUND, "No chain is served".into());
    };
    if name != state.ctx.frontend.serving_endpoint {
        return error_response(StatusCode::NOT_FOUND, format!("Unknown serving endpoint '{}'", name));
    }

    info!("Chain invocation on '{}' with {} message(s)", name, req.messages.len());
    match chain.invoke(&req.messages).await {
        Ok(reply) => (StatusCode::OK, Json(vec![reply])).into_response(),
        Err(ChainError::EmptyInput) =>
            error_response(StatusCode::BAD_REQUEST, ChainError::EmptyInput.to_string()),
        Err(e) => {
            error!("Chain invocation on '{}' failed: {}", name, e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
