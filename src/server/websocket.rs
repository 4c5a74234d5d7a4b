use crate::app::AppContext;
use crate::cli::Args;
use crate::models::websocket::{ ClientMessage, ServerMessage };
use crate::session::{ ChatSession, TurnOutcome, ERROR_PLACEHOLDER };

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };

use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ Request, Response, ErrorResponse };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_rustls::TlsAcceptor;

use rustls::ServerConfig;
use rustls::pki_types::{ CertificateDer, PrivateKeyDer };
use rustls_pemfile::{ certs, pkcs8_private_keys };

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use chrono::Utc;
use futures::{ Sink, SinkExt, StreamExt };
use log::{ info, warn, error, debug };
use url::form_urlencoded;

const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::new(10).unwrap()));
}

pub(crate) fn load_tls_config(
    cert_path: &str,
    key_path: &str
) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let cert_file = File::open(cert_path).map_err(|e|
        format!("Failed to open TLS certificate file '{}': {}", cert_path, e)
    )?;
    let key_file = File::open(key_path).map_err(|e|
        format!("Failed to open TLS key file '{}': {}", key_path, e)
    )?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Failed to read certificate(s): {}", e))?;

    let mut keys = pkcs8_private_keys(&mut key_reader);
    let key = match keys.next() {
        Some(Ok(k)) => PrivateKeyDer::Pkcs8(k),
        Some(Err(e)) => {
            return Err(format!("Error reading private key: {}", e).into());
        }
        None => {
            return Err("No PKCS8 private key found in key file".into());
        }
    };

    let config = ServerConfig::builder().with_no_client_auth().with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

pub async fn start_ws_server(
    addr: &str,
    ctx: Arc<AppContext>,
    args: Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    let tls_acceptor = if args.enable_tls {
        match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                let config = load_tls_config(cert_path, key_path)?;
                Some(TlsAcceptor::from(config))
            }
            (Some(_), None) | (None, Some(_)) => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                return Err("Missing TLS certificate or key path".into());
            }
            (None, None) => {
                error!("--enable-tls was set but no certificate/key paths provided.");
                return Err("TLS enabled without cert/key".into());
            }
        }
    } else {
        info!("TLS not enabled. Running plain WebSocket (WS) server.");
        None
    };
    let protocol = if tls_acceptor.is_some() { "wss" } else { "ws" };
    info!("{} server listening on: {}", protocol.to_uppercase(), addr);

    if ctx.api_key.is_some() {
        info!("WebSocket server configured with API Key authentication.");
    } else {
        warn!("WebSocket server configured WITHOUT API Key authentication. Connections are open.");
    }

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let ctx_clone = Arc::clone(&ctx);
        let tls_acceptor_clone = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor_clone {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, ctx_clone).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, ctx_clone).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

/// Reads the client key from the `X-API-Key` header, falling back to the `api_key` query parameter.
fn provided_api_key(req: &Request) -> Option<String> {
    let from_header = req
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    from_header.or_else(|| {
        let qs = req.uri().query().unwrap_or("");
        form_urlencoded::parse(qs.as_bytes())
            .find(|(k, _)| k == "api_key")
            .map(|(_, v)| v.into_owned())
    })
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    ctx: Arc<AppContext>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let required_api_key = ctx.api_key.clone();
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let Some(required) = required_api_key.as_deref() else {
            return Ok(response);
        };

        let provided = provided_api_key(req);
        debug!("Client {} provided API key: {}", peer, provided.is_some());

        if provided.as_deref() != Some(required) {
            warn!("{}: bad or missing API key", peer);
            let mut resp = ErrorResponse::new(Some("Unauthorized".into()));
            *resp.status_mut() = StatusCode::UNAUTHORIZED;
            return Err(resp);
        }
        info!("{} authenticated", peer);
        Ok(response)
    };

    match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => {
            handle_connection(peer, ws, ctx).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

async fn send_message<T>(tx: &mut T, peer: SocketAddr, msg: &ServerMessage) -> bool
    where T: Sink<Message> + Unpin, T::Error: std::fmt::Display
{
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize message for {}: {}", peer, e);
            return false;
        }
    };
    match tx.send(Message::Text(json)).await {
        Ok(()) => true,
        Err(e) => {
            error!("Error sending message to {}: {}", peer, e);
            false
        }
    }
}

/// Builds the replies for one parsed client message, updating the session.
pub async fn dispatch(session: &mut ChatSession, ctx: &AppContext, msg: ClientMessage) -> Vec<ServerMessage> {
    match msg {
        ClientMessage::Chat { content } => {
            let outcome = session
                .handle_user_input(&content, ctx.endpoint.as_ref(), &ctx.turn_options).await;
            let timestamp = Utc::now().timestamp();
            match outcome {
                None => Vec::new(),
                Some(TurnOutcome::Reply(content)) => vec![ServerMessage::Response { content, timestamp }],
                Some(TurnOutcome::Failed { message }) =>
                    vec![
                        ServerMessage::Error { message },
                        ServerMessage::Response { content: ERROR_PLACEHOLDER.to_string(), timestamp }
                    ],
            }
        }
        ClientMessage::Feedback { feedback } => {
            session.set_feedback_widget(feedback);
            let outcome = session.submit_feedback(ctx.feedback.as_ref()).await;
            outcome
                .toast()
                .map(|message| vec![ServerMessage::Toast { message: message.to_string() }])
                .unwrap_or_default()
        }
    }
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    ctx: Arc<AppContext>
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    let (mut tx, mut rx) = websocket.split();
    let mut session = ChatSession::new();
    info!("Assigned chat session {} to {}", session.id(), peer);

    while let Some(msg) = rx.next().await {
        let message = match msg {
            Ok(message) => message,
            Err(e) => {
                error!("Error receiving message from {}: {}", peer, e);
                break;
            }
        };

        if message.len() > MAX_MESSAGE_SIZE {
            warn!("Message from {} exceeds size limit ({} > {})", peer, message.len(), MAX_MESSAGE_SIZE);
            let error_msg = ServerMessage::Error { message: "Message too large".to_string() };
            send_message(&mut tx, peer, &error_msg).await;
            break;
        }

        match message {
            Message::Text(text) => {
                let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        error!("Failed to parse message from {}: {}", peer, e);
                        let error_msg = ServerMessage::Error {
                            message: format!("Failed to parse message: {}", e),
                        };
                        if !send_message(&mut tx, peer, &error_msg).await {
                            break;
                        }
                        continue;
                    }
                };

                let starts_turn = matches!(
                    &client_msg,
                    ClientMessage::Chat { content } if !content.trim().is_empty()
                );
                if starts_turn && !send_message(&mut tx, peer, &ServerMessage::Processing).await {
                    break;
                }

                let mut delivered = true;
                for reply in dispatch(&mut session, &ctx, client_msg).await {
                    if !send_message(&mut tx, peer, &reply).await {
                        delivered = false;
                        break;
                    }
                }
                if !delivered {
                    break;
                }
            }
            Message::Close(_) => {
                info!("Received close frame from {}", peer);
                break;
            }
            Message::Ping(ping_data) => {
                if tx.send(Message::Pong(ping_data)).await.is_err() {
                    error!("Failed to send pong to {}", peer);
                    break;
                }
            }
            _ => {}
        }
    }

    info!(
        "Connection {} closed; session {} ended after {} message(s)",
        peer,
        session.id(),
        session.transcript().len()
    );
}
