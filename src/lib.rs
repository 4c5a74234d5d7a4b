pub mod app;
pub mod chain;
pub mod cli;
pub mod config;
pub mod dbsql;
pub mod feedback;
pub mod llm;
pub mod models;
pub mod server;
pub mod session;

use app::AppContext;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Serving Endpoint: {}", args.serving_endpoint.as_deref().unwrap_or("<unset>"));
    info!("Invocation Mode: {}", args.invocation_mode);
    info!("Send History: {}", args.send_history);
    info!("Max Tokens: {}", args.max_tokens);
    info!("Log Method: {}", args.log_method);
    info!("Chat Log Table: {}", args.chat_log_table.as_deref().unwrap_or("<unset>"));
    info!("WebSocket Address: {}", args.server_addr);
    info!("HTTP Port: {}", args.http_port.map(|p| p.to_string()).unwrap_or_else(|| "disabled".into()));
    info!("Serve Chain: {}", args.serve_chain);
    if args.serve_chain {
        info!("Chain Config Path: {}", args.chain_config_path);
    }
    info!("-------------------------");

    let ctx = Arc::new(AppContext::new(&args).await?);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, ctx, args);
    server.run().await?;

    Ok(())
}
