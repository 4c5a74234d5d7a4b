pub mod api;
pub mod websocket;

use crate::app::AppContext;
use crate::cli::Args;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    ctx: Arc<AppContext>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, ctx: Arc<AppContext>, args: Args) -> Self {
        Self { addr, ctx, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(http_port) = self.args.http_port {
            api::start_http_server(http_port, self.ctx.clone(), self.args.clone()).await?;
        }

        websocket::start_ws_server(&self.addr, self.ctx.clone(), self.args.clone()).await
    }
}
