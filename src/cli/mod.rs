use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Serving Endpoint Args ---
    /// Name of the serving endpoint that answers chat turns. Required.
    #[arg(long, env = "SERVING_ENDPOINT")]
    pub serving_endpoint: Option<String>,

    /// Workspace host without scheme (e.g., adb-123.4.azuredatabricks.net)
    #[arg(long, env = "DATABRICKS_HOST")]
    pub databricks_host: Option<String>,

    /// Workspace URL including scheme. Takes precedence over DATABRICKS_HOST.
    #[arg(long, env = "FULL_DATABRICKS_HOST")]
    pub full_databricks_host: Option<String>,

    /// Personal access token used as bearer credential for every workspace call.
    #[arg(long, env = "DATABRICKS_TOKEN_VALUE", default_value = "")]
    pub databricks_token: String,

    /// Request shape sent to the serving endpoint (chat, raw)
    #[arg(long, env = "INVOCATION_MODE", default_value = "chat")]
    pub invocation_mode: String,

    /// Forward the whole transcript instead of only the newest user message.
    #[arg(long, env = "SEND_HISTORY", default_value = "false")]
    pub send_history: bool,

    /// max_tokens sent with chat-mode requests.
    #[arg(long, env = "MAX_TOKENS", default_value = "400")]
    pub max_tokens: u32,

    /// System message prepended to chat-mode requests.
    #[arg(long, env = "SYSTEM_PROMPT", default_value = "You are a helpful assistant.")]
    pub system_prompt: String,

    // --- Feedback Sink Args ---
    /// Feedback logging method (dbsql, anything else selects the hosted table)
    #[arg(long, env = "LOG_METHOD", default_value = "supabase")]
    pub log_method: String,

    /// Fully qualified feedback table (e.g., main.app.feedback_log)
    #[arg(long, env = "CHAT_LOG_TABLE")]
    pub chat_log_table: Option<String>,

    /// SQL warehouse that executes feedback inserts.
    #[arg(long, env = "DATABRICKS_WAREHOUSE_ID_VALUE")]
    pub warehouse_id: Option<String>,

    /// Base URL of the hosted relational backend.
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// API key of the hosted relational backend.
    #[arg(long, env = "SUPABASE_KEY")]
    pub supabase_key: Option<String>,

    /// Create the feedback table on startup when logging through the SQL warehouse.
    #[arg(long, env = "ENSURE_FEEDBACK_TABLE", default_value = "false")]
    pub ensure_feedback_table: bool,

    // --- Chain Args ---
    /// Path to the chain configuration file.
    #[arg(long, env = "CHAIN_CONFIG_PATH", default_value = "json/chain_config.json")]
    pub chain_config_path: String,

    /// Serve the chain at /serving-endpoints/{name}/invocations on the HTTP API server.
    #[arg(long, env = "SERVE_CHAIN", default_value = "false")]
    pub serve_chain: bool,

    // --- Server Args ---
    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Port for the HTTP API server (chat page, health, chain route). Disabled when unset.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Optional API Key required for clients to connect. If set, clients must provide this key.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Optional path to the TLS certificate file (PEM format) for enabling WSS. Requires --tls-key.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling WSS. Requires --tls-cert.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
