use log::{ error, info, warn };
use std::error::Error;
use std::sync::Arc;

use crate::chain::Chain;
use crate::cli::Args;
use crate::config::chain::load_chain_config;
use crate::config::{ ConfigError, FrontendConfig, InvocationMode, LogMethod };
use crate::dbsql::{ ensure_feedback_table, StatementExecutor };
use crate::feedback::{ initialize_feedback_sink, FeedbackSink };
use crate::llm::chat::{ new_client, EndpointClient };
use crate::llm::{ EndpointConfig, GenerationParams };
use crate::session::TurnOptions;

/// Everything a connection or HTTP handler needs, built once at startup.
pub struct AppContext {
    pub frontend: FrontendConfig,
    pub endpoint: Arc<dyn EndpointClient>,
    pub feedback: Arc<dyn FeedbackSink>,
    pub turn_options: TurnOptions,
    pub chain: Option<Arc<Chain>>,
    pub api_key: Option<String>,
}

impl AppContext {
    pub fn from_parts(
        frontend: FrontendConfig,
        endpoint: Arc<dyn EndpointClient>,
        feedback: Arc<dyn FeedbackSink>,
        chain: Option<Arc<Chain>>,
        api_key: Option<String>
    ) -> Self {
        let params = match frontend.invocation_mode {
            InvocationMode::Chat => GenerationParams { max_tokens: Some(frontend.max_tokens), temperature: None },
            InvocationMode::Raw => GenerationParams::default(),
        };
        let turn_options = TurnOptions { send_history: frontend.send_history, params };
        Self {
            frontend,
            endpoint,
            feedback,
            turn_options,
            chain,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub async fn new(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let frontend = FrontendConfig::from_args(args)?;

        let endpoint_config = EndpointConfig {
            mode: frontend.invocation_mode,
            workspace_url: frontend.workspace_url.clone(),
            token: frontend.token.clone(),
            endpoint_name: frontend.serving_endpoint.clone(),
            system_prompt: Some(frontend.system_prompt.clone()),
        };
        let endpoint = new_client(&endpoint_config)?;
        info!(
            "Serving endpoint configured: Name={}, Mode={:?}, SendHistory={}",
            frontend.serving_endpoint,
            frontend.invocation_mode,
            frontend.send_history
        );

        let feedback = initialize_feedback_sink(args);
        if args.ensure_feedback_table {
            Self::ensure_table(args, &frontend).await;
        }

        let chain = if args.serve_chain { Some(Self::initialize_chain(args, &frontend)?) } else { None };

        Ok(Self::from_parts(frontend, endpoint, feedback, chain, args.server_api_key.clone()))
    }

    fn initialize_chain(
        args: &Args,
        frontend: &FrontendConfig
    ) -> Result<Arc<Chain>, Box<dyn Error + Send + Sync>> {
        info!("Loading chain config from: {}", args.chain_config_path);
        let config = load_chain_config(&args.chain_config_path).map_err(ConfigError::Chain)?;

        let model_config = EndpointConfig {
            mode: InvocationMode::Chat,
            workspace_url: frontend.workspace_url.clone(),
            token: frontend.token.clone(),
            endpoint_name: config.endpoint_name.clone(),
            system_prompt: None,
        };
        let model = new_client(&model_config)?;
        info!(
            "Chain configured: Model={}, RewriteOnHistory={}, MaxTokens={}, Temperature={}",
            config.endpoint_name,
            config.rewrite_on_history,
            config.parameters.max_tokens,
            config.parameters.temperature
        );
        Ok(Arc::new(Chain::new(config, model)))
    }

    async fn ensure_table(args: &Args, frontend: &FrontendConfig) {
        if LogMethod::parse(&args.log_method) != LogMethod::Dbsql {
            warn!("ENSURE_FEEDBACK_TABLE only applies to LOG_METHOD=dbsql; skipping.");
            return;
        }
        let (Some(table), Some(warehouse_id)) = (args.chat_log_table.as_deref(), args.warehouse_id.as_deref()) else {
            warn!("ENSURE_FEEDBACK_TABLE needs CHAT_LOG_TABLE and DATABRICKS_WAREHOUSE_ID_VALUE; skipping.");
            return;
        };
        let result = match StatementExecutor::new(&frontend.workspace_url, &frontend.token, warehouse_id) {
            Ok(executor) => ensure_feedback_table(&executor, table).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("Failed to create feedback table {}: {}", table, e);
        }
    }
}
