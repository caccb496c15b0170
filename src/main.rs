use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use relayq::accounts::{AccountPool, SharedFileSynchronizer};
use relayq::config::Config;
use relayq::dispatch::RequestDispatcher;
use relayq::logs::LogBuffer;
use relayq::models::ModelResolver;
use relayq::refresh::TokenRefresher;
use relayq::translate::{self, ForeignRequest};
use relayq::upstream::UpstreamClient;

#[derive(Parser)]
#[command(name = "relayq", about = "Local translating proxy core — smoke-test CLI")]
struct Cli {
    #[arg(long, env = "RELAYQ_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a caller-facing model name to its internal upstream id.
    ResolveModel { model: String },
    /// Translate a chat-completions-style request (read as JSON from stdin)
    /// into the upstream wire body and print it.
    Translate {
        #[arg(long)]
        model: String,
    },
    /// Load the shared accounts file once and print the resulting pool.
    SyncAccounts,
    /// Run one request through the full pipeline: resolve the model, select
    /// an account, ensure a valid token, translate, and call upstream —
    /// retrying with another account on a rate-limit or revoked token.
    Dispatch {
        #[arg(long)]
        model: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    match cli.command {
        Command::ResolveModel { model } => {
            let resolver = ModelResolver::default_mappings();
            let internal_id = resolver.resolve(&model)?;
            println!("{internal_id}");
        }
        Command::Translate { model } => {
            let resolver = ModelResolver::default_mappings();
            let internal_id = resolver.resolve(&model)?;

            let stdin = std::io::read_to_string(std::io::stdin())?;
            let req: ForeignRequest = serde_json::from_str(&stdin)?;
            let (body, _tool_names) = translate::translate_request(&req, &internal_id, None)?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::SyncAccounts => {
            let Some(path) = config.shared_accounts_file.clone() else {
                anyhow::bail!("no shared_accounts_file configured");
            };
            let pool = Arc::new(AccountPool::new(config.selection_policy, config.cooldown_duration));
            let synchronizer = SharedFileSynchronizer::new(path);
            synchronizer.sync_if_needed(&pool, true).await?;

            for account in pool.list().await {
                println!("{} [{}] requests={}", account.id, account.name, account.request_count);
            }
        }
        Command::Dispatch { model } => {
            let Some(path) = config.shared_accounts_file.clone() else {
                anyhow::bail!("no shared_accounts_file configured");
            };
            let pool = Arc::new(AccountPool::new(config.selection_policy, config.cooldown_duration));
            let synchronizer = SharedFileSynchronizer::new(path);
            synchronizer.sync_if_needed(&pool, true).await?;

            let stdin = std::io::read_to_string(std::io::stdin())?;
            let request: ForeignRequest = serde_json::from_str(&stdin)?;

            let dispatcher = RequestDispatcher::new(
                pool,
                TokenRefresher::new(config.region.clone(), config.proxy_url.as_deref())?,
                UpstreamClient::new(config.region.clone(), config.kiro_version.clone(), config.proxy_url.as_deref())?,
                ModelResolver::default_mappings(),
                Arc::new(LogBuffer::new(config.log_buffer_capacity)),
                config.token_safety_margin,
            );

            let session_id = uuid::Uuid::new_v4().to_string();
            let response = dispatcher
                .handle(&session_id, &model, &request, config.compat_mode)
                .await?;
            println!("upstream responded with status {}", response.status);
        }
    }

    Ok(())
}
