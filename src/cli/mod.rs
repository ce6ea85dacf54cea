//! Command-line interface parsing and dispatch.

pub mod chat;
pub mod conversation_list;
pub mod provider_list;
pub mod send;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::api::AiProvider;
use crate::auth::ui::{confirm, prompt_credentials};
use crate::auth::{AuthManager, TokenStore};
use crate::core::client::ChatClient;
use crate::core::config::Config;
use crate::utils::logging::init_tracing;

#[derive(Parser)]
#[command(name = "flexgpt")]
#[command(version, about = "Terminal chat client for the FlexGPT backend")]
#[command(
    long_about = "flexgpt talks to a FlexGPT backend and streams AI provider responses \
into the terminal as they arrive.\n\n\
Environment Variables:\n\
  FLEXGPT_API_BASE_URL  Backend API root (defaults to http://localhost:8100/api)\n\
  FLEXGPT_TOKEN         Access token, used instead of the stored login\n\
  FLEXGPT_LOG           tracing filter for diagnostics on stderr"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log debug diagnostics to stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the access token in the system keyring
    Login {
        #[arg(short, long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
        /// Sign in again even if a token is already stored
        #[arg(long)]
        force: bool,
    },
    /// Forget the stored access token
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Show AI provider availability
    Providers,
    /// List saved conversations
    Conversations,
    /// Print the messages of one conversation
    Show { id: String },
    /// Delete a conversation
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Send one message and stream the reply to stdout
    Send {
        /// Message text (words are joined with spaces)
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
        #[arg(short, long)]
        provider: Option<AiProvider>,
        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,
        /// Attach a file (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,
    },
    /// Interactive chat (default)
    Chat {
        #[arg(short, long)]
        provider: Option<AiProvider>,
        #[arg(short, long)]
        conversation: Option<String>,
    },
    /// Set a configuration value (base-url, default-provider)
    Set { key: String, value: Option<String> },
    /// Unset a configuration value
    Unset { key: String },
}

/// Shared state for command handlers.
pub struct CliContext {
    pub config: Config,
    pub auth: AuthManager,
}

impl CliContext {
    pub fn new(config: Config, tokens: TokenStore) -> Self {
        let client = ChatClient::new(reqwest::Client::new(), &config.api_base_url(), None);
        Self {
            auth: AuthManager::new(client, tokens),
            config,
        }
    }

    pub fn client(&self) -> Result<ChatClient, Box<dyn Error>> {
        Ok(self.auth.authenticated_client()?)
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::load()?;
    let command = args.command.unwrap_or(Commands::Chat {
        provider: None,
        conversation: None,
    });

    match command {
        Commands::Set { key, value } => set_config(config, &key, value),
        Commands::Unset { key } => unset_config(config, &key),
        command => {
            let ctx = CliContext::new(config, TokenStore::new());
            run_command(&ctx, command).await
        }
    }
}

async fn run_command(ctx: &CliContext, command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Login {
            email,
            password,
            force,
        } => {
            if ctx.auth.is_logged_in() && !force {
                println!("Already logged in. Use --force to sign in again.");
                return Ok(());
            }
            let credentials = prompt_credentials(email, password)?;
            let user = ctx
                .auth
                .login(&credentials.email, &credentials.password)
                .await?;
            println!("✅ Logged in as {} <{}>", user.name, user.email);
            if ctx.auth.tokens().has_env_override() {
                eprintln!("⚠️  FLEXGPT_TOKEN is set and takes precedence over the stored token");
            }
            Ok(())
        }
        Commands::Logout => {
            ctx.auth.logout()?;
            println!("✅ Logged out");
            Ok(())
        }
        Commands::Whoami => {
            let user = ctx.client()?.profile().await?;
            println!("{} <{}> ({})", user.name, user.email, user.account_type);
            Ok(())
        }
        Commands::Providers => provider_list::list_providers(&ctx.client()?).await,
        Commands::Conversations => conversation_list::list_conversations(&ctx.client()?).await,
        Commands::Show { id } => conversation_list::show_conversation(&ctx.client()?, &id).await,
        Commands::Delete { id, yes } => {
            let client = ctx.client()?;
            if !yes && !confirm(&format!("Delete conversation {id}?"))? {
                println!("Cancelled.");
                return Ok(());
            }
            client.delete_conversation(&id).await?;
            println!("✅ Deleted conversation {id}");
            Ok(())
        }
        Commands::Send {
            message,
            provider,
            conversation,
            files,
        } => {
            let provider = provider.unwrap_or_else(|| ctx.config.provider_or_default());
            send::send_once(
                &ctx.client()?,
                provider,
                &message.join(" "),
                conversation,
                &files,
            )
            .await
        }
        Commands::Chat {
            provider,
            conversation,
        } => {
            let provider = provider.unwrap_or_else(|| ctx.config.provider_or_default());
            chat::run_chat(ctx.client()?, provider, conversation).await
        }
        Commands::Set { .. } | Commands::Unset { .. } => Ok(()),
    }
}

fn set_config(mut config: Config, key: &str, value: Option<String>) -> Result<(), Box<dyn Error>> {
    let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
        config.print_all();
        return Ok(());
    };

    match key {
        "base-url" => {
            config.set_base_url(&value);
            config.save()?;
            println!("✅ Set base-url to: {}", config.api_base_url());
        }
        "default-provider" => {
            let provider: AiProvider = value.parse()?;
            config.default_provider = Some(provider);
            config.save()?;
            println!("✅ Set default-provider to: {provider}");
        }
        _ => return Err(format!("Unknown config key: {key}").into()),
    }
    Ok(())
}

fn unset_config(mut config: Config, key: &str) -> Result<(), Box<dyn Error>> {
    match key {
        "base-url" => config.base_url = None,
        "default-provider" => config.default_provider = None,
        _ => return Err(format!("Unknown config key: {key}").into()),
    }
    config.save()?;
    println!("✅ Unset {key}");
    Ok(())
}
