//! # agentkb CLI (`akb`)
//!
//! ```bash
//! akb --config ./config/akb.toml init
//! akb agent create docs-bot --description "Product docs"
//! akb ingest <agent-id> https://example.com/guide --kind web
//! akb ingest <agent-id> ./manual.pdf --kind pdf --meta team=support
//! akb ingest <agent-id> "The sky is blue." --kind text --title sky
//! akb ask <agent-id> "What color is the sky?"
//! akb serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use agentkb::{commands, config, logging, server};

/// agentkb: per-agent knowledge bases with retrieval-augmented answering.
#[derive(Parser)]
#[command(name = "akb", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/akb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite database and run schema migrations (idempotent).
    Init,

    /// Manage agents.
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Manage chats.
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },

    /// Ingest a source into an agent's knowledge base.
    Ingest {
        agent_id: String,
        /// URL, PDF path, or the raw text itself.
        source: String,
        /// `web`, `pdf`, or `text`.
        #[arg(long, default_value = "text")]
        kind: String,
        /// Title; labels text sources as `text-<title>`.
        #[arg(long)]
        title: Option<String>,
        /// Extra metadata as `key=value` (repeatable).
        #[arg(long = "meta", value_parser = parse_key_val)]
        meta: Vec<(String, String)>,
    },

    /// Ask a question against an agent's knowledge base.
    Ask {
        agent_id: String,
        question: String,
        /// Continue this chat: its history conditions retrieval and the turn is saved.
        #[arg(long)]
        chat: Option<String>,
    },

    /// Start the HTTP API server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum AgentAction {
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    List,
    /// Rename an agent or change its description.
    Update {
        agent_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete an agent, its chats, and its knowledge base.
    Delete { agent_id: String },
}

#[derive(Subcommand)]
enum ChatAction {
    Create {
        agent_id: String,
        #[arg(long)]
        title: Option<String>,
    },
    List { agent_id: String },
    /// Print a chat with all its turns.
    Show { agent_id: String, chat_id: String },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Agent { action } => match action {
            AgentAction::Create { name, description } => {
                commands::run_agent_create(&cfg, &name, description.as_deref()).await?
            }
            AgentAction::List => commands::run_agent_list(&cfg).await?,
            AgentAction::Update {
                agent_id,
                name,
                description,
            } => {
                commands::run_agent_update(&cfg, &agent_id, name.as_deref(), description.as_deref())
                    .await?
            }
            AgentAction::Delete { agent_id } => commands::run_agent_delete(&cfg, &agent_id).await?,
        },
        Commands::Chat { action } => match action {
            ChatAction::Create { agent_id, title } => {
                commands::run_chat_create(&cfg, &agent_id, title.as_deref()).await?
            }
            ChatAction::List { agent_id } => commands::run_chat_list(&cfg, &agent_id).await?,
            ChatAction::Show { agent_id, chat_id } => {
                commands::run_chat_show(&cfg, &agent_id, &chat_id).await?
            }
        },
        Commands::Ingest {
            agent_id,
            source,
            kind,
            title,
            meta,
        } => commands::run_ingest(&cfg, &agent_id, &source, &kind, title, meta).await?,
        Commands::Ask {
            agent_id,
            question,
            chat,
        } => commands::run_ask(&cfg, &agent_id, &question, chat.as_deref()).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
