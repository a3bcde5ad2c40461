//! CLI command implementations. Results are printed to stdout.

use anyhow::Result;
use serde_json::json;

use agentkb_core::models::{IngestRequest, Metadata, SourceKind};

use crate::config::Config;
use crate::migrate;
use crate::service::RagService;

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    println!("Database initialized successfully.");
    Ok(())
}

pub async fn run_agent_create(config: &Config, name: &str, description: Option<&str>) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let agent = service.create_agent(name, description).await?;
    println!("created agent {} ({})", agent.id, agent.name);
    Ok(())
}

pub async fn run_agent_list(config: &Config) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let agents = service.list_agents().await?;
    if agents.is_empty() {
        println!("No agents.");
        return Ok(());
    }
    for agent in agents {
        let chunks = service.knowledge_size(&agent.id).await?;
        println!(
            "{}  {}  chunks: {}  created: {}",
            agent.id,
            agent.name,
            chunks,
            agent.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub async fn run_agent_update(
    config: &Config,
    agent_id: &str,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let agent = service.update_agent(agent_id, name, description).await?;
    println!("updated agent {} ({})", agent.id, agent.name);
    Ok(())
}

pub async fn run_agent_delete(config: &Config, agent_id: &str) -> Result<()> {
    let service = RagService::from_config(config).await?;
    service.delete_agent(agent_id).await?;
    println!("deleted agent {}", agent_id);
    Ok(())
}

pub async fn run_chat_create(config: &Config, agent_id: &str, title: Option<&str>) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let chat = service.create_chat(agent_id, title, Metadata::new()).await?;
    println!("created chat {} ({})", chat.id, chat.title);
    Ok(())
}

pub async fn run_chat_list(config: &Config, agent_id: &str) -> Result<()> {
    let service = RagService::from_config(config).await?;
    for chat in service.list_chats(agent_id).await? {
        println!("{}  {}", chat.id, chat.title);
    }
    Ok(())
}

pub async fn run_chat_show(config: &Config, agent_id: &str, chat_id: &str) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let chat = service.get_chat(agent_id, chat_id).await?;
    println!("{} ({} turns)", chat.title, chat.turns.len());
    for turn in &chat.turns {
        println!("[{}] {}: {}", turn.timestamp.format("%H:%M:%S"), turn.role, turn.content);
    }
    Ok(())
}

pub async fn run_ingest(
    config: &Config,
    agent_id: &str,
    source: &str,
    kind: &str,
    title: Option<String>,
    meta: Vec<(String, String)>,
) -> Result<()> {
    let kind: SourceKind = kind.parse()?;
    let metadata: Metadata = meta.into_iter().map(|(k, v)| (k, json!(v))).collect();
    let mut request = IngestRequest::new(source, kind).with_metadata(metadata);
    if let Some(title) = title {
        request = request.with_title(title);
    }

    let service = RagService::from_config(config).await?;
    let result = service.ingest(agent_id, request).await?;
    if result.duplicate {
        println!("already ingested: {} (fingerprint {})", result.source, result.fingerprint);
    } else {
        println!("ingested {}", result.source);
        println!("  fingerprint: {}", result.fingerprint);
        println!("  chunks: {}", result.chunk_count);
    }
    Ok(())
}

pub async fn run_ask(
    config: &Config,
    agent_id: &str,
    question: &str,
    chat_id: Option<&str>,
) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let answer = service.ask(agent_id, chat_id, question).await?;
    println!("{}", answer.answer);
    println!();
    println!("confidence: {:.2}", answer.confidence);
    for source in &answer.sources {
        println!("  source: {}", source);
    }
    Ok(())
}
