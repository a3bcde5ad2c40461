//! Agent and chat persistence.
//!
//! Deleting an agent cascades to its chats and their messages through the
//! schema's foreign keys; the agent's vector collection is removed by the
//! service layer.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use agentkb_core::models::{Agent, Chat, ChatRole, ChatTurn, Metadata};

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp in database: {}", s))?
        .with_timezone(&Utc))
}

#[derive(Clone)]
pub struct AgentRepository {
    pool: SqlitePool,
}

impl AgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str, description: Option<&str>) -> Result<Agent> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let agent = Agent {
            collection: Agent::collection_for(&id),
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO agents (id, name, description, collection, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(&agent.collection)
        .bind(agent.created_at.to_rfc3339())
        .bind(agent.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(agent)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query(
            "SELECT id, name, description, collection, created_at, updated_at FROM agents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| agent_from_row(&r)).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Agent>> {
        let rows = sqlx::query(
            "SELECT id, name, description, collection, created_at, updated_at FROM agents ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(agent_from_row).collect()
    }

    /// Returns `false` when no such agent existed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace name and description. `None` when no such agent exists.
    pub async fn update(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Option<Agent>> {
        let result = sqlx::query(
            "UPDATE agents SET name = ?, description = ?, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    pub async fn touch(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE agents SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn agent_from_row(row: &SqliteRow) -> Result<Agent> {
    Ok(Agent {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        collection: row.get("collection"),
        created_at: parse_ts(row.get("created_at"))?,
        updated_at: parse_ts(row.get("updated_at"))?,
    })
}

#[derive(Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, agent_id: &str, title: &str, metadata: Metadata) -> Result<Chat> {
        let chat = Chat {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            title: title.to_string(),
            metadata,
            created_at: Utc::now(),
            turns: Vec::new(),
        };

        sqlx::query(
            "INSERT INTO chats (id, agent_id, title, metadata_json, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chat.id)
        .bind(&chat.agent_id)
        .bind(&chat.title)
        .bind(serde_json::to_string(&chat.metadata)?)
        .bind(chat.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(chat)
    }

    /// The chat with its turns in conversational order.
    pub async fn get(&self, chat_id: &str) -> Result<Option<Chat>> {
        let row = sqlx::query(
            "SELECT id, agent_id, title, metadata_json, created_at FROM chats WHERE id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let mut chat = chat_from_row(&r)?;
                chat.turns = self.history(chat_id).await?;
                Ok(Some(chat))
            }
            None => Ok(None),
        }
    }

    /// Chats of one agent, oldest first, without turns.
    pub async fn list_for_agent(&self, agent_id: &str) -> Result<Vec<Chat>> {
        let rows = sqlx::query(
            r#"
            SELECT id, agent_id, title, metadata_json, created_at
            FROM chats WHERE agent_id = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chat_from_row).collect()
    }

    /// Set the title and, when given, replace the metadata.
    pub async fn update(
        &self,
        chat_id: &str,
        title: &str,
        metadata: Option<&Metadata>,
    ) -> Result<Option<Chat>> {
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;
        let result = sqlx::query(
            "UPDATE chats SET title = ?, metadata_json = COALESCE(?, metadata_json) WHERE id = ?",
        )
        .bind(title)
        .bind(metadata_json)
        .bind(chat_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(chat_id).await
    }

    pub async fn delete(&self, chat_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn history(&self, chat_id: &str) -> Result<Vec<ChatTurn>> {
        let rows = sqlx::query(
            "SELECT role, content, created_at FROM chat_messages WHERE chat_id = ? ORDER BY seq",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> Result<ChatTurn> {
                let role: String = r.get("role");
                Ok(ChatTurn {
                    role: role.parse::<ChatRole>()?,
                    content: r.get("content"),
                    timestamp: parse_ts(r.get("created_at"))?,
                })
            })
            .collect()
    }

    /// Append turns atomically, preserving their order.
    pub async fn append_turns(&self, chat_id: &str, turns: &[ChatTurn]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for turn in turns {
            sqlx::query(
                "INSERT INTO chat_messages (chat_id, role, content, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(chat_id)
            .bind(turn.role.as_str())
            .bind(&turn.content)
            .bind(turn.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn chat_from_row(row: &SqliteRow) -> Result<Chat> {
    let metadata_json: String = row.get("metadata_json");
    Ok(Chat {
        id: row.get("id"),
        agent_id: row.get("agent_id"),
        title: row.get("title"),
        metadata: serde_json::from_str(&metadata_json)?,
        created_at: parse_ts(row.get("created_at"))?,
        turns: Vec::new(),
    })
}
