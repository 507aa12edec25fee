//! 数据访问层（DAO）
//!
//! 负责源表（openai_responses）的变更检测查询和
//! 目标表（openai_chat_history）的插入/更新，将数据访问逻辑与业务逻辑分离。

use crate::sync::models::{ChangeRecord, SyncedRecord};
use crate::sync::types::TranscriptEntry;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};

/// 变更检测 DAO：只读访问源表
///
/// 源表由上游业务维护，本进程不创建也不迁移它的结构
pub struct ChangeDao {
    db: Pool<Postgres>,
}

impl ChangeDao {
    /// 创建新的变更检测 DAO
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }

    /// 查询 cutoff 之后更新过、且已有响应 ID 的记录，按更新时间倒序返回
    ///
    /// cutoff 由调用方计算（当前时间减去检测窗口），方便测试时注入时钟
    pub async fn recent_changes(&self, cutoff: DateTime<Utc>) -> Result<Vec<ChangeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id::text AS id, phone, latest_response_id, updated_at
            FROM openai_responses
            WHERE updated_at > $1
            AND latest_response_id IS NOT NULL
            ORDER BY updated_at DESC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.db)
        .await
        .context("查询变更记录失败")?;

        let records: Vec<ChangeRecord> = rows
            .into_iter()
            .map(|row| {
                let phone: Option<String> = row.get("phone");
                ChangeRecord {
                    id: row.get("id"),
                    phone: phone.unwrap_or_default(),
                    latest_response_id: row.get("latest_response_id"),
                    updated_at: row.get("updated_at"),
                }
            })
            .collect();

        debug!("[ChangeDAO] 窗口内变更记录 {} 条", records.len());
        Ok(records)
    }
}

/// 聊天记录 DAO：维护目标表
pub struct HistoryDao {
    db: Pool<Postgres>,
}

impl HistoryDao {
    /// 创建新的聊天记录 DAO
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }

    /// 初始化目标表结构
    pub async fn init_db(&self) -> Result<()> {
        info!("[HistoryDAO/DB] 初始化聊天记录表结构");

        let sql = r#"
            CREATE TABLE IF NOT EXISTS openai_chat_history (
                id TEXT PRIMARY KEY,
                phone TEXT NOT NULL DEFAULT '',
                response_id TEXT NOT NULL DEFAULT '',
                chat_history JSONB NOT NULL DEFAULT '[]'::jsonb,
                fetched_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#;
        sqlx::query(sql)
            .execute(&self.db)
            .await
            .context("创建聊天记录表失败")?;

        info!("[HistoryDAO/DB] 数据库表初始化完成");
        Ok(())
    }

    /// 插入或更新一条聊天记录（以 id 为冲突键的单条原子 upsert）
    ///
    /// 重复同步同一个 id 会原地覆盖 chat_history、phone、response_id，
    /// 并把 fetched_at 刷新为当前时间；不保留历史版本
    pub async fn upsert_history(
        &self,
        id: &str,
        phone: &str,
        response_id: &str,
        transcript: &[TranscriptEntry],
    ) -> Result<()> {
        let chat_history =
            serde_json::to_value(transcript).context("序列化 chat_history 失败")?;

        let sql = r#"
            INSERT INTO openai_chat_history (id, phone, response_id, chat_history, fetched_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (id)
            DO UPDATE SET
                chat_history = EXCLUDED.chat_history,
                phone = EXCLUDED.phone,
                response_id = EXCLUDED.response_id,
                fetched_at = NOW()
        "#;

        sqlx::query(sql)
            .bind(id)
            .bind(phone)
            .bind(response_id)
            .bind(chat_history)
            .execute(&self.db)
            .await
            .context("插入或更新聊天记录失败")?;

        debug!("[HistoryDAO] 已落库: id={}, {} 条消息", id, transcript.len());
        Ok(())
    }

    /// 根据 id 查询单条已同步记录
    pub async fn get_history_by_id(&self, id: &str) -> Result<Option<SyncedRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, phone, response_id, chat_history, fetched_at
            FROM openai_chat_history
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("查询聊天记录失败")?;

        match row {
            Some(row) => {
                let chat_history: serde_json::Value = row.get("chat_history");
                let chat_history: Vec<TranscriptEntry> =
                    serde_json::from_value(chat_history).context("解析 chat_history 失败")?;
                Ok(Some(SyncedRecord {
                    id: row.get("id"),
                    phone: row.get("phone"),
                    response_id: row.get("response_id"),
                    chat_history,
                    fetched_at: row.get("fetched_at"),
                }))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::db::create_pg_pool;
    use crate::sync::models::SyncerConfig;
    use uuid::Uuid;

    async fn test_pool() -> Result<Pool<Postgres>> {
        let config = SyncerConfig::from_env()?;
        create_pg_pool(&config.database_url()).await
    }

    fn transcript(texts: &[(&str, &str)]) -> Vec<TranscriptEntry> {
        texts
            .iter()
            .map(|(role, content)| TranscriptEntry {
                role: role.to_string(),
                content: content.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    #[ignore]
    async fn test_upsert_history_idempotent() -> Result<()> {
        let pool = test_pool().await?;
        let dao = HistoryDao::new(pool.clone());
        dao.init_db().await?;

        let id = format!("test-{}", Uuid::new_v4());
        let first = transcript(&[("user", "你好"), ("assistant", "你好，有什么可以帮你？")]);
        let second = transcript(&[
            ("user", "你好"),
            ("assistant", "你好，有什么可以帮你？"),
            ("user", "再见"),
        ]);

        dao.upsert_history(&id, "17764008284", "resp_a", &first)
            .await?;
        let row1 = dao.get_history_by_id(&id).await?.expect("首次写入后应有记录");
        assert_eq!(row1.chat_history, first);

        dao.upsert_history(&id, "17764008284", "resp_b", &second)
            .await?;
        let row2 = dao.get_history_by_id(&id).await?.expect("二次写入后应有记录");

        // 同一个 id 只保留一行，内容被第二次写入覆盖，fetched_at 被刷新
        assert_eq!(row2.chat_history, second);
        assert_eq!(row2.response_id, "resp_b");
        assert!(row2.fetched_at >= row1.fetched_at);

        sqlx::query("DELETE FROM openai_chat_history WHERE id = $1")
            .bind(&id)
            .execute(&pool)
            .await?;
        Ok(())
    }

    #[tokio::test]
    #[ignore]
    async fn test_recent_changes_window() -> Result<()> {
        let pool = test_pool().await?;

        // 测试环境可能没有源表，这里建一个最小结构（线上由上游业务维护）
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS openai_responses (
                id TEXT PRIMARY KEY,
                phone TEXT,
                latest_response_id TEXT,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&pool)
        .await?;

        let fresh_id = format!("test-{}", Uuid::new_v4());
        let stale_id = format!("test-{}", Uuid::new_v4());
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO openai_responses (id, phone, latest_response_id, updated_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&fresh_id)
        .bind("17764008284")
        .bind("resp_fresh")
        .bind(now - chrono::Duration::seconds(5))
        .execute(&pool)
        .await?;

        sqlx::query(
            "INSERT INTO openai_responses (id, phone, latest_response_id, updated_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&stale_id)
        .bind("17764008284")
        .bind("resp_stale")
        .bind(now - chrono::Duration::seconds(120))
        .execute(&pool)
        .await?;

        let dao = ChangeDao::new(pool.clone());
        let records = dao.recent_changes(now - chrono::Duration::seconds(60)).await?;

        // 5 秒前更新的记录在窗口内，120 秒前的不在
        assert!(records.iter().any(|r| r.id == fresh_id));
        assert!(!records.iter().any(|r| r.id == stale_id));

        sqlx::query("DELETE FROM openai_responses WHERE id = ANY($1)")
            .bind(vec![fresh_id, stale_id])
            .execute(&pool)
            .await?;
        Ok(())
    }
}
