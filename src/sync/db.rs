//! PostgreSQL 数据库工具：统一创建连接池
//!
//! 约定：连接只在单次查询期间从池中借出，查询结束（包括出错路径）即归还，
//! 不会跨 tick 持有连接。

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

/// 创建 PostgreSQL 连接池
pub async fn create_pg_pool(database_url: &str) -> Result<Pool<Postgres>> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("连接 PostgreSQL 数据库失败")?;

    Ok(pool)
}
