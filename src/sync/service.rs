//! 聊天记录同步服务层
//!
//! 驱动「检测变更 -> 拉取记录 -> 落库」的轮询循环。
//! 单条记录的失败只影响它自己，查询失败当作空批次处理，
//! 意外错误由监督循环带退避重启，进程只能被外部终止。

use crate::sync::api::ResponsesApi;
use crate::sync::dao::{ChangeDao, HistoryDao};
use crate::sync::db::create_pg_pool;
use crate::sync::guard::DedupGuard;
use crate::sync::models::{ChangeRecord, SyncerConfig};
use anyhow::Result;
use chrono::Utc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 单个 tick 的处理统计
#[derive(Debug, Default, Clone, Copy)]
pub struct TickStats {
    /// 窗口内检测到的变更记录数
    pub detected: usize,
    /// 因去重或字段为空而跳过的记录数
    pub skipped: usize,
    /// 拉取并落库成功的记录数
    pub synced: usize,
    /// 拉取或落库失败、留待下个 tick 重试的记录数
    pub failed: usize,
}

/// 监督循环的重启退避：逐次翻倍，有上限，成功后重置
#[derive(Debug)]
pub struct RestartBackoff {
    current: Duration,
}

impl RestartBackoff {
    /// 初始退避时长
    pub const BASE: Duration = Duration::from_secs(1);
    /// 退避时长上限
    pub const MAX: Duration = Duration::from_secs(60);

    pub fn new() -> Self {
        Self {
            current: Self::BASE,
        }
    }

    /// 取本次重启前应等待的时长，并推进到下一档
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(Self::MAX);
        delay
    }

    /// 恢复正常后回到初始档位
    pub fn reset(&mut self) {
        self.current = Self::BASE;
    }
}

impl Default for RestartBackoff {
    fn default() -> Self {
        Self::new()
    }
}

/// 聊天记录同步器
///
/// 持有连接池、API 客户端和去重集合的显式上下文对象，
/// 每个 tick 都通过它执行，去重容量与检测窗口均可注入
pub struct HistorySyncer {
    config: SyncerConfig,
    /// OpenAI API 客户端
    api: ResponsesApi,
    /// 变更检测 DAO
    change_dao: ChangeDao,
    /// 聊天记录 DAO
    history_dao: HistoryDao,
    /// 进程内去重集合
    guard: DedupGuard,
}

impl HistorySyncer {
    /// 创建同步器：建立连接池、构造 API 客户端并初始化目标表
    pub async fn new(config: SyncerConfig) -> Result<Self> {
        info!(
            "[Sync] 🔌 连接数据库: {}:{}/{}",
            config.db_host, config.db_port, config.db_name
        );
        let db = create_pg_pool(&config.database_url()).await?;
        info!("[Sync] ✅ 数据库连接成功");

        let api = ResponsesApi::with_api_key(&config.api_key, config.api_base_url.clone())?;
        let history_dao = HistoryDao::new(db.clone());
        history_dao.init_db().await?;

        Ok(Self {
            api,
            change_dao: ChangeDao::new(db),
            history_dao,
            guard: DedupGuard::new(config.guard_capacity),
            config,
        })
    }

    /// 判断一条变更记录是否需要进入拉取/落库流程
    ///
    /// id 或响应 ID 为空的记录直接跳过；已处理过的组合 key 也跳过
    fn should_process(record: &ChangeRecord, guard: &DedupGuard) -> bool {
        if record.id.is_empty() || record.latest_response_id.is_empty() {
            return false;
        }
        !guard.contains(&record.id, &record.latest_response_id)
    }

    /// 处理单条变更记录：拉取聊天记录并落库
    ///
    /// 只有落库成功后才把组合 key 标记为已处理，
    /// 失败的记录下个 tick 仍会出现在变更查询里，自然重试
    async fn process_record(&mut self, record: &ChangeRecord) -> Result<()> {
        let transcript = self
            .api
            .fetch_chat_history(&record.latest_response_id)
            .await?;

        self.history_dao
            .upsert_history(
                &record.id,
                &record.phone,
                &record.latest_response_id,
                &transcript,
            )
            .await?;

        self.guard.mark(&record.id, &record.latest_response_id);
        info!(
            "[Sync] ✅ 同步完成: id={}, 共 {} 条消息",
            record.id,
            transcript.len()
        );
        Ok(())
    }

    /// 执行一次完整的轮询处理（一个 tick）
    ///
    /// 查询失败按空批次处理，单条记录的失败不影响后续记录
    pub async fn sync_once(&mut self) -> Result<TickStats> {
        let tick_id = Uuid::new_v4();
        let cutoff = Utc::now() - self.config.change_window;

        let records = match self.change_dao.recent_changes(cutoff).await {
            Ok(records) => records,
            Err(e) => {
                error!("[Sync] ❌ 查询变更记录失败，按空批次处理: {:#}", e);
                Vec::new()
            }
        };

        let mut stats = TickStats {
            detected: records.len(),
            ..Default::default()
        };

        for record in &records {
            if !Self::should_process(record, &self.guard) {
                debug!(
                    "[Sync] 跳过记录: id={}, responseID={}, tickID={}",
                    record.id, record.latest_response_id, tick_id
                );
                stats.skipped += 1;
                continue;
            }

            info!(
                "[Sync] 🔔 检测到变更: id={}, responseID={}, 更新时间={}, tickID={}",
                record.id, record.latest_response_id, record.updated_at, tick_id
            );

            match self.process_record(record).await {
                Ok(()) => stats.synced += 1,
                Err(e) => {
                    warn!(
                        "[Sync] ⚠️ 本 tick 跳过该记录，等待下次重试: id={}, 错误: {:#}",
                        record.id, e
                    );
                    stats.failed += 1;
                }
            }
        }

        if stats.detected > 0 {
            info!(
                "[Sync] 📊 tick 统计: 检测 {}, 同步 {}, 跳过 {}, 失败 {}, tickID={}",
                stats.detected, stats.synced, stats.skipped, stats.failed, tick_id
            );
        } else {
            debug!("[Sync] 本 tick 无变更, tickID={}", tick_id);
        }

        Ok(stats)
    }

    /// 轮询主循环：固定间隔执行 tick，正常情况下永不返回
    pub async fn run_loop(&mut self) -> Result<()> {
        info!(
            "[Sync] 👀 开始轮询，每 {} 秒检查一次变更",
            self.config.poll_interval.as_secs()
        );

        loop {
            self.sync_once().await?;
            sleep(self.config.poll_interval).await;
        }
    }

    /// 监督循环：初始化或轮询循环意外出错时，带指数退避重启
    ///
    /// 这是显式的错误策略：单条记录的错误在 tick 内部被吸收，
    /// 逃出 tick 的错误不再让进程直接退出，而是记录后重启轮询
    pub async fn run_supervised(config: SyncerConfig) {
        let mut backoff = RestartBackoff::new();

        loop {
            match Self::new(config.clone()).await {
                Ok(mut syncer) => {
                    backoff.reset();
                    if let Err(e) = syncer.run_loop().await {
                        error!("[Sync] ❌ 轮询循环异常退出: {:#}", e);
                    }
                }
                Err(e) => {
                    error!("[Sync] ❌ 同步器初始化失败: {:#}", e);
                }
            }

            let delay = backoff.next_delay();
            warn!("[Sync] ⏳ {} 秒后重启轮询循环", delay.as_secs());
            sleep(delay).await;
        }
    }
}
