//! 聊天记录同步模块
//!
//! 实现 OpenAI 聊天记录的轮询同步流程：检测变更 -> 拉取记录 -> 落库

pub mod api;
pub mod dao;
pub mod db;
pub mod guard;
pub mod models;
pub mod service;
pub mod types;

// 重新导出主要类型和函数
pub use api::ResponsesApi;
pub use dao::{ChangeDao, HistoryDao};
pub use guard::DedupGuard;
pub use models::{ChangeRecord, SyncedRecord, SyncerConfig};
pub use service::HistorySyncer;
pub use types::TranscriptEntry;
