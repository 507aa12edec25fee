pub mod sync;

// 重新导出常用类型和函数，方便外部使用
pub use sync::{
    guard::DedupGuard,
    models::{ChangeRecord, SyncerConfig},
    service::HistorySyncer,
    types::TranscriptEntry,
};
