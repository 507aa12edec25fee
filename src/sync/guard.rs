//! 进程内去重集合

use std::collections::HashSet;
use tracing::{debug, warn};

/// 已处理记录的去重集合（带容量上限）
///
/// key 为「记录 ID + 最新响应 ID」的组合。超出容量时整体清空，
/// 不做逐条淘汰；重启后不保留，因此只能提供尽力去重，不是正确性保证。
#[derive(Debug)]
pub struct DedupGuard {
    seen: HashSet<String>,
    capacity: usize,
}

impl DedupGuard {
    /// 默认容量上限
    pub const DEFAULT_CAPACITY: usize = 1000;

    /// 创建去重集合，容量由调用方注入
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            capacity,
        }
    }

    fn key(id: &str, response_id: &str) -> String {
        format!("{}:{}", id, response_id)
    }

    /// 判断组合 key 是否已处理过
    pub fn contains(&self, id: &str, response_id: &str) -> bool {
        self.seen.contains(&Self::key(id, response_id))
    }

    /// 标记组合 key 为已处理
    ///
    /// 插入后超出容量时整体清空，只放回当前 key；
    /// 清空后的一段时间内已处理记录可能被重新处理
    pub fn mark(&mut self, id: &str, response_id: &str) {
        let key = Self::key(id, response_id);
        self.seen.insert(key.clone());
        if self.seen.len() > self.capacity {
            warn!(
                "[Guard] ⚠️ 去重集合超过容量 {}，整体清空",
                self.capacity
            );
            self.seen.clear();
            self.seen.insert(key);
        }
        debug!("[Guard] 当前已记录 {} 个 key", self.seen.len());
    }

    /// 当前记录的 key 数量
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marked_key_is_contained() {
        let mut guard = DedupGuard::new(10);
        assert!(!guard.contains("uuid-1", "resp-1"));

        guard.mark("uuid-1", "resp-1");
        assert!(guard.contains("uuid-1", "resp-1"));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn same_id_with_new_response_id_is_a_new_key() {
        let mut guard = DedupGuard::new(10);
        guard.mark("uuid-1", "resp-1");

        // 同一个 ID 换了响应 ID，应当重新处理
        assert!(!guard.contains("uuid-1", "resp-2"));
    }

    #[test]
    fn overflow_clears_wholesale_and_keeps_last_key() {
        let mut guard = DedupGuard::new(3);
        guard.mark("uuid-1", "resp-1");
        guard.mark("uuid-2", "resp-2");
        guard.mark("uuid-3", "resp-3");
        assert_eq!(guard.len(), 3);

        // 第 4 个 key 触发整体清空，只保留触发溢出的 key
        guard.mark("uuid-4", "resp-4");
        assert_eq!(guard.len(), 1);
        assert!(guard.contains("uuid-4", "resp-4"));
        assert!(!guard.contains("uuid-1", "resp-1"));
    }

    #[test]
    fn default_capacity_is_one_thousand() {
        let guard = DedupGuard::default();
        assert_eq!(DedupGuard::DEFAULT_CAPACITY, 1000);
        assert!(guard.is_empty());
    }
}
