// ==========================================
// 装配工位套件追踪系统 - 工位互斥锁注册表
// ==========================================
// 职责: 同一工位的状态变更串行化，不同工位互不阻塞
// 说明: 每次变更在持锁期间完成 读取 -> 修改 -> 持久化
// ==========================================

use crate::engine::error::{StationError, StationResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 按工位ID惰性创建的互斥锁集合
#[derive(Debug, Default)]
pub struct WorkstationLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WorkstationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取（必要时创建）工位锁句柄
    pub fn handle(&self, workstation_id: &str) -> StationResult<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| StationError::LockPoisoned(e.to_string()))?;
        Ok(locks
            .entry(workstation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// 在工位锁内执行闭包
    pub fn with_lock<T, F>(&self, workstation_id: &str, f: F) -> StationResult<T>
    where
        F: FnOnce() -> StationResult<T>,
    {
        let handle = self.handle(workstation_id)?;
        let _guard = handle
            .lock()
            .map_err(|e| StationError::LockPoisoned(format!("工位 {}: {}", workstation_id, e)))?;
        f()
    }

    /// 已登记的工位数
    pub fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_same_workstation_shares_handle() {
        let locks = WorkstationLocks::new();
        let a = locks.handle("1").unwrap();
        let b = locks.handle("1").unwrap();
        let c = locks.handle("2").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_with_lock_serializes_same_workstation() {
        let locks = Arc::new(WorkstationLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks
                        .with_lock("1", || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(2));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
