use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ReaderError, Result};
use crate::store::{StorePath, SyncStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub chapter: u32,
    pub scroll_offset: u64,
}

/// 阅读进度写回。滚动事件经防抖合并，只保留一个待写入任务；换章时立即写入。
pub struct ProgressTracker {
    store: Arc<dyn SyncStore>,
    uid: String,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn SyncStore>, uid: String, debounce: Duration) -> Self {
        Self {
            store,
            uid,
            debounce,
            pending: Mutex::new(None),
        }
    }

    /// 防抖写入：取消尚未触发的写入，用最新的值重新计时
    pub fn record(&self, novel_id: &str, chapter: u32, scroll_offset: u64) {
        let store = self.store.clone();
        let path = StorePath::novel(&self.uid, novel_id);
        let debounce = self.debounce;
        let progress = Progress {
            chapter,
            scroll_offset,
        };

        let task = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(e) = write_progress(store.as_ref(), &path, progress).await {
                warn!("保存阅读进度失败: {}", e);
            }
        });
        self.replace_pending(Some(task));
    }

    /// 换章后立即写入，滚动位置归零
    pub fn record_chapter(&self, novel_id: &str, chapter: u32) {
        self.replace_pending(None);

        let store = self.store.clone();
        let path = StorePath::novel(&self.uid, novel_id);
        let progress = Progress {
            chapter,
            scroll_offset: 0,
        };
        tokio::spawn(async move {
            if let Err(e) = write_progress(store.as_ref(), &path, progress).await {
                warn!("保存章节进度失败: {}", e);
            }
        });
    }

    pub fn has_pending(&self) -> bool {
        self.lock_pending()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn replace_pending(&self, task: Option<JoinHandle<()>>) {
        let previous = std::mem::replace(&mut *self.lock_pending(), task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.replace_pending(None);
    }
}

/// 覆盖小说记录中的进度字段，后写者胜出
pub async fn write_progress(store: &dyn SyncStore, path: &StorePath, progress: Progress) -> Result<()> {
    let Some(Value::Object(mut novel)) = store.read(path).await? else {
        return Err(ReaderError::Sync(format!("{} 不存在", path)));
    };

    novel.insert("currentChapter".to_string(), progress.chapter.into());
    novel.insert("scrollPosition".to_string(), progress.scroll_offset.into());
    novel.insert("lastReadAt".to_string(), Utc::now().timestamp_millis().into());

    store.write(path, Value::Object(novel)).await?;
    debug!("进度已保存: {} 第 {} 章 {}", path, progress.chapter, progress.scroll_offset);
    Ok(())
}
