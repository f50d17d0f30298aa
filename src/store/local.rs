use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use super::{Snapshots, StorePath, SyncStore};
use crate::error::{ReaderError, Result};

struct Watcher {
    path: StorePath,
    tx: watch::Sender<Option<Value>>,
}

/// 进程内 JSON 树，可选地持久化到本地文件
pub struct LocalStore {
    tree: Mutex<Value>,
    watchers: Mutex<Vec<Watcher>>,
    file: Option<PathBuf>,
    // 串行化写入，保证落盘顺序与内存一致
    write_lock: tokio::sync::Mutex<()>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self::with_tree(Value::Object(Map::new()), None)
    }

    #[instrument(skip_all)]
    pub async fn open(file: &Path) -> Result<Self> {
        let tree = if fs::try_exists(file).await.unwrap_or(false) {
            let bytes = fs::read(file)
                .await
                .map_err(|e| ReaderError::Sync(format!("读取 {} 失败: {}", file.display(), e)))?;
            serde_json::from_slice(&bytes)
                .map_err(|e| ReaderError::Sync(format!("{} 不是有效的 JSON: {}", file.display(), e)))?
        } else {
            Value::Object(Map::new())
        };

        info!("已打开本地存储: {}", file.display());
        Ok(Self::with_tree(tree, Some(file.to_path_buf())))
    }

    fn with_tree(tree: Value, file: Option<PathBuf>) -> Self {
        Self {
            tree: Mutex::new(tree),
            watchers: Mutex::new(Vec::new()),
            file,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 仍有接收端的订阅数量
    pub fn live_subscriptions(&self) -> usize {
        let mut watchers = lock(&self.watchers);
        watchers.retain(|w| w.tx.receiver_count() > 0);
        watchers.len()
    }

    async fn persist(&self, snapshot: &Value) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| ReaderError::Sync(format!("序列化失败: {}", e)))?;

        // 先写临时文件再改名，中途失败不会留下半个文件
        let staging = staging_path(file);
        fs::write(&staging, bytes)
            .await
            .map_err(|e| ReaderError::Sync(format!("写入 {} 失败: {}", staging.display(), e)))?;
        fs::rename(&staging, file)
            .await
            .map_err(|e| ReaderError::Sync(format!("替换 {} 失败: {}", file.display(), e)))
    }
}

fn staging_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn get_at<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| node.get(segment.as_str()))
        .filter(|value| !value.is_null())
}

fn set_at(root: &mut Value, path: &StorePath, doc: Value) {
    let Some((last, parents)) = path.segments().split_last() else {
        *root = doc;
        return;
    };

    if doc.is_null() {
        let parent = parents
            .iter()
            .try_fold(&mut *root, |node, segment| node.get_mut(segment.as_str()));
        if let Some(Value::Object(map)) = parent {
            map.remove(last);
        }
        return;
    }

    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        node = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        map.insert(last.clone(), doc);
    }
}

#[async_trait]
impl SyncStore for LocalStore {
    fn subscribe(&self, path: &StorePath) -> Snapshots {
        let tree = lock(&self.tree);
        let mut watchers = lock(&self.watchers);
        watchers.retain(|w| w.tx.receiver_count() > 0);

        if let Some(watcher) = watchers.iter().find(|w| &w.path == path) {
            return watcher.tx.subscribe();
        }

        let (tx, rx) = watch::channel(get_at(&tree, path).cloned());
        watchers.push(Watcher {
            path: path.clone(),
            tx,
        });
        debug!("新订阅: {}", path);
        rx
    }

    async fn write(&self, path: &StorePath, doc: Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let snapshot = {
            let mut tree = lock(&self.tree);
            set_at(&mut tree, path, doc);

            let mut watchers = lock(&self.watchers);
            watchers.retain(|w| w.tx.receiver_count() > 0);
            for watcher in watchers.iter().filter(|w| w.path.overlaps(path)) {
                watcher.tx.send_replace(get_at(&tree, &watcher.path).cloned());
            }

            self.file.as_ref().map(|_| tree.clone())
        };

        debug!("已写入: {}", path);
        match snapshot {
            Some(snapshot) => self.persist(&snapshot).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn subscription_fires_immediately_then_on_change() {
        let store = LocalStore::in_memory();
        let path = StorePath::settings("u1");
        let mut rx = store.subscribe(&path);
        assert_eq!(*rx.borrow_and_update(), None);

        store.write(&path, json!({ "fontSize": 20 })).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(json!({ "fontSize": 20 })));
    }

    #[tokio::test]
    async fn child_write_updates_collection_snapshot() {
        let store = LocalStore::in_memory();
        let rx = store.subscribe(&StorePath::novels("u1"));

        store
            .write(&StorePath::novel("u1", "1"), json!({ "title": "A" }))
            .await
            .unwrap();
        assert_eq!(*rx.borrow(), Some(json!({ "1": { "title": "A" } })));

        store.write(&StorePath::novel("u1", "1"), Value::Null).await.unwrap();
        assert_eq!(*rx.borrow(), Some(json!({})));
    }

    #[tokio::test]
    async fn other_users_are_not_notified() {
        let store = LocalStore::in_memory();
        let mut rx = store.subscribe(&StorePath::novels("u2"));
        rx.borrow_and_update();

        store
            .write(&StorePath::novel("u1", "1"), json!({ "title": "A" }))
            .await
            .unwrap();
        assert!(!rx.has_changed().unwrap());
        assert_eq!(*rx.borrow(), None);
    }

    #[tokio::test]
    async fn dropped_receivers_are_pruned() {
        let store = LocalStore::in_memory();
        let rx = store.subscribe(&StorePath::novels("u1"));
        let other = store.subscribe(&StorePath::settings("u1"));
        assert_eq!(store.live_subscriptions(), 2);

        drop(rx);
        drop(other);
        assert_eq!(store.live_subscriptions(), 0);
    }

    #[tokio::test]
    async fn persists_to_file_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("library.json");

        let store = LocalStore::open(&file).await.unwrap();
        store
            .write(&StorePath::settings("u1"), json!({ "themeMode": "light" }))
            .await
            .unwrap();
        drop(store);

        let reopened = LocalStore::open(&file).await.unwrap();
        assert_eq!(
            reopened.read(&StorePath::settings("u1")).await.unwrap(),
            Some(json!({ "themeMode": "light" }))
        );
    }

    #[tokio::test]
    async fn writes_replace_the_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("library.json");
        // 上次中断留下的临时文件
        std::fs::write(staging_path(&file), "{ half").unwrap();

        let store = LocalStore::open(&file).await.unwrap();
        for size in [14, 28] {
            store
                .write(&StorePath::settings("u1"), json!({ "fontSize": size }))
                .await
                .unwrap();
        }

        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, ["library.json"]);

        let reopened = LocalStore::open(&file).await.unwrap();
        assert_eq!(
            reopened.read(&StorePath::settings("u1")).await.unwrap(),
            Some(json!({ "fontSize": 28 }))
        );
    }

    #[tokio::test]
    async fn corrupt_file_is_a_sync_failure() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("library.json");
        std::fs::write(&file, "{ not json").unwrap();

        assert!(matches!(LocalStore::open(&file).await, Err(ReaderError::Sync(_))));
    }
}
