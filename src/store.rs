pub mod local;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::Result;

pub use local::LocalStore;

/// 某路径下的完整文档快照流。订阅时立即可读当前值，之后每次变更都会通知。
pub type Snapshots = watch::Receiver<Option<Value>>;

/// 按用户分区的键值同步存储
#[async_trait]
pub trait SyncStore: Send + Sync {
    fn subscribe(&self, path: &StorePath) -> Snapshots;

    /// 覆盖写入整个文档，写入 null 表示删除
    async fn write(&self, path: &StorePath, doc: Value) -> Result<()>;

    async fn read(&self, path: &StorePath) -> Result<Option<Value>> {
        Ok(self.subscribe(path).borrow().clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath(Vec<String>);

impl StorePath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            segments
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        )
    }

    pub fn novels(uid: &str) -> Self {
        Self::new(["users", uid, "novels"])
    }

    pub fn novel(uid: &str, novel_id: &str) -> Self {
        Self::new(["users", uid, "novels", novel_id])
    }

    pub fn settings(uid: &str) -> Self {
        Self::new(["users", uid, "settings"])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// 两条路径互为前缀时，一方的写入会影响另一方的快照
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}
