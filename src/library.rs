use serde_json::Value;
use tracing::warn;

use crate::error::{ReaderError, Result};
use crate::model::Novel;

/// 解析小说集合文档，按最近阅读时间倒序排列。
///
/// 集合以 id 为键存储；单条记录损坏时跳过并记录日志，不影响其余记录。
pub fn decode_novels(doc: Option<&Value>) -> Result<Vec<Novel>> {
    let entries: Vec<&Value> = match doc {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(map)) => map.values().collect(),
        Some(Value::Array(items)) => items.iter().filter(|v| !v.is_null()).collect(),
        Some(other) => {
            return Err(ReaderError::Sync(format!(
                "小说集合格式错误: {}",
                other
            )));
        }
    };

    let mut novels: Vec<Novel> = entries
        .into_iter()
        .filter_map(|entry| {
            serde_json::from_value(entry.clone())
                .map_err(|e| warn!("跳过无法解析的小说记录: {}", e))
                .ok()
        })
        .collect();
    sort_recent(&mut novels);
    Ok(novels)
}

pub fn sort_recent(novels: &mut [Novel]) {
    novels.sort_by(|a, b| {
        b.last_read_at
            .cmp(&a.last_read_at)
            .then_with(|| a.title.cmp(&b.title))
    });
}

/// 按标题过滤，不区分大小写
pub fn search<'a>(novels: &'a [Novel], query: &str) -> Vec<&'a Novel> {
    let query = query.trim().to_lowercase();
    novels
        .iter()
        .filter(|novel| query.is_empty() || novel.title.to_lowercase().contains(&query))
        .collect()
}

/// 基于毫秒时间戳的 id，已被占用时递增
pub fn next_id(now_ms: i64, existing: &[Novel]) -> String {
    let mut candidate = now_ms.max(0);
    while existing.iter().any(|n| n.id == candidate.to_string()) {
        candidate += 1;
    }
    candidate.to_string()
}

/// 由章节链接创建新记录，空链接返回 None
pub fn new_novel(url: &str, now_ms: i64, existing: &[Novel]) -> Option<Novel> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    Some(Novel::from_chapter_url(next_id(now_ms, existing), url, now_ms))
}
