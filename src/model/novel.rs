use serde::{Deserialize, Serialize};

use crate::pattern;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Novel {
    pub id: String,
    pub title: String,
    pub base_url_pattern: String, // 含 {chapter} 占位符
    pub current_chapter: u32,
    pub last_read_at: i64, // 毫秒时间戳
    #[serde(default)]
    pub scroll_position: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
}

impl Novel {
    /// 由用户粘贴的章节链接创建小说记录
    pub fn from_chapter_url(id: String, url: &str, now_ms: i64) -> Self {
        let found = pattern::extract(url);
        Self {
            id,
            title: found.title,
            base_url_pattern: found.pattern,
            current_chapter: found.start_chapter.max(1),
            last_read_at: now_ms,
            scroll_position: 0,
            cover_image: None,
        }
    }

    pub fn chapter_url(&self, chapter: u32) -> String {
        pattern::construct(&self.base_url_pattern, chapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_novel_starts_at_inferred_chapter() {
        let novel = Novel::from_chapter_url(
            "1700000000000".into(),
            "https://www.fanmtl.com/novel/shadow-slave_5.html",
            1_700_000_000_000,
        );
        assert_eq!(novel.current_chapter, 5);
        assert_eq!(novel.scroll_position, 0);
        assert_eq!(novel.title, "SHADOW SLAVE");
        assert_eq!(
            novel.chapter_url(6),
            "https://www.fanmtl.com/novel/shadow-slave_6.html"
        );
    }

    #[test]
    fn chapter_zero_url_is_clamped_to_first_chapter() {
        let novel = Novel::from_chapter_url("1".into(), "https://example.com/prologue_0.html", 0);
        assert_eq!(novel.current_chapter, 1);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let novel = Novel::from_chapter_url("42".into(), "https://example.com/a_1.html", 9);
        let value = serde_json::to_value(&novel).unwrap();
        assert_eq!(value["baseUrlPattern"], "https://example.com/a_{chapter}.html");
        assert_eq!(value["currentChapter"], 1);
        assert_eq!(value["lastReadAt"], 9);
        assert!(value.get("coverImage").is_none());
    }
}
