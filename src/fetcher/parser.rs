use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use crate::error::{ReaderError, Result};
use crate::model::ChapterData;

pub const FALLBACK_TITLE: &str = "Chapter";

// 按优先级排列，body 兜底
static CONTENT_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        ".chapter-content",
        "#chapter-content",
        ".entry-content",
        "#content",
        "article",
        "body",
    ]
    .iter()
    .map(|s| Selector::parse(s).expect("无法创建正文选择器"))
    .collect()
});

static TITLE_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [".chapter-title", "h1"]
        .iter()
        .map(|s| Selector::parse(s).expect("无法创建标题选择器"))
        .collect()
});

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("脚本正则无效"));

/// 从整页 HTML 中提取章节标题和正文
#[instrument(skip_all)]
pub fn parse_chapter(html: &str) -> Result<ChapterData> {
    let document = Html::parse_document(html);

    let content = CONTENT_SELECTORS
        .iter()
        .find_map(|selector| document.select(selector).next())
        .map(|elem| elem.inner_html())
        .ok_or_else(|| ReaderError::Parse("no content element".to_string()))?;

    let content = strip_scripts(&content);
    if content.trim().is_empty() {
        return Err(ReaderError::Parse("no readable content".to_string()));
    }

    let title = TITLE_SELECTORS
        .iter()
        .filter_map(|selector| document.select(selector).next())
        .map(|elem| elem.text().collect::<String>().trim().to_string())
        .find(|title| !title.is_empty())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());

    debug!("章节解析完成: {}", title);
    Ok(ChapterData { title, content })
}

pub fn strip_scripts(markup: &str) -> String {
    SCRIPT_BLOCK.replace_all(markup, "").into_owned()
}
