use std::sync::LazyLock;

use regex::{Captures, Regex};

pub const PLACEHOLDER: &str = "{chapter}";

pub const UNKNOWN_TITLE: &str = "Unknown Novel";

// .../name_12.html
static CHAPTER_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(\d+)\.html$").expect("章节后缀正则无效"));

// {chapter} 或补零形式 {chapter:03}；{{ 和 }} 是转义后的字面花括号
static PLACEHOLDER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{chapter(?::0(\d+))?\}").expect("占位符正则无效")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    pub pattern: String,
    pub start_chapter: u32,
    pub title: String,
}

/// 从一个具体的章节链接推断章节模板、起始章节和标题。
///
/// 对任意输入都会返回结果：匹配不到 `_<数字>.html` 结尾时，
/// 退回到在原链接后追加 `page={chapter}` 查询参数。
pub fn extract(url: &str) -> UrlPattern {
    if let Some(found) = match_suffix(url) {
        return found;
    }

    UrlPattern {
        pattern: append_page_query(url),
        start_chapter: 1,
        title: UNKNOWN_TITLE.to_string(),
    }
}

fn match_suffix(url: &str) -> Option<UrlPattern> {
    let caps = CHAPTER_SUFFIX.captures(url)?;
    let digits = caps.get(1)?;
    let start_chapter = digits.as_str().parse::<u32>().ok()?;

    // 保留前导零宽度，保证模板能还原出原链接
    let token = if digits.as_str().len() > 1 && digits.as_str().starts_with('0') {
        format!("{{chapter:0{}}}", digits.as_str().len())
    } else {
        PLACEHOLDER.to_string()
    };

    let mut pattern = String::with_capacity(url.len() + token.len());
    pattern.push_str(&escape(&url[..digits.start()]));
    pattern.push_str(&token);
    pattern.push_str(&escape(&url[digits.end()..]));

    Some(UrlPattern {
        pattern,
        start_chapter,
        title: title_from_filename(url),
    })
}

fn title_from_filename(url: &str) -> String {
    let filename = url.rsplit('/').next().unwrap_or(url);
    let title = CHAPTER_SUFFIX
        .replace(filename, "")
        .replace('-', " ")
        .to_uppercase();
    let title = title.trim();
    if title.is_empty() {
        UNKNOWN_TITLE.to_string()
    } else {
        title.to_string()
    }
}

fn append_page_query(url: &str) -> String {
    let (base, fragment) = match url.find('#') {
        Some(idx) => url.split_at(idx),
        None => (url, ""),
    };

    let separator = if base.ends_with('?') || base.ends_with('&') {
        ""
    } else if base.contains('?') {
        "&"
    } else {
        "?"
    };

    format!(
        "{}{}page={}{}",
        escape(base),
        separator,
        PLACEHOLDER,
        escape(fragment)
    )
}

/// 链接里原有的花括号按 `{{`、`}}` 转义，不会被当成占位符
fn escape(raw: &str) -> String {
    raw.replace('{', "{{").replace('}', "}}")
}

/// 把章节号代入模板中的第一个占位符，并还原转义的花括号
pub fn construct(pattern: &str, chapter: u32) -> String {
    let mut filled = false;
    PLACEHOLDER_TOKEN
        .replace_all(pattern, |caps: &Captures| match &caps[0] {
            "{{" => "{".to_string(),
            "}}" => "}".to_string(),
            token if filled => token.to_string(),
            _ => {
                filled = true;
                match caps.get(1) {
                    Some(width) => {
                        let width = width.as_str().parse::<usize>().unwrap_or(0);
                        format!("{:0width$}", chapter, width = width)
                    }
                    None => chapter.to_string(),
                }
            }
        })
        .into_owned()
}

pub fn has_placeholder(pattern: &str) -> bool {
    PLACEHOLDER_TOKEN
        .find_iter(pattern)
        .any(|m| m.as_str() != "{{" && m.as_str() != "}}")
}
