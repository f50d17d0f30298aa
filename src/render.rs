use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("换行正则无效"));

// 这些元素的前后各断一行
const BLOCK_TAGS: [&str; 15] = [
    "p", "div", "section", "article", "blockquote", "pre", "li", "ul", "ol", "h1", "h2", "h3",
    "h4", "h5", "h6",
];
const SKIPPED_TAGS: [&str; 3] = ["script", "style", "noscript"];

/// 把章节 HTML 片段转换为纯文本段落，供终端显示。
///
/// 按文档顺序遍历：块级元素各自成段，块外的散落文本按 `<br>` 分段。
pub fn paragraphs(content: &str) -> Vec<String> {
    let content = LINE_BREAK.replace_all(content, "\n");
    let fragment = Html::parse_fragment(&content);

    let mut text = String::new();
    collect_text(fragment.root_element(), &mut text);
    split_lines(&text)
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };

        let name = child.value().name();
        if SKIPPED_TAGS.contains(&name) {
            continue;
        }
        let block = BLOCK_TAGS.contains(&name);
        if block {
            out.push('\n');
        }
        collect_text(child, out);
        if block {
            out.push('\n');
        }
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

/// 按宽度折行，中日韩文字按单个字符计
pub fn wrap(paragraph: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in paragraph.split(' ') {
        let word_len = word.chars().count();
        let line_len = line.chars().count();
        if line_len > 0 && line_len + 1 + word_len > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);

        while line.chars().count() > width {
            let head: String = line.chars().take(width).collect();
            let tail: String = line.chars().skip(width).collect();
            lines.push(head);
            line = tail;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}
