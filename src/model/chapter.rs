#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterData {
    pub title: String,
    pub content: String, // HTML 片段
}
