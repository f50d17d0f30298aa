use thiserror::Error;

pub const FETCH_FAILURE_MESSAGE: &str =
    "Unable to load chapter. The source site may be blocking access or you are offline.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReaderError {
    /// 凭据、权限或配置错误，整个会话不可用
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// 同步存储读写失败
    #[error("Sync failed: {0}")]
    Sync(String),

    /// 所有代理策略都失败
    #[error("{}", FETCH_FAILURE_MESSAGE)]
    Fetch,

    /// 源文档无法解析
    #[error("Failed to parse chapter content: {0}")]
    Parse(String),

    #[error("Text generation failed: {0}")]
    Generation(String),
}

impl ReaderError {
    /// 需要用户重新加载或重新登录的全局错误
    pub fn is_global(&self) -> bool {
        matches!(self, ReaderError::Auth(_))
    }

    /// 阅读流程内可通过重试恢复的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReaderError::Fetch | ReaderError::Parse(_))
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_failure_renders_documented_message() {
        assert_eq!(ReaderError::Fetch.to_string(), FETCH_FAILURE_MESSAGE);
    }

    #[test]
    fn only_auth_is_global() {
        assert!(ReaderError::Auth("no profile".into()).is_global());
        assert!(!ReaderError::Sync("disk".into()).is_global());
        assert!(!ReaderError::Fetch.is_global());
    }

    #[test]
    fn fetch_and_parse_are_retryable() {
        assert!(ReaderError::Fetch.is_retryable());
        assert!(ReaderError::Parse("empty".into()).is_retryable());
        assert!(!ReaderError::Generation("down".into()).is_retryable());
    }
}
