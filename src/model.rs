pub mod chapter;
pub mod novel;
pub mod settings;

pub use chapter::ChapterData;
pub use novel::Novel;
pub use settings::{ReaderSettings, ThemeMode, ThemePreset};
