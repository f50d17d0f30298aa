pub mod autoscroll;
pub mod selection;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::ai::Assistant;
use crate::error::ReaderError;
use crate::fetcher::ChapterFetcher;
use crate::model::{ChapterData, Novel, ReaderSettings};
use crate::progress::ProgressTracker;

pub use autoscroll::{AutoScroller, ScrollToken, Viewport};
pub use selection::{Anchor, Rect, TextSelection};

#[derive(Debug, Clone, PartialEq)]
pub enum ChapterState {
    Loading,
    Ready(ChapterData),
    Failed(ReaderError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Explanation {
    Hidden,
    Loading,
    Ready(String),
}

/// 一次章节加载的凭据。结果只有在凭据仍是最新时才会被采用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub novel_id: String,
    pub chapter: u32,
    pub url: String,
    seq: u64,
}

/// 后台加载完成后带回的结果
#[derive(Debug)]
pub struct Loaded {
    pub ticket: FetchTicket,
    pub result: Result<ChapterData, ReaderError>,
    pub elapsed: Duration,
}

/// 在会话之外抓取凭据对应的章节，结果交回 [`ReaderSession::finish_load`]
#[instrument(skip_all, fields(chapter = ticket.chapter))]
pub async fn fetch_ticket(fetcher: Arc<ChapterFetcher>, ticket: FetchTicket) -> Loaded {
    info!("正在加载: {}", ticket.url);
    let started = Instant::now();
    let result = fetcher.fetch(&ticket.url).await;
    Loaded {
        ticket,
        result,
        elapsed: started.elapsed(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainRequest {
    pub text: String,
    pub title: String,
}

/// 单本小说的阅读会话：章节导航、自动滚动、选区解释和控件显隐
pub struct ReaderSession {
    novel: Novel,
    current_chapter: u32,
    chapter: ChapterState,
    fetch_seq: u64,
    viewport: Viewport,
    controls_visible: bool,
    settings_open: bool,
    selection: Option<(TextSelection, Anchor)>,
    explanation: Explanation,
    scroller: AutoScroller,
    progress: ProgressTracker,
}

impl ReaderSession {
    pub fn new(novel: Novel, settings: &ReaderSettings, progress: ProgressTracker) -> Self {
        Self {
            current_chapter: novel.current_chapter.max(1),
            novel,
            chapter: ChapterState::Loading,
            fetch_seq: 0,
            viewport: Viewport::default(),
            controls_visible: true,
            settings_open: false,
            selection: None,
            explanation: Explanation::Hidden,
            scroller: AutoScroller::new(settings.auto_scroll_enabled, settings.auto_scroll_speed),
            progress,
        }
    }

    pub fn novel(&self) -> &Novel {
        &self.novel
    }

    pub fn current_chapter(&self) -> u32 {
        self.current_chapter
    }

    pub fn chapter(&self) -> &ChapterState {
        &self.chapter
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn controls_visible(&self) -> bool {
        self.controls_visible
    }

    pub fn settings_open(&self) -> bool {
        self.settings_open
    }

    pub fn anchor(&self) -> Option<Anchor> {
        self.selection.as_ref().map(|(_, anchor)| *anchor)
    }

    pub fn explanation(&self) -> &Explanation {
        &self.explanation
    }

    pub fn can_go_prev(&self) -> bool {
        self.current_chapter > 1
    }

    /// 页面标题，抓取到的标题为空时显示章节号
    pub fn heading(&self) -> String {
        match &self.chapter {
            ChapterState::Ready(data) if !data.title.trim().is_empty() => data.title.clone(),
            _ => format!("Chapter {}", self.current_chapter),
        }
    }

    // ---- 章节加载 ----

    pub fn begin_load(&mut self) -> FetchTicket {
        self.fetch_seq += 1;
        self.chapter = ChapterState::Loading;
        // 新章节尚未排版
        self.viewport.content_height = 0.0;
        self.sync_auto_scroll();

        FetchTicket {
            novel_id: self.novel.id.clone(),
            chapter: self.current_chapter,
            url: self.novel.chapter_url(self.current_chapter),
            seq: self.fetch_seq,
        }
    }

    /// 采用加载结果。过期的结果被丢弃并返回 false。
    pub fn finish_load(&mut self, ticket: FetchTicket, result: Result<ChapterData, ReaderError>) -> bool {
        if ticket.seq != self.fetch_seq
            || ticket.chapter != self.current_chapter
            || ticket.novel_id != self.novel.id
        {
            debug!("丢弃过期的第 {} 章加载结果", ticket.chapter);
            return false;
        }

        match result {
            Ok(data) => {
                self.chapter = ChapterState::Ready(data);
                let restore = if self.current_chapter == self.novel.current_chapter {
                    self.novel.scroll_position as f64
                } else {
                    0.0
                };
                self.viewport.scroll_to(restore);
            }
            Err(e) => {
                warn!("第 {} 章加载失败: {}", ticket.chapter, e);
                self.chapter = ChapterState::Failed(e);
            }
        }
        self.sync_auto_scroll();
        true
    }

    #[instrument(skip_all, fields(chapter = self.current_chapter))]
    pub async fn load(&mut self, fetcher: &ChapterFetcher) {
        let ticket = self.begin_load();
        info!("正在加载: {}", ticket.url);
        let result = fetcher.fetch(&ticket.url).await;
        self.finish_load(ticket, result);
    }

    /// 仅在失败状态下重新加载当前章节
    pub fn retry(&mut self) -> Option<FetchTicket> {
        match self.chapter {
            ChapterState::Failed(_) => Some(self.begin_load()),
            _ => None,
        }
    }

    // ---- 导航 ----

    pub fn next(&mut self) -> FetchTicket {
        self.go_to(self.current_chapter.saturating_add(1))
    }

    /// 第一章时不做任何事
    pub fn prev(&mut self) -> Option<FetchTicket> {
        if !self.can_go_prev() {
            return None;
        }
        Some(self.go_to(self.current_chapter - 1))
    }

    fn go_to(&mut self, chapter: u32) -> FetchTicket {
        self.current_chapter = chapter;
        self.viewport.offset = 0.0;
        self.selection = None;
        self.progress.record_chapter(&self.novel.id, chapter);
        self.begin_load()
    }

    // ---- 滚动 ----

    pub fn set_layout(&mut self, content_height: f64, viewport_height: f64) {
        self.viewport.content_height = content_height.max(0.0);
        self.viewport.viewport_height = viewport_height.max(0.0);
        let offset = self.viewport.offset;
        self.viewport.scroll_to(offset);
        self.sync_auto_scroll();
    }

    pub fn on_user_scroll(&mut self, offset: f64) {
        self.viewport.scroll_to(offset);
        self.record_scroll();
        self.sync_auto_scroll();
    }

    fn record_scroll(&self) {
        self.progress.record(
            &self.novel.id,
            self.current_chapter,
            self.viewport.offset.round() as u64,
        );
    }

    fn is_blocked(&self) -> bool {
        self.settings_open
            || self.controls_visible
            || self.selection.is_some()
            || self.explanation != Explanation::Hidden
    }

    fn can_auto_scroll(&self) -> bool {
        matches!(self.chapter, ChapterState::Ready(_))
            && !self.is_blocked()
            && !self.viewport.at_bottom()
    }

    fn sync_auto_scroll(&mut self) -> Option<ScrollToken> {
        let can_run = self.can_auto_scroll();
        self.scroller.sync(can_run)
    }

    /// 当前运行中的自动滚动循环
    pub fn auto_scroll_token(&self) -> Option<ScrollToken> {
        self.scroller.active()
    }

    /// 每帧调用一次。每帧都会重新检查阻塞条件；返回 false 时驱动方应停止该循环。
    pub fn frame(&mut self, token: ScrollToken) -> bool {
        if !self.can_auto_scroll() {
            self.scroller.cancel();
            return false;
        }

        let before = self.viewport.offset.round();
        let running = self.scroller.tick(token, &mut self.viewport);
        if self.viewport.offset.round() != before {
            self.record_scroll();
        }
        running
    }

    pub fn apply_settings(&mut self, settings: &ReaderSettings) {
        self.scroller
            .configure(settings.auto_scroll_enabled, settings.auto_scroll_speed);
        self.sync_auto_scroll();
    }

    pub fn auto_scroll_enabled(&self) -> bool {
        self.scroller.enabled()
    }

    pub fn auto_scroll_speed(&self) -> u8 {
        self.scroller.speed()
    }

    // ---- 控件与设置面板 ----

    /// 点击正文切换控件显隐；选区拖拽结束时的抬起不算点击
    pub fn on_tap(&mut self, ends_selection_drag: bool) {
        if ends_selection_drag {
            return;
        }
        self.controls_visible = !self.controls_visible;
        self.sync_auto_scroll();
    }

    pub fn set_controls_visible(&mut self, visible: bool) {
        self.controls_visible = visible;
        self.sync_auto_scroll();
    }

    pub fn set_settings_open(&mut self, open: bool) {
        self.settings_open = open;
        self.sync_auto_scroll();
    }

    /// 存储推送了新的小说快照
    pub fn sync_novel(&mut self, novel: &Novel) {
        if novel.id == self.novel.id {
            self.novel = novel.clone();
        }
    }

    // ---- 选区与解释 ----

    pub fn on_selection_change(&mut self, selection: Option<TextSelection>, container: &Rect) {
        self.selection = selection.and_then(|selection| {
            selection::anchor_for(&selection, container).map(|anchor| (selection, anchor))
        });
        self.sync_auto_scroll();
    }

    pub fn begin_explain(&mut self) -> Option<ExplainRequest> {
        let (selection, _) = self.selection.take()?;
        self.explanation = Explanation::Loading;
        self.sync_auto_scroll();

        Some(ExplainRequest {
            text: selection.text.trim().to_string(),
            title: self.novel.title.clone(),
        })
    }

    pub fn finish_explain(&mut self, answer: String) {
        if self.explanation == Explanation::Loading {
            self.explanation = Explanation::Ready(answer);
        }
    }

    pub fn dismiss_explanation(&mut self) {
        self.explanation = Explanation::Hidden;
        self.sync_auto_scroll();
    }

    pub async fn explain(&mut self, assistant: &Assistant) {
        let Some(request) = self.begin_explain() else {
            return;
        };
        let answer = assistant.explain(&request.text, &request.title).await;
        self.finish_explain(answer);
    }
}
