use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use novel_reader::ai::Assistant;
use novel_reader::auth::LocalAuth;
use novel_reader::cli::{Command, HELP};
use novel_reader::config::init_config;
use novel_reader::error::ReaderError;
use novel_reader::fetcher::ChapterFetcher;
use novel_reader::model::settings::FONT_FAMILIES;
use novel_reader::reader::{
    self, ChapterState, ExplainRequest, Explanation, FetchTicket, Loaded, ReaderSession, Rect,
    TextSelection,
};
use novel_reader::session::{App, Session};
use novel_reader::store::LocalStore;
use novel_reader::{logger, render, utils};

const PAGE_LINES: usize = 20;
const LINE_WIDTH: usize = 80;
const FRAME: Duration = Duration::from_millis(100);

type Input = Lines<BufReader<Stdin>>;

/// 打开中的章节及其排版结果，一行即一个滚动单位
struct Reading {
    session: ReaderSession,
    lines: Vec<String>,
}

impl Reading {
    fn layout(&mut self) {
        self.lines = match self.session.chapter() {
            ChapterState::Ready(data) => render::paragraphs(&data.content)
                .iter()
                .flat_map(|p| {
                    let mut wrapped = render::wrap(p, LINE_WIDTH);
                    wrapped.push(String::new());
                    wrapped
                })
                .collect(),
            _ => Vec::new(),
        };
        self.session
            .set_layout(self.lines.len() as f64, PAGE_LINES as f64);
    }

    fn top_line(&self) -> usize {
        self.session.viewport().offset.floor() as usize
    }
}

/// 后台任务：章节加载和 AI 解释，完成后回到主循环
struct Background {
    fetcher: Arc<ChapterFetcher>,
    loads: JoinSet<Loaded>,
    explains: JoinSet<String>,
}

impl Background {
    fn new(fetcher: ChapterFetcher) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            loads: JoinSet::new(),
            explains: JoinSet::new(),
        }
    }

    fn load(&mut self, ticket: FetchTicket) {
        println!("\n正在加载第 {} 章...", ticket.chapter);
        self.loads
            .spawn(reader::fetch_ticket(self.fetcher.clone(), ticket));
    }

    fn explain(&mut self, assistant: &Assistant, request: ExplainRequest) {
        self.explains.abort_all();
        let assistant = assistant.clone();
        self.explains
            .spawn(async move { assistant.explain(&request.text, &request.title).await });
    }

    /// 离开阅读页时丢弃未完成的任务
    fn clear(&mut self) {
        self.loads = JoinSet::new();
        self.explains = JoinSet::new();
    }
}

enum Event {
    Line(Option<String>),
    Loaded(std::result::Result<Loaded, JoinError>),
    Explained(std::result::Result<String, JoinError>),
    StoreChanged(std::result::Result<(), ReaderError>),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    logger::init();
    let config = init_config()?;

    let store = Arc::new(LocalStore::open(&config.store.path).await?);
    let auth = Arc::new(LocalAuth::new(config.auth.profile.clone()));
    let assistant = Assistant::from_config(&config.ai);
    if !assistant.is_available() {
        info!("未配置 AI 密钥，解释与阅读报告不可用");
    }
    let mut app = App::new(auth, store, config.progress.debounce());
    let fetcher = ChapterFetcher::from_config(config.fetch)?;
    info!("代理顺序: {}", fetcher.strategy_names().join(" -> "));

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut background = Background::new(fetcher);
    let mut reading: Option<Reading> = None;
    let mut store_live = true;
    let mut show_prompt = true;

    println!("\n=== novel-reader ===");
    if !sign_in(&mut app, &mut input).await? {
        return Ok(());
    }
    if let Some(session) = app.session() {
        print_library(session);
    }

    loop {
        if show_prompt {
            prompt(if reading.is_some() { "阅读" } else { "书架" })?;
        }
        show_prompt = true;

        let event = tokio::select! {
            line = input.next_line() => Event::Line(line?),
            Some(joined) = background.loads.join_next() => Event::Loaded(joined),
            Some(joined) = background.explains.join_next() => Event::Explained(joined),
            changed = store_changed(&mut app), if store_live => Event::StoreChanged(changed),
        };

        let line = match event {
            Event::Line(Some(line)) => line,
            Event::Line(None) => break,
            Event::Loaded(Ok(loaded)) => {
                show_prompt = on_loaded(&mut reading, loaded);
                continue;
            }
            Event::Explained(Ok(answer)) => {
                show_prompt = on_explained(&mut reading, answer);
                continue;
            }
            Event::Loaded(Err(e)) | Event::Explained(Err(e)) => {
                if !e.is_cancelled() {
                    error!("后台任务异常结束: {}", e);
                }
                show_prompt = false;
                continue;
            }
            Event::StoreChanged(Ok(())) => {
                show_prompt = false;
                if let Some(session) = app.session_mut()
                    && sync_reader(session, &mut reading)
                {
                    background.clear();
                    print_library(session);
                    show_prompt = true;
                }
                continue;
            }
            Event::StoreChanged(Err(e)) => {
                warn!("停止接收存储推送: {}", e);
                store_live = false;
                show_prompt = false;
                continue;
            }
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("输入错误: {}", e);
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => println!("{}", HELP),
            Command::SignIn => {
                if app.session().is_none() {
                    if !sign_in(&mut app, &mut input).await? {
                        break;
                    }
                    store_live = true;
                }
            }
            Command::SignOut => {
                reading = None;
                background.clear();
                app.sign_out().await?;
                println!("已登出。输入 signin 重新登录。");
            }
            command => {
                let Some(session) = app.session_mut() else {
                    println!("请先登录 (signin)。");
                    continue;
                };
                if let Err(e) = dispatch(
                    command,
                    session,
                    &mut reading,
                    &mut background,
                    &assistant,
                    &mut input,
                )
                .await
                {
                    error!("{}", e);
                    println!("操作失败: {}", e);
                }
                if sync_reader(session, &mut reading) {
                    background.clear();
                    print_library(session);
                }
            }
        }
    }

    println!("程序结束。");
    Ok(())
}

/// 等待当前账户的存储推送；未登录时永不完成
async fn store_changed(app: &mut App) -> std::result::Result<(), ReaderError> {
    match app.session_mut() {
        Some(session) => session.changed().await,
        None => std::future::pending().await,
    }
}

async fn dispatch(
    command: Command,
    session: &mut Session,
    reading: &mut Option<Reading>,
    background: &mut Background,
    assistant: &Assistant,
    input: &mut Input,
) -> Result<()> {
    match command {
        Command::List => print_library(session),
        Command::Search(query) => {
            let hits = session.search(&query);
            if hits.is_empty() {
                println!("没有匹配的小说。");
            }
            for novel in hits {
                println!("  [{}] {} · 第 {} 章", novel.id, novel.title, novel.current_chapter);
            }
        }
        Command::Add(url) => match session.add_novel(&url).await? {
            Some(novel) => println!(
                "已添加《{}》，从第 {} 章开始 (id {})",
                novel.title, novel.current_chapter, novel.id
            ),
            None => println!("链接不能为空。"),
        },
        Command::Remove(key) => {
            let Some(id) = resolve_novel(session, &key) else {
                println!("找不到小说: {}", key);
                return Ok(());
            };
            session.remove_novel(&id).await?;
            println!("已删除。");
        }
        Command::Open(key) => {
            let Some(id) = resolve_novel(session, &key) else {
                println!("找不到小说: {}", key);
                return Ok(());
            };
            if let Some(reader) = session.open_reader(&id) {
                background.clear();
                let mut opened = Reading {
                    session: reader,
                    lines: Vec::new(),
                };
                background.load(opened.session.begin_load());
                *reading = Some(opened);
            }
        }
        Command::Report => {
            println!("正在生成阅读报告...");
            println!("\n{}\n", assistant.reading_report(session.novels()).await);
        }
        Command::Theme(preset) => {
            change_settings(session, reading, |s| s.apply_theme(preset)).await?;
            println!("主题: {}", preset.name());
        }
        Command::Font(size) => {
            let settings = change_settings(session, reading, |s| s.set_font_size(size)).await?;
            println!("字号: {}", settings.font_size);
        }
        Command::Family(family) => {
            if !FONT_FAMILIES.contains(&family.as_str()) {
                println!("可选字体: {}", FONT_FAMILIES.join(", "));
                return Ok(());
            }
            change_settings(session, reading, |s| s.font_family = family).await?;
        }
        Command::Speed(speed) => {
            let settings = change_settings(session, reading, |s| s.set_scroll_speed(speed)).await?;
            println!("自动滚动速度: {}", settings.auto_scroll_speed);
        }
        Command::AutoScroll(enabled) => {
            change_settings(session, reading, |s| s.auto_scroll_enabled = enabled).await?;
            println!("自动滚动: {}", if enabled { "开" } else { "关" });
        }
        reader_command => {
            let Some(current) = reading.as_mut() else {
                println!("请先打开一本小说 (open)。");
                return Ok(());
            };
            if read(reader_command, current, background, assistant, input).await? {
                *reading = None;
                background.clear();
                print_library(session);
            }
        }
    }
    Ok(())
}

/// 阅读页命令，返回 true 表示回到书架
async fn read(
    command: Command,
    reading: &mut Reading,
    background: &mut Background,
    assistant: &Assistant,
    input: &mut Input,
) -> Result<bool> {
    match command {
        Command::Back => return Ok(true),
        Command::Next => {
            let ticket = reading.session.next();
            reading.layout();
            background.load(ticket);
        }
        Command::Prev => match reading.session.prev() {
            Some(ticket) => {
                reading.layout();
                background.load(ticket);
            }
            None => println!("已经是第一章。"),
        },
        Command::Retry => match reading.session.retry() {
            Some(ticket) => {
                reading.layout();
                background.load(ticket);
            }
            None => println!("当前章节无需重试。"),
        },
        Command::Down | Command::Up | Command::Goto(_) => {
            let offset = reading.session.viewport().offset;
            let page = PAGE_LINES as f64;
            let target = match command {
                Command::Down => offset + page,
                Command::Up => offset - page,
                Command::Goto(line) => line,
                _ => offset,
            };
            reading.session.on_user_scroll(target);
            print_page(reading);
        }
        Command::Tap => {
            reading.session.on_tap(false);
            println!("控件: {}", if reading.session.controls_visible() { "显示" } else { "隐藏" });
        }
        Command::Auto => auto_scroll(reading, input).await?,
        Command::Explain(text) => explain(reading, &text, assistant, background),
        Command::Close => {
            if *reading.session.explanation() == Explanation::Hidden {
                println!("没有打开的解释。");
            } else {
                reading.session.dismiss_explanation();
                println!("解释已关闭。");
            }
        }
        _ => {}
    }
    Ok(false)
}

/// 采用后台加载结果并显示，过期结果被忽略时返回 false
fn on_loaded(reading: &mut Option<Reading>, loaded: Loaded) -> bool {
    let Some(current) = reading.as_mut() else {
        return false;
    };
    let Loaded {
        ticket,
        result,
        elapsed,
    } = loaded;
    if !current.session.finish_load(ticket, result) {
        return false;
    }
    utils::display_elapsed_time("加载", elapsed);

    current.layout();
    match current.session.chapter() {
        ChapterState::Failed(e) => {
            println!("\n⚠️ {}", e);
            if e.is_retryable() {
                println!("输入 retry 重试。");
            }
        }
        _ => {
            println!("\n耗时: {}", utils::format_elapsed(elapsed));
            print_page(current);
        }
    }
    true
}

fn on_explained(reading: &mut Option<Reading>, answer: String) -> bool {
    let Some(current) = reading.as_mut() else {
        debug!("阅读页已关闭，丢弃解释");
        return false;
    };
    current.session.finish_explain(answer);
    match current.session.explanation() {
        Explanation::Ready(answer) => {
            println!("\n┌─ AI 解释 ─\n{}\n└─ 输入 close 关闭", answer);
            true
        }
        _ => false,
    }
}

/// 自动滚动直到回车、到达底部或被阻塞
async fn auto_scroll(reading: &mut Reading, input: &mut Input) -> Result<()> {
    if !reading.session.auto_scroll_enabled() {
        println!("自动滚动未开启，输入 autoscroll on 开启。");
        return Ok(());
    }

    reading.session.set_controls_visible(false);
    let Some(token) = reading.session.auto_scroll_token() else {
        println!("当前无法自动滚动。");
        reading.session.set_controls_visible(true);
        return Ok(());
    };
    println!("自动滚动中 (速度 {})，按回车停止。", reading.session.auto_scroll_speed());

    let mut ticker = tokio::time::interval(FRAME);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut shown_bottom = (reading.top_line() + PAGE_LINES).min(reading.lines.len());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let running = reading.session.frame(token);
                let bottom = (reading.top_line() + PAGE_LINES).min(reading.lines.len());
                for line in &reading.lines[shown_bottom.min(bottom)..bottom] {
                    println!("{}", line);
                }
                shown_bottom = shown_bottom.max(bottom);
                if !running {
                    println!("—— 本章结束，输入 n 进入下一章 ——");
                    break;
                }
            }
            line = input.next_line() => {
                line?;
                break;
            }
        }
    }

    reading.session.set_controls_visible(true);
    Ok(())
}

fn explain(reading: &mut Reading, text: &str, assistant: &Assistant, background: &mut Background) {
    let Some((row, col)) = reading
        .lines
        .iter()
        .enumerate()
        .find_map(|(row, line)| line.find(text).map(|byte| (row, line[..byte].chars().count())))
    else {
        println!("本章中没有找到这段文字。");
        return;
    };

    let container = Rect::new(0.0, 0.0, LINE_WIDTH as f64, reading.lines.len() as f64);
    let selection = TextSelection {
        text: text.to_string(),
        bounds: Rect::new(col as f64, row as f64, text.chars().count() as f64, 1.0),
    };
    reading.session.on_selection_change(Some(selection), &container);
    if reading.session.anchor().is_none() {
        println!("选区无效。");
        return;
    }

    if let Some(request) = reading.session.begin_explain() {
        println!("正在解释，可继续阅读...");
        background.explain(assistant, request);
    }
}

async fn change_settings<F>(
    session: &mut Session,
    reading: &mut Option<Reading>,
    change: F,
) -> Result<novel_reader::model::ReaderSettings>
where
    F: FnOnce(&mut novel_reader::model::ReaderSettings),
{
    if let Some(current) = reading.as_mut() {
        current.session.set_settings_open(true);
    }
    let result = session.update_settings(change).await;
    if let Some(current) = reading.as_mut() {
        current.session.apply_settings(session.settings());
        current.session.set_settings_open(false);
    }
    Ok(result?)
}

/// 把存储推送的变化同步到阅读页；小说被删除时关闭阅读页并返回 true
fn sync_reader(session: &mut Session, reading: &mut Option<Reading>) -> bool {
    session.refresh();
    let Some(current) = reading.as_mut() else {
        return false;
    };
    match session.novel(&current.session.novel().id) {
        Some(novel) => {
            current.session.sync_novel(novel);
            false
        }
        None => {
            println!("\n该小说已被删除，返回书架。");
            *reading = None;
            true
        }
    }
}

async fn sign_in(app: &mut App, input: &mut Input) -> Result<bool> {
    loop {
        match app.sign_in().await {
            Ok(()) => {
                if let Some(session) = app.session() {
                    println!("欢迎，{}", session.identity().uid);
                }
                return Ok(true);
            }
            Err(e) => {
                error!("登录失败: {}", e);
                println!("⛔ {}\n输入 r 重试，q 退出", e);
                prompt("登录")?;
                match input.next_line().await? {
                    Some(line) if line.trim().eq_ignore_ascii_case("r") => continue,
                    _ => return Ok(false),
                }
            }
        }
    }
}

fn resolve_novel(session: &Session, key: &str) -> Option<String> {
    let novels = session.novels();
    key.parse::<usize>()
        .ok()
        .filter(|&index| index >= 1 && index <= novels.len())
        .map(|index| novels[index - 1].id.clone())
        .or_else(|| session.novel(key).map(|n| n.id.clone()))
}

fn print_library(session: &Session) {
    let novels = session.novels();
    println!("\n=== 书架 ({} 本) ===", novels.len());
    if novels.is_empty() {
        println!("书架是空的。输入 add <章节链接> 添加小说，help 查看帮助。");
    }
    for (index, novel) in novels.iter().enumerate() {
        println!(
            "{:>3}. {} · 第 {} 章",
            index + 1,
            utils::truncate(&novel.title, 40),
            novel.current_chapter
        );
    }
}

fn print_page(reading: &Reading) {
    println!("\n### {}", reading.session.heading());
    let top = reading.top_line().min(reading.lines.len());
    let bottom = (top + PAGE_LINES).min(reading.lines.len());
    for line in &reading.lines[top..bottom] {
        println!("{}", line);
    }
    println!(
        "—— 第 {} 章 · 第 {}-{} 行 / 共 {} 行 ——",
        reading.session.current_chapter(),
        top + 1,
        bottom,
        reading.lines.len()
    );
    if reading.session.controls_visible() {
        let prev = if reading.session.can_go_prev() { "p 上一章 · " } else { "" };
        println!("{}n 下一章 · d/u 翻页 · auto 自动滚动 · explain <文字> · back 返回", prev);
    }
}

fn prompt(label: &str) -> Result<()> {
    print!("{}> ", label);
    io::stdout().flush()?;
    Ok(())
}
