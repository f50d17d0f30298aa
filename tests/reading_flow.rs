use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use novel_reader::auth::LocalAuth;
use novel_reader::error::FETCH_FAILURE_MESSAGE;
use novel_reader::fetcher::FetchStrategy;
use novel_reader::reader::{ChapterState, fetch_ticket};
use novel_reader::store::{LocalStore, StorePath, SyncStore};
use novel_reader::{App, ChapterFetcher, ReaderError};
use tokio::task::JoinSet;

const DEBOUNCE: Duration = Duration::from_millis(500);

/// 总是返回过短内容的代理
struct Stub {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl FetchStrategy for Stub {
    fn name(&self) -> &str {
        "Stub"
    }

    async fn fetch(&self, _url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("<html><body>blocked</body></html>".to_string())
    }
}

/// 模拟源站，可以切换离线
struct Site {
    pages: HashMap<String, String>,
    online: Arc<AtomicBool>,
}

#[async_trait]
impl FetchStrategy for Site {
    fn name(&self) -> &str {
        "Site"
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("Status 404 Not Found"))
    }
}

/// 某一章响应很慢的源站
struct Laggy {
    slow_url: String,
    delay: Duration,
}

#[async_trait]
impl FetchStrategy for Laggy {
    fn name(&self) -> &str {
        "Laggy"
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        if url == self.slow_url {
            tokio::time::sleep(self.delay).await;
        }
        let n = url
            .trim_end_matches(".html")
            .rsplit('_')
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| anyhow!("Status 404 Not Found"))?;
        Ok(chapter_page(n))
    }
}

fn chapter_page(n: u32) -> String {
    format!(
        r#"<html><head><title>site</title></head><body>
        <nav>menu</nav>
        <article>
          <h1 class="chapter-title"> Chapter {n}: Nightmare </h1>
          <div class="chapter-content">
            <p>Sunny opened his eyes in chapter {n}.</p>
            <script>alert(1)</script>
            <p>The Spell whispered something long enough to pass the content threshold.</p>
          </div>
        </article>
        </body></html>"#
    )
}

struct Fixture {
    fetcher: ChapterFetcher,
    stub_calls: Arc<AtomicUsize>,
    online: Arc<AtomicBool>,
}

fn fixture() -> Fixture {
    let pages = (1..=5)
        .map(|n| (format!("https://novels.example/shadow-slave_{n}.html"), chapter_page(n)))
        .collect();
    let stub_calls = Arc::new(AtomicUsize::new(0));
    let online = Arc::new(AtomicBool::new(true));
    let fetcher = ChapterFetcher::new(
        vec![
            Box::new(Stub {
                calls: stub_calls.clone(),
            }),
            Box::new(Site {
                pages,
                online: online.clone(),
            }),
        ],
        100,
    );
    Fixture {
        fetcher,
        stub_calls,
        online,
    }
}

async fn signed_in(store: Arc<LocalStore>) -> App {
    let auth = Arc::new(LocalAuth::new(Some("reader".into())));
    let mut app = App::new(auth, store, DEBOUNCE);
    app.sign_in().await.unwrap();
    app
}

#[tokio::test(start_paused = true)]
async fn read_navigate_and_persist_progress() {
    let fixture = fixture();
    let store = Arc::new(LocalStore::in_memory());
    let mut app = signed_in(store.clone()).await;
    let session = app.session_mut().unwrap();

    let novel = session
        .add_novel("https://novels.example/shadow-slave_2.html")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(novel.title, "SHADOW SLAVE");

    let mut reader = session.open_reader(&novel.id).unwrap();
    reader.load(&fixture.fetcher).await;
    let ChapterState::Ready(data) = reader.chapter() else {
        panic!("chapter should be ready: {:?}", reader.chapter());
    };
    assert_eq!(data.title, "Chapter 2: Nightmare");
    assert!(data.content.contains("chapter 2"));
    assert!(!data.content.contains("alert(1)"));
    assert_eq!(fixture.stub_calls.load(Ordering::SeqCst), 1);

    reader.next();
    reader.load(&fixture.fetcher).await;
    assert_eq!(reader.current_chapter(), 3);
    assert_eq!(reader.heading(), "Chapter 3: Nightmare");

    reader.set_layout(2000.0, 600.0);
    reader.on_user_scroll(120.0);
    reader.on_user_scroll(480.0);
    tokio::time::sleep(Duration::from_millis(600)).await;

    let stored = store
        .read(&StorePath::novel("reader", &novel.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["currentChapter"], 3);
    assert_eq!(stored["scrollPosition"], 480);

    session.refresh();
    assert_eq!(session.novel(&novel.id).unwrap().current_chapter, 3);
}

#[tokio::test(start_paused = true)]
async fn reopening_restores_scroll_of_synced_chapter() {
    let fixture = fixture();
    let store = Arc::new(LocalStore::in_memory());
    let mut app = signed_in(store).await;
    let session = app.session_mut().unwrap();
    let novel = session
        .add_novel("https://novels.example/shadow-slave_4.html")
        .await
        .unwrap()
        .unwrap();

    let mut reader = session.open_reader(&novel.id).unwrap();
    reader.load(&fixture.fetcher).await;
    reader.set_layout(2000.0, 600.0);
    reader.on_user_scroll(300.0);
    tokio::time::sleep(Duration::from_millis(600)).await;
    drop(reader);

    session.refresh();
    let mut reader = session.open_reader(&novel.id).unwrap();
    reader.load(&fixture.fetcher).await;
    reader.set_layout(2000.0, 600.0);
    assert_eq!(reader.viewport().offset, 300.0);
}

#[tokio::test(start_paused = true)]
async fn next_while_slow_fetch_pending_drops_stale_result() {
    let store = Arc::new(LocalStore::in_memory());
    let mut app = signed_in(store).await;
    let session = app.session_mut().unwrap();
    let novel = session
        .add_novel("https://novels.example/shadow-slave_2.html")
        .await
        .unwrap()
        .unwrap();
    let fetcher = Arc::new(ChapterFetcher::new(
        vec![Box::new(Laggy {
            slow_url: "https://novels.example/shadow-slave_2.html".into(),
            delay: Duration::from_secs(5),
        })],
        100,
    ));

    let mut reader = session.open_reader(&novel.id).unwrap();
    let mut loads = JoinSet::new();
    loads.spawn(fetch_ticket(fetcher.clone(), reader.begin_load()));

    // 第 2 章还在加载时翻到下一章
    let ticket = reader.next();
    assert_eq!(ticket.chapter, 3);
    assert_eq!(reader.chapter(), &ChapterState::Loading);
    loads.spawn(fetch_ticket(fetcher.clone(), ticket));

    let fresh = loads.join_next().await.unwrap().unwrap();
    assert_eq!(fresh.ticket.chapter, 3);
    assert!(reader.finish_load(fresh.ticket, fresh.result));
    assert_eq!(reader.heading(), "Chapter 3: Nightmare");

    let stale = loads.join_next().await.unwrap().unwrap();
    assert_eq!(stale.ticket.chapter, 2);
    assert!(stale.elapsed >= Duration::from_secs(5));
    assert!(stale.result.is_ok());
    assert!(!reader.finish_load(stale.ticket, stale.result));

    assert_eq!(reader.current_chapter(), 3);
    assert_eq!(reader.heading(), "Chapter 3: Nightmare");
    assert!(loads.is_empty());
}

#[tokio::test]
async fn prev_at_first_chapter_fetches_nothing() {
    let fixture = fixture();
    let store = Arc::new(LocalStore::in_memory());
    let mut app = signed_in(store).await;
    let session = app.session_mut().unwrap();
    let novel = session
        .add_novel("https://novels.example/shadow-slave_1.html")
        .await
        .unwrap()
        .unwrap();

    let mut reader = session.open_reader(&novel.id).unwrap();
    reader.load(&fixture.fetcher).await;
    let calls = fixture.stub_calls.load(Ordering::SeqCst);

    assert!(reader.prev().is_none());
    assert_eq!(reader.current_chapter(), 1);
    assert!(matches!(reader.chapter(), ChapterState::Ready(_)));
    assert_eq!(fixture.stub_calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn offline_source_fails_once_then_retry_recovers() {
    let fixture = fixture();
    let store = Arc::new(LocalStore::in_memory());
    let mut app = signed_in(store).await;
    let session = app.session_mut().unwrap();
    let novel = session
        .add_novel("https://novels.example/shadow-slave_5.html")
        .await
        .unwrap()
        .unwrap();

    fixture.online.store(false, Ordering::SeqCst);
    let mut reader = session.open_reader(&novel.id).unwrap();
    reader.load(&fixture.fetcher).await;
    match reader.chapter() {
        ChapterState::Failed(e) => {
            assert_eq!(e, &ReaderError::Fetch);
            assert_eq!(e.to_string(), FETCH_FAILURE_MESSAGE);
            assert!(e.is_retryable());
        }
        other => panic!("expected failure, got {:?}", other),
    }

    fixture.online.store(true, Ordering::SeqCst);
    assert!(reader.retry().is_some());
    reader.load(&fixture.fetcher).await;
    assert!(matches!(reader.chapter(), ChapterState::Ready(_)));
}

#[tokio::test]
async fn removing_novel_survives_sign_out_and_back_in() {
    let store = Arc::new(LocalStore::in_memory());
    let mut app = signed_in(store.clone()).await;
    let session = app.session_mut().unwrap();
    let kept = session
        .add_novel("https://novels.example/a_1.html")
        .await
        .unwrap()
        .unwrap();
    let removed = session
        .add_novel("https://novels.example/b_1.html")
        .await
        .unwrap()
        .unwrap();
    session.remove_novel(&removed.id).await.unwrap();

    app.sign_out().await.unwrap();
    assert_eq!(store.live_subscriptions(), 0);

    app.sign_in().await.unwrap();
    let ids: Vec<_> = app
        .session()
        .unwrap()
        .novels()
        .iter()
        .map(|n| n.id.clone())
        .collect();
    assert_eq!(ids, [kept.id]);
}
