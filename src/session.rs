use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::auth::{AuthProvider, Identity};
use crate::error::{ReaderError, Result};
use crate::library;
use crate::model::{Novel, ReaderSettings};
use crate::progress::ProgressTracker;
use crate::reader::ReaderSession;
use crate::store::{Snapshots, StorePath, SyncStore};

/// 一个已登录用户的数据视图。订阅随会话一起释放。
pub struct Session {
    identity: Identity,
    store: Arc<dyn SyncStore>,
    debounce: Duration,
    novels_rx: Snapshots,
    settings_rx: Snapshots,
    novels: Vec<Novel>,
    settings: ReaderSettings,
}

impl Session {
    #[instrument(skip_all, fields(uid = %identity.uid))]
    pub async fn open(identity: Identity, store: Arc<dyn SyncStore>, debounce: Duration) -> Self {
        let novels_rx = store.subscribe(&StorePath::novels(&identity.uid));
        let settings_rx = store.subscribe(&StorePath::settings(&identity.uid));

        let mut session = Self {
            identity,
            store,
            debounce,
            novels_rx,
            settings_rx,
            novels: Vec::new(),
            settings: ReaderSettings::default(),
        };
        session.refresh();

        // 首次访问时写入默认设置
        if session.settings_rx.borrow().is_none() {
            if let Err(e) = session.save_settings(&ReaderSettings::default()).await {
                warn!("初始化设置失败: {}", e);
            }
            session.refresh();
        }

        info!("会话已打开: {} 本小说", session.novels.len());
        session
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn novels(&self) -> &[Novel] {
        &self.novels
    }

    pub fn novel(&self, id: &str) -> Option<&Novel> {
        self.novels.iter().find(|n| n.id == id)
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn search(&self, query: &str) -> Vec<&Novel> {
        library::search(&self.novels, query)
    }

    /// 读取最新快照。解析失败时保留上一次的缓存。
    pub fn refresh(&mut self) {
        let novels_doc = self.novels_rx.borrow_and_update().clone();
        match library::decode_novels(novels_doc.as_ref()) {
            Ok(novels) => self.novels = novels,
            Err(e) => warn!("小说列表同步失败，保留缓存: {}", e),
        }

        let settings_doc = self.settings_rx.borrow_and_update().clone();
        if let Some(doc) = settings_doc {
            self.settings = ReaderSettings::merged(&doc);
        }
    }

    /// 等待任一订阅路径发生变化，并刷新缓存
    pub async fn changed(&mut self) -> Result<()> {
        let closed = tokio::select! {
            r = self.novels_rx.changed() => r.is_err(),
            r = self.settings_rx.changed() => r.is_err(),
        };
        if closed {
            return Err(ReaderError::Sync("存储订阅已关闭".to_string()));
        }
        self.refresh();
        Ok(())
    }

    /// 添加小说，空链接不写入并返回 None
    pub async fn add_novel(&mut self, url: &str) -> Result<Option<Novel>> {
        let Some(novel) = library::new_novel(url, Utc::now().timestamp_millis(), &self.novels)
        else {
            return Ok(None);
        };

        let doc = serde_json::to_value(&novel).map_err(|e| ReaderError::Sync(e.to_string()))?;
        self.store
            .write(&StorePath::novel(&self.identity.uid, &novel.id), doc)
            .await?;
        info!("已添加: {} ({})", novel.title, novel.base_url_pattern);
        self.refresh();
        Ok(Some(novel))
    }

    pub async fn remove_novel(&mut self, id: &str) -> Result<bool> {
        if self.novel(id).is_none() {
            return Ok(false);
        }
        self.store
            .write(&StorePath::novel(&self.identity.uid, id), Value::Null)
            .await?;
        info!("已删除: {}", id);
        self.refresh();
        Ok(true)
    }

    pub async fn save_settings(&mut self, settings: &ReaderSettings) -> Result<()> {
        let doc = serde_json::to_value(settings.clone().clamped())
            .map_err(|e| ReaderError::Sync(e.to_string()))?;
        self.store
            .write(&StorePath::settings(&self.identity.uid), doc)
            .await?;
        self.refresh();
        Ok(())
    }

    /// 在当前设置上修改并保存
    pub async fn update_settings<F>(&mut self, change: F) -> Result<ReaderSettings>
    where
        F: FnOnce(&mut ReaderSettings),
    {
        let mut settings = self.settings.clone();
        change(&mut settings);
        self.save_settings(&settings).await?;
        Ok(self.settings.clone())
    }

    pub fn progress_tracker(&self) -> ProgressTracker {
        ProgressTracker::new(self.store.clone(), self.identity.uid.clone(), self.debounce)
    }

    pub fn open_reader(&self, novel_id: &str) -> Option<ReaderSession> {
        let novel = self.novel(novel_id)?.clone();
        Some(ReaderSession::new(novel, &self.settings, self.progress_tracker()))
    }
}

/// 顶层应用状态：身份变化时先拆除旧会话，再为新身份打开会话
pub struct App {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn SyncStore>,
    debounce: Duration,
    auth_rx: watch::Receiver<Option<Identity>>,
    session: Option<Session>,
}

impl App {
    pub fn new(auth: Arc<dyn AuthProvider>, store: Arc<dyn SyncStore>, debounce: Duration) -> Self {
        let auth_rx = auth.on_state_change();
        Self {
            auth,
            store,
            debounce,
            auth_rx,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub async fn sign_in(&mut self) -> Result<()> {
        self.auth.sign_in().await?;
        self.handle_auth_change().await;
        Ok(())
    }

    pub async fn sign_out(&mut self) -> Result<()> {
        self.auth.sign_out().await?;
        self.handle_auth_change().await;
        Ok(())
    }

    /// 按最新身份重建会话，身份未变时什么也不做
    pub async fn handle_auth_change(&mut self) {
        let identity = self.auth_rx.borrow_and_update().clone();
        let current = self.session.as_ref().map(|s| s.identity());
        if current == identity.as_ref() {
            return;
        }

        if let Some(old) = self.session.take() {
            info!("关闭会话: {}", old.identity().uid);
        }
        if let Some(identity) = identity {
            self.session =
                Some(Session::open(identity, self.store.clone(), self.debounce).await);
        }
    }
}
