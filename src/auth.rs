use async_trait::async_trait;
use rand::Rng;
use tokio::sync::watch;
use tracing::info;

use crate::error::{ReaderError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub anonymous: bool,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// 当前身份，之后每次登录、登出都会更新
    fn on_state_change(&self) -> watch::Receiver<Option<Identity>>;

    async fn sign_in(&self) -> Result<Identity>;

    async fn sign_out(&self) -> Result<()>;
}

/// 本地身份：配置了 profile 时使用固定身份，否则生成匿名身份
pub struct LocalAuth {
    profile: Option<String>,
    state: watch::Sender<Option<Identity>>,
}

impl LocalAuth {
    pub fn new(profile: Option<String>) -> Self {
        let (state, _) = watch::channel(None);
        Self { profile, state }
    }

    pub fn current(&self) -> Option<Identity> {
        self.state.borrow().clone()
    }

    fn resolve_identity(&self) -> Result<Identity> {
        match &self.profile {
            Some(profile) => {
                let uid = profile.trim();
                if uid.is_empty() {
                    return Err(ReaderError::Auth("configured profile is blank".to_string()));
                }
                if uid.contains('/') {
                    return Err(ReaderError::Auth(format!(
                        "profile '{}' must not contain '/'",
                        uid
                    )));
                }
                Ok(Identity {
                    uid: uid.to_string(),
                    anonymous: false,
                })
            }
            None => Ok(Identity {
                uid: format!("anon-{:016x}", rand::rng().random::<u64>()),
                anonymous: true,
            }),
        }
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    fn on_state_change(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }

    async fn sign_in(&self) -> Result<Identity> {
        if let Some(identity) = self.current() {
            return Ok(identity);
        }

        let identity = self.resolve_identity()?;
        info!("已登录: {}", identity.uid);
        self.state.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(identity) = self.state.send_replace(None) {
            info!("已登出: {}", identity.uid);
        }
        Ok(())
    }
}
