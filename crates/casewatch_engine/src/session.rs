use std::sync::{PoisonError, RwLock};

/// Access to the current bearer token. Refreshing it is the provider's job.
pub trait SessionProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Session holding a token set by the caller.
#[derive(Debug, Default)]
pub struct StaticSession {
    token: RwLock<Option<String>>,
}

impl StaticSession {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token.filter(|token| !token.trim().is_empty())),
        }
    }

    pub fn set_token(&self, token: Option<String>) {
        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *slot = token.filter(|token| !token.trim().is_empty());
    }
}

impl SessionProvider for StaticSession {
    fn access_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
