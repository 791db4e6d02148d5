// src/session.rs
use std::fmt;
use std::sync::RwLock;

use log::info;

use crate::errors::LuxeError;

/// Credential for the generative model API.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Result<Self, LuxeError> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(LuxeError::Validation("API key must not be empty".to_string()));
        }
        Ok(ApiKey(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Key gate for every call to the model. Passed explicitly to whoever needs
/// it; generation code receives an [`ApiKey`] from [`SessionContext::authorize`].
#[derive(Debug, Default)]
pub struct SessionContext {
    api_key: RwLock<Option<ApiKey>>,
}

impl SessionContext {
    pub fn new(initial: Option<ApiKey>) -> Self {
        Self {
            api_key: RwLock::new(initial),
        }
    }

    pub fn check_key(&self) -> bool {
        self.api_key.read().map(|key| key.is_some()).unwrap_or(false)
    }

    pub fn set_key(&self, key: ApiKey) {
        if let Ok(mut slot) = self.api_key.write() {
            *slot = Some(key);
            info!("Session API key updated");
        }
    }

    pub fn authorize(&self) -> Result<ApiKey, LuxeError> {
        self.api_key
            .read()
            .ok()
            .and_then(|key| key.clone())
            .ok_or(LuxeError::MissingApiKey)
    }
}
