//! Access-token lookup for catalog calls.
//!
//! Tokens are written into the users table by the auth collaborator; this
//! side only reads them. An expired token is treated as absent so a refresh
//! run skips the user instead of burning API calls on guaranteed 401s.

use crate::library_store::LibraryStore;
use anyhow::{bail, Result};
use chrono::Utc;
use std::sync::Arc;

pub trait CredentialProvider: Send + Sync {
    /// A usable access token for the user, or an error when none exists.
    fn access_token(&self, user_id: &str) -> Result<String>;
}

pub struct StoreCredentialProvider {
    store: Arc<dyn LibraryStore>,
}

impl StoreCredentialProvider {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }
}

impl CredentialProvider for StoreCredentialProvider {
    fn access_token(&self, user_id: &str) -> Result<String> {
        let Some(user) = self.store.get_user(user_id)? else {
            bail!("Unknown user {}", user_id);
        };
        let Some(token) = user.access_token else {
            bail!("User {} has no access token", user_id);
        };
        if let Some(expires) = user.token_expires {
            if expires <= Utc::now().timestamp() {
                bail!("Access token for user {} expired", user_id);
            }
        }
        Ok(token)
    }
}
