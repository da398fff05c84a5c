use crate::error::Result;
use crate::models::CredentialSet;
use async_trait::async_trait;
use google_gmail1::oauth2::storage::{TokenInfo, TokenStorage};
use keyring::Entry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "gfilter";
const CREDENTIALS_KEY: &str = "oauth_client";
const TOKEN_KEY: &str = "gmail_token";

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenData {
    tokens: Vec<TokenInfo>,
}

fn read_entry<T: DeserializeOwned>(key: &str) -> Result<Option<T>> {
    let entry = Entry::new(APP_NAME, key)?;
    match entry.get_password() {
        Ok(serialized) => Ok(Some(serde_json::from_str(&serialized)?)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_entry<T: Serialize>(key: &str, value: &T) -> Result<()> {
    let entry = Entry::new(APP_NAME, key)?;
    let serialized = serde_json::to_string(value)?;
    entry.set_password(&serialized)?;
    Ok(())
}

fn clear_entry(key: &str) -> Result<()> {
    let entry = Entry::new(APP_NAME, key)?;
    match entry.delete_password() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// OAuth client credentials and the session token, kept in the OS keyring.
pub struct Secrets;

impl Secrets {
    pub fn load_credentials() -> Result<Option<CredentialSet>> {
        read_entry(CREDENTIALS_KEY)
    }

    pub fn store_credentials(credentials: &CredentialSet) -> Result<()> {
        write_entry(CREDENTIALS_KEY, credentials)
    }

    pub fn has_token() -> Result<bool> {
        let data: Option<TokenData> = read_entry(TOKEN_KEY)?;
        Ok(data.is_some_and(|d| !d.tokens.is_empty()))
    }

    pub fn clear_token() -> Result<()> {
        clear_entry(TOKEN_KEY)
    }
}

/// Token storage handed to the OAuth flow. Only one token is kept; scopes are
/// ignored because every request uses the same set.
pub struct RingStorage;

#[async_trait]
impl TokenStorage for RingStorage {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> anyhow::Result<()> {
        let data = TokenData {
            tokens: vec![token],
        };
        write_entry(TOKEN_KEY, &data)?;
        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        read_entry::<TokenData>(TOKEN_KEY)
            .ok()
            .flatten()
            .and_then(|data| data.tokens.into_iter().next())
    }
}
