use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::database::prefs::PrefsStore;
use crate::error::{Error, Result};
use crate::models::user::User;
use crate::utils::crypto;

pub const USERS_KEY: &str = "users_list_encrypted_v1";
pub const ENCRYPTION_KEY_KEY: &str = "user_manager_encryption_key_v1";
pub const CORRUPT_BACKUP_KEY: &str = "users_list_corrupt_backup";

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub encryption: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { encryption: true }
    }
}

/// Persistent list of check-in accounts.
///
/// Every mutation rewrites the whole collection. The in-memory copy mirrors
/// the last collection loaded or saved through this instance and is only
/// dropped by [`CredentialStore::invalidate`].
#[derive(Clone)]
pub struct CredentialStore {
    prefs: PrefsStore,
    key: Option<Arc<str>>,
    encrypt_writes: bool,
    cache: Arc<Mutex<Option<Vec<User>>>>,
}

impl CredentialStore {
    /// An existing key is always loaded so a list written in either mode
    /// stays readable. `settings.encryption` only picks how saves are written.
    pub async fn open(prefs: PrefsStore, settings: StoreSettings) -> Result<Self> {
        let key = match prefs.get_string(ENCRYPTION_KEY_KEY).await? {
            Some(existing) => Some(existing),
            None if settings.encryption => {
                let generated = crypto::generate_key();
                prefs.put_string(ENCRYPTION_KEY_KEY, &generated).await?;
                tracing::info!("Generated a new credential store encryption key");
                Some(generated)
            }
            None => None,
        };

        Ok(Self {
            prefs,
            key: key.map(Arc::from),
            encrypt_writes: settings.encryption,
            cache: Arc::new(Mutex::new(None)),
        })
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        let mut cache = self.cache.lock().await;
        Ok(self.loaded(&mut cache).await?.clone())
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.list().await?.len())
    }

    pub async fn active_count(&self) -> Result<usize> {
        Ok(self.list().await?.iter().filter(|u| u.is_active).count())
    }

    /// Ordered snapshot of the accounts an automation run should log in.
    pub async fn active_users(&self) -> Result<Vec<User>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|u| u.is_active)
            .collect())
    }

    pub async fn add(&self, name: &str, user_id: &str, password: &str) -> Result<bool> {
        self.mutate(|users| {
            if users.iter().any(|u| u.user_id == user_id) {
                return false;
            }
            users.push(User::new(name, user_id, password));
            true
        })
        .await
    }

    /// Replaces name and, when given, password. `id`, `user_id` and
    /// `is_active` are kept.
    pub async fn update(&self, user_id: &str, name: &str, password: Option<&str>) -> Result<bool> {
        self.mutate(|users| match users.iter_mut().find(|u| u.user_id == user_id) {
            Some(user) => {
                user.name = name.to_string();
                if let Some(password) = password {
                    user.password = password.to_string();
                }
                true
            }
            None => false,
        })
        .await
    }

    pub async fn delete(&self, user_id: &str) -> Result<bool> {
        self.mutate(|users| {
            let before = users.len();
            users.retain(|u| u.user_id != user_id);
            users.len() != before
        })
        .await
    }

    pub async fn toggle_active(&self, user_id: &str) -> Result<bool> {
        self.mutate(|users| match users.iter_mut().find(|u| u.user_id == user_id) {
            Some(user) => {
                user.is_active = !user.is_active;
                true
            }
            None => false,
        })
        .await
    }

    pub async fn clear_all(&self) -> Result<()> {
        let mut cache = self.cache.lock().await;
        self.persist(&[]).await?;
        *cache = Some(Vec::new());
        Ok(())
    }

    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    pub async fn refresh(&self) -> Result<Vec<User>> {
        self.invalidate().await;
        self.list().await
    }

    async fn mutate<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<User>) -> bool,
    {
        let mut cache = self.cache.lock().await;
        let mut users = self.loaded(&mut cache).await?.clone();
        if !f(&mut users) {
            return Ok(false);
        }
        self.persist(&users).await?;
        *cache = Some(users);
        Ok(true)
    }

    async fn loaded<'a>(
        &self,
        cache: &'a mut MutexGuard<'_, Option<Vec<User>>>,
    ) -> Result<&'a Vec<User>> {
        if cache.is_none() {
            let users = self.load().await?;
            **cache = Some(users);
        }
        Ok(cache.get_or_insert_with(Vec::new))
    }

    async fn load(&self) -> Result<Vec<User>> {
        let Some(raw) = self.prefs.get_string(USERS_KEY).await? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        match self.decode(&raw) {
            Ok(users) => Ok(unique_by_user_id(users)),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Stored user list is unreadable; keeping a backup copy and starting empty"
                );
                self.prefs.put_string(CORRUPT_BACKUP_KEY, &raw).await?;
                self.persist(&[]).await?;
                Ok(Vec::new())
            }
        }
    }

    fn decode(&self, raw: &str) -> Result<Vec<User>> {
        let parse = |json: &str| -> Result<Vec<User>> {
            serde_json::from_str(json)
                .map_err(|e| Error::Storage(format!("stored user list is malformed: {}", e)))
        };
        match &self.key {
            Some(key) => match crypto::decrypt(raw, key) {
                Ok(json) => parse(&json),
                // A list written while encryption was off is still plain JSON.
                Err(e) => parse(raw).map_err(|_| e),
            },
            None => parse(raw),
        }
    }

    async fn persist(&self, users: &[User]) -> Result<()> {
        let json = serde_json::to_string(users)
            .map_err(|e| Error::Storage(format!("failed to serialize user list: {}", e)))?;
        let stored = match (&self.key, self.encrypt_writes) {
            (Some(key), true) => crypto::encrypt(&json, key)?,
            _ => json,
        };
        self.prefs.put_string(USERS_KEY, &stored).await
    }
}

fn unique_by_user_id(users: Vec<User>) -> Vec<User> {
    let mut seen = HashSet::new();
    users
        .into_iter()
        .filter(|u| seen.insert(u.user_id.clone()))
        .collect()
}
