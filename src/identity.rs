use std::{collections::HashMap, fs, io::ErrorKind, path::PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::{
    error::SessionError,
    protocol_objects::{Activity, ActivityKind, Theme, User},
    types::{Result, THEME_KEY, USER_KEY_PREFIX},
    utils::{generate_id, handle_from_url, now_millis, random_display_name, url_with_handle},
};

/// String key-value persistence for a peer's own identity and preferences.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store for tests and ephemeral peers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .insert(String::from(key), String::from(value));
        Ok(())
    }
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{file_name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        Ok(fs::write(self.path_for(key), value)?)
    }
}

pub fn user_key(id: &str) -> String {
    format!("{USER_KEY_PREFIX}{id}")
}

/// The local peer's identity after bootstrap, plus the page URL carrying its handle.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerIdentity {
    pub user: User,
    pub page_url: String,
}

impl PeerIdentity {
    /// Rehydrates the user named by the URL fragment, or mints a new one.
    ///
    /// Every bootstrap appends a `session_created` activity and writes the
    /// user back. Storage failures degrade to a fresh, unsaved identity.
    pub fn bootstrap(store: &dyn KeyValueStore, page_url: &str) -> Self {
        let (handle, page_url) = match handle_from_url(page_url) {
            Some(handle) => (handle, String::from(page_url)),
            None => {
                let handle = generate_id();
                let page_url = url_with_handle(page_url, &handle);
                (handle, page_url)
            }
        };

        let created = Activity::new(ActivityKind::SessionCreated, now_millis(), None);
        let user = match load_user(store, &handle) {
            Some(mut saved) => {
                saved.id = handle.clone();
                if saved.activities.is_empty() {
                    saved.activities.push(created.clone());
                }
                info!(target = "session.identity", peer = %handle, name = %saved.name, "rehydrated peer identity");
                saved.with_activity(created)
            }
            None => {
                let mut user = User::new(&handle, random_display_name());
                user.activities.push(created);
                info!(target = "session.identity", peer = %handle, name = %user.name, "minted peer identity");
                user
            }
        };

        save_user(store, &user);

        Self { user, page_url }
    }
}

fn load_user(store: &dyn KeyValueStore, id: &str) -> Option<User> {
    let raw = match store.get(&user_key(id)) {
        Ok(raw) => raw?,
        Err(error) => {
            warn!(target = "session.identity", error = %error, "failed to read saved user");
            return None;
        }
    };

    match serde_json::from_str::<User>(&raw) {
        Ok(user) => Some(user),
        Err(error) => {
            debug!(target = "session.identity", error = %error, "discarding unparsable saved user");
            None
        }
    }
}

pub(crate) fn save_user(store: &dyn KeyValueStore, user: &User) {
    let result = serde_json::to_string(user)
        .map_err(SessionError::from)
        .and_then(|raw| store.put(&user_key(&user.id), &raw));

    if let Err(error) = result {
        warn!(target = "session.identity", peer = %user.id, error = %error, "failed to persist user");
    }
}

pub(crate) fn load_theme(store: &dyn KeyValueStore) -> Theme {
    match store.get(THEME_KEY) {
        Ok(Some(raw)) => raw.parse().unwrap_or_default(),
        Ok(None) => Theme::default(),
        Err(error) => {
            warn!(target = "session.identity", error = %error, "failed to read saved theme");
            Theme::default()
        }
    }
}

pub(crate) fn save_theme(store: &dyn KeyValueStore, theme: Theme) {
    if let Err(error) = store.put(THEME_KEY, &theme.to_string()) {
        warn!(target = "session.identity", error = %error, "failed to persist theme");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "http://localhost:5173/";

    #[test]
    fn first_visit_mints_handle_and_saves_user() {
        let store = MemoryStore::new();
        let identity = PeerIdentity::bootstrap(&store, PAGE);

        let handle = handle_from_url(&identity.page_url).expect("handle written to fragment");
        assert_eq!(handle, identity.user.id);
        assert_eq!(identity.user.activities.len(), 1);
        assert_eq!(
            identity.user.activities[0].kind,
            ActivityKind::SessionCreated
        );
        assert!(store.get(&user_key(&handle)).unwrap().is_some());
    }

    #[test]
    fn reload_with_handle_rehydrates_and_appends_session_created() {
        let store = MemoryStore::new();
        let first = PeerIdentity::bootstrap(&store, PAGE);
        let second = PeerIdentity::bootstrap(&store, &first.page_url);

        assert_eq!(second.user.id, first.user.id);
        assert_eq!(second.user.name, first.user.name);
        assert_eq!(second.user.activities.len(), 2);
        assert_eq!(second.page_url, first.page_url);
    }

    #[test]
    fn saved_user_without_activities_gets_a_default_log() {
        let store = MemoryStore::new();
        store
            .put(&user_key("abc"), r#"{"id":"abc","name":"Quinn"}"#)
            .unwrap();

        let identity = PeerIdentity::bootstrap(&store, "http://localhost/#abc");
        assert_eq!(identity.user.name, "Quinn");
        assert_eq!(identity.user.activities.len(), 2);
    }

    #[test]
    fn unparsable_saved_user_is_replaced() {
        let store = MemoryStore::new();
        store.put(&user_key("abc"), "{not json").unwrap();

        let identity = PeerIdentity::bootstrap(&store, "http://localhost/#abc");
        assert_eq!(identity.user.id, "abc");
        assert_eq!(identity.user.activities.len(), 1);
    }

    #[test]
    fn theme_round_trips_through_store() {
        let store = MemoryStore::new();
        assert_eq!(load_theme(&store), Theme::Light);
        save_theme(&store, Theme::Dark);
        assert_eq!(store.get(THEME_KEY).unwrap().as_deref(), Some("dark"));
        assert_eq!(load_theme(&store), Theme::Dark);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get("session-theme").unwrap(), None);
        store.put("session-theme", "dark").unwrap();

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get("session-theme").unwrap().as_deref(),
            Some("dark")
        );
    }
}
