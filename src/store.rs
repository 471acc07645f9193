use crate::conversation::Conversation;
use crate::error::{FarmSmartError, Result};
use crate::schema::FarmInfo;
use async_trait::async_trait;
use log::{debug, error, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Inserts a new conversation; fails if the id is taken.
    async fn create(&self, conversation: &Conversation) -> Result<()>;
    async fn load(&self, id: &str) -> Result<Conversation>;
    /// Inserts or replaces.
    async fn save(&self, conversation: &Conversation) -> Result<()>;
    /// The user's conversations, most recently updated first.
    async fn list(&self, user_id: &str, include_archived: bool) -> Result<Vec<Conversation>>;
    async fn archive(&self, id: &str) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

pub fn farm_info_key(user_id: &str) -> String {
    format!("farmInfo:{}", user_id)
}

pub async fn load_farm_info(store: &dyn KeyValueStore, user_id: &str) -> Result<Option<FarmInfo>> {
    match store.get(&farm_info_key(user_id)).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn save_farm_info(store: &dyn KeyValueStore, user_id: &str, farm_info: &FarmInfo) -> Result<()> {
    let raw = serde_json::to_string(farm_info)?;
    store.set(&farm_info_key(user_id), &raw).await
}

fn sort_newest_first(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// Process-local store, used by tests and by hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create(&self, conversation: &Conversation) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&conversation.id) {
            return Err(FarmSmartError::Persistence(format!(
                "Conversation {} already exists",
                conversation.id
            )));
        }
        conversations.insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Conversation> {
        self.conversations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| FarmSmartError::ConversationNotFound(id.to_string()))
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn list(&self, user_id: &str, include_archived: bool) -> Result<Vec<Conversation>> {
        let mut found: Vec<Conversation> = self
            .conversations
            .read()
            .await
            .values()
            .filter(|c| c.user_id == user_id && (include_archived || !c.is_archived))
            .cloned()
            .collect();
        sort_newest_first(&mut found);
        Ok(found)
    }

    async fn archive(&self, id: &str) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(id)
            .ok_or_else(|| FarmSmartError::ConversationNotFound(id.to_string()))?;
        conversation.is_archived = true;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.conversations
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| FarmSmartError::ConversationNotFound(id.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

/// Stores each conversation as `conversations/<id>.json` and the key-value
/// pairs in a single `kv.json` under a data directory.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    kv_lock: Mutex<()>,
}

impl JsonFileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("conversations")).await?;
        debug!("Opened JSON store at {}", root.display());
        Ok(Self {
            root,
            kv_lock: Mutex::new(()),
        })
    }

    fn conversation_path(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(FarmSmartError::InvalidInput(format!(
                "Invalid conversation id: {:?}",
                id
            )));
        }
        Ok(self.root.join("conversations").join(format!("{}.json", id)))
    }

    fn kv_path(&self) -> PathBuf {
        self.root.join("kv.json")
    }

    async fn read_kv(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(self.kv_path()).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_conversation(&self, path: &Path, id: &str) -> Result<Conversation> {
        match fs::read_to_string(path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FarmSmartError::ConversationNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes through a sibling temp file so readers never see a partial file.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl ConversationStore for JsonFileStore {
    async fn create(&self, conversation: &Conversation) -> Result<()> {
        let path = self.conversation_path(&conversation.id)?;
        if fs::try_exists(&path).await? {
            return Err(FarmSmartError::Persistence(format!(
                "Conversation {} already exists",
                conversation.id
            )));
        }
        write_atomic(&path, &serde_json::to_string_pretty(conversation)?).await
    }

    async fn load(&self, id: &str) -> Result<Conversation> {
        let path = self.conversation_path(id)?;
        self.read_conversation(&path, id).await
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        let path = self.conversation_path(&conversation.id)?;
        write_atomic(&path, &serde_json::to_string_pretty(conversation)?).await
    }

    async fn list(&self, user_id: &str, include_archived: bool) -> Result<Vec<Conversation>> {
        let mut entries = fs::read_dir(self.root.join("conversations")).await?;
        let mut found = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path).await?;
            match serde_json::from_str::<Conversation>(&raw) {
                Ok(c) if c.user_id == user_id && (include_archived || !c.is_archived) => {
                    found.push(c)
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable conversation {}: {}", path.display(), e),
            }
        }

        sort_newest_first(&mut found);
        Ok(found)
    }

    async fn archive(&self, id: &str) -> Result<()> {
        let mut conversation = self.load(id).await?;
        conversation.is_archived = true;
        self.save(&conversation).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.conversation_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FarmSmartError::ConversationNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.kv_lock.lock().await;
        Ok(self.read_kv().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.kv_lock.lock().await;
        let mut values = self.read_kv().await?;
        values.insert(key.to_string(), value.to_string());
        write_atomic(&self.kv_path(), &serde_json::to_string_pretty(&values)?).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.kv_lock.lock().await;
        let mut values = self.read_kv().await?;
        if values.remove(key).is_some() {
            write_atomic(&self.kv_path(), &serde_json::to_string_pretty(&values)?).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    Conversation(Conversation),
    FarmInfo { user_id: String, farm_info: FarmInfo },
}

impl PendingWrite {
    fn supersedes(&self, other: &PendingWrite) -> bool {
        match (self, other) {
            (Self::Conversation(a), Self::Conversation(b)) => a.id == b.id,
            (Self::FarmInfo { user_id: a, .. }, Self::FarmInfo { user_id: b, .. }) => a == b,
            _ => false,
        }
    }

    async fn apply(&self, conversations: &dyn ConversationStore, values: &dyn KeyValueStore) -> Result<()> {
        match self {
            Self::Conversation(conversation) => conversations.save(conversation).await,
            Self::FarmInfo { user_id, farm_info } => save_farm_info(values, user_id, farm_info).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Conversation(c) => format!("conversation {}", c.id),
            Self::FarmInfo { user_id, .. } => format!("farm info for {}", user_id),
        }
    }
}

/// Writes that have not reached the store yet.
///
/// A newer snapshot of the same record replaces the queued one. Each write
/// gets one attempt plus `max_retries` retries across flushes, then it is
/// dropped with an error log.
#[derive(Debug, Default)]
pub struct PendingWrites {
    queue: Vec<(PendingWrite, u32)>,
    max_retries: u32,
}

impl PendingWrites {
    pub fn new(max_retries: u32) -> Self {
        Self {
            queue: Vec::new(),
            max_retries,
        }
    }

    pub fn push(&mut self, write: PendingWrite) {
        self.queue.retain(|(queued, _)| !write.supersedes(queued));
        self.queue.push((write, 0));
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Attempts every queued write once. Returns how many are still queued.
    pub async fn flush(&mut self, conversations: &dyn ConversationStore, values: &dyn KeyValueStore) -> usize {
        let mut remaining = Vec::new();

        for (write, failures) in std::mem::take(&mut self.queue) {
            match write.apply(conversations, values).await {
                Ok(()) => debug!("Persisted {}", write.describe()),
                Err(e) if failures < self.max_retries => {
                    warn!(
                        "Failed to persist {} (attempt {}): {}",
                        write.describe(),
                        failures + 1,
                        e
                    );
                    remaining.push((write, failures + 1));
                }
                Err(e) => error!(
                    "Giving up on {} after {} attempts: {}",
                    write.describe(),
                    failures + 1,
                    e
                ),
            }
        }

        self.queue = remaining;
        self.queue.len()
    }
}
