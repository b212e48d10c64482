use serde::Serialize;
use serde::de::DeserializeOwned;
use spin_sdk::key_value::Store;
use std::collections::HashMap;
use std::sync::Mutex;

/// JSON-document persistence seam. Handlers run against the Spin
/// key-value store; unit tests run against [`MemoryStore`]. A store
/// that supports conditional updates would implement its
/// add-to-set-if-absent here.
pub trait DocumentStore {
    fn get_doc<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>>;
    fn put_doc<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()>;
    fn delete_doc(&self, key: &str) -> anyhow::Result<()>;
}

impl DocumentStore for Store {
    fn get_doc<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        Ok(self.get_json(key)?)
    }

    fn put_doc<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        Ok(self.set_json(key, value)?)
    }

    fn delete_doc(&self, key: &str) -> anyhow::Result<()> {
        Ok(self.delete(key)?)
    }
}

/// In-memory document store. Backs unit tests; each put replaces the
/// whole document, matching the key-value store's semantics.
pub struct MemoryStore {
    docs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            docs: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn get_doc<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let docs = self.docs.lock().expect("memory store lock");
        match docs.get(key) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    fn put_doc<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.docs
            .lock()
            .expect("memory store lock")
            .insert(key.to_string(), bytes);
        Ok(())
    }

    fn delete_doc(&self, key: &str) -> anyhow::Result<()> {
        self.docs.lock().expect("memory store lock").remove(key);
        Ok(())
    }
}
