// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory persistence for messages and their index tags.
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dwn_core::Cid;

use crate::traits::{filter_matches, Filter, IndexTags, MessageStore, TagValue};

type Tenant = String;

/// An in-memory store for messages, indexed by tenant and CID.
#[derive(Debug)]
pub struct InnerMemoryStore<M> {
    messages: HashMap<(Tenant, Cid), (M, IndexTags)>,
}

/// An in-memory [`MessageStore`] implementation.
///
/// `MemoryStore` supports usage in asynchronous and multi-threaded contexts
/// by wrapping an `InnerMemoryStore` with an `RwLock` and `Arc`. Convenience
/// methods are provided to obtain a read- or write-lock on the underlying
/// store.
#[derive(Clone, Debug)]
pub struct MemoryStore<M> {
    inner: Arc<RwLock<InnerMemoryStore<M>>>,
}

impl<M> MemoryStore<M> {
    /// Creates a new in-memory store.
    pub fn new() -> Self {
        let inner = InnerMemoryStore {
            messages: HashMap::new(),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Obtains a read-lock on the store.
    pub fn read_store(&self) -> RwLockReadGuard<'_, InnerMemoryStore<M>> {
        self.inner
            .read()
            .expect("acquire shared read access on store")
    }

    /// Obtains a write-lock on the store.
    pub fn write_store(&self) -> RwLockWriteGuard<'_, InnerMemoryStore<M>> {
        self.inner
            .write()
            .expect("acquire exclusive write access on store")
    }
}

impl<M> Default for MemoryStore<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> MessageStore<M> for MemoryStore<M>
where
    M: Clone + Send + Sync,
{
    type Error = Infallible;

    async fn open(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn put(
        &mut self,
        tenant: &str,
        cid: &Cid,
        message: &M,
        tags: IndexTags,
    ) -> Result<bool, Self::Error> {
        let mut store = self.write_store();
        let key = (tenant.to_string(), *cid);

        if store.messages.contains_key(&key) {
            return Ok(false);
        }

        store.messages.insert(key, (message.clone(), tags));
        Ok(true)
    }

    async fn get(&self, tenant: &str, cid: &Cid) -> Result<Option<M>, Self::Error> {
        let store = self.read_store();
        let entry = store.messages.get(&(tenant.to_string(), *cid));
        Ok(entry.map(|(message, _)| message.clone()))
    }

    async fn query(&self, tenant: &str, filter: &Filter) -> Result<Vec<(Cid, M)>, Self::Error> {
        let store = self.read_store();

        let mut entries: Vec<(Cid, M)> = store
            .messages
            .iter()
            .filter(|((entry_tenant, _), (_, tags))| {
                entry_tenant == tenant && filter_matches(tags, filter)
            })
            .map(|((_, cid), (message, _))| (*cid, message.clone()))
            .collect();

        entries.sort_by_key(|(cid, _)| cid.to_text());
        Ok(entries)
    }

    async fn delete(&mut self, tenant: &str, cid: &Cid) -> Result<bool, Self::Error> {
        let mut store = self.write_store();
        Ok(store.messages.remove(&(tenant.to_string(), *cid)).is_some())
    }

    async fn set_tag(
        &mut self,
        tenant: &str,
        cid: &Cid,
        tag: &str,
        value: TagValue,
    ) -> Result<bool, Self::Error> {
        let mut store = self.write_store();

        match store.messages.get_mut(&(tenant.to_string(), *cid)) {
            Some((_, tags)) => {
                tags.insert(tag.to_string(), value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear(&mut self) -> Result<(), Self::Error> {
        let mut store = self.write_store();
        store.messages.clear();
        Ok(())
    }
}
