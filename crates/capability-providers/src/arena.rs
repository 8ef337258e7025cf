//! Record Arena
//!
//! Id-keyed storage for provider records. Ids are generated here
//! (`<PREFIX>-0001`, ...) and the map never leaves its provider; writers hold
//! the lock for the whole mutation.

use std::collections::BTreeMap;

use tokio::sync::RwLock;

struct Slots<T> {
    next: u32,
    records: BTreeMap<String, T>,
}

impl<T> Slots<T> {
    fn allocate(&mut self, prefix: &str) -> String {
        self.next += 1;
        format!("{prefix}-{:04}", self.next)
    }
}

pub(crate) struct Arena<T> {
    prefix: &'static str,
    slots: RwLock<Slots<T>>,
}

impl<T: Clone> Arena<T> {
    pub(crate) fn new(prefix: &'static str) -> Self {
        Self::seeded(prefix, Vec::<fn(String) -> T>::new())
    }

    /// Build with initial records, each constructed from its generated id
    pub(crate) fn seeded<F>(prefix: &'static str, seeds: impl IntoIterator<Item = F>) -> Self
    where
        F: FnOnce(String) -> T,
    {
        let mut slots = Slots {
            next: 0,
            records: BTreeMap::new(),
        };
        for build in seeds {
            let id = slots.allocate(prefix);
            let record = build(id.clone());
            slots.records.insert(id, record);
        }
        Self {
            prefix,
            slots: RwLock::new(slots),
        }
    }

    /// Ids are matched case-insensitively
    pub(crate) fn normalize(id: &str) -> String {
        id.trim().to_uppercase()
    }

    pub(crate) async fn insert_with(&self, build: impl FnOnce(String) -> T) -> T {
        let mut slots = self.slots.write().await;
        let id = slots.allocate(self.prefix);
        let record = build(id.clone());
        slots.records.insert(id, record.clone());
        record
    }

    pub(crate) async fn get(&self, id: &str) -> Option<T> {
        self.slots.read().await.records.get(&Self::normalize(id)).cloned()
    }

    /// Apply `change` in place; `None` when the id is unknown
    pub(crate) async fn update<E>(
        &self,
        id: &str,
        change: impl FnOnce(&mut T) -> Result<(), E>,
    ) -> Option<Result<T, E>> {
        let mut slots = self.slots.write().await;
        let record = slots.records.get_mut(&Self::normalize(id))?;
        Some(change(record).map(|()| record.clone()))
    }

    /// Records matching `keep`, in id order
    pub(crate) async fn filter(&self, keep: impl Fn(&T) -> bool) -> Vec<T> {
        self.slots
            .read()
            .await
            .records
            .values()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }
}
