//! A narrow fast key/value capability, grounded on the teacher's
//! `CacheState`/`GroupCache` (`moka::future::Cache` + a custom `Expiry`) but
//! reshaped around the primitives spec §9's "Global Redis client as
//! singleton" design note asks for: hash ops, set ops, a scripted atomic
//! read-modify-write, TTL, and prefix scan. `scc::HashMap::entry_async`
//! supplies the per-key exclusivity moka's plain cache does not.
use scc::HashMap as ConcurrentMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum FastKvError {
    #[error("value at key was not a hash entry")]
    WrongShape,
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

pub type FastKvResult<T> = Result<T, FastKvError>;

#[derive(Debug, Clone)]
enum SlotData {
    Hash(Vec<u8>),
    Set(BTreeSet<String>),
    List(VecDeque<Vec<u8>>),
}

#[derive(Debug, Clone)]
struct Slot {
    data: SlotData,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Capability surface every component depending on fast-store state programs
/// against; `MokaFastKv` is the only implementation (production and tests
/// alike, per spec §9's in-memory-double design note).
pub trait FastKv: Send + Sync {
    fn hash_get<T>(&self, key: &str) -> impl Future<Output = FastKvResult<Option<T>>> + Send
    where
        T: DeserializeOwned + Send;

    fn hash_set<T>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> impl Future<Output = FastKvResult<()>> + Send
    where
        T: Serialize + Sync;

    /// Single-actor scripted update: `f` observes the current value (if any,
    /// and still live) and returns the next value plus an arbitrary result.
    /// The whole read-modify-write happens under one `scc` bucket lock.
    fn hash_update<T, F, R>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        f: F,
    ) -> impl Future<Output = FastKvResult<R>> + Send
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce(Option<T>) -> (Option<T>, R) + Send,
        R: Send;

    fn delete(&self, key: &str) -> impl Future<Output = bool> + Send;

    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = ()> + Send;

    /// Atomically adds `member` to the set at `key`; returns whether it was
    /// newly added. Touches the set's TTL if `ttl` is given.
    fn set_add(
        &self,
        key: &str,
        member: impl Into<String> + Send,
        ttl: Option<Duration>,
    ) -> impl Future<Output = bool> + Send;

    fn set_remove(&self, key: &str, member: &str) -> impl Future<Output = bool> + Send;

    fn set_contains(&self, key: &str, member: &str) -> impl Future<Output = bool> + Send;

    fn set_members(&self, key: &str) -> impl Future<Output = Vec<String>> + Send;

    fn set_len(&self, key: &str) -> impl Future<Output = usize> + Send;

    /// Pushes `value` to the front of a capped list, trimming to `cap`.
    fn list_push_capped<T>(
        &self,
        key: &str,
        value: &T,
        cap: usize,
        ttl: Duration,
    ) -> impl Future<Output = FastKvResult<()>> + Send
    where
        T: Serialize + Sync;

    fn list_items<T>(&self, key: &str) -> impl Future<Output = FastKvResult<Vec<T>>> + Send
    where
        T: DeserializeOwned + Send;

    /// Linear scan of live keys starting with `prefix`. Intended for
    /// maintenance tasks (component I), not hot paths.
    fn scan_prefix(&self, prefix: &str) -> impl Future<Output = Vec<String>> + Send;
}

#[derive(Clone, Default)]
pub struct MokaFastKv {
    inner: Arc<ConcurrentMap<String, Slot>>,
}

impl MokaFastKv {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ConcurrentMap::new()),
        }
    }

    /// Drops every entry whose TTL has elapsed. Called by the background
    /// cleanup task, not on the request path.
    pub async fn sweep_expired(&self) {
        let now = Instant::now();
        self.inner.retain_async(|_, v| v.is_live(now)).await;
    }
}

impl FastKv for MokaFastKv {
    async fn hash_get<T>(&self, key: &str) -> FastKvResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let now = Instant::now();
        match self.inner.get_async(key).await {
            Some(entry) if entry.is_live(now) => match &entry.data {
                SlotData::Hash(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
                _ => Err(FastKvError::WrongShape),
            },
            _ => Ok(None),
        }
    }

    async fn hash_set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> FastKvResult<()>
    where
        T: Serialize + Sync,
    {
        let bytes = serde_json::to_vec(value)?;
        let slot = Slot {
            data: SlotData::Hash(bytes),
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        match self.inner.entry_async(key.to_owned()).await {
            scc::hash_map::Entry::Occupied(mut o) => *o.get_mut() = slot,
            scc::hash_map::Entry::Vacant(v) => {
                v.insert_entry(slot);
            }
        }
        Ok(())
    }

    async fn hash_update<T, F, R>(&self, key: &str, ttl: Option<Duration>, f: F) -> FastKvResult<R>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce(Option<T>) -> (Option<T>, R) + Send,
        R: Send,
    {
        let now = Instant::now();
        let entry = self.inner.entry_async(key.to_owned()).await;
        let current = match &entry {
            scc::hash_map::Entry::Occupied(o) if o.get().is_live(now) => match &o.get().data {
                SlotData::Hash(bytes) => Some(serde_json::from_slice::<T>(bytes)?),
                _ => return Err(FastKvError::WrongShape),
            },
            _ => None,
        };
        let (next, result) = f(current);
        match next {
            Some(v) => {
                let bytes = serde_json::to_vec(&v)?;
                let slot = Slot {
                    data: SlotData::Hash(bytes),
                    expires_at: ttl.map(|d| now + d),
                };
                match entry {
                    scc::hash_map::Entry::Occupied(mut o) => *o.get_mut() = slot,
                    scc::hash_map::Entry::Vacant(v) => {
                        v.insert_entry(slot);
                    }
                }
            }
            None => {
                if let scc::hash_map::Entry::Occupied(o) = entry {
                    o.remove();
                }
            }
        }
        Ok(result)
    }

    async fn delete(&self, key: &str) -> bool {
        self.inner.remove_async(key).await.is_some()
    }

    async fn expire(&self, key: &str, ttl: Duration) {
        if let Some(mut entry) = self.inner.get_async(key).await {
            entry.expires_at = Some(Instant::now() + ttl);
        }
    }

    async fn set_add(&self, key: &str, member: impl Into<String> + Send, ttl: Option<Duration>) -> bool {
        let member = member.into();
        let now = Instant::now();
        let entry = self.inner.entry_async(key.to_owned()).await;
        match entry {
            scc::hash_map::Entry::Occupied(mut o) => {
                if !o.get().is_live(now) {
                    let mut set = BTreeSet::new();
                    let added = set.insert(member);
                    o.get_mut().data = SlotData::Set(set);
                    o.get_mut().expires_at = ttl.map(|d| now + d);
                    return added;
                }
                match &mut o.get_mut().data {
                    SlotData::Set(set) => {
                        let added = set.insert(member);
                        if ttl.is_some() {
                            o.get_mut().expires_at = ttl.map(|d| now + d);
                        }
                        added
                    }
                    _ => false,
                }
            }
            scc::hash_map::Entry::Vacant(v) => {
                let mut set = BTreeSet::new();
                set.insert(member);
                v.insert_entry(Slot {
                    data: SlotData::Set(set),
                    expires_at: ttl.map(|d| now + d),
                });
                true
            }
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> bool {
        if let Some(mut entry) = self.inner.get_async(key).await
            && let SlotData::Set(set) = &mut entry.data
        {
            return set.remove(member);
        }
        false
    }

    async fn set_contains(&self, key: &str, member: &str) -> bool {
        let now = Instant::now();
        match self.inner.get_async(key).await {
            Some(entry) if entry.is_live(now) => match &entry.data {
                SlotData::Set(set) => set.contains(member),
                _ => false,
            },
            _ => false,
        }
    }

    async fn set_members(&self, key: &str) -> Vec<String> {
        let now = Instant::now();
        match self.inner.get_async(key).await {
            Some(entry) if entry.is_live(now) => match &entry.data {
                SlotData::Set(set) => set.iter().cloned().collect(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    async fn set_len(&self, key: &str) -> usize {
        self.set_members(key).await.len()
    }

    async fn list_push_capped<T>(
        &self,
        key: &str,
        value: &T,
        cap: usize,
        ttl: Duration,
    ) -> FastKvResult<()>
    where
        T: Serialize + Sync,
    {
        let bytes = serde_json::to_vec(value)?;
        let now = Instant::now();
        let entry = self.inner.entry_async(key.to_owned()).await;
        match entry {
            scc::hash_map::Entry::Occupied(mut o) => {
                let live = o.get().is_live(now);
                let slot = o.get_mut();
                if !live {
                    slot.data = SlotData::List(VecDeque::new());
                }
                match &mut slot.data {
                    SlotData::List(list) => {
                        list.push_front(bytes);
                        while list.len() > cap {
                            list.pop_back();
                        }
                    }
                    _ => return Err(FastKvError::WrongShape),
                }
                slot.expires_at = Some(now + ttl);
            }
            scc::hash_map::Entry::Vacant(v) => {
                let mut list = VecDeque::new();
                list.push_front(bytes);
                v.insert_entry(Slot {
                    data: SlotData::List(list),
                    expires_at: Some(now + ttl),
                });
            }
        }
        Ok(())
    }

    async fn list_items<T>(&self, key: &str) -> FastKvResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let now = Instant::now();
        match self.inner.get_async(key).await {
            Some(entry) if entry.is_live(now) => match &entry.data {
                SlotData::List(list) => list
                    .iter()
                    .map(|b| serde_json::from_slice(b).map_err(FastKvError::from))
                    .collect(),
                _ => Err(FastKvError::WrongShape),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let mut out = Vec::new();
        self.inner
            .scan_async(|k, v| {
                if v.is_live(now) && k.starts_with(prefix) {
                    out.push(k.clone());
                }
            })
            .await;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_round_trip() {
        let kv = MokaFastKv::new();
        kv.hash_set("k", &42u32, None).await.unwrap();
        let v: Option<u32> = kv.hash_get("k").await.unwrap();
        assert_eq!(v, Some(42));
    }

    #[tokio::test]
    async fn hash_update_is_exclusive_under_contention() {
        let kv = Arc::new(MokaFastKv::new());
        kv.hash_set("counter", &0u32, None).await.unwrap();
        let mut handles = Vec::new();
        for _ in 0..64 {
            let kv = kv.clone();
            handles.push(tokio::spawn(async move {
                kv.hash_update::<u32, _, _>("counter", None, |v| {
                    let v = v.unwrap_or(0) + 1;
                    (Some(v), ())
                })
                .await
                .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let v: Option<u32> = kv.hash_get("counter").await.unwrap();
        assert_eq!(v, Some(64));
    }

    #[tokio::test]
    async fn expired_hash_reads_as_absent() {
        let kv = MokaFastKv::new();
        kv.hash_set("k", &1u32, Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let v: Option<u32> = kv.hash_get("k").await.unwrap();
        assert_eq!(v, None);
    }

    #[tokio::test]
    async fn set_add_is_idempotent() {
        let kv = MokaFastKv::new();
        assert!(kv.set_add("s", "a", None).await);
        assert!(!kv.set_add("s", "a", None).await);
        assert_eq!(kv.set_len("s").await, 1);
    }

    #[tokio::test]
    async fn capped_list_trims_oldest() {
        let kv = MokaFastKv::new();
        for i in 0..5u32 {
            kv.list_push_capped("l", &i, 3, Duration::from_secs(60))
                .await
                .unwrap();
        }
        let items: Vec<u32> = kv.list_items("l").await.unwrap();
        assert_eq!(items, vec![4, 3, 2]);
    }
}
