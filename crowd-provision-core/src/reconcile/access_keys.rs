//! Access keys of the task user.
//!
//! The provider returns a secret only from the create call, so the local
//! store is the only place it survives. A remote key without a readable
//! local record can never be used again and is deleted.

use rand::seq::SliceRandom;

use crate::aws::CloudProvider;
use crate::error::{ProvisionError, ProvisionResult};
use crate::store::StateKey;
use crate::types::{AccessKeyRecord, Action, ResourceKind};

/// Keys IAM allows per user.
pub const MAX_ACCESS_KEYS: usize = 2;

const INACTIVE: &str = "Inactive";

impl<P: CloudProvider + ?Sized> super::Reconciler<'_, P> {
    /// Reconcile the keys of `user_name` with their local records and return
    /// the key to operate with, chosen at random among the valid active ones.
    ///
    /// A key is created when no valid active key is left, or when orphans were
    /// deleted in this call, as long as fewer than [`MAX_ACCESS_KEYS`] remain.
    /// Inactive keys with a local record are kept but never chosen.
    pub async fn ensure_access_keys(&mut self, user_name: &str) -> ProvisionResult<AccessKeyRecord> {
        let remote = self.provider.list_access_keys(user_name).await?;
        let mut valid: Vec<AccessKeyRecord> = Vec::with_capacity(MAX_ACCESS_KEYS);
        let mut usable: Vec<AccessKeyRecord> = Vec::with_capacity(MAX_ACCESS_KEYS);
        let mut repaired = 0usize;

        for summary in &remote {
            let id = summary.access_key_id.as_str();
            let key = StateKey::with_sub_id(ResourceKind::AccessKey, user_name, id);
            match self.local::<AccessKeyRecord>(&key).await? {
                Some(record) if record.access_key_id == id && !record.secret_access_key.is_empty() => {
                    if summary.status.as_deref() == Some(INACTIVE) {
                        log::warn!("Access key {id} of {user_name} is inactive; keeping it unused");
                        self.record(
                            ResourceKind::AccessKey,
                            id,
                            Action::ReusedLocal,
                            Some("inactive, not used".to_string()),
                        );
                    } else {
                        self.record(ResourceKind::AccessKey, id, Action::ReusedLocal, None);
                        usable.push(record.clone());
                    }
                    valid.push(record);
                }
                _ => {
                    log::warn!(
                        "Access key {id} of {user_name} has no usable local record; deleting it"
                    );
                    self.provider.delete_access_key(user_name, id).await?;
                    self.store.remove(&key).await?;
                    self.record(
                        ResourceKind::AccessKey,
                        id,
                        Action::Repaired,
                        Some("secret unrecoverable, key deleted".to_string()),
                    );
                    repaired += 1;
                }
            }
        }

        for sub_id in self
            .store
            .list_sub_ids(ResourceKind::AccessKey, user_name)
            .await?
        {
            if remote.iter().all(|s| s.access_key_id != sub_id) {
                log::warn!("Removing local record of access key {sub_id}, which no longer exists");
                self.store
                    .remove(&StateKey::with_sub_id(
                        ResourceKind::AccessKey,
                        user_name,
                        &sub_id,
                    ))
                    .await?;
            }
        }

        if valid.len() < MAX_ACCESS_KEYS && (usable.is_empty() || repaired > 0) {
            let record = self.provider.create_access_key(user_name).await?;
            let key =
                StateKey::with_sub_id(ResourceKind::AccessKey, user_name, &record.access_key_id);
            self.store.put(&key, &record).await?;
            self.record(ResourceKind::AccessKey, &record.access_key_id, Action::Created, None);
            valid.push(record.clone());
            usable.push(record);
        }

        let active = usable.choose(&mut self.rng).cloned().ok_or_else(|| {
            let inactive: Vec<&str> = valid.iter().map(|r| r.access_key_id.as_str()).collect();
            ProvisionError::unexpected(format!(
                "no usable access key for {user_name}: {} inactive, none can be created",
                inactive.join(", ")
            ))
        })?;
        log::info!(
            "Operating as {user_name} with access key {} ({} valid, {} active)",
            active.access_key_id,
            valid.len(),
            usable.len()
        );
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::Reconciler;
    use crate::store::LocalStateStore;
    use crate::testing::InMemoryProvider;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    const USER: &str = "crowd-task-user";

    fn key(id: &str) -> StateKey {
        StateKey::with_sub_id(ResourceKind::AccessKey, USER, id)
    }

    #[tokio::test]
    async fn test_two_valid_keys_are_kept() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(dir.path());
        let provider = InMemoryProvider::new();
        let a = provider.seed_access_key(USER).await;
        let b = provider.seed_access_key(USER).await;
        store.put(&key(&a.access_key_id), &a).await.unwrap();
        store.put(&key(&b.access_key_id), &b).await.unwrap();

        let mut reconciler = Reconciler::new(&provider, &store, "/crowd-task/")
            .with_rng(StdRng::seed_from_u64(7));
        let active = reconciler.ensure_access_keys(USER).await.unwrap();

        assert!(active == a || active == b);
        assert!(provider.mutations().await.is_empty());
        assert!(reconciler
            .outcomes()
            .iter()
            .all(|o| o.action == Action::ReusedLocal));
    }

    #[tokio::test]
    async fn test_corrupt_record_counts_as_orphan() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(dir.path());
        let provider = InMemoryProvider::new();
        let a = provider.seed_access_key(USER).await;
        let path = store.path_for(&key(&a.access_key_id));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let mut reconciler = Reconciler::new(&provider, &store, "/crowd-task/");
        let active = reconciler.ensure_access_keys(USER).await.unwrap();

        assert_ne!(active.access_key_id, a.access_key_id);
        assert_eq!(provider.access_key_ids(USER).await, vec![active.access_key_id.clone()]);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stale_local_record_is_removed() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(dir.path());
        let provider = InMemoryProvider::new();
        let live = provider.seed_access_key(USER).await;
        store.put(&key(&live.access_key_id), &live).await.unwrap();
        let gone = AccessKeyRecord {
            access_key_id: "AKIAGONE0000000000".to_string(),
            ..live.clone()
        };
        store.put(&key(&gone.access_key_id), &gone).await.unwrap();

        let mut reconciler = Reconciler::new(&provider, &store, "/crowd-task/");
        let active = reconciler.ensure_access_keys(USER).await.unwrap();

        assert_eq!(active, live);
        assert_eq!(
            store
                .list_sub_ids(ResourceKind::AccessKey, USER)
                .await
                .unwrap(),
            vec![live.access_key_id]
        );
    }

    #[tokio::test]
    async fn test_inactive_key_is_kept_but_not_chosen() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(dir.path());
        let provider = InMemoryProvider::new();
        let inactive = provider.seed_access_key(USER).await;
        store.put(&key(&inactive.access_key_id), &inactive).await.unwrap();
        provider.deactivate_access_key(USER, &inactive.access_key_id).await;

        let mut reconciler = Reconciler::new(&provider, &store, "/crowd-task/");
        let active = reconciler.ensure_access_keys(USER).await.unwrap();

        assert_ne!(active.access_key_id, inactive.access_key_id);
        let mut ids = provider.access_key_ids(USER).await;
        ids.sort();
        let mut expected = vec![inactive.access_key_id.clone(), active.access_key_id.clone()];
        expected.sort();
        assert_eq!(ids, expected);
        assert_eq!(provider.creations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_two_inactive_keys_leave_nothing_to_choose() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(dir.path());
        let provider = InMemoryProvider::new();
        for _ in 0..2 {
            let record = provider.seed_access_key(USER).await;
            store.put(&key(&record.access_key_id), &record).await.unwrap();
            provider.deactivate_access_key(USER, &record.access_key_id).await;
        }

        let mut reconciler = Reconciler::new(&provider, &store, "/crowd-task/");
        let err = reconciler.ensure_access_keys(USER).await.unwrap_err();

        assert!(err.to_string().contains("inactive"));
        assert!(provider.mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_seeded_choice_is_reproducible() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(dir.path());
        let provider = InMemoryProvider::new();
        for _ in 0..2 {
            let record = provider.seed_access_key(USER).await;
            store.put(&key(&record.access_key_id), &record).await.unwrap();
        }

        let mut picks = Vec::new();
        for _ in 0..2 {
            let mut reconciler = Reconciler::new(&provider, &store, "/crowd-task/")
                .with_rng(StdRng::seed_from_u64(42));
            picks.push(reconciler.ensure_access_keys(USER).await.unwrap());
        }
        assert_eq!(picks[0], picks[1]);
    }
}
