//! Reconciliation of probe results with the local state store.
//!
//! One `ensure_*` routine per resource kind, grouped by service family in the
//! submodules. Each routine probes, decides one [`Action`], applies it and
//! records a [`StepOutcome`].

mod access_keys;
mod identity;
mod logging;
mod storage;

pub use access_keys::MAX_ACCESS_KEYS;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::aws::CloudProvider;
use crate::error::ProvisionResult;
use crate::probe::{Claim, Prober};
use crate::store::{LocalStateStore, StateKey, StoreError};
use crate::types::{Action, ResourceKind, StepOutcome};

/// Action for a resource given its remote and local descriptors.
///
/// | remote | local | action |
/// |---|---|---|
/// | absent | any | [`Action::Created`] |
/// | present | equal | [`Action::ReusedRemote`] |
/// | present | absent or different | [`Action::Refreshed`] |
pub fn decide<T: PartialEq>(remote: Option<&T>, local: Option<&T>) -> Action {
    match (remote, local) {
        (None, _) => Action::Created,
        (Some(remote), Some(local)) if remote == local => Action::ReusedRemote,
        (Some(_), _) => Action::Refreshed,
    }
}

pub struct Reconciler<'a, P: ?Sized> {
    provider: &'a P,
    prober: Prober<'a, P>,
    store: &'a LocalStateStore,
    iam_path: String,
    outcomes: Vec<StepOutcome>,
    rng: StdRng,
}

impl<'a, P: CloudProvider + ?Sized> Reconciler<'a, P> {
    pub fn new(provider: &'a P, store: &'a LocalStateStore, iam_path: impl Into<String>) -> Self {
        let iam_path = iam_path.into();
        Self {
            provider,
            prober: Prober::new(provider, iam_path.clone()),
            store,
            iam_path,
            outcomes: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the generator used to pick the active access key.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<StepOutcome> {
        self.outcomes
    }

    fn record(&mut self, kind: ResourceKind, name: &str, action: Action, detail: Option<String>) {
        match &detail {
            Some(detail) => log::info!("{kind} {name}: {action} ({detail})"),
            None => log::info!("{kind} {name}: {action}"),
        }
        self.outcomes.push(StepOutcome {
            kind,
            name: name.to_string(),
            action,
            detail,
        });
    }

    /// Local entry for `key`. A corrupt entry counts as absent.
    async fn local<T: DeserializeOwned>(&self, key: &StateKey) -> ProvisionResult<Option<T>> {
        match self.store.get(key).await {
            Ok(value) => Ok(value),
            Err(err @ StoreError::Corrupt { .. }) => {
                log::warn!("Ignoring local entry {key}: {err}");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Persist a descriptor the provider just returned for a new resource.
    async fn created<T: Serialize>(&mut self, key: &StateKey, descriptor: &T) -> ProvisionResult<()> {
        self.store.put(key, descriptor).await?;
        self.record(key.kind, &key.name, Action::Created, None);
        Ok(())
    }

    /// Align the local entry with a resource found remotely.
    async fn adopt<T>(&mut self, key: &StateKey, remote: &T) -> ProvisionResult<Action>
    where
        T: Serialize + DeserializeOwned + PartialEq,
    {
        let local: Option<T> = self.local(key).await?;
        let action = decide(Some(remote), local.as_ref());
        if action == Action::Refreshed {
            self.store.put(key, remote).await?;
        }
        self.record(key.kind, &key.name, action, None);
        Ok(action)
    }

    /// Persist or adopt the outcome of a claim-by-creation.
    async fn settle<T>(&mut self, key: &StateKey, claim: Claim<T>) -> ProvisionResult<T>
    where
        T: Serialize + DeserializeOwned + PartialEq,
    {
        match claim {
            Claim::Created(descriptor) => {
                self.created(key, &descriptor).await?;
                Ok(descriptor)
            }
            Claim::Existing(descriptor) => {
                self.adopt(key, &descriptor).await?;
                Ok(descriptor)
            }
        }
    }
}
