//! Per-(chain, wallet) session lease.
//!
//! A session holds the lease from before its first launch until after its aggregate task has
//! finished. The aggregate worker checks the lease before overwriting the aggregate file, so two
//! sessions targeting the same wallet and chain cannot interleave writes.

use crate::{layout, Error, ObjectStore, Result};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLease {
    pub session_id: Uuid,
    pub chain_id: String,
    pub wallet: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionLease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

pub struct LeaseStore<'a> {
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    ttl: Duration,
}

impl<'a> LeaseStore<'a> {
    pub fn new(store: &'a dyn ObjectStore, bucket: &'a str, ttl: Duration) -> Self {
        Self { store, bucket, ttl }
    }

    pub async fn acquire(
        &self,
        chain_id: &str,
        wallet: &str,
        session_id: Uuid,
    ) -> Result<SessionLease> {
        let key = layout::lease_key(chain_id, wallet);
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|err| Error::Config(anyhow!("invalid lease ttl: {err}")))?;
        let lease = SessionLease {
            session_id,
            chain_id: chain_id.to_string(),
            wallet: wallet.to_string(),
            acquired_at: now,
            expires_at: now + ttl,
        };
        let body = serde_json::to_vec(&lease)
            .map_err(|err| Error::Lease(anyhow!("encode lease: {err}")))?;

        if self.try_put(&key, body.clone()).await? {
            return Ok(lease);
        }

        let (held, raw) = self.read_raw(&key).await?;
        if held.session_id == session_id {
            return Ok(held);
        }
        if !held.is_expired(now) {
            return Err(Error::Lease(anyhow!(
                "chain_id={chain_id} wallet={wallet} is held by session {} until {}",
                held.session_id,
                held.expires_at
            )));
        }

        tracing::warn!(
            event = "walletsweep.lease.expired",
            chain_id = %chain_id,
            wallet = %wallet,
            stale_session = %held.session_id,
            expired_at = %held.expires_at,
            "replacing expired session lease"
        );
        let swapped = self
            .store
            .replace_if_unchanged(self.bucket, &key, &raw, body, layout::CONTENT_TYPE_JSON)
            .await
            .map_err(|err| Error::Lease(anyhow!("replace lease {key}: {err}")))?;
        if swapped {
            return Ok(lease);
        }
        Err(Error::Lease(anyhow!(
            "chain_id={chain_id} wallet={wallet} was taken by another session"
        )))
    }

    /// Succeeds only if the current lease exists and belongs to `session_id`.
    pub async fn verify(&self, chain_id: &str, wallet: &str, session_id: Uuid) -> Result<()> {
        let key = layout::lease_key(chain_id, wallet);
        let held = self.read(&key).await?;
        if held.session_id != session_id {
            return Err(Error::Lease(anyhow!(
                "chain_id={chain_id} wallet={wallet} is held by session {}, not {session_id}",
                held.session_id
            )));
        }
        Ok(())
    }

    pub async fn release(&self, lease: &SessionLease) -> Result<()> {
        self.verify(&lease.chain_id, &lease.wallet, lease.session_id)
            .await?;
        let key = layout::lease_key(&lease.chain_id, &lease.wallet);
        self.store.delete(self.bucket, &key).await
    }

    async fn try_put(&self, key: &str, body: Vec<u8>) -> Result<bool> {
        self.store
            .put_if_absent(self.bucket, key, body, layout::CONTENT_TYPE_JSON)
            .await
            .map_err(|err| Error::Lease(anyhow!("write lease {key}: {err}")))
    }

    async fn read(&self, key: &str) -> Result<SessionLease> {
        self.read_raw(key).await.map(|(lease, _)| lease)
    }

    /// The decoded lease plus the exact stored body, for compare-and-swap.
    async fn read_raw(&self, key: &str) -> Result<(SessionLease, Vec<u8>)> {
        let bytes = self
            .store
            .get_bytes(self.bucket, key)
            .await
            .map_err(|err| Error::Lease(anyhow!("read lease {key}: {err}")))?;
        let lease = serde_json::from_slice(&bytes)
            .map_err(|err| Error::Lease(anyhow!("decode lease {key}: {err}")))?;
        Ok((lease, bytes))
    }
}
