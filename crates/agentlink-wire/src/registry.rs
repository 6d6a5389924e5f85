//! Peer directory: known peer agents, their capabilities and liveness.
//!
//! The [`PeerDirectory`] is a cheaply clonable, thread-safe table keyed by
//! agent id. Records are created by registry discovery or by an inbound
//! handshake and merged on every later sighting (last write wins).
//!
//! Status only moves `active → unreachable` through [`PeerDirectory::mark_unreachable`]
//! (a failed outbound send). Nothing here moves a peer back automatically; a
//! fresh discovery hit or handshake upserts it as `active`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// Highest trust score.
pub const MAX_TRUST_SCORE: u8 = 100;

/// Liveness state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    /// Reachable as far as we know.
    Active,
    /// The last outbound send failed.
    Unreachable,
}

/// A single known peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    /// Peer agent id.
    pub agent_id: String,
    /// Base URL of the peer's A2A endpoint.
    pub endpoint: String,
    /// Capability namespaces the peer advertises.
    pub capabilities: BTreeSet<String>,
    /// Trust score, 0..=100.
    pub trust_score: u8,
    /// Last time the peer was seen through discovery or handshake.
    pub last_seen: DateTime<Utc>,
    /// Liveness.
    pub status: PeerStatus,
}

/// Fields to merge into a peer record. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct PeerUpdate {
    pub agent_id: String,
    pub endpoint: Option<String>,
    pub capabilities: Option<BTreeSet<String>>,
    pub trust_score: Option<u8>,
    pub status: Option<PeerStatus>,
}

/// Thread-safe directory of all known peers.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    peers: Arc<RwLock<HashMap<String, PeerRecord>>>,
}

impl PeerDirectory {
    /// Create a new empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or merge a peer.
    ///
    /// A new record takes `default_trust` unless the update carries a score;
    /// an existing record keeps its score unless the update carries one.
    /// Returns the stored record.
    pub fn upsert(&self, update: PeerUpdate, default_trust: u8, now: DateTime<Utc>) -> PeerRecord {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        let record = peers
            .entry(update.agent_id.clone())
            .and_modify(|existing| {
                if let Some(endpoint) = &update.endpoint {
                    existing.endpoint = endpoint.clone();
                }
                if let Some(capabilities) = &update.capabilities {
                    existing.capabilities = capabilities.clone();
                }
                if let Some(score) = update.trust_score {
                    existing.trust_score = score.min(MAX_TRUST_SCORE);
                }
                if let Some(status) = update.status {
                    existing.status = status;
                }
                existing.last_seen = now;
            })
            .or_insert_with(|| PeerRecord {
                agent_id: update.agent_id.clone(),
                endpoint: update.endpoint.clone().unwrap_or_default(),
                capabilities: update.capabilities.clone().unwrap_or_default(),
                trust_score: update
                    .trust_score
                    .unwrap_or(default_trust)
                    .min(MAX_TRUST_SCORE),
                last_seen: now,
                status: update.status.unwrap_or(PeerStatus::Active),
            });
        record.clone()
    }

    /// Mark a peer unreachable after a failed outbound send.
    pub fn mark_unreachable(&self, agent_id: &str) -> bool {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        match peers.get_mut(agent_id) {
            Some(entry) => {
                entry.status = PeerStatus::Unreachable;
                true
            }
            None => false,
        }
    }

    /// Set a peer's trust score (clamped to 100). Returns the new score.
    pub fn set_trust_score(&self, agent_id: &str, score: u8) -> Option<u8> {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers.get_mut(agent_id).map(|entry| {
            entry.trust_score = score.min(MAX_TRUST_SCORE);
            entry.trust_score
        })
    }

    /// Snapshot of a single peer.
    pub fn get(&self, agent_id: &str) -> Option<PeerRecord> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.get(agent_id).cloned()
    }

    /// All peers, optionally restricted to those advertising `capability`,
    /// sorted by agent id.
    pub fn list(&self, capability: Option<&str>) -> Vec<PeerRecord> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<PeerRecord> = peers
            .values()
            .filter(|p| capability.map_or(true, |c| p.capabilities.contains(c)))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        out
    }

    /// Active peers only.
    pub fn active(&self) -> Vec<PeerRecord> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers
            .values()
            .filter(|p| p.status == PeerStatus::Active)
            .cloned()
            .collect()
    }

    /// Union of capabilities advertised by all peers.
    pub fn available_capabilities(&self) -> BTreeSet<String> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers
            .values()
            .flat_map(|p| p.capabilities.iter().cloned())
            .collect()
    }

    /// Number of active peers.
    pub fn active_count(&self) -> usize {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers
            .values()
            .filter(|p| p.status == PeerStatus::Active)
            .count()
    }

    /// Total number of peers (including unreachable).
    pub fn total_count(&self) -> usize {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.len()
    }
}
