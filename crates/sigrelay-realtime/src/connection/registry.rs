//! Session registry: tracks every live connection in its role namespaces.
//!
//! There are two addressable namespaces. The streamer namespace holds
//! streamers and SFUs, the player namespace holds players and SFUs. SFUs
//! are additionally indexed on their own so they can be counted and
//! listed. Every map stores the same `Arc<ConnectionHandle>`, so state
//! changes on an SFU are visible from either side.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::handle::{ConnectionHandle, PeerRole};

/// Thread-safe registry of all signalling connections.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// Streamer namespace: streamers and SFUs.
    streamers: DashMap<String, Arc<ConnectionHandle>>,
    /// Player namespace: players and SFUs.
    players: DashMap<String, Arc<ConnectionHandle>>,
    /// SFUs only.
    sfus: DashMap<String, Arc<ConnectionHandle>>,
}

/// Per-role connection counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCounts {
    pub streamers: usize,
    pub players: usize,
    pub sfus: usize,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn maps_for(&self, role: PeerRole) -> Vec<&DashMap<String, Arc<ConnectionHandle>>> {
        match role {
            PeerRole::Streamer => vec![&self.streamers],
            PeerRole::Player => vec![&self.players],
            PeerRole::Sfu => vec![&self.streamers, &self.players, &self.sfus],
        }
    }

    /// Inserts a connection under its current id in every namespace its
    /// role occupies. Entries previously held under that id are replaced
    /// and returned; they are not notified.
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> Vec<Arc<ConnectionHandle>> {
        let id = handle.id();
        self.insert_as(&id, &handle)
    }

    fn insert_as(&self, id: &str, handle: &Arc<ConnectionHandle>) -> Vec<Arc<ConnectionHandle>> {
        let mut displaced: Vec<Arc<ConnectionHandle>> = Vec::new();
        for map in self.maps_for(handle.role) {
            let Some(old) = map.insert(id.to_string(), handle.clone()) else {
                continue;
            };
            if !Arc::ptr_eq(&old, handle) && !displaced.iter().any(|d| Arc::ptr_eq(d, &old)) {
                displaced.push(old);
            }
        }
        displaced
    }

    /// Removes the entries that still point at this exact handle.
    ///
    /// A connection that was displaced by a newer registration under the
    /// same id never evicts its replacement.
    pub fn unregister_handle(&self, handle: &Arc<ConnectionHandle>) -> bool {
        let id = handle.id();
        self.remove_as(&id, handle)
    }

    fn remove_as(&self, id: &str, handle: &Arc<ConnectionHandle>) -> bool {
        let mut removed = false;
        for map in self.maps_for(handle.role) {
            removed |= map
                .remove_if(id, |_, current| Arc::ptr_eq(current, handle))
                .is_some();
        }
        removed
    }

    /// Removes the connection registered under `id` with the given role.
    pub fn unregister(&self, id: &str, role: PeerRole) -> Option<Arc<ConnectionHandle>> {
        let primary = match role {
            PeerRole::Streamer => &self.streamers,
            PeerRole::Player => &self.players,
            PeerRole::Sfu => &self.sfus,
        };
        let handle = primary
            .get(id)
            .map(|entry| entry.value().clone())
            .filter(|h| h.role == role)?;
        self.remove_as(id, &handle).then_some(handle)
    }

    /// Moves a connection to a new id in every namespace it occupies.
    ///
    /// Returns the entries displaced from the new id.
    pub fn rekey(&self, handle: &Arc<ConnectionHandle>, new_id: &str) -> Vec<Arc<ConnectionHandle>> {
        let old_id = handle.id();
        if old_id == new_id {
            return Vec::new();
        }
        self.remove_as(&old_id, handle);
        handle.set_id(new_id);
        self.insert_as(new_id, handle)
    }

    /// Finds a connection in the namespace addressed by `role`.
    ///
    /// `Streamer` searches the streamer namespace (streamers and SFUs),
    /// `Player` the player namespace (players and SFUs), and `Sfu` only SFUs.
    pub fn find(&self, id: &str, role: PeerRole) -> Option<Arc<ConnectionHandle>> {
        let map = match role {
            PeerRole::Streamer => &self.streamers,
            PeerRole::Player => &self.players,
            PeerRole::Sfu => &self.sfus,
        };
        map.get(id).map(|entry| entry.value().clone())
    }

    /// Finds a live producer by id.
    pub fn streamer(&self, id: &str) -> Option<Arc<ConnectionHandle>> {
        self.find(id, PeerRole::Streamer).filter(|h| !h.is_closed())
    }

    /// Finds a live consumer by id.
    pub fn player(&self, id: &str) -> Option<Arc<ConnectionHandle>> {
        self.find(id, PeerRole::Player).filter(|h| !h.is_closed())
    }

    /// Point-in-time snapshot of the namespace addressed by `role`.
    pub fn all_of_role(&self, role: PeerRole) -> Vec<Arc<ConnectionHandle>> {
        let map = match role {
            PeerRole::Streamer => &self.streamers,
            PeerRole::Player => &self.players,
            PeerRole::Sfu => &self.sfus,
        };
        map.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Live consumers currently recorded as subscribers of `streamer_id`.
    pub fn subscribers_of(&self, streamer_id: &str) -> Vec<Arc<ConnectionHandle>> {
        let Some(streamer) = self.streamer(streamer_id) else {
            return Vec::new();
        };
        streamer
            .subscribers()
            .iter()
            .filter_map(|id| self.player(id))
            .collect()
    }

    /// Ids of every live producer that has announced it is streaming, sorted.
    pub fn streaming_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .streamers
            .iter()
            .filter(|entry| entry.value().is_streaming() && !entry.value().is_closed())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// First streaming producer by id order, skipping `except`.
    pub fn first_streaming(&self, except: &str) -> Option<Arc<ConnectionHandle>> {
        self.streaming_ids()
            .into_iter()
            .filter(|id| id != except)
            .find_map(|id| self.streamer(&id))
    }

    /// Every registered connection once, regardless of how many
    /// namespaces it occupies.
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        let mut seen = HashSet::new();
        self.streamers
            .iter()
            .chain(self.players.iter())
            .map(|entry| entry.value().clone())
            .filter(|h| seen.insert(h.session_id))
            .collect()
    }

    /// Per-role connection counts.
    pub fn counts(&self) -> RegistryCounts {
        let mut by_role: BTreeMap<&'static str, usize> = BTreeMap::new();
        for handle in self.all_connections() {
            *by_role.entry(handle.role.as_str()).or_default() += 1;
        }
        RegistryCounts {
            streamers: by_role.get("streamer").copied().unwrap_or(0),
            players: by_role.get("player").copied().unwrap_or(0),
            sfus: by_role.get("sfu").copied().unwrap_or(0),
        }
    }

    /// Total number of distinct connections.
    pub fn len(&self) -> usize {
        self.all_connections().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.streamers.is_empty() && self.players.is_empty()
    }
}
