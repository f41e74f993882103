//! Friend graph collaborator. Messaging only asks one question of it:
//! may these two users talk?

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::error::StoreError;

pub trait FriendGraph: Send + Sync {
    fn is_friend(&self, a: &str, b: &str) -> bool;
}

/// In-memory adjacency map. Friendship counts only when both directions
/// are present.
#[derive(Clone, Default)]
pub struct FriendDirectory {
    adjacency: Arc<DashMap<String, HashSet<String>>>,
}

impl FriendDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an adjacency map `{userId: [friendIds]}`, kept as given.
    pub fn from_adjacency(map: HashMap<String, Vec<String>>) -> Self {
        let directory = Self::new();
        for (user, friends) in map {
            directory
                .adjacency
                .insert(user, friends.into_iter().collect());
        }
        directory
    }

    /// Load `friends.json` from the data directory. A missing file yields
    /// an empty graph.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            tracing::info!("No friend graph at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)?;
        let map: HashMap<String, Vec<String>> = serde_json::from_str(&raw)?;
        let directory = Self::from_adjacency(map);
        tracing::info!(
            users = directory.adjacency.len(),
            "Friend graph loaded from {}",
            path.display()
        );
        Ok(directory)
    }

    /// Record a confirmed friendship in both directions.
    pub fn link(&self, a: &str, b: &str) {
        if a == b {
            return;
        }
        self.adjacency
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        self.adjacency
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
    }

    fn has_edge(&self, from: &str, to: &str) -> bool {
        self.adjacency
            .get(from)
            .map(|friends| friends.contains(to))
            .unwrap_or(false)
    }
}

impl FriendGraph for FriendDirectory {
    fn is_friend(&self, a: &str, b: &str) -> bool {
        self.has_edge(a, b) && self.has_edge(b, a)
    }
}
