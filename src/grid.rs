use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use glam::DVec2;

use crate::physics::Aabb;

pub type ChunkKey = (i64, i64);

/// Broad-phase bucket index. Every entity lives in exactly one chunk, the one
/// containing the position it was last inserted or re-homed at.
///
/// Chunk contents are ordered sets so that queries return entities in a stable
/// order for a given seed.
#[derive(Clone, Debug)]
pub struct Grid<K> {
    chunk_size: f64,
    chunks: HashMap<ChunkKey, BTreeSet<K>>,
    homes: HashMap<K, ChunkKey>,
}

impl<K: Copy + Ord + Hash> Grid<K> {
    pub fn new(chunk_size: f64) -> Self {
        Self {
            chunk_size: chunk_size.max(f64::EPSILON),
            chunks: HashMap::new(),
            homes: HashMap::new(),
        }
    }

    pub fn chunk_size(&self) -> f64 {
        self.chunk_size
    }

    pub fn key_for(&self, pos: DVec2) -> ChunkKey {
        (
            (pos.x / self.chunk_size).floor() as i64,
            (pos.y / self.chunk_size).floor() as i64,
        )
    }

    pub fn len(&self) -> usize {
        self.homes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.homes.is_empty()
    }

    pub fn contains(&self, id: K) -> bool {
        self.homes.contains_key(&id)
    }

    pub fn chunk_of(&self, id: K) -> Option<ChunkKey> {
        self.homes.get(&id).copied()
    }

    pub fn chunk(&self, key: ChunkKey) -> Option<&BTreeSet<K>> {
        self.chunks.get(&key)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.homes.clear();
    }

    /// Insert, or re-home if already present.
    pub fn insert(&mut self, id: K, pos: DVec2) {
        if self.contains(id) {
            self.rehome(id, pos);
            return;
        }
        let key = self.key_for(pos);
        self.chunks.entry(key).or_default().insert(id);
        self.homes.insert(id, key);
    }

    pub fn remove(&mut self, id: K) -> bool {
        let Some(key) = self.homes.remove(&id) else {
            return false;
        };
        self.detach(id, key);
        true
    }

    fn detach(&mut self, id: K, key: ChunkKey) {
        if let Some(chunk) = self.chunks.get_mut(&key) {
            chunk.remove(&id);
            if chunk.is_empty() {
                self.chunks.remove(&key);
            }
        }
    }

    /// Move `id` to the chunk for `pos`. Returns true if its chunk changed.
    /// Unknown ids are left out; they must be inserted explicitly.
    pub fn rehome(&mut self, id: K, pos: DVec2) -> bool {
        let new_key = self.key_for(pos);
        let Some(old_key) = self.homes.get(&id).copied() else {
            return false;
        };
        if old_key == new_key {
            return false;
        }
        self.detach(id, old_key);
        self.chunks.entry(new_key).or_default().insert(id);
        self.homes.insert(id, new_key);
        true
    }

    /// Keys of non-empty chunks overlapping `bounds`, row-major.
    pub fn chunks_near(&self, bounds: &Aabb) -> Vec<ChunkKey> {
        let (x0, y0) = self.key_for(bounds.min);
        let (x1, y1) = self.key_for(bounds.max);
        let mut keys = Vec::new();
        for cy in y0..=y1 {
            for cx in x0..=x1 {
                if self.chunks.contains_key(&(cx, cy)) {
                    keys.push((cx, cy));
                }
            }
        }
        keys
    }

    /// Entities homed in any chunk overlapping `bounds`. Coarse: positions are not checked.
    pub fn entities_in_box(&self, bounds: &Aabb) -> Vec<K> {
        self.chunks_near(bounds)
            .into_iter()
            .filter_map(|key| self.chunks.get(&key))
            .flat_map(|chunk| chunk.iter().copied())
            .collect()
    }

    /// Entities whose position (as reported by `position_of`) lies within `radius` of `center`.
    pub fn entities_in_disk(
        &self,
        center: DVec2,
        radius: f64,
        position_of: impl Fn(K) -> Option<DVec2>,
    ) -> Vec<K> {
        let radius_sq = radius * radius;
        self.entities_in_box(&Aabb::around(center, radius))
            .into_iter()
            .filter(|id| {
                position_of(*id)
                    .map(|p| p.distance_squared(center) <= radius_sq)
                    .unwrap_or(false)
            })
            .collect()
    }
}
