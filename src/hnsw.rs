//! Graph-based approximate nearest-neighbor index.
//!
//! A bounded-degree proximity graph in the HNSW family, searched by
//! inner product. Vectors are expected to be L2-normalized by the
//! caller, so inner product equals cosine similarity.
//!
//! Three tunables trade build/query time for recall:
//! - `m` — graph degree (max neighbors per node; layer 0 allows `2m`),
//! - `ef_construction` — candidate-list breadth while inserting,
//! - `ef_search` — candidate-list breadth while querying.
//!
//! Defaults (32 / 200 / 50) give high recall at moderate latency for
//! corpora in the thousands-of-chunks range.
//!
//! Slots are wrapped by an explicit id-map: every inserted vector
//! carries an external `i64` id, and tombstoned entries (negative id)
//! are skipped by search without reindexing the graph. Level sampling
//! uses a seeded RNG, so index construction is deterministic for a
//! given insertion order.
//!
//! The whole structure serde-derives and is persisted with bincode; an
//! artifact must be read back by the same library family that wrote it.

use anyhow::{bail, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

/// Graph construction and search tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 32,
            ef_construction: 200,
            ef_search: 50,
        }
    }
}

/// Hard cap on sampled levels; corpora would need to be astronomically
/// large to reach it.
const MAX_LEVEL: usize = 16;

/// A scored graph slot. Ordered by similarity, ties broken by slot so
/// heap behavior is deterministic.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Neighbor {
    sim: f32,
    slot: u32,
}

impl Eq for Neighbor {}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sim
            .total_cmp(&other.sim)
            .then_with(|| other.slot.cmp(&self.slot))
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The persisted ANN index.
#[derive(Debug, Serialize, Deserialize)]
pub struct HnswIndex {
    dims: usize,
    params: HnswParams,
    /// Row-major vector storage, `len = slots × dims`.
    vectors: Vec<f32>,
    /// Top layer of each slot.
    levels: Vec<u8>,
    /// `links[slot][layer]` = neighbor slots; length `levels[slot] + 1`.
    links: Vec<Vec<Vec<u32>>>,
    /// External id per slot; negative entries are tombstones.
    ids: Vec<i64>,
    entry: Option<u32>,
    max_level: u8,
    seed: u64,
}

impl HnswIndex {
    pub fn new(dims: usize, params: HnswParams) -> Self {
        Self {
            dims,
            params,
            vectors: Vec::new(),
            levels: Vec::new(),
            links: Vec::new(),
            ids: Vec::new(),
            entry: None,
            max_level: 0,
            seed: 0x9e37_79b9_7f4a_7c15,
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Number of slots, tombstones included.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of live (non-tombstoned) entries.
    pub fn live_len(&self) -> usize {
        self.ids.iter().filter(|&&id| id >= 0).count()
    }

    fn vector(&self, slot: u32) -> &[f32] {
        let start = slot as usize * self.dims;
        &self.vectors[start..start + self.dims]
    }

    fn dot(&self, slot: u32, query: &[f32]) -> f32 {
        self.vector(slot)
            .iter()
            .zip(query.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Geometric level sampling, seeded per slot for determinism.
    fn sample_level(&self, slot: u32) -> usize {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(slot as u64));
        let unif: f64 = rng.random();
        let mult = 1.0 / (self.params.m as f64).ln();
        ((-unif.ln() * mult).floor() as usize).min(MAX_LEVEL)
    }

    fn max_degree(&self, layer: usize) -> usize {
        if layer == 0 {
            self.params.m * 2
        } else {
            self.params.m
        }
    }

    /// Insert a vector under an external id.
    ///
    /// Ids must be non-negative; the caller (the artifact builder)
    /// assigns them densely in insertion order.
    pub fn add(&mut self, vector: &[f32], id: i64) -> Result<()> {
        if vector.len() != self.dims {
            bail!(
                "vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dims
            );
        }
        if id < 0 {
            bail!("negative ids are reserved for tombstones");
        }

        let slot = self.ids.len() as u32;
        let level = self.sample_level(slot);

        self.vectors.extend_from_slice(vector);
        self.ids.push(id);
        self.levels.push(level as u8);
        self.links.push(vec![Vec::new(); level + 1]);

        let Some(entry) = self.entry else {
            self.entry = Some(slot);
            self.max_level = level as u8;
            return Ok(());
        };

        // Greedy descent through layers above the new node's level.
        let mut current = entry;
        let top = self.max_level as usize;
        for layer in ((level + 1)..=top).rev() {
            current = self.greedy_closest(vector, current, layer);
        }

        // Connect on each shared layer, widest first.
        let mut entry_points = vec![current];
        for layer in (0..=level.min(top)).rev() {
            let found = self.search_layer(vector, &entry_points, self.params.ef_construction, layer);

            let max_deg = self.max_degree(layer);
            let selected: Vec<u32> = found.iter().take(self.params.m).map(|n| n.slot).collect();

            for &neighbor in &selected {
                self.links[slot as usize][layer].push(neighbor);
                self.links[neighbor as usize][layer].push(slot);
                self.prune(neighbor, layer, max_deg);
            }

            entry_points = found.iter().map(|n| n.slot).collect();
            if entry_points.is_empty() {
                entry_points = vec![current];
            }
        }

        if level > self.max_level as usize {
            self.entry = Some(slot);
            self.max_level = level as u8;
        }

        Ok(())
    }

    /// Keep a node's neighbor list within the degree bound, retaining
    /// the highest-similarity neighbors.
    fn prune(&mut self, slot: u32, layer: usize, max_deg: usize) {
        if self.links[slot as usize][layer].len() <= max_deg {
            return;
        }

        let base = self.vector(slot).to_vec();
        let mut scored: Vec<Neighbor> = self.links[slot as usize][layer]
            .iter()
            .map(|&nb| Neighbor {
                sim: self.dot(nb, &base),
                slot: nb,
            })
            .collect();
        scored.sort_by(|a, b| b.cmp(a));
        scored.truncate(max_deg);
        self.links[slot as usize][layer] = scored.into_iter().map(|n| n.slot).collect();
    }

    /// Hill-climb to the locally closest node on one layer.
    fn greedy_closest(&self, query: &[f32], start: u32, layer: usize) -> u32 {
        let mut current = start;
        let mut current_sim = self.dot(current, query);

        loop {
            let mut improved = false;
            for &nb in &self.links[current as usize][layer] {
                let sim = self.dot(nb, query);
                if sim > current_sim {
                    current = nb;
                    current_sim = sim;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Best-first search of one layer, returning up to `ef` neighbors
    /// in descending similarity order.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[u32],
        ef: usize,
        layer: usize,
    ) -> Vec<Neighbor> {
        let mut visited: HashSet<u32> = HashSet::new();
        let mut candidates: BinaryHeap<Neighbor> = BinaryHeap::new();
        let mut results: BinaryHeap<Reverse<Neighbor>> = BinaryHeap::new();

        for &ep in entry_points {
            if visited.insert(ep) {
                let n = Neighbor {
                    sim: self.dot(ep, query),
                    slot: ep,
                };
                candidates.push(n);
                results.push(Reverse(n));
                if results.len() > ef {
                    results.pop();
                }
            }
        }

        while let Some(candidate) = candidates.pop() {
            let worst = results.peek().map(|r| r.0.sim).unwrap_or(f32::NEG_INFINITY);
            if results.len() >= ef && candidate.sim < worst {
                break;
            }

            let node_links = &self.links[candidate.slot as usize];
            if layer >= node_links.len() {
                continue;
            }
            for &nb in &node_links[layer] {
                if !visited.insert(nb) {
                    continue;
                }
                let sim = self.dot(nb, query);
                let worst = results.peek().map(|r| r.0.sim).unwrap_or(f32::NEG_INFINITY);
                if results.len() < ef || sim > worst {
                    let n = Neighbor { sim, slot: nb };
                    candidates.push(n);
                    results.push(Reverse(n));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<Neighbor> = results.into_iter().map(|r| r.0).collect();
        out.sort_by(|a, b| b.cmp(a));
        out
    }

    /// Find up to `k` nearest entries by inner product, descending.
    ///
    /// Tombstoned slots are skipped. Asking for more results than the
    /// corpus holds simply returns fewer.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(i64, f32)> {
        self.search_with_ef(query, k, self.params.ef_search)
    }

    pub fn search_with_ef(&self, query: &[f32], k: usize, ef: usize) -> Vec<(i64, f32)> {
        let Some(entry) = self.entry else {
            return Vec::new();
        };
        if k == 0 || query.len() != self.dims {
            return Vec::new();
        }

        let mut current = entry;
        for layer in (1..=self.max_level as usize).rev() {
            current = self.greedy_closest(query, current, layer);
        }

        let ef = ef.max(k);
        let found = self.search_layer(query, &[current], ef, 0);

        found
            .into_iter()
            .filter_map(|n| {
                let id = self.ids[n.slot as usize];
                // Negative id = tombstone ("no match" sentinel slot).
                (id >= 0).then_some((id, n.sim))
            })
            .take(k)
            .collect()
    }

    /// Tombstone an external id. The slot stays in the graph as a
    /// routing node but is never returned from search.
    pub fn mark_deleted(&mut self, id: i64) -> bool {
        for stored in self.ids.iter_mut() {
            if *stored == id {
                *stored = -1;
                return true;
            }
        }
        false
    }
}
