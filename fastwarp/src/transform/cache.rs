//! A bounded cache of transform contexts keyed by CRS pair.
//!
//! Creating a CRS transformation is expensive, so contexts are kept per
//! `(source CRS, destination CRS)` and reused. Eviction is frequency based:
//! when the cache is full, the entry with the fewest lookups goes first, ties
//! going to the lexicographically smallest key.
//!
//! Every context leaves the cache through [`Reprojection::destroy`], whether it
//! is replaced, evicted, removed, cleared or dropped with the cache.

use super::TransformContext;
use crate::engine::Reprojection;
use anyhow::{Result, ensure};
use parking_lot::Mutex;
use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

/// Identifies a cached context: source and destination CRS definitions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransformKey {
	src_crs: String,
	dst_crs: String,
}

impl TransformKey {
	pub fn new(src_crs: &str, dst_crs: &str) -> Result<TransformKey> {
		ensure!(!src_crs.is_empty(), "source CRS must not be empty");
		ensure!(!dst_crs.is_empty(), "destination CRS must not be empty");
		Ok(TransformKey {
			src_crs: src_crs.to_string(),
			dst_crs: dst_crs.to_string(),
		})
	}

	pub fn src_crs(&self) -> &str {
		&self.src_crs
	}

	pub fn dst_crs(&self) -> &str {
		&self.dst_crs
	}
}

struct CacheEntry {
	context: TransformContext,
	use_count: u64,
}

pub struct TransformContextCache {
	entries: BTreeMap<TransformKey, CacheEntry>,
	capacity: usize,
	engine: Arc<dyn Reprojection>,
}

/// How warpers share one cache.
pub type SharedTransformCache = Arc<Mutex<TransformContextCache>>;

impl TransformContextCache {
	pub fn new(engine: Arc<dyn Reprojection>, capacity: usize) -> Self {
		TransformContextCache {
			entries: BTreeMap::new(),
			capacity: capacity.max(1),
			engine,
		}
	}

	pub fn shared(engine: Arc<dyn Reprojection>, capacity: usize) -> SharedTransformCache {
		Arc::new(Mutex::new(TransformContextCache::new(engine, capacity)))
	}

	/// Inserts `context` under `key` with a use count of 1.
	///
	/// An existing entry for `key` is destroyed first. If the cache is full,
	/// the least used entry is evicted.
	pub fn put(&mut self, key: TransformKey, context: TransformContext) {
		self.remove(&key);

		if self.entries.len() >= self.capacity {
			let victim = self
				.entries
				.iter()
				.fold(None, |min: Option<(&TransformKey, u64)>, (k, e)| match min {
					Some((_, count)) if count <= e.use_count => min,
					_ => Some((k, e.use_count)),
				})
				.map(|(k, _)| k.clone());
			if let Some(victim) = victim {
				log::debug!(
					"evicting transform context {:?} -> {:?}",
					victim.src_crs,
					victim.dst_crs
				);
				self.remove(&victim);
			}
		}

		self.entries.insert(key, CacheEntry { context, use_count: 1 });
	}

	/// Looks up `key`, counting the lookup on a hit.
	pub fn get(&mut self, key: &TransformKey) -> Option<&TransformContext> {
		let entry = self.entries.get_mut(key)?;
		entry.use_count += 1;
		Some(&entry.context)
	}

	/// Destroys and forgets the entry for `key`, if any.
	pub fn remove(&mut self, key: &TransformKey) {
		if let Some(entry) = self.entries.remove(key) {
			self.engine.destroy(entry.context);
		}
	}

	/// Destroys every entry.
	pub fn clear(&mut self) {
		let entries = std::mem::take(&mut self.entries);
		for (_, entry) in entries {
			self.engine.destroy(entry.context);
		}
	}

	pub fn use_count(&self, key: &TransformKey) -> Option<u64> {
		self.entries.get(key).map(|e| e.use_count)
	}

	pub fn contains(&self, key: &TransformKey) -> bool {
		self.entries.contains_key(key)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}
}

impl Drop for TransformContextCache {
	fn drop(&mut self) {
		self.clear();
	}
}

impl Debug for TransformContextCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransformContextCache")
			.field("length", &self.entries.len())
			.field("capacity", &self.capacity)
			.finish_non_exhaustive()
	}
}
