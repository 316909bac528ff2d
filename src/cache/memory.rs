//! In-memory [`ResponseCache`] that keeps only the most recently stored response.

// self
use crate::{
	_prelude::*,
	cache::{CacheEntry, ResponseCache},
};

type Slot = Option<(String, Arc<CacheEntry>)>;

/// Single-slot cache: every [`ResponseCache::set`] discards whatever was stored before, for any
/// URI.
///
/// Entries are immutable behind an [`Arc`], so a reader that races a replacement sees either the
/// previous entry or the new one.
#[derive(Clone, Debug, Default)]
pub struct SingleSlotCache(Arc<RwLock<Slot>>);
impl SingleSlotCache {
	/// URI of the resident entry, if any.
	pub fn resident_uri(&self) -> Option<String> {
		self.0.read().as_ref().map(|(uri, _)| uri.clone())
	}

	/// Drops the resident entry.
	pub fn clear(&self) {
		*self.0.write() = None;
	}
}
impl ResponseCache for SingleSlotCache {
	fn get(&self, uri: &str) -> Option<Arc<CacheEntry>> {
		self.0.read().as_ref().filter(|(key, _)| key == uri).map(|(_, entry)| entry.clone())
	}

	fn set(&self, uri: &str, entry: CacheEntry) {
		*self.0.write() = Some((uri.to_owned(), Arc::new(entry)));
	}
}
