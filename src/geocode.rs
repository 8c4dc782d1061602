//! Memoized reverse geocoding.
//!
//! The shell performs the actual lookup through the Location capability;
//! the core caches results in an LRU keyed by rounded coordinates so nearby
//! fixes do not re-query.

use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;

use crate::{ValidatedCoordinate, GEOCODE_CACHE_CAPACITY};

/// Coordinates rounded to 1e-4 degrees (roughly 11 m), so jittery GPS fixes
/// in the same spot share a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeocodeKey {
    lat_e4: i64,
    lon_e4: i64,
}

impl GeocodeKey {
    #[must_use]
    pub fn from_coordinate(coord: ValidatedCoordinate) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self {
            lat_e4: (coord.lat() * 10_000.0).round() as i64,
            lon_e4: (coord.lon() * 10_000.0).round() as i64,
        }
    }
}

pub struct GeocodeCache {
    cache: LruCache<GeocodeKey, String>,
}

impl Default for GeocodeCache {
    fn default() -> Self {
        Self {
            cache: LruCache::new(
                NonZeroUsize::new(GEOCODE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ),
        }
    }
}

impl fmt::Debug for GeocodeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeocodeCache")
            .field("len", &self.cache.len())
            .field("cap", &self.cache.cap())
            .finish()
    }
}

impl GeocodeCache {
    #[must_use = "a cache hit should short-circuit the shell round trip"]
    pub fn get(&mut self, coord: ValidatedCoordinate) -> Option<String> {
        self.cache.get(&GeocodeKey::from_coordinate(coord)).cloned()
    }

    pub fn insert(&mut self, coord: ValidatedCoordinate, address: String) {
        self.cache.put(GeocodeKey::from_coordinate(coord), address);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
