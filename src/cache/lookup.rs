//! Cache Lookup Module
//!
//! Typed outcome of a cache read. A read never fails; every problem with the
//! stored value degrades to a miss whose reason stays observable.

// == Cache Miss ==
/// Why a lookup returned no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMiss {
    /// Nothing stored under the key
    Absent,
    /// Stored value is malformed or does not decode as the requested type
    Corrupted,
    /// Stored value was written under another cache-format version
    VersionMismatch,
    /// The store could not be read
    Unavailable,
}

// == Cache Lookup ==
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    /// Entry found; may be past its TTL
    Hit {
        data: T,
        is_stale: bool,
        /// Milliseconds since the entry was written
        age: u64,
    },
    Miss(CacheMiss),
}

impl<T> CacheLookup<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            CacheLookup::Hit { data, .. } => Some(data),
            CacheLookup::Miss(_) => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            CacheLookup::Hit { data, .. } => Some(data),
            CacheLookup::Miss(_) => None,
        }
    }

    pub fn is_from_cache(&self) -> bool {
        matches!(self, CacheLookup::Hit { .. })
    }

    /// True only for a hit past its TTL.
    pub fn is_stale(&self) -> bool {
        matches!(self, CacheLookup::Hit { is_stale: true, .. })
    }

    /// True for a hit within its TTL.
    pub fn is_fresh(&self) -> bool {
        matches!(self, CacheLookup::Hit { is_stale: false, .. })
    }

    pub fn age(&self) -> Option<u64> {
        match self {
            CacheLookup::Hit { age, .. } => Some(*age),
            CacheLookup::Miss(_) => None,
        }
    }

    pub fn miss_reason(&self) -> Option<CacheMiss> {
        match self {
            CacheLookup::Hit { .. } => None,
            CacheLookup::Miss(reason) => Some(*reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_accessors() {
        let lookup = CacheLookup::Hit {
            data: 5,
            is_stale: true,
            age: 120,
        };
        assert_eq!(lookup.data(), Some(&5));
        assert!(lookup.is_from_cache());
        assert!(lookup.is_stale());
        assert!(!lookup.is_fresh());
        assert_eq!(lookup.age(), Some(120));
        assert_eq!(lookup.miss_reason(), None);
        assert_eq!(lookup.into_data(), Some(5));
    }

    #[test]
    fn test_miss_accessors() {
        let lookup: CacheLookup<u32> = CacheLookup::Miss(CacheMiss::VersionMismatch);
        assert!(!lookup.is_from_cache());
        assert!(!lookup.is_stale());
        assert_eq!(lookup.age(), None);
        assert_eq!(lookup.miss_reason(), Some(CacheMiss::VersionMismatch));
    }
}
