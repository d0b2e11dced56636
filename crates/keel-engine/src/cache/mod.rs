//! GPU-resident cache of derived resources.
//!
//! Entries are keyed by a content hash plus a usage tag and evicted least
//! recently used first. Pinned entries are never evicted.
//!
//! ```text
//! get_or_create ──hit──► handle
//!       │miss
//!       ▼
//!  factory() ─► evict LRU until it fits ─► allocate ─OOM─► evict, retry once
//! ```

mod key;

pub use key::{CacheKey, UsageTag};

use rustc_hash::FxHashMap;

use crate::config::CacheConfig;
use crate::device::{GraphicsContext, ResourceDesc, ResourceHandle};
use crate::error::{Error, Result};

/// Memory pressure reported by the OS.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum MemoryPressure {
    #[default]
    Normal,
    LowMemory,
}

/// One resident resource.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    handle: ResourceHandle,
    resident_bytes: u64,
    last_used: u64,
    pinned: bool,
}

impl CacheEntry {
    pub fn handle(&self) -> ResourceHandle {
        self.handle
    }

    pub fn resident_bytes(&self) -> u64 {
        self.resident_bytes
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub resident_bytes: u64,
}

/// Outcome of a pressure-driven eviction pass.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct EvictionReport {
    pub evicted: usize,
    pub freed_bytes: u64,
    pub resident_bytes: u64,
    pub target_bytes: u64,
}

pub struct ResourceCache {
    config: CacheConfig,
    pressure: MemoryPressure,
    entries: FxHashMap<CacheKey, CacheEntry>,
    resident_bytes: u64,

    /// Logical clock for LRU ordering; bumped on every touch.
    tick: u64,

    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ResourceCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            pressure: MemoryPressure::Normal,
            entries: FxHashMap::default(),
            resident_bytes: 0,
            tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn pressure(&self) -> MemoryPressure {
        self.pressure
    }

    pub fn resident_bytes(&self) -> u64 {
        self.resident_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            entries: self.entries.len(),
            resident_bytes: self.resident_bytes,
        }
    }

    /// Resident-byte ceiling under the current pressure level.
    pub fn target_bytes(&self) -> u64 {
        let fraction = match self.pressure {
            MemoryPressure::Normal => self.config.normal_fraction,
            MemoryPressure::LowMemory => self.config.low_memory_fraction,
        };
        (self.config.budget_bytes as f64 * fraction.clamp(0.0, 1.0)).floor() as u64
    }

    /// Bytes held by pinned entries, which eviction never reclaims.
    pub fn pinned_bytes(&self) -> u64 {
        self.entries
            .values()
            .filter(|entry| entry.pinned)
            .map(|entry| entry.resident_bytes)
            .sum()
    }

    pub fn entry(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Looks up a resident resource and marks it as recently used.
    pub fn resource(&mut self, key: &CacheKey) -> Option<ResourceHandle> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        entry.last_used = tick;
        Some(entry.handle)
    }

    /// Returns the resource for `key`, building it with `factory` on a miss.
    ///
    /// Older unpinned entries are evicted to make room. If the new resource
    /// cannot fit under the current target even with every unpinned entry
    /// gone, nothing is evicted or allocated and [`Error::BudgetExceeded`]
    /// is returned. A device out-of-memory error
    /// triggers one eviction pass and one retry.
    pub fn get_or_create<F>(
        &mut self,
        ctx: &mut GraphicsContext,
        key: CacheKey,
        factory: F,
    ) -> Result<ResourceHandle>
    where
        F: FnOnce() -> ResourceDesc,
    {
        if let Some(handle) = self.resource(&key) {
            self.hits += 1;
            return Ok(handle);
        }
        self.misses += 1;

        let desc = factory();
        let size = desc.size_bytes();
        let target = self.target_bytes();

        if size.saturating_add(self.pinned_bytes()) > target {
            return Err(Error::BudgetExceeded {
                resident: self.resident_bytes.saturating_add(size),
                target,
            });
        }
        self.evict_to(ctx, target - size)?;

        let handle = match ctx.allocate(&desc) {
            Ok(handle) => handle,
            Err(Error::OutOfDeviceMemory { requested }) => {
                log::warn!(
                    "device out of memory allocating \"{}\" ({requested} bytes); evicting and retrying",
                    desc.label
                );
                self.evict_bytes(ctx, requested)?;
                ctx.allocate(&desc)?
            }
            Err(e) => return Err(e),
        };

        let tick = self.next_tick();
        self.entries.insert(
            key,
            CacheEntry {
                handle,
                resident_bytes: size,
                last_used: tick,
                pinned: false,
            },
        );
        self.resident_bytes += size;

        log::debug!(
            "cached {:?} \"{}\" ({} bytes, resident {}/{})",
            key,
            desc.label,
            size,
            self.resident_bytes,
            target
        );
        Ok(handle)
    }

    /// Drops the entry for `key`, pinned or not. Returns whether one existed.
    pub fn invalidate(&mut self, ctx: &mut GraphicsContext, key: &CacheKey) -> Result<bool> {
        let Some(entry) = self.entries.remove(key) else {
            return Ok(false);
        };
        self.resident_bytes -= entry.resident_bytes;
        ctx.free(entry.handle)?;
        Ok(true)
    }

    pub fn pin(&mut self, key: &CacheKey) -> bool {
        self.set_pinned(key, true)
    }

    pub fn unpin(&mut self, key: &CacheKey) -> bool {
        self.set_pinned(key, false)
    }

    fn set_pinned(&mut self, key: &CacheKey, pinned: bool) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.pinned = pinned;
                true
            }
            None => false,
        }
    }

    /// Applies an OS memory pressure level and evicts down to its target.
    ///
    /// The level is sticky: a `LowMemory` target holds until `Normal` is
    /// signalled again.
    pub fn on_pressure_signal(
        &mut self,
        ctx: &mut GraphicsContext,
        level: MemoryPressure,
    ) -> Result<EvictionReport> {
        if self.pressure != level {
            log::info!("cache pressure {:?} -> {:?}", self.pressure, level);
            self.pressure = level;
        }

        let target = self.target_bytes();
        let before = (self.entries.len(), self.resident_bytes);
        self.evict_to(ctx, target)?;

        let report = EvictionReport {
            evicted: before.0 - self.entries.len(),
            freed_bytes: before.1 - self.resident_bytes,
            resident_bytes: self.resident_bytes,
            target_bytes: target,
        };

        if self.resident_bytes > target {
            log::warn!(
                "cache still over target after eviction: {} > {} (pinned entries)",
                self.resident_bytes,
                target
            );
            return Err(Error::BudgetExceeded {
                resident: self.resident_bytes,
                target,
            });
        }
        Ok(report)
    }

    /// Frees every entry, pinned included. Returns the number released.
    ///
    /// Free failures are logged; the cache is empty afterwards regardless.
    pub fn clear(&mut self, ctx: &mut GraphicsContext) -> usize {
        let count = self.entries.len();
        for (key, entry) in self.entries.drain() {
            if let Err(e) = ctx.free(entry.handle) {
                log::warn!("failed to free cached {key:?}: {e}");
            }
        }
        self.resident_bytes = 0;
        if count > 0 {
            log::debug!("cache cleared ({count} entries)");
        }
        count
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Unpinned keys, least recently used first.
    fn eviction_order(&self) -> Vec<CacheKey> {
        let mut candidates: Vec<(u64, CacheKey)> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.pinned)
            .map(|(k, e)| (e.last_used, *k))
            .collect();
        candidates.sort_unstable_by_key(|(last_used, _)| *last_used);
        candidates.into_iter().map(|(_, k)| k).collect()
    }

    fn evict_to(&mut self, ctx: &mut GraphicsContext, goal: u64) -> Result<()> {
        if self.resident_bytes <= goal {
            return Ok(());
        }
        for key in self.eviction_order() {
            if self.resident_bytes <= goal {
                break;
            }
            self.evict(ctx, &key)?;
        }
        Ok(())
    }

    fn evict_bytes(&mut self, ctx: &mut GraphicsContext, bytes: u64) -> Result<()> {
        let mut freed = 0;
        for key in self.eviction_order() {
            if freed >= bytes {
                break;
            }
            freed += self.evict(ctx, &key)?;
        }
        Ok(())
    }

    fn evict(&mut self, ctx: &mut GraphicsContext, key: &CacheKey) -> Result<u64> {
        let Some(entry) = self.entries.remove(key) else {
            return Ok(0);
        };
        self.resident_bytes -= entry.resident_bytes;
        self.evictions += 1;
        log::trace!("evicted {key:?} ({} bytes)", entry.resident_bytes);
        ctx.free(entry.handle)?;
        Ok(entry.resident_bytes)
    }
}
