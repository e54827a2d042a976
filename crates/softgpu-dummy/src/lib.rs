//! softgpu-dummy - In-memory memory hierarchy for testing
//!
//! This crate provides a [`MemoryBus`] implementation backed by a plain
//! byte buffer. It is useful for testing and development without the
//! surrounding processor model: tests can preload data, run SM programs
//! against it, and inspect every access afterwards. An optional fixed
//! latency makes prefetched lines report in-flight for a number of polls,
//! which is enough to exercise load/store stalls.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use softgpu_sm::MemoryBus;

/// Cache-line granularity of the in-flight tracker
const LINE_SIZE: u64 = 64;

/// Configuration for the dummy memory
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Backing-store size in bytes
    pub size: usize,
    /// Bus address of the first backing byte
    pub base: u64,
    /// Polls a prefetched line stays in flight (0 = never stalls)
    pub latency: u32,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            size: 64 * 1024,
            base: 0,
            latency: 0,
        }
    }
}

/// Dummy memory hierarchy
///
/// Reads outside the backing range return all-ones, the master-abort
/// response of a real bus; writes outside it are dropped.
pub struct DummyMemory {
    config: DummyConfig,
    data: Vec<u8>,
    pending: BTreeMap<u64, u32>,
    writes: Vec<(u64, u32)>,
    flushes: u32,
}

impl DummyMemory {
    /// Create a zero-filled dummy memory with the given configuration.
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![0; config.size];
        Self {
            config,
            data,
            pending: BTreeMap::new(),
            writes: Vec::new(),
            flushes: 0,
        }
    }

    /// Create a dummy memory with the default configuration.
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy memory with pre-filled data.
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut memory = Self::new(config);
        let len = core::cmp::min(initial_data.len(), memory.data.len());
        memory.data[..len].copy_from_slice(&initial_data[..len]);
        memory
    }

    /// Get a reference to the backing data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the backing data.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the configuration.
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Every committed write, in order.
    pub fn writes(&self) -> &[(u64, u32)] {
        &self.writes
    }

    /// Number of cache flushes requested.
    pub fn flush_count(&self) -> u32 {
        self.flushes
    }

    /// Read a backing word without going through the bus interface.
    pub fn word(&self, address: u64) -> u32 {
        self.offset(address)
            .map(|base| {
                u32::from_le_bytes([
                    self.data[base],
                    self.data[base + 1],
                    self.data[base + 2],
                    self.data[base + 3],
                ])
            })
            .unwrap_or(0xFFFF_FFFF)
    }

    fn offset(&self, address: u64) -> Option<usize> {
        let offset = address.checked_sub(self.config.base)? as usize;
        (offset + 4 <= self.data.len()).then_some(offset)
    }
}

impl MemoryBus for DummyMemory {
    fn read(&mut self, address: u64) -> u32 {
        let value = self.word(address);
        log::trace!("dummy read {value:#010X} from {address:#X}");
        value
    }

    fn write(&mut self, address: u64, value: u32) {
        if let Some(base) = self.offset(address) {
            self.data[base..base + 4].copy_from_slice(&value.to_le_bytes());
            self.writes.push((address, value));
        } else {
            log::trace!("dummy write to {address:#X} outside the backing range dropped");
        }
    }

    fn prefetch(&mut self, address: u64) {
        if self.config.latency > 0 {
            self.pending
                .insert(address / LINE_SIZE, self.config.latency);
        }
    }

    fn flush_cache(&mut self) {
        self.pending.clear();
        self.flushes += 1;
    }

    // Each poll ages the line; the caller polls once per tick, so a
    // latency of N holds the line in flight for N ticks.
    fn in_flight(&mut self, address: u64) -> bool {
        let line = address / LINE_SIZE;
        match self.pending.get_mut(&line) {
            Some(polls) => {
                *polls -= 1;
                if *polls == 0 {
                    self.pending.remove(&line);
                }
                true
            }
            None => false,
        }
    }
}
