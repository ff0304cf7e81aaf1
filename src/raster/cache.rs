//! Bounded per-dataset cache of decoded blocks.
//!
//! Entries are keyed by `(band, block_x, block_y)` and evicted in least
//! recently used order. A dirty block is always encoded before its slot is
//! given up; if that encode fails the block stays cached and the error is
//! returned to the caller.

use lru::LruCache;

use crate::errors::{BlockFailure, BlockRef, RasterError, Result};
use crate::raster::codec::CodecSession;

/// One decoded block.
#[derive(Debug, Clone)]
pub struct Block {
    data: Vec<u8>,
    dirty: bool,
}

impl Block {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel bytes. Callers obtain the block through
    /// [`BlockCache::get_block`] with `for_write` set, which marks it dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Successful `decode_block` calls.
    pub decodes: u64,
    /// Successful `encode_block` calls, from eviction or flush.
    pub encodes: u64,
    pub evictions: u64,
}

pub struct BlockCache {
    entries: LruCache<BlockRef, Block>,
    capacity: usize,
    stats: CacheStats,
}

impl BlockCache {
    /// A cache holding at most `capacity` blocks (at least one).
    pub fn new(capacity: usize) -> Self {
        BlockCache {
            entries: LruCache::unbounded(),
            capacity: capacity.max(1),
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &BlockRef) -> bool {
        self.entries.contains(key)
    }

    /// `Some(dirty)` for a resident block, `None` otherwise.
    pub fn is_dirty(&self, key: &BlockRef) -> Option<bool> {
        self.entries.peek(key).map(|b| b.dirty)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Returns the block for `key`, decoding it on a miss.
    ///
    /// A hit refreshes recency. With `for_write` the block is marked dirty.
    pub fn get_block(
        &mut self,
        session: &mut CodecSession<'_>,
        key: BlockRef,
        for_write: bool,
    ) -> Result<&mut Block> {
        self.fetch(session, key, for_write, false)
    }

    /// Like `get_block(.., true)` but a missing block is materialized as
    /// padding instead of being decoded, for callers about to overwrite it
    /// entirely.
    pub fn get_block_for_overwrite(
        &mut self,
        session: &mut CodecSession<'_>,
        key: BlockRef,
    ) -> Result<&mut Block> {
        self.fetch(session, key, true, true)
    }

    fn fetch(
        &mut self,
        session: &mut CodecSession<'_>,
        key: BlockRef,
        for_write: bool,
        overwrite: bool,
    ) -> Result<&mut Block> {
        let fresh = if self.entries.contains(&key) {
            self.stats.hits += 1;
            None
        } else {
            self.stats.misses += 1;
            let data = if overwrite {
                session.descriptor(key.band).padding_block()
            } else {
                log::trace!("decoding {key}");
                let data = session.decode(key)?;
                self.stats.decodes += 1;
                data
            };
            self.make_room(session, self.capacity - 1)?;
            Some(data)
        };

        let block = self.entries.get_or_insert_mut(key, move || Block {
            data: fresh.unwrap_or_default(),
            dirty: false,
        });
        if for_write {
            block.dirty = true;
        }
        Ok(block)
    }

    /// Evicts least recently used blocks until at most `target` remain.
    fn make_room(&mut self, session: &mut CodecSession<'_>, target: usize) -> Result<()> {
        while self.entries.len() > target {
            let Some((key, block)) = self.entries.peek_lru() else {
                break;
            };
            let key = *key;
            if block.dirty {
                log::debug!("flushing dirty {key} before eviction");
                session.encode(key, &block.data)?;
                self.stats.encodes += 1;
            }
            self.entries.pop_lru();
            self.stats.evictions += 1;
            log::debug!("evicted {key}");
        }
        Ok(())
    }

    /// Changes the capacity, evicting (and flushing) blocks if it shrinks.
    pub fn set_capacity(&mut self, session: &mut CodecSession<'_>, capacity: usize) -> Result<()> {
        self.capacity = capacity.max(1);
        self.make_room(session, self.capacity)
    }

    /// Encodes every dirty block of `band`.
    pub fn flush_band(&mut self, session: &mut CodecSession<'_>, band: usize) -> Result<()> {
        self.flush_matching(session, |key| key.band == band)
    }

    /// Encodes every dirty block.
    ///
    /// Best effort: a failing block is recorded and stays dirty, the remaining
    /// blocks are still attempted. All failures are returned together.
    pub fn flush_all(&mut self, session: &mut CodecSession<'_>) -> Result<()> {
        self.flush_matching(session, |_| true)
    }

    fn flush_matching(
        &mut self,
        session: &mut CodecSession<'_>,
        matches: impl Fn(&BlockRef) -> bool,
    ) -> Result<()> {
        let mut dirty: Vec<BlockRef> = self
            .entries
            .iter()
            .filter(|(key, block)| block.dirty && matches(*key))
            .map(|(key, _)| *key)
            .collect();
        dirty.sort_by_key(|k| (k.band, k.block_y, k.block_x));

        let mut failures = Vec::new();
        for key in dirty {
            let Some(block) = self.entries.peek_mut(&key) else {
                continue;
            };
            match session.encode(key, &block.data) {
                Ok(()) => {
                    block.dirty = false;
                    self.stats.encodes += 1;
                }
                Err(error) => {
                    log::error!("failed to flush {key}: {error}");
                    failures.push(BlockFailure { block: key, error });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RasterError::FlushFailed { failures })
        }
    }

    /// Drops a cached block without flushing it. Returns whether it was
    /// resident.
    pub fn invalidate(&mut self, key: &BlockRef) -> bool {
        self.entries.pop(key).is_some()
    }

    /// Drops every cached block of `band` without flushing.
    pub fn invalidate_band(&mut self, band: usize) {
        let keys: Vec<BlockRef> = self
            .entries
            .iter()
            .filter(|(key, _)| key.band == band)
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            self.entries.pop(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::raster::codec::{BandDescriptor, BlockCodec, BlockContext};
    use crate::raster::PixelType;
    use std::collections::HashMap;

    /// Counts calls and stores blocks in a map; can be told to fail encodes.
    #[derive(Default)]
    struct CountingCodec {
        stored: HashMap<(usize, usize), Vec<u8>>,
        decodes: Vec<(usize, usize)>,
        encodes: Vec<(usize, usize)>,
        fail_encode: Option<(usize, usize)>,
    }

    impl BlockCodec for CountingCodec {
        fn driver_name(&self) -> &'static str {
            "COUNT"
        }

        fn decode_block(&mut self, ctx: &mut BlockContext<'_>) -> Result<Vec<u8>> {
            let at = (ctx.block_x, ctx.block_y);
            self.decodes.push(at);
            Ok(self
                .stored
                .get(&at)
                .cloned()
                .unwrap_or_else(|| vec![(ctx.block_x * 10 + ctx.block_y) as u8; 4]))
        }

        fn encode_block(&mut self, ctx: &mut BlockContext<'_>, data: &[u8]) -> Result<()> {
            let at = (ctx.block_x, ctx.block_y);
            if self.fail_encode == Some(at) {
                return Err(std::io::Error::other("disk full").into());
            }
            self.encodes.push(at);
            self.stored.insert(at, data.to_vec());
            Ok(())
        }
    }

    struct Harness {
        codec: Box<dyn BlockCodec>,
        bands: Vec<BandDescriptor>,
        diagnostics: Diagnostics,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                codec: Box::<CountingCodec>::default(),
                bands: vec![BandDescriptor::new(PixelType::Byte, (2, 2)); 2],
                diagnostics: Diagnostics::new(),
            }
        }

        fn session(&mut self) -> CodecSession<'_> {
            CodecSession {
                codec: &mut *self.codec,
                bands: &self.bands,
                raster_size: (4, 4),
                diagnostics: &mut self.diagnostics,
            }
        }
    }

    fn key(band: usize, block_x: usize, block_y: usize) -> BlockRef {
        BlockRef {
            band,
            block_x,
            block_y,
        }
    }

    #[test]
    fn lru_eviction_redecodes() {
        let mut harness = Harness::new();
        let mut cache = BlockCache::new(1);
        let mut session = harness.session();

        let first = cache.get_block(&mut session, key(1, 0, 0), false).unwrap().data().to_vec();
        cache.get_block(&mut session, key(1, 1, 0), false).unwrap();
        let again = cache.get_block(&mut session, key(1, 0, 0), false).unwrap().data().to_vec();

        assert_eq!(first, again);
        let stats = cache.stats();
        assert_eq!(stats.decodes, 3);
        assert_eq!(stats.evictions, 2);
        assert_eq!(stats.hits, 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn hit_refreshes_recency() {
        let mut harness = Harness::new();
        let mut cache = BlockCache::new(2);
        let mut session = harness.session();

        cache.get_block(&mut session, key(1, 0, 0), false).unwrap();
        cache.get_block(&mut session, key(1, 1, 0), false).unwrap();
        cache.get_block(&mut session, key(1, 0, 0), false).unwrap();
        cache.get_block(&mut session, key(1, 0, 1), false).unwrap();

        assert!(cache.contains(&key(1, 0, 0)));
        assert!(!cache.contains(&key(1, 1, 0)));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn dirty_block_is_encoded_on_eviction() {
        let mut harness = Harness::new();
        let mut cache = BlockCache::new(1);
        let mut session = harness.session();

        cache
            .get_block(&mut session, key(1, 0, 0), true)
            .unwrap()
            .data_mut()
            .copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(cache.is_dirty(&key(1, 0, 0)), Some(true));
        cache.get_block(&mut session, key(1, 1, 1), false).unwrap();
        assert_eq!(cache.stats().encodes, 1);

        let reread = cache.get_block(&mut session, key(1, 0, 0), false).unwrap();
        assert_eq!(reread.data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn failed_eviction_keeps_dirty_block() {
        let mut harness = Harness::new();
        harness.codec = Box::new(CountingCodec {
            fail_encode: Some((0, 0)),
            ..Default::default()
        });
        let mut cache = BlockCache::new(1);
        let mut session = harness.session();

        cache.get_block(&mut session, key(1, 0, 0), true).unwrap();
        let err = cache.get_block(&mut session, key(1, 1, 0), false).unwrap_err();
        assert!(matches!(err, RasterError::IoError { block: Some(b), .. } if b == key(1, 0, 0)));
        assert!(cache.contains(&key(1, 0, 0)));
        assert_eq!(cache.is_dirty(&key(1, 0, 0)), Some(true));
        assert!(!cache.contains(&key(1, 1, 0)));
    }

    #[test]
    fn flush_is_best_effort_and_idempotent() {
        let mut harness = Harness::new();
        harness.codec = Box::new(CountingCodec {
            fail_encode: Some((1, 0)),
            ..Default::default()
        });
        let mut cache = BlockCache::new(8);
        let mut session = harness.session();

        for (x, y) in [(0, 0), (1, 0), (0, 1)] {
            cache.get_block(&mut session, key(1, x, y), true).unwrap();
        }
        match cache.flush_all(&mut session) {
            Err(RasterError::FlushFailed { failures }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].block, key(1, 1, 0));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cache.stats().encodes, 2);
        assert_eq!(cache.is_dirty(&key(1, 1, 0)), Some(true));
        assert_eq!(cache.is_dirty(&key(1, 0, 1)), Some(false));

        cache.invalidate(&key(1, 1, 0));
        cache.flush_all(&mut session).unwrap();
        cache.flush_all(&mut session).unwrap();
        assert_eq!(cache.stats().encodes, 2);
    }

    #[test]
    fn flush_band_only_touches_that_band() {
        let mut harness = Harness::new();
        let mut cache = BlockCache::new(8);
        let mut session = harness.session();

        cache.get_block(&mut session, key(1, 0, 0), true).unwrap();
        cache.get_block(&mut session, key(2, 0, 0), true).unwrap();
        cache.flush_band(&mut session, 2).unwrap();
        assert_eq!(cache.is_dirty(&key(1, 0, 0)), Some(true));
        assert_eq!(cache.is_dirty(&key(2, 0, 0)), Some(false));
    }

    #[test]
    fn overwrite_skips_decode() {
        let mut harness = Harness::new();
        let mut cache = BlockCache::new(4);
        let mut session = harness.session();

        let block = cache
            .get_block_for_overwrite(&mut session, key(1, 1, 1))
            .unwrap();
        assert_eq!(block.data(), &[0, 0, 0, 0]);
        assert!(block.is_dirty());
        assert_eq!(cache.stats().decodes, 0);
    }

    #[test]
    fn invalidate_band_and_shrink() {
        let mut harness = Harness::new();
        let mut cache = BlockCache::new(4);
        let mut session = harness.session();

        cache.get_block(&mut session, key(1, 0, 0), false).unwrap();
        cache.get_block(&mut session, key(2, 0, 0), true).unwrap();
        cache.get_block(&mut session, key(2, 1, 0), false).unwrap();
        cache.invalidate_band(1);
        assert_eq!(cache.len(), 2);

        cache.set_capacity(&mut session, 1).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().encodes, 1);
        assert!(cache.contains(&key(2, 1, 0)));
    }
}
