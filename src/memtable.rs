use std::sync::Arc;

use bytes::Bytes;
use seekdb_skiplist::{
    arena::BlockArena,
    list::{SkipList, SkipListIter},
};

use crate::{
    comparator::prelude::*,
    format::{self, PAST_TRAILER, SEEK_TRAILER, Tag},
};

/// Adapter exposing the crate's internal-key order to the skiplist.
#[derive(Clone, Default)]
pub(crate) struct EntryComparator {
    c: InternalKeyComparator<BytewiseComparator>,
}

impl seekdb_skiplist::comparator::Comparator for EntryComparator {
    type Item = Bytes;

    fn compare(&self, a: &Bytes, b: &Bytes) -> std::cmp::Ordering {
        self.c.compare(a, b)
    }
}

type List = Arc<SkipList<Bytes, Bytes, EntryComparator, BlockArena>>;
type ListIter = SkipListIter<Bytes, Bytes, EntryComparator, BlockArena>;

/// Ordered index behind a database handle: internal key to value over the
/// skiplist, newest revision first within each user-key group. Revisions are
/// never unlinked; deletion is a tombstone record that navigation hides.
pub(crate) struct MemTable {
    list: List,
}

impl MemTable {
    pub(crate) fn new() -> Self {
        let list = Arc::new(SkipList::new(EntryComparator::default(), BlockArena::new()));
        Self { list }
    }

    /// Whether the index supports ordered range search. Cursors read this
    /// once at creation to decide if relational seeks keep their range
    /// semantics.
    pub(crate) fn range_capable(&self) -> bool {
        true
    }

    pub(crate) fn put(&self, seq: u64, key: &[u8], value: &[u8]) {
        self.list.insert(
            format::make_internal_key(key, seq, Tag::Put),
            Bytes::copy_from_slice(value),
        );
    }

    pub(crate) fn tombstone(&self, seq: u64, key: &[u8]) {
        self.list.insert(
            format::make_internal_key(key, seq, Tag::Tombstone),
            Bytes::new(),
        );
    }

    /// Resolves the newest revision of `key`. `None` when the key was never
    /// written or its newest revision is a tombstone.
    pub(crate) fn get(&self, key: &[u8]) -> Option<Bytes> {
        let mut iter = self.raw_iter();
        iter.seek_head(key);
        match iter.internal_key().and_then(format::split) {
            Some((user, _, Tag::Put)) if user == key => iter.value_bytes(),
            _ => None,
        }
    }

    pub(crate) fn raw_iter(&self) -> MemIter {
        MemIter {
            iter: self.list.iter(),
        }
    }

    pub(crate) fn mem_usage(&self) -> usize {
        self.list.mem_usage()
    }
}

/// Raw positional handle over the index. Positions are internal-key
/// entries; revision and tombstone visibility is the cursor's concern.
pub(crate) struct MemIter {
    iter: ListIter,
}

impl MemIter {
    pub(crate) fn is_valid(&self) -> bool {
        self.iter.is_valid()
    }

    pub(crate) fn clear(&mut self) {
        self.iter.clear();
    }

    pub(crate) fn seek_to_first(&mut self) {
        self.iter.seek_to_first();
    }

    pub(crate) fn seek_to_last(&mut self) {
        self.iter.seek_to_last();
    }

    /// Positions at the head entry (newest revision) of the first group
    /// whose user key is at or above `key`.
    pub(crate) fn seek_head(&mut self, key: &[u8]) {
        let target = format::make_seek_key(key, SEEK_TRAILER);
        self.iter.seek(&target);
    }

    /// Positions at the last entry strictly below `key`'s group.
    pub(crate) fn seek_before_group(&mut self, key: &[u8]) {
        let target = format::make_seek_key(key, SEEK_TRAILER);
        self.iter.seek_for_prev(&target);
    }

    /// Positions at the head entry of the group following `key`'s group.
    pub(crate) fn seek_past_group(&mut self, key: &[u8]) {
        let target = format::make_seek_key(key, PAST_TRAILER);
        self.iter.seek(&target);
    }

    pub(crate) fn internal_key(&self) -> Option<&[u8]> {
        self.iter.key().map(|key| &key[..])
    }

    pub(crate) fn value(&self) -> Option<&[u8]> {
        self.iter.value().map(|value| &value[..])
    }

    /// Shared-buffer clone of the current value.
    pub(crate) fn value_bytes(&self) -> Option<Bytes> {
        self.iter.value().cloned()
    }
}
