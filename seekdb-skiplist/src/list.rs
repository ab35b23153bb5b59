use std::{
    alloc::Layout,
    cmp::Ordering::{Equal, Greater, Less},
    mem,
    ptr::{self, NonNull, addr_of_mut, null_mut},
    sync::{
        Arc,
        atomic::{AtomicPtr, AtomicUsize, Ordering::SeqCst},
    },
};

use crate::{arena::MemAllocator, comparator::Comparator};

const MAX_HEIGHT: usize = 20;
const BRANCH_FACTOR: u32 = 4;

#[repr(C)]
struct Node<K, V> {
    key: K,
    value: V,
    tower: [AtomicPtr<Self>; MAX_HEIGHT],
}

impl<K, V> Node<K, V> {
    fn next(&self, level: usize) -> *mut Self {
        self.tower[level].load(SeqCst)
    }

    fn set_next(&self, level: usize, node: *mut Self) {
        self.tower[level].store(node, SeqCst);
    }

    // Nodes are allocated with the tower truncated to their sampled height.
    fn layout_for(height: usize) -> Layout {
        assert!(height >= 1 && height <= MAX_HEIGHT);
        let size =
            mem::size_of::<Self>() - mem::size_of::<AtomicPtr<Self>>() * (MAX_HEIGHT - height);
        Layout::from_size_align(size, mem::align_of::<Self>()).expect("node layout")
    }

    fn new_in(key: K, value: V, height: usize, allocator: &impl MemAllocator) -> *mut Self {
        unsafe {
            let node = allocator.allocate(Self::layout_for(height)) as *mut Self;
            assert!(!node.is_null() && node.is_aligned());
            ptr::write(addr_of_mut!((*node).key), key);
            ptr::write(addr_of_mut!((*node).value), value);
            ptr::write_bytes((*node).tower.as_mut_ptr(), 0, height);
            node
        }
    }

    // The head carries no key or value; only its tower is initialized and it
    // is never handed out.
    fn new_head(allocator: &impl MemAllocator) -> *mut Self {
        unsafe {
            let node = allocator.allocate(Self::layout_for(MAX_HEIGHT)) as *mut Self;
            assert!(!node.is_null() && node.is_aligned());
            ptr::write_bytes((*node).tower.as_mut_ptr(), 0, MAX_HEIGHT);
            node
        }
    }
}

/// Concurrent skiplist over arena-allocated nodes. Insert-only: records are
/// never unlinked, so readers need no coordination beyond the atomic links.
pub struct SkipList<K, V, C, A> {
    height: AtomicUsize,
    head: NonNull<Node<K, V>>,
    comparator: C,
    allocator: A,
}

unsafe impl<K, V, C, A> Send for SkipList<K, V, C, A>
where
    K: Send,
    V: Send,
    C: Send,
    A: Send,
{
}

unsafe impl<K, V, C, A> Sync for SkipList<K, V, C, A>
where
    K: Sync,
    V: Sync,
    C: Sync,
    A: Sync,
{
}

impl<K, V, C, A> SkipList<K, V, C, A>
where
    C: Comparator<Item = K>,
    A: MemAllocator,
{
    pub fn new(comparator: C, allocator: A) -> Self {
        let head = Node::new_head(&allocator);
        SkipList {
            height: AtomicUsize::new(1),
            head: NonNull::new(head).expect("head allocation"),
            comparator,
            allocator,
        }
    }

    fn height(&self) -> usize {
        self.height.load(SeqCst)
    }

    pub fn mem_usage(&self) -> usize {
        self.allocator.mem_usage()
    }

    /// Finds the node nearest to `key` in the requested direction: the first
    /// node at or above `key` scanning forward, the last node at or below
    /// `key` scanning in reverse. `allow_equal` controls whether an exact
    /// match may be returned. Null when no node qualifies.
    fn find_near(&self, key: &K, allow_equal: bool, reverse: bool) -> *mut Node<K, V> {
        let head = self.head.as_ptr();
        let mut cur = head;
        let mut level = self.height() - 1;

        unsafe {
            loop {
                let next = (*cur).next(level);
                if next.is_null() {
                    if level > 0 {
                        level -= 1;
                        continue;
                    }
                    if !reverse || ptr::eq(cur, head) {
                        return null_mut();
                    }
                    return cur;
                }

                match self.comparator.compare(key, &(*next).key) {
                    Greater => {
                        cur = next;
                    }
                    Equal => {
                        if allow_equal {
                            return next;
                        }
                        if !reverse {
                            // keys are unique, so the bottom-level successor
                            // is the first strictly-greater node
                            return (*next).next(0);
                        }
                        if level > 0 {
                            level -= 1;
                            continue;
                        }
                        if ptr::eq(cur, head) {
                            return null_mut();
                        }
                        return cur;
                    }
                    Less => {
                        if level > 0 {
                            level -= 1;
                            continue;
                        }
                        if !reverse {
                            return next;
                        }
                        if ptr::eq(cur, head) {
                            return null_mut();
                        }
                        return cur;
                    }
                }
            }
        }
    }

    fn find_first(&self) -> *mut Node<K, V> {
        unsafe { (*self.head.as_ptr()).next(0) }
    }

    fn find_last(&self) -> *mut Node<K, V> {
        let head = self.head.as_ptr();
        let mut cur = head;
        let mut level = self.height() - 1;

        unsafe {
            loop {
                let next = (*cur).next(level);
                if !next.is_null() {
                    cur = next;
                    continue;
                }
                if level > 0 {
                    level -= 1;
                    continue;
                }
                if ptr::eq(cur, head) {
                    return null_mut();
                }
                return cur;
            }
        }
    }

    /// Inserts a record. Keys must be unique; inserting a key that compares
    /// equal to a stored one corrupts the list.
    pub fn insert(&self, key: K, value: V) {
        let mut list_height = self.height();
        let mut prev = [null_mut(); MAX_HEIGHT + 1];
        let mut next = [null_mut(); MAX_HEIGHT + 1];

        prev[list_height] = self.head.as_ptr();
        for level in (0..list_height).rev() {
            (prev[level], next[level]) = self.find_splice(&key, prev[level + 1], level);
            debug_assert!(!ptr::eq(prev[level], next[level]) || prev[level].is_null());
        }

        let height = random_height();
        let node_ptr = Node::new_in(key, value, height, &self.allocator);

        while height > list_height {
            match self
                .height
                .compare_exchange(list_height, height, SeqCst, SeqCst)
            {
                Ok(_) => break,
                Err(current) => list_height = current,
            }
        }

        unsafe {
            let node = &*node_ptr;
            for level in 0..height {
                loop {
                    if prev[level].is_null() {
                        // the list grew past the height we sampled earlier
                        (prev[level], next[level]) =
                            self.find_splice(&node.key, self.head.as_ptr(), level);
                    }

                    node.set_next(level, next[level]);
                    match (*prev[level]).tower[level].compare_exchange(
                        next[level],
                        node_ptr,
                        SeqCst,
                        SeqCst,
                    ) {
                        Ok(_) => break,
                        Err(_) => {
                            // a racing insert moved the splice point
                            (prev[level], next[level]) =
                                self.find_splice(&node.key, prev[level], level);
                        }
                    }
                }
            }
        }
    }

    fn find_splice(
        &self,
        key: &K,
        start: *mut Node<K, V>,
        level: usize,
    ) -> (*mut Node<K, V>, *mut Node<K, V>) {
        let mut cur = start;
        unsafe {
            loop {
                let next = (*cur).next(level);
                if next.is_null() {
                    return (cur, null_mut());
                }
                match self.comparator.compare(&(*next).key, key) {
                    Less => cur = next,
                    Equal => return (next, next),
                    Greater => return (cur, next),
                }
            }
        }
    }

    pub fn iter(self: &Arc<Self>) -> SkipListIter<K, V, C, A> {
        SkipListIter::new(self.clone())
    }
}

impl<K, V, C, A> Drop for SkipList<K, V, C, A> {
    fn drop(&mut self) {
        unsafe {
            let mut cur = (*self.head.as_ptr()).next(0);
            while !cur.is_null() {
                let next = (*cur).next(0);
                ptr::drop_in_place(cur);
                cur = next;
            }
        }
    }
}

// [1, MAX_HEIGHT], promoting one level with probability 1/BRANCH_FACTOR
fn random_height() -> usize {
    let mut height = 1;
    while height < MAX_HEIGHT && rand::random::<u32>() % BRANCH_FACTOR == 0 {
        height += 1;
    }
    height
}

/// Positional handle into a [`SkipList`]: a shared reference to the list
/// plus an opaque node pointer, null while unpositioned.
pub struct SkipListIter<K, V, C, A> {
    list: Arc<SkipList<K, V, C, A>>,
    node: *mut Node<K, V>,
}

unsafe impl<K, V, C, A> Send for SkipListIter<K, V, C, A>
where
    K: Send,
    V: Send,
    C: Send,
    A: Send,
{
}

unsafe impl<K, V, C, A> Sync for SkipListIter<K, V, C, A>
where
    K: Sync,
    V: Sync,
    C: Sync,
    A: Sync,
{
}

impl<K, V, C, A> SkipListIter<K, V, C, A>
where
    C: Comparator<Item = K>,
    A: MemAllocator,
{
    pub fn new(list: Arc<SkipList<K, V, C, A>>) -> Self {
        SkipListIter {
            list,
            node: null_mut(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.node.is_null()
    }

    pub fn key(&self) -> Option<&K> {
        if self.is_valid() {
            unsafe { Some(&(*self.node).key) }
        } else {
            None
        }
    }

    pub fn value(&self) -> Option<&V> {
        if self.is_valid() {
            unsafe { Some(&(*self.node).value) }
        } else {
            None
        }
    }

    pub fn next(&mut self) {
        assert!(self.is_valid());
        self.node = unsafe { (*self.node).next(0) };
    }

    pub fn prev(&mut self) {
        assert!(self.is_valid());
        let key = unsafe { &(*self.node).key };
        self.node = self.list.find_near(key, false, true);
    }

    /// Positions at the first node whose key is at or above `key`.
    pub fn seek(&mut self, key: &K) {
        self.node = self.list.find_near(key, true, false);
    }

    /// Positions at the last node whose key is at or below `key`.
    pub fn seek_for_prev(&mut self, key: &K) {
        self.node = self.list.find_near(key, true, true);
    }

    pub fn seek_to_first(&mut self) {
        self.node = self.list.find_first();
    }

    pub fn seek_to_last(&mut self) {
        self.node = self.list.find_last();
    }

    /// Back to the unpositioned state; the list is untouched.
    pub fn clear(&mut self) {
        self.node = null_mut();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, atomic::AtomicUsize};

    use crate::{
        arena::{BlockArena, SystemAllocator},
        comparator::OrdComparator,
    };

    use super::SkipList;

    fn new_list() -> Arc<SkipList<usize, usize, OrdComparator<usize>, BlockArena>> {
        Arc::new(SkipList::new(
            OrdComparator::default(),
            BlockArena::default(),
        ))
    }

    #[test]
    fn empty_list_drops_cleanly() {
        let list = new_list();
        let mut iter = list.iter();
        iter.seek_to_first();
        assert!(!iter.is_valid());
        iter.seek_to_last();
        assert!(!iter.is_valid());
        drop(iter);
        drop(list);
    }

    #[test]
    fn insert_and_scan_ascending() {
        const COUNT: usize = 10_000;
        let list = new_list();
        for i in 0..COUNT {
            list.insert(i, i + 1);
        }

        let mut iter = list.iter();
        iter.seek_to_first();
        for i in 0..COUNT {
            assert!(iter.is_valid());
            assert_eq!(iter.key().unwrap(), &i);
            assert_eq!(iter.value().unwrap(), &(i + 1));
            iter.next();
        }
        assert!(!iter.is_valid());
    }

    #[test]
    fn scan_descending() {
        const COUNT: usize = 1_000;
        let list = new_list();
        for i in 0..COUNT {
            list.insert(i, i);
        }

        let mut iter = list.iter();
        iter.seek_to_last();
        for i in (0..COUNT).rev() {
            assert!(iter.is_valid());
            assert_eq!(iter.key().unwrap(), &i);
            iter.prev();
        }
        assert!(!iter.is_valid());
    }

    #[test]
    fn seek_lands_at_or_above() {
        let list = new_list();
        for i in (0..100).map(|i| i * 2) {
            list.insert(i, i);
        }

        let mut iter = list.iter();
        iter.seek(&10);
        assert_eq!(iter.key().unwrap(), &10);

        iter.seek(&11);
        assert_eq!(iter.key().unwrap(), &12);

        iter.seek(&199);
        assert!(!iter.is_valid());
    }

    #[test]
    fn seek_for_prev_lands_at_or_below() {
        let list = new_list();
        for i in (0..100).map(|i| i * 2) {
            list.insert(i, i);
        }

        let mut iter = list.iter();
        iter.seek_for_prev(&10);
        assert_eq!(iter.key().unwrap(), &10);

        iter.seek_for_prev(&11);
        assert_eq!(iter.key().unwrap(), &10);

        iter.seek_for_prev(&1000);
        assert_eq!(iter.key().unwrap(), &198);

        let list = new_list();
        list.insert(5, 5);
        let mut iter = list.iter();
        iter.seek_for_prev(&4);
        assert!(!iter.is_valid());
    }

    #[test]
    fn clear_returns_to_unpositioned() {
        let list = new_list();
        list.insert(1, 1);

        let mut iter = list.iter();
        iter.seek_to_first();
        assert!(iter.is_valid());
        iter.clear();
        assert!(!iter.is_valid());
        iter.seek_to_first();
        assert!(iter.is_valid());
    }

    #[test]
    fn concurrent_inserts_are_all_visible() {
        const PER_THREAD: usize = 5_000;
        const THREADS: usize = 4;

        let list = Arc::new(SkipList::new(
            OrdComparator::default(),
            SystemAllocator::default(),
        ));

        std::thread::scope(|scope| {
            for t in 0..THREADS {
                let list = list.clone();
                scope.spawn(move || {
                    let offset = t * PER_THREAD;
                    for i in 0..PER_THREAD {
                        list.insert(offset + i, offset + i);
                    }
                });
            }
        });

        let mut iter = list.iter();
        iter.seek_to_first();
        for i in 0..PER_THREAD * THREADS {
            assert!(iter.is_valid());
            assert_eq!(iter.key().unwrap(), &i);
            iter.next();
        }
        assert!(!iter.is_valid());
    }

    #[test]
    fn stored_objects_are_dropped_with_the_list() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        #[derive(PartialEq, Eq, PartialOrd, Ord)]
        struct Tracked(usize);

        impl Drop for Tracked {
            fn drop(&mut self) {
                DROPS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let list = Arc::new(SkipList::new(
            OrdComparator::default(),
            BlockArena::default(),
        ));
        for i in 0..5 {
            list.insert(Tracked(i), ());
        }

        assert_eq!(DROPS.load(std::sync::atomic::Ordering::SeqCst), 0);
        drop(list);
        assert_eq!(DROPS.load(std::sync::atomic::Ordering::SeqCst), 5);
    }
}
