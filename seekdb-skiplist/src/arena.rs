use std::{
    alloc::Layout,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering::SeqCst},
};

use parking_lot::Mutex;

/// Bump allocator interface for skiplist nodes. Allocations live as long as
/// the allocator; nothing is freed individually.
pub trait MemAllocator: Send + Sync {
    /// # Safety
    ///
    /// The returned block is uninitialized and must be written before it is
    /// read. It must not be touched after the allocator is dropped.
    unsafe fn allocate(&self, layout: Layout) -> *mut u8;

    fn mem_usage(&self) -> usize;
}

const BLOCK_BYTES: usize = 4096;
const LARGE_ALLOC: usize = BLOCK_BYTES / 4;
const ALIGN: usize = align_of::<u64>();

struct ArenaCore {
    // u64 storage keeps every block 8-byte aligned
    blocks: Vec<Vec<u64>>,
    tail: *mut u8,
    remaining: usize,
}

unsafe impl Send for ArenaCore {}

/// Block arena: carves small allocations out of fixed-size blocks, gives
/// oversized requests a dedicated block.
pub struct BlockArena {
    core: Mutex<ArenaCore>,
    usage: AtomicUsize,
}

impl BlockArena {
    pub fn new() -> Self {
        Self {
            core: Mutex::new(ArenaCore {
                blocks: Vec::new(),
                tail: NonNull::dangling().as_ptr(),
                remaining: 0,
            }),
            usage: AtomicUsize::new(0),
        }
    }

    fn bump(&self, layout: Layout) -> NonNull<u8> {
        assert!(layout.align() <= ALIGN);
        let mut core = self.core.lock();

        if layout.size() > LARGE_ALLOC {
            return self.push_block(&mut core.blocks, layout.size());
        }

        // rounding the size up keeps the tail aligned for the next caller
        let need = (layout.size() + ALIGN - 1) & !(ALIGN - 1);
        if need > core.remaining {
            let ptr = self.push_block(&mut core.blocks, BLOCK_BYTES);
            core.tail = ptr.as_ptr();
            core.remaining = BLOCK_BYTES;
        }

        let ptr = core.tail;
        core.tail = core.tail.wrapping_add(need);
        core.remaining -= need;
        unsafe { NonNull::new_unchecked(ptr) }
    }

    fn push_block(&self, blocks: &mut Vec<Vec<u64>>, bytes: usize) -> NonNull<u8> {
        let words = bytes.div_ceil(size_of::<u64>());
        let block = vec![0u64; words];
        let ptr = block.as_ptr() as *mut u8;
        blocks.push(block);
        self.usage.fetch_add(words * size_of::<u64>(), SeqCst);
        unsafe { NonNull::new_unchecked(ptr) }
    }

    pub fn memory_usage(&self) -> usize {
        self.usage.load(SeqCst)
    }
}

impl Default for BlockArena {
    fn default() -> Self {
        Self::new()
    }
}

impl MemAllocator for BlockArena {
    unsafe fn allocate(&self, layout: Layout) -> *mut u8 {
        self.bump(layout).as_ptr()
    }

    fn mem_usage(&self) -> usize {
        self.memory_usage()
    }
}

/// Tracking allocator over the global allocator. Frees everything it handed
/// out when dropped.
#[derive(Default)]
pub struct SystemAllocator {
    allocs: Mutex<Vec<(usize, Layout)>>,
    usage: AtomicUsize,
}

impl MemAllocator for SystemAllocator {
    unsafe fn allocate(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { std::alloc::alloc(layout) };
        assert!(!ptr.is_null());
        self.allocs.lock().push((ptr as usize, layout));
        self.usage.fetch_add(layout.size(), SeqCst);
        ptr
    }

    fn mem_usage(&self) -> usize {
        self.usage.load(SeqCst)
    }
}

impl Drop for SystemAllocator {
    fn drop(&mut self) {
        for (ptr, layout) in self.allocs.get_mut().drain(..) {
            unsafe { std::alloc::dealloc(ptr as *mut u8, layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::alloc::Layout;

    use super::{BLOCK_BYTES, BlockArena, MemAllocator, SystemAllocator};

    #[test]
    fn block_arena_stays_aligned() {
        let arena = BlockArena::new();
        for size in [1usize, 3, 8, 24, 40] {
            let layout = Layout::from_size_align(size, 8).unwrap();
            let ptr = unsafe { arena.allocate(layout) };
            assert_eq!(ptr as usize % 8, 0);
        }
    }

    #[test]
    fn block_arena_accounts_usage() {
        let arena = BlockArena::new();
        assert_eq!(arena.mem_usage(), 0);

        let layout = Layout::from_size_align(16, 8).unwrap();
        unsafe { arena.allocate(layout) };
        assert_eq!(arena.mem_usage(), BLOCK_BYTES);

        // fits in the current block, no growth
        unsafe { arena.allocate(layout) };
        assert_eq!(arena.mem_usage(), BLOCK_BYTES);
    }

    #[test]
    fn block_arena_dedicates_large_blocks() {
        let arena = BlockArena::new();
        let layout = Layout::from_size_align(BLOCK_BYTES * 2, 8).unwrap();
        let ptr = unsafe { arena.allocate(layout) };
        assert_eq!(ptr as usize % 8, 0);
        assert!(arena.mem_usage() >= BLOCK_BYTES * 2);
    }

    #[test]
    fn system_allocator_accounts_usage() {
        let alloc = SystemAllocator::default();
        let layout = Layout::from_size_align(64, 8).unwrap();
        unsafe { alloc.allocate(layout) };
        unsafe { alloc.allocate(layout) };
        assert_eq!(alloc.mem_usage(), 128);
    }
}
