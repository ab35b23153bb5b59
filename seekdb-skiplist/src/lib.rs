pub mod arena;
pub mod comparator;
pub mod list;

pub mod prelude {
    #![allow(unused)]

    pub use crate::arena::{BlockArena, MemAllocator, SystemAllocator};
    pub use crate::comparator::{Comparator, OrdComparator};
    pub use crate::list::{SkipList, SkipListIter};
}
