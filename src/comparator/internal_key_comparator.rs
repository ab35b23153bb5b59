use std::cmp::{self, Ordering::Equal};

use crate::format::{trailer, user_key};

use super::Comparator;

/// Orders internal keys by user key ascending, then trailer descending, so
/// the newest revision of a user key is the first entry of its group.
pub struct InternalKeyComparator<C>
where
    C: Comparator,
{
    c: C,
}

impl<C> InternalKeyComparator<C>
where
    C: Comparator,
{
    pub fn new(c: C) -> Self {
        Self { c }
    }
}

impl<C> Default for InternalKeyComparator<C>
where
    C: Comparator + Default,
{
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C> Clone for InternalKeyComparator<C>
where
    C: Comparator,
{
    fn clone(&self) -> Self {
        Self { c: self.c.clone() }
    }
}

impl<C> Comparator for InternalKeyComparator<C>
where
    C: Comparator,
{
    fn compare(&self, a: &[u8], b: &[u8]) -> cmp::Ordering {
        match self.c.compare(user_key(a), user_key(b)) {
            Equal => trailer(a).cmp(&trailer(b)).reverse(),
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering::*;

    use crate::{
        comparator::prelude::*,
        format::{SEEK_TRAILER, Tag, make_internal_key, make_seek_key},
    };

    #[test]
    fn user_key_order_dominates() {
        let cmp = InternalKeyComparator::new(BytewiseComparator);

        assert_eq!(
            cmp.compare(
                &make_internal_key(b"key1", 1, Tag::Put),
                &make_internal_key(b"key2", 3, Tag::Put),
            ),
            Less
        );
        assert_eq!(
            cmp.compare(
                &make_internal_key(b"key2", 1, Tag::Put),
                &make_internal_key(b"key1", 9, Tag::Put),
            ),
            Greater
        );
    }

    #[test]
    fn newer_revisions_sort_first_within_a_group() {
        let cmp = InternalKeyComparator::new(BytewiseComparator);

        assert_eq!(
            cmp.compare(
                &make_internal_key(b"key", 2, Tag::Put),
                &make_internal_key(b"key", 1, Tag::Put),
            ),
            Less
        );
        assert_eq!(
            cmp.compare(
                &make_internal_key(b"key", 1, Tag::Put),
                &make_internal_key(b"key", 2, Tag::Put),
            ),
            Greater
        );
        assert_eq!(
            cmp.compare(
                &make_internal_key(b"key", 1, Tag::Put),
                &make_internal_key(b"key", 1, Tag::Put),
            ),
            Equal
        );
    }

    #[test]
    fn seek_key_heads_its_group() {
        let cmp = InternalKeyComparator::new(BytewiseComparator);
        let head = make_seek_key(b"key", SEEK_TRAILER);

        assert_eq!(
            cmp.compare(&head, &make_internal_key(b"key", u64::MAX >> 8, Tag::Put)),
            Less
        );
        assert_eq!(
            cmp.compare(&head, &make_internal_key(b"kez", 1, Tag::Put)),
            Less
        );
        assert_eq!(
            cmp.compare(&head, &make_internal_key(b"kex", 1, Tag::Put)),
            Greater
        );
    }
}
