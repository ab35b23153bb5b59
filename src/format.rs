use bytes::{Buf, BufMut, Bytes, BytesMut};

pub(crate) const TRAILER_LEN: usize = size_of::<u64>();

/// Trailer that sorts at the head of a user-key group, ahead of every stored
/// revision of that key.
pub(crate) const SEEK_TRAILER: u64 = u64::MAX;

/// Trailer that sorts past every stored revision of a user key, at the
/// position of the next group's head.
pub(crate) const PAST_TRAILER: u64 = 0;

/// Record kind carried in the low byte of the trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Tag {
    Tombstone = 0,
    Put = 1,
}

impl Tag {
    fn from_u8(raw: u8) -> Option<Tag> {
        match raw {
            0 => Some(Tag::Tombstone),
            1 => Some(Tag::Put),
            _ => None,
        }
    }
}

/// Internal key layout: user key ++ 8-byte little-endian trailer, the
/// trailer packing `(seq << 8) | tag`.
pub(crate) fn make_internal_key(user_key: &[u8], seq: u64, tag: Tag) -> Bytes {
    make_seek_key(user_key, (seq << 8) | tag as u64)
}

pub(crate) fn make_seek_key(user_key: &[u8], trailer: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(user_key.len() + TRAILER_LEN);
    buf.put(user_key);
    buf.put_u64_le(trailer);
    buf.freeze()
}

pub(crate) fn user_key(internal_key: &[u8]) -> &[u8] {
    assert!(internal_key.len() >= TRAILER_LEN);
    &internal_key[..internal_key.len() - TRAILER_LEN]
}

pub(crate) fn trailer(internal_key: &[u8]) -> u64 {
    assert!(internal_key.len() >= TRAILER_LEN);
    internal_key[internal_key.len() - TRAILER_LEN..]
        .as_ref()
        .get_u64_le()
}

/// Splits an internal key into user key, sequence number and tag. `None`
/// when the bytes do not form a well-formed internal key.
pub(crate) fn split(internal_key: &[u8]) -> Option<(&[u8], u64, Tag)> {
    if internal_key.len() < TRAILER_LEN {
        return None;
    }
    let trailer = trailer(internal_key);
    let tag = Tag::from_u8((trailer & 0xff) as u8)?;
    Some((user_key(internal_key), trailer >> 8, tag))
}

#[cfg(test)]
mod tests {
    use super::{PAST_TRAILER, SEEK_TRAILER, Tag, make_internal_key, make_seek_key, split, trailer};

    #[test]
    fn split_inverts_make() {
        let key = make_internal_key(b"key1", 42, Tag::Put);
        let (user, seq, tag) = split(&key).unwrap();
        assert_eq!(user, b"key1");
        assert_eq!(seq, 42);
        assert_eq!(tag, Tag::Put);

        let key = make_internal_key(b"", 7, Tag::Tombstone);
        let (user, seq, tag) = split(&key).unwrap();
        assert_eq!(user, b"");
        assert_eq!(seq, 7);
        assert_eq!(tag, Tag::Tombstone);
    }

    #[test]
    fn short_keys_do_not_split() {
        assert!(split(b"").is_none());
        assert!(split(b"1234567").is_none());
    }

    #[test]
    fn unknown_tags_do_not_split() {
        let key = make_seek_key(b"key", (1 << 8) | 0xab);
        assert!(split(&key).is_none());
    }

    #[test]
    fn group_marker_trailers_bracket_real_ones() {
        let newest = trailer(&make_internal_key(b"k", u64::MAX >> 8, Tag::Put));
        let oldest = trailer(&make_internal_key(b"k", 1, Tag::Tombstone));
        // descending trailer order puts SEEK first and PAST last
        assert!(SEEK_TRAILER > newest);
        assert!(oldest > PAST_TRAILER);
    }
}
