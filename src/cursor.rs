use std::sync::Arc;

use bytes::Bytes;

use crate::{
    db::DbCore,
    error::Result,
    format::{self, Tag},
    memtable::MemIter,
    status::Code,
};

/// Relational rule applied by [`Cursor::seek`] when locating a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Position exactly at the target key, or report `NotFound`.
    Exact,
    /// Position at the greatest key at or below the target.
    LessOrEqual,
    /// Position at the smallest key at or above the target.
    GreaterOrEqual,
}

/// Applies the capability negotiation: relational policies keep their range
/// semantics only on a range-capable index and degrade to an exact match
/// otherwise.
fn effective_policy(policy: MatchPolicy, range_capable: bool) -> MatchPolicy {
    if range_capable {
        policy
    } else {
        MatchPolicy::Exact
    }
}

/// Stateful handle for ordered traversal of a database's key space.
///
/// A cursor is in exactly one of three states: unpositioned (fresh, or after
/// [`reset`](Cursor::reset)), positioned on a live record, or exhausted
/// (moved past either end). Reads and deletes apply to the positioned state
/// only. A cursor is not safe for concurrent use without external
/// serialization; mutations made through one cursor become visible to
/// another on its next navigation call, not retroactively.
pub struct Cursor {
    db: Arc<DbCore>,
    state: Option<MemIter>,
    range_capable: bool,
}

impl Cursor {
    pub(crate) fn create(db: Arc<DbCore>) -> Result<Cursor> {
        let (code, state) = db.cursor_init();
        code.into_result()?;
        let range_capable = db.range_capable();
        tracing::debug!("cursor opened");
        Ok(Cursor {
            db,
            state,
            range_capable,
        })
    }

    /// Releases engine-side cursor state. Safe to call repeatedly and safe
    /// after the database handle itself was closed; both are successful
    /// no-ops.
    pub fn close(&mut self) -> Result<()> {
        if let Some(state) = self.state.take() {
            self.db.cursor_release(state).into_result()?;
            tracing::debug!("cursor closed");
        }
        Ok(())
    }

    /// True iff the cursor is positioned on a live record. Never fails and
    /// is stable between mutations.
    pub fn is_valid(&self) -> bool {
        !self.db.is_closed() && self.state.as_ref().is_some_and(MemIter::is_valid)
    }

    /// Moves to the record selected by `policy` relative to `key`.
    ///
    /// Under [`MatchPolicy::Exact`] a miss reports
    /// [`Error::NotFound`](crate::error::Error::NotFound) and leaves the
    /// cursor exhausted, so "absent" stays distinguishable from "failed".
    /// The relational policies require an index with ordered range search;
    /// on an index without it they fall back to an exact match. When no key
    /// qualifies the cursor is left exhausted, which is not an error. An
    /// empty key is a valid target and acts as the conceptual minimum.
    pub fn seek(&mut self, key: &[u8], policy: MatchPolicy) -> Result<()> {
        self.raw_seek(key, policy).into_result()
    }

    /// [`seek`](Cursor::seek) with [`MatchPolicy::LessOrEqual`].
    pub fn seek_le(&mut self, key: &[u8]) -> Result<()> {
        self.seek(key, MatchPolicy::LessOrEqual)
    }

    /// [`seek`](Cursor::seek) with [`MatchPolicy::GreaterOrEqual`].
    pub fn seek_ge(&mut self, key: &[u8]) -> Result<()> {
        self.seek(key, MatchPolicy::GreaterOrEqual)
    }

    /// Moves to the smallest key in the space, leaving the cursor exhausted
    /// when the space is empty.
    pub fn first(&mut self) -> Result<()> {
        self.raw_first().into_result()
    }

    /// Moves to the greatest key in the space, leaving the cursor exhausted
    /// when the space is empty.
    pub fn last(&mut self) -> Result<()> {
        self.raw_last().into_result()
    }

    /// Steps to the next key in ascending order. Stepping off the end leaves
    /// the cursor exhausted; calling this while not positioned is an error.
    pub fn next(&mut self) -> Result<()> {
        self.raw_next().into_result()
    }

    /// Steps to the previous key in descending order. Stepping off the front
    /// leaves the cursor exhausted; calling this while not positioned is an
    /// error.
    pub fn prev(&mut self) -> Result<()> {
        self.raw_prev().into_result()
    }

    /// Returns the key under the cursor as a freshly owned buffer.
    ///
    /// Internally a two-phase read: the engine reports the exact length,
    /// then fills a buffer of that size. The phases are never exposed
    /// separately.
    pub fn key(&self) -> Result<Bytes> {
        let (code, len) = self.raw_key_len();
        code.into_result()?;
        let mut buf = vec![0u8; len];
        self.raw_key_copy(&mut buf).into_result()?;
        Ok(Bytes::from(buf))
    }

    /// Returns the value under the cursor as a freshly owned buffer, via the
    /// same two-phase read as [`key`](Cursor::key) with a 64-bit length.
    pub fn value(&self) -> Result<Bytes> {
        let (code, len) = self.raw_value_len();
        code.into_result()?;
        let mut buf = vec![0u8; len as usize];
        self.raw_value_copy(&mut buf).into_result()?;
        Ok(Bytes::from(buf))
    }

    /// Deletes the record under the cursor, then advances to the next live
    /// record in ascending order, exhausted when none remains. Re-query
    /// [`is_valid`](Cursor::is_valid) after a delete rather than assuming
    /// the position held.
    pub fn delete(&mut self) -> Result<()> {
        self.raw_delete().into_result()
    }

    /// Returns the cursor to the unpositioned state without releasing its
    /// engine-side state; every navigation call is valid again afterwards.
    pub fn reset(&mut self) -> Result<()> {
        self.raw_reset().into_result()
    }

    fn raw_state(&mut self) -> std::result::Result<&mut MemIter, Code> {
        if self.db.is_closed() {
            return Err(Code::Closed);
        }
        self.state.as_mut().ok_or(Code::Closed)
    }

    fn raw_state_ref(&self) -> std::result::Result<&MemIter, Code> {
        if self.db.is_closed() {
            return Err(Code::Closed);
        }
        self.state.as_ref().ok_or(Code::Closed)
    }

    fn raw_seek(&mut self, key: &[u8], policy: MatchPolicy) -> Code {
        let range_capable = self.range_capable;
        let state = match self.raw_state() {
            Ok(state) => state,
            Err(code) => return code,
        };

        match effective_policy(policy, range_capable) {
            MatchPolicy::Exact => {
                state.seek_head(key);
                let code = Self::settle_forward(state);
                if !code.is_ok() {
                    return code;
                }
                let hit = matches!(
                    state.internal_key().and_then(format::split),
                    Some((user, _, _)) if user == key
                );
                if !hit {
                    state.clear();
                    return Code::NotFound;
                }
                Code::Ok
            }
            MatchPolicy::GreaterOrEqual => {
                state.seek_head(key);
                Self::settle_forward(state)
            }
            MatchPolicy::LessOrEqual => {
                state.seek_head(key);
                let code = Self::settle_forward(state);
                if !code.is_ok() {
                    return code;
                }
                let hit = matches!(
                    state.internal_key().and_then(format::split),
                    Some((user, _, _)) if user == key
                );
                if hit {
                    return Code::Ok;
                }
                Self::settle_backward(state, key)
            }
        }
    }

    fn raw_first(&mut self) -> Code {
        let state = match self.raw_state() {
            Ok(state) => state,
            Err(code) => return code,
        };
        state.seek_to_first();
        Self::settle_forward(state)
    }

    fn raw_last(&mut self) -> Code {
        let state = match self.raw_state() {
            Ok(state) => state,
            Err(code) => return code,
        };

        state.seek_to_last();
        let last_key = match Self::current_user_key(state) {
            Ok(Some(key)) => key,
            Ok(None) => return Code::Ok, // empty space, exhausted
            Err(code) => return code,
        };

        // the bottom entry of the last group is its oldest revision; hop to
        // the group head before judging liveness
        state.seek_head(&last_key);
        match Self::current_tag(state) {
            Ok(Some(Tag::Put)) => Code::Ok,
            Ok(Some(Tag::Tombstone)) => Self::settle_backward(state, &last_key),
            Ok(None) => Code::Corrupt,
            Err(code) => code,
        }
    }

    fn raw_next(&mut self) -> Code {
        let state = match self.raw_state() {
            Ok(state) => state,
            Err(code) => return code,
        };
        let current = match Self::current_user_key(state) {
            Ok(Some(key)) => key,
            Ok(None) => return Code::Invalid,
            Err(code) => return code,
        };
        state.seek_past_group(&current);
        Self::settle_forward(state)
    }

    fn raw_prev(&mut self) -> Code {
        let state = match self.raw_state() {
            Ok(state) => state,
            Err(code) => return code,
        };
        let current = match Self::current_user_key(state) {
            Ok(Some(key)) => key,
            Ok(None) => return Code::Invalid,
            Err(code) => return code,
        };
        Self::settle_backward(state, &current)
    }

    fn raw_key_len(&self) -> (Code, usize) {
        let state = match self.raw_state_ref() {
            Ok(state) => state,
            Err(code) => return (code, 0),
        };
        let Some(ikey) = state.internal_key() else {
            return (Code::Invalid, 0);
        };
        match format::split(ikey) {
            Some((user, _, _)) => (Code::Ok, user.len()),
            None => (Code::Corrupt, 0),
        }
    }

    fn raw_key_copy(&self, buf: &mut [u8]) -> Code {
        let state = match self.raw_state_ref() {
            Ok(state) => state,
            Err(code) => return code,
        };
        let Some(ikey) = state.internal_key() else {
            return Code::Invalid;
        };
        let Some((user, _, _)) = format::split(ikey) else {
            return Code::Corrupt;
        };
        if buf.len() != user.len() {
            return Code::Invalid;
        }
        buf.copy_from_slice(user);
        Code::Ok
    }

    fn raw_value_len(&self) -> (Code, u64) {
        let state = match self.raw_state_ref() {
            Ok(state) => state,
            Err(code) => return (code, 0),
        };
        match state.value() {
            Some(value) => (Code::Ok, value.len() as u64),
            None => (Code::Invalid, 0),
        }
    }

    fn raw_value_copy(&self, buf: &mut [u8]) -> Code {
        let state = match self.raw_state_ref() {
            Ok(state) => state,
            Err(code) => return code,
        };
        let Some(value) = state.value() else {
            return Code::Invalid;
        };
        if buf.len() != value.len() {
            return Code::Invalid;
        }
        buf.copy_from_slice(value);
        Code::Ok
    }

    fn raw_delete(&mut self) -> Code {
        let current = {
            let state = match self.raw_state() {
                Ok(state) => state,
                Err(code) => return code,
            };
            match Self::current_user_key(state) {
                Ok(Some(key)) => key,
                Ok(None) => return Code::Invalid,
                Err(code) => return code,
            }
        };

        let code = self.db.kv_delete(&current);
        if !code.is_ok() {
            return code;
        }

        // the deleted group is dead now; land on the next live record
        let state = match self.raw_state() {
            Ok(state) => state,
            Err(code) => return code,
        };
        state.seek_past_group(&current);
        Self::settle_forward(state)
    }

    fn raw_reset(&mut self) -> Code {
        let state = match self.raw_state() {
            Ok(state) => state,
            Err(code) => return code,
        };
        state.clear();
        Code::Ok
    }

    fn current_user_key(state: &MemIter) -> std::result::Result<Option<Bytes>, Code> {
        match state.internal_key() {
            None => Ok(None),
            Some(ikey) => match format::split(ikey) {
                Some((user, _, _)) => Ok(Some(Bytes::copy_from_slice(user))),
                None => Err(Code::Corrupt),
            },
        }
    }

    fn current_tag(state: &MemIter) -> std::result::Result<Option<Tag>, Code> {
        match state.internal_key() {
            None => Ok(None),
            Some(ikey) => match format::split(ikey) {
                Some((_, _, tag)) => Ok(Some(tag)),
                None => Err(Code::Corrupt),
            },
        }
    }

    /// Walks forward from a group head until a live record is found, leaving
    /// the iterator exhausted when none remains.
    fn settle_forward(state: &mut MemIter) -> Code {
        loop {
            let dead_key = match state.internal_key() {
                None => return Code::Ok, // exhausted
                Some(ikey) => match format::split(ikey) {
                    Some((_, _, Tag::Put)) => return Code::Ok,
                    Some((user, _, Tag::Tombstone)) => Bytes::copy_from_slice(user),
                    None => return Code::Corrupt,
                },
            };
            state.seek_past_group(&dead_key);
        }
    }

    /// Walks backward to the newest live record of the greatest group
    /// strictly below `from`, leaving the iterator exhausted when none
    /// exists.
    fn settle_backward(state: &mut MemIter, from: &[u8]) -> Code {
        let mut probe = Bytes::copy_from_slice(from);
        loop {
            state.seek_before_group(&probe);
            let prev_key = match state.internal_key() {
                None => return Code::Ok, // exhausted below the first group
                Some(ikey) => match format::split(ikey) {
                    Some((user, _, _)) => Bytes::copy_from_slice(user),
                    None => return Code::Corrupt,
                },
            };

            // the group was just observed, so its head exists
            state.seek_head(&prev_key);
            match state.internal_key().and_then(format::split) {
                Some((_, _, Tag::Put)) => return Code::Ok,
                Some((_, _, Tag::Tombstone)) => probe = prev_key,
                None => return Code::Corrupt,
            }
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::error!("failed to release cursor: {err}");
        }
    }
}
