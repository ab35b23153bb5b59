use crate::{db::Database, error::Result};

/// Configuration for opening a [`Database`].
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub(crate) mem_limit: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            mem_limit: 64 << 20,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upper bound in bytes on index memory. Writes report a `Full` engine
    /// error once the bound is crossed; reads and deletes are unaffected.
    pub fn mem_limit(&mut self, bytes: usize) -> &mut Self {
        self.mem_limit = bytes;
        self
    }

    pub fn open(&self) -> Result<Database> {
        Database::open(self.clone())
    }
}
