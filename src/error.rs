use crate::status::Code;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An exact seek or a delete found no matching record.
    #[error("record not found")]
    NotFound,

    /// The operation reached a database handle that is already closed.
    #[error("database is closed")]
    Closed,

    /// Opaque engine failure, propagated verbatim.
    #[error("engine error: {0}")]
    Engine(Code),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
