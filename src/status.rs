use std::fmt;

use crate::error::{Error, Result};

/// Raw result codes reported by the engine core. Public operations never
/// surface a `Code` on success paths; [`Code::into_result`] is the single
/// point where codes become typed errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Code {
    Ok = 0,
    /// No record matched an exact lookup. Distinct from failure so callers
    /// can branch on "absent" versus "broken".
    NotFound = -1,
    /// The operation does not apply to the cursor's current state.
    Invalid = -2,
    /// Stored bytes failed to parse back into an internal key.
    Corrupt = -3,
    /// The configured memory budget is exhausted.
    Full = -4,
    /// The database handle is closed.
    Closed = -5,
}

impl Code {
    pub fn is_ok(self) -> bool {
        self == Code::Ok
    }

    pub fn message(self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::NotFound => "no matching record",
            Code::Invalid => "cursor is not positioned on a record",
            Code::Corrupt => "malformed internal key",
            Code::Full => "memory budget exhausted",
            Code::Closed => "database handle is closed",
        }
    }

    pub(crate) fn into_result(self) -> Result<()> {
        match self {
            Code::Ok => Ok(()),
            Code::NotFound => Err(Error::NotFound),
            Code::Closed => Err(Error::Closed),
            code => Err(Error::Engine(code)),
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), *self as i32)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;

    use super::Code;

    #[test]
    fn translation_keeps_the_taxonomy_apart() {
        assert!(Code::Ok.into_result().is_ok());
        assert!(matches!(Code::NotFound.into_result(), Err(Error::NotFound)));
        assert!(matches!(Code::Closed.into_result(), Err(Error::Closed)));
        assert!(matches!(
            Code::Full.into_result(),
            Err(Error::Engine(Code::Full))
        ));
        assert!(matches!(
            Code::Invalid.into_result(),
            Err(Error::Engine(Code::Invalid))
        ));
    }

    #[test]
    fn codes_render_message_and_value() {
        assert_eq!(Code::NotFound.to_string(), "no matching record (-1)");
        assert_eq!(Code::Ok.to_string(), "ok (0)");
    }
}
