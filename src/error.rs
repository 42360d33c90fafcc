//! # Error Codes and Typed Failures
//!
//! Every public operation reports failures through [`eyre::Report`], with a
//! typed [`DbError`] as the root cause whenever the failure maps onto one of
//! the engine's stable result codes. The connection additionally retains the
//! most recent `(code, message)` pair so callers can inspect it after the
//! fact, mirroring the classic errcode/errmsg pattern of embedded databases.
//!
//! The integer values of [`ErrorCode`] are part of the on-the-wire API and
//! must never change.

use std::fmt;

/// Stable result codes surfaced to callers.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok = 0,
    Error = 1,
    Busy = 2,
    Locked = 3,
    NoMem = 4,
    ReadOnly = 5,
    IoError = 6,
    Corrupt = 7,
    NotFound = 8,
    Full = 9,
    CantOpen = 10,
    Constraint = 11,
    Mismatch = 12,
    Misuse = 13,
    Range = 14,
    Row = 100,
    Done = 101,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Recovers the code carried by a report, or `Error` for untyped failures.
    pub fn of(report: &eyre::Report) -> ErrorCode {
        report
            .chain()
            .find_map(|cause| cause.downcast_ref::<DbError>())
            .map(|e| e.code)
            .unwrap_or(ErrorCode::Error)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Ok => "ok",
            ErrorCode::Error => "error",
            ErrorCode::Busy => "busy",
            ErrorCode::Locked => "locked",
            ErrorCode::NoMem => "out of memory",
            ErrorCode::ReadOnly => "attempt to write a readonly database",
            ErrorCode::IoError => "disk I/O error",
            ErrorCode::Corrupt => "database disk image is malformed",
            ErrorCode::NotFound => "not found",
            ErrorCode::Full => "database or page is full",
            ErrorCode::CantOpen => "unable to open database file",
            ErrorCode::Constraint => "constraint failed",
            ErrorCode::Mismatch => "datatype mismatch",
            ErrorCode::Misuse => "library routine called out of sequence",
            ErrorCode::Range => "bind or column index out of range",
            ErrorCode::Row => "row available",
            ErrorCode::Done => "done",
        };
        f.write_str(name)
    }
}

/// A failure carrying a stable result code. Attach context with the usual
/// `eyre` combinators; `ErrorCode::of` digs the code back out of the chain.
#[derive(Debug)]
pub struct DbError {
    pub code: ErrorCode,
    pub message: String,
}

impl DbError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for DbError {}

/// Builds an `eyre::Report` rooted in a typed [`DbError`].
pub fn db_err(code: ErrorCode, message: impl Into<String>) -> eyre::Report {
    eyre::Report::new(DbError::new(code, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Ok.as_i32(), 0);
        assert_eq!(ErrorCode::Corrupt.as_i32(), 7);
        assert_eq!(ErrorCode::Constraint.as_i32(), 11);
        assert_eq!(ErrorCode::Misuse.as_i32(), 13);
        assert_eq!(ErrorCode::Range.as_i32(), 14);
        assert_eq!(ErrorCode::Row.as_i32(), 100);
        assert_eq!(ErrorCode::Done.as_i32(), 101);
    }

    #[test]
    fn code_survives_context_chain() {
        let report: eyre::Report = Err::<(), _>(db_err(ErrorCode::Constraint, "duplicate key"))
            .wrap_err("inserting row 42")
            .wrap_err("executing INSERT")
            .unwrap_err();

        assert_eq!(ErrorCode::of(&report), ErrorCode::Constraint);
    }

    #[test]
    fn untyped_report_maps_to_generic_error() {
        let report = eyre::eyre!("something else went wrong");
        assert_eq!(ErrorCode::of(&report), ErrorCode::Error);
    }
}
