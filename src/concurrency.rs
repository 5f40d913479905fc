//! Compile-time concurrency strategy selection.
//!
//! Marker types choose between optimistic (version-checked) and unchecked
//! (last-writer-wins) commit semantics at the type level.
//!
//! # Example
//!
//! ```ignore
//! // Default: optimistic concurrency (safe)
//! let repo = Repository::new(store);
//!
//! // Opt-out for single-writer scenarios
//! let repo = Repository::new(store).without_concurrency_checking();
//! ```

use thiserror::Error;

/// No version checking - last writer wins.
///
/// Events are appended without checking whether other events were added since
/// loading. Suitable for single-writer scenarios or when conflicts are
/// acceptable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unchecked;

/// Optimistic concurrency control - version checked on every commit.
///
/// This is the default strategy for
/// [`Repository`](crate::repository::Repository). The repository records the
/// stream version when loading an aggregate and the store accepts the append
/// only if the stored event count still equals that version
/// (compare-and-append). Otherwise the commit fails with a
/// [`ConcurrencyConflict`] and nothing is appended.
#[derive(Debug, Clone, Copy, Default)]
pub struct Optimistic;

/// Sealed trait for concurrency strategy markers.
///
/// This trait cannot be implemented outside this crate, ensuring only
/// [`Unchecked`] and [`Optimistic`] can be used as concurrency strategies.
pub trait ConcurrencyStrategy: private::Sealed + Default + Send + Sync {
    /// Whether this strategy checks versions before appending.
    const CHECK_VERSION: bool;
}

impl ConcurrencyStrategy for Unchecked {
    const CHECK_VERSION: bool = false;
}

impl ConcurrencyStrategy for Optimistic {
    const CHECK_VERSION: bool = true;
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Unchecked {}
    impl Sealed for super::Optimistic {}
}

/// Error indicating a concurrency conflict during a commit.
///
/// Returned when using [`Optimistic`] concurrency and another writer has
/// appended events to the stream since the aggregate was loaded. A version is
/// the number of events in the stream, so `expected: 0` means the writer
/// expected a new, empty stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "concurrency conflict: expected version {expected}, found {actual} (hint: stream was \
     modified; reload and retry)"
)]
pub struct ConcurrencyConflict {
    /// The version the writer read at load time.
    pub expected: u64,
    /// The actual stored event count at commit time.
    pub actual: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_includes_versions_and_hint() {
        let conflict = ConcurrencyConflict {
            expected: 5,
            actual: 10,
        };
        let msg = conflict.to_string();
        assert!(msg.contains("expected version 5"));
        assert!(msg.contains("found 10"));
        assert!(msg.contains("reload and retry"));
    }

    #[test]
    fn strategies_report_version_checking() {
        assert!(Optimistic::CHECK_VERSION);
        assert!(!Unchecked::CHECK_VERSION);
    }
}
