// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Concrete collaborators behind the domain traits, plus the
// metrics log:
//
//   artifact_store.rs — Atomic on-disk bundles. Stages a full
//                       bundle directory, then swaps a CURRENT
//                       pointer by temp file + rename.
//
//   corpus_store.rs   — The labelled corpus and training history
//                       in SQLite (rusqlite), with an in-memory
//                       twin for tests.
//
//   notifier.rs       — Job-progress events to the log or to an
//                       mpsc channel subscriber.
//
//   metrics.rs        — Per-epoch training metrics appended to a
//                       CSV file.
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §16 (Shared-State Concurrency)

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Atomic bundle persistence
pub mod artifact_store;

/// SQLite and in-memory corpus stores
pub mod corpus_store;

/// Notification sinks
pub mod notifier;

/// Training metrics CSV logger
pub mod metrics;

/// Current UTC time as RFC 3339 text.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}
