//! Test utilities for the pinpoint crate.
//!
//! In-memory adapters for every driven port, a recording email transport, and
//! a settable clock. Shared by unit tests (in `src/`) and integration tests
//! (in `tests/`); compiled for tests and behind the `test-support` feature.

mod clock;
mod email;
mod memory;

pub use clock::MutableClock;
pub use email::{RecordingEmailTransport, SentEmail};
pub use memory::{Faults, InMemoryStore, SeededOrganization};
