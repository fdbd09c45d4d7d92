//! MangaHub real-time fabric workspace root.
//!
//! The fabric itself lives in the service crates; this crate re-exports them
//! for the integration suites under `tests/integration/`, which start each
//! service in-process.

pub use chat_hub;
pub use mh_protocol;
pub use notify_bus;
pub use progress_bus;
pub use scheduler;
