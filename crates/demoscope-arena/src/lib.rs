//! Growable bump arena and per-message scratch buffers for demo decoding.
//!
//! Decoding a demo produces thousands of short-lived, variably-sized
//! allocations per message (names, strings, string-table entries). This
//! crate services them from a small number of large blocks that are reset
//! in bulk instead of freed one by one.
//!
//! # Architecture
//!
//! ```text
//! Arena (one per pool: session-long schema names, per-message temporaries)
//! ├── Block[] (power-of-two growth, capped at u32::MAX bytes)
//! │   └── Vec<u8> + used cursor
//! └── generation counter (bumped by clear/free, stamped into ArenaSlot)
//!
//! MessageBuffer (payload bytes of the message in flight)
//! └── SmallVec<[u8; 8192]>, spills to the heap for larger payloads
//! ```
//!
//! Allocations never move. An [`ArenaSlot`] resolves to the same bytes
//! until the arena is cleared or freed; after that it is reported as stale.
//! The crate contains no `unsafe` code.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod arena;
pub mod block;
pub mod config;
pub mod error;
pub mod handle;
pub mod scratch;

pub use arena::Arena;
pub use config::ArenaConfig;
pub use error::ArenaError;
pub use handle::ArenaSlot;
pub use scratch::MessageBuffer;
