//! # Shared Types Crate
//!
//! Domain entities and wire shapes used across the Plait synchronization
//! core: addresses, mutations and their persisted records, and the
//! per-aggregate state records (members, properties, collection records,
//! file attachments).
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary
//!   lives here.
//! - **Wire Fidelity**: serialized forms use camelCase field names and
//!   kebab-case action tags, matching what peers put on the wire.

pub mod address;
pub mod entities;

pub use address::Address;
pub use entities::*;
