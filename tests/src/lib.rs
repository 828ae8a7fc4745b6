//! # Plait Test Suite
//!
//! Unified test crate for cross-component scenarios:
//!
//! ```text
//! tests/src/
//! ├── support.rs        # Fixtures, fault injection
//! └── integration/      # Convergence, rollback, file, failure scenarios
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p plait-tests
//!
//! # By area
//! cargo test -p plait-tests integration::convergence
//! cargo test -p plait-tests integration::rollback
//! ```

pub mod integration;
