// SPDX-License-Identifier: Apache-2.0

//! veil-core: shared vocabulary for veilsql.
//!
//! Provides the unified error type and the small value types that every
//! other crate in the workspace speaks: encryption modes, statement and
//! clause kinds, and bound parameter values.

pub mod error;
pub mod types;

pub use error::{VeilError, VeilResult};
pub use types::*;
