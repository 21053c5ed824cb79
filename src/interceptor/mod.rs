// SPDX-License-Identifier: Apache-2.0

//! Statement Interceptor
//!
//! Rewrites outgoing statements so conditions on protected columns match
//! their encrypted storage:
//! - **Statement rewriting**: column redirection and inline literal encryption
//! - **Parameter rewriting**: ciphertext for bound call arguments, per-field
//!   handlers for values taken from mapped entities
//! - **Escape hatch**: a single-use toggle carried in the [`CallContext`]
//!
//! Anything the parser cannot handle passes through unmodified.

pub mod handler;
pub mod params;
pub mod pipeline;
pub mod rewriter;
pub mod toggle;
pub mod types;

pub use handler::FieldHandler;
pub use params::ParameterRewriter;
pub use pipeline::InterceptionPipeline;
pub use rewriter::StatementRewriter;
pub use toggle::{CallContext, InterceptionToggle};
pub use types::*;
