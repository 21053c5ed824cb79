// SPDX-License-Identifier: Apache-2.0

//! Encryption Policies
//!
//! Field declarations come from the mapping layer through a [`PolicySource`];
//! the [`PolicyRegistry`] turns them into per-type column maps and caches
//! them for the life of the process.

pub mod declaration;
pub mod registry;

pub use declaration::{
    EncryptedEntity, FieldDeclaration, PolicySource, StaticPolicySource, TypeDeclarations,
};
pub use registry::{EncryptionPolicy, PolicyMap, PolicyRegistry};
