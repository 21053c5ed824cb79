// SPDX-License-Identifier: Apache-2.0

//! Key material and the searchable field cipher.

pub mod backend;
pub mod cipher;
pub mod key;

pub use backend::{CredentialProvider, KeyringProvider, MockProvider};
pub use cipher::FieldCipher;
pub use key::{KeyMaterial, KeySource};
