//! # crypto-utils
//!
//! Hashing primitives, zeroizing containers, and secure random generation
//! utilities shared by the signing crates.

pub mod error;
pub mod hash;
pub mod random;
pub mod zeroizing;

pub use error::CryptoError;
