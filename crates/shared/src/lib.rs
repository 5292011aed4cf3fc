//! Shared utilities for the hookrelay gateway.
//!
//! This crate provides common functionality used across all other crates:
//! - Client-assertion JWT signing over JWK keys
//! - Hashing and secret generation
//! - Cursor pagination
//! - Field validators

pub mod crypto;
pub mod jwt;
pub mod pagination;
pub mod validation;
