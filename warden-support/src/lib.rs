//! # Warden Support
//!
//! Shared utilities for the Warden DI framework.
//!
//! This crate provides:
//! - Text rendering for error messages
//! - Common utilities shared between warden crates

pub mod rendering;
