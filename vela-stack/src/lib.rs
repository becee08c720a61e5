//! Vela Stack
//!
//! Stack persistence backends for the vela package engine. The engine
//! consumes the [`vela_core::StackStore`] contract; this crate provides an
//! in-memory backend for tests and embedding, and a local JSON-file backend
//! for simple single-node use.

pub mod local;
pub mod memory;

pub use local::LocalStackStore;
pub use memory::MemoryStackStore;
