//! Shared types and wire events for the Crosstalk platform.
//!
//! This crate provides the foundational types used across all Crosstalk
//! crates: the closed inbound/outbound event unions spoken over the
//! WebSocket transport, and the friend-list payload shapes.
//!
//! No crate in the workspace depends on anything *except* `crosstalk-types`
//! for cross-cutting type definitions. This keeps the dependency graph clean
//! and prevents circular dependencies.

mod event;

pub use event::{FriendInfo, InboundEvent, OutboundEvent};

/// Default source language tag applied when a client omits one.
pub const DEFAULT_SOURCE_LANGUAGE: &str = "tr";

/// Default target language tag applied when a client omits one.
pub const DEFAULT_TARGET_LANGUAGE: &str = "en";
