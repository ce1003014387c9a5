//! Warden - Admission Control for Request-Validation Front Doors
//!
//! This crate implements a per-identity rate limiter that enforces a
//! trailing-minute and a trailing-hour ceiling at once. Each front door
//! (chat, HTTP API) owns an independent limiter, and a background janitor
//! evicts identities that went quiet so memory stays bounded.

pub mod config;
pub mod error;
pub mod frontdoor;
pub mod ratelimit;
