//! # Platform Runtime
//!
//! Composition root for the CampusPost platform. Everything that crosses a
//! subsystem boundary is wired here: storage adapters behind each domain
//! port, the event-routing loop that fans bus events into the hub and the
//! dispatch engine, and the scheduler's registered job handlers.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod wiring;

pub use config::RuntimeConfig;
pub use wiring::Platform;
