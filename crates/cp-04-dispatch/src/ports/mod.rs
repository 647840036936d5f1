//! Ports: what this subsystem needs from the outside world.

pub mod outbound;
