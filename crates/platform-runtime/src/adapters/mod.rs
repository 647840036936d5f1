//! Adapters bridging subsystem ports to other subsystems' services.

pub mod ai;
pub mod barcode_control;
pub mod courier_directory;
