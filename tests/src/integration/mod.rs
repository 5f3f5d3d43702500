//! Cross-context flows: every test wires two or more buses to one
//! [`event_bus::BroadcastHub`], standing in for tabs of the same application.

pub mod broadcast;
pub mod telemetry;
