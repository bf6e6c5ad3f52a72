//! Mock gateway implementation for testing and development.
//!
//! This module provides a simulated scanner driver that can be scripted
//! programmatically without requiring physical hardware.

pub mod gateway;

// Re-export commonly used types
pub use gateway::{GatewayCall, MockDevice, MockGateway, MockGatewayHandle, MockOperation};
