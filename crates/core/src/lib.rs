//! core data types and wire format for motelink

pub mod sample;
pub mod types;
pub mod wire;

pub use sample::{SampleBuffer, SamplePair, SetQueue};
pub use types::{NodeId, Rssi};
pub use wire::{Frame, FrameType, WireError, FLAG_ACK};
