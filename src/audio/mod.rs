//! Audio subsystem module

pub mod accumulator;
pub mod host;

#[cfg(feature = "capture")]
pub mod capture;
#[cfg(feature = "capture")]
pub mod device;

pub use accumulator::{sample_accumulator, AccumulatorReader, AccumulatorWriter, SampleWindow};
pub use host::HostState;

#[cfg(feature = "capture")]
pub use capture::InputCapture;
#[cfg(feature = "capture")]
pub use device::{find_input_device, list_input_devices, InputDeviceInfo};
