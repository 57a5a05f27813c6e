//! Audio capture, ring buffer, and windowing.

pub mod capture;
pub mod chunker;
pub mod ring_buffer;

pub use capture::{list_devices, AudioDeviceInfo, CaptureDriver, CaptureFormat, CpalDriver};
pub use chunker::{AnalysisWindow, Chunker};
pub use ring_buffer::{sample_ring, AudioConsumer, AudioProducer};
