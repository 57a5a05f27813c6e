//! Audio capture via cpal.
//!
//! Opens the default (or named) input device and streams its native format
//! into the ring buffer. The cpal callback does nothing but copy samples
//! into the lock-free producer (no allocation, no locks, no format
//! conversion) so the real-time thread can never stall. Downmixing and
//! resampling happen later on the pipeline side.
//!
//! `CaptureDriver` is the seam the orchestrator talks through; tests swap
//! in a driver that feeds synthetic audio instead of a microphone.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::ring_buffer::AudioProducer;
use crate::session::SessionError;

/// An input device as reported to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub id: i32,
    pub name: String,
    pub is_default: bool,
}

/// Native format of an opened capture stream. The pipeline uses this to
/// convert into the canonical analysis format.
#[derive(Debug, Clone, Copy)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Seam between the orchestrator and the audio device.
///
/// `start` must hand the producer to whatever generates samples and report
/// the native stream format; `stop` must cease sample production.
pub trait CaptureDriver: Send {
    fn start(
        &mut self,
        device: Option<&str>,
        producer: AudioProducer,
    ) -> Result<CaptureFormat, SessionError>;

    fn stop(&mut self);
}

/// List available input devices.
pub fn list_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    if let Ok(inputs) = host.input_devices() {
        for (i, dev) in inputs.enumerate() {
            if let Ok(name) = dev.name() {
                let is_default = default_name.as_deref() == Some(name.as_str());
                devices.push(AudioDeviceInfo {
                    id: i as i32,
                    name,
                    is_default,
                });
            }
        }
    }
    devices
}

/// Resolved input device plus the stream config we will open it with.
struct ResolvedDevice {
    device: cpal::Device,
    stream_config: StreamConfig,
    format: CaptureFormat,
}

/// Find and configure the input device. `None` selects the system default.
fn resolve_device(device_name: Option<&str>) -> Result<ResolvedDevice, SessionError> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| {
                SessionError::DeviceUnavailable(format!("failed to enumerate input devices: {e}"))
            })?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| {
                SessionError::DeviceUnavailable(format!("input device not found: {name}"))
            })?
    } else {
        host.default_input_device().ok_or_else(|| {
            SessionError::DeviceUnavailable("no default input device available".to_string())
        })?
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());

    let default_config = device.default_input_config().map_err(|e| {
        SessionError::DeviceUnavailable(format!("failed to get default input config: {e}"))
    })?;

    let format = CaptureFormat {
        sample_rate: default_config.sample_rate().0,
        channels: default_config.channels(),
    };
    let stream_config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        device = %dev_name,
        native_rate = format.sample_rate,
        channels = format.channels,
        "selected input device"
    );

    Ok(ResolvedDevice {
        device,
        stream_config,
        format,
    })
}

/// Production capture driver backed by cpal.
///
/// `cpal::Stream` is not `Send`, so the stream lives on a dedicated thread
/// that parks until `stop` signals it to drop the stream and exit.
pub struct CpalDriver {
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    done_rx: Option<std::sync::mpsc::Receiver<()>>,
}

impl CpalDriver {
    /// Upper bound on waiting for the capture thread to drop its stream.
    const STOP_ACK_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);

    pub fn new() -> Self {
        Self {
            stop_tx: None,
            done_rx: None,
        }
    }
}

impl Default for CpalDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDriver for CpalDriver {
    fn start(
        &mut self,
        device: Option<&str>,
        producer: AudioProducer,
    ) -> Result<CaptureFormat, SessionError> {
        let device_name = device.map(String::from);
        let (format_tx, format_rx) = std::sync::mpsc::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let resolved = match resolve_device(device_name.as_deref()) {
                    Ok(r) => r,
                    Err(e) => {
                        let _ = format_tx.send(Err(e));
                        return;
                    }
                };
                let format = resolved.format;

                let stream = resolved.device.build_input_stream(
                    &resolved.stream_config,
                    move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                        // Real-time context: copy into the ring and nothing else.
                        producer.write(data);
                    },
                    move |err| {
                        // Degrades to silence; the pipeline keeps running.
                        error!("audio input stream error: {err}");
                    },
                    None,
                );
                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = format_tx.send(Err(SessionError::DeviceUnavailable(format!(
                            "failed to build input stream: {e}"
                        ))));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = format_tx.send(Err(SessionError::DeviceUnavailable(format!(
                        "failed to start input stream: {e}"
                    ))));
                    return;
                }

                let _ = format_tx.send(Ok(format));
                info!("audio capture started");

                // Park until stop (or the driver is dropped), keeping the
                // stream alive.
                let _ = stop_rx.recv();
                drop(stream);
                let _ = done_tx.send(());
                info!("audio capture stopped");
            })
            .map_err(|e| {
                SessionError::DeviceUnavailable(format!("failed to spawn capture thread: {e}"))
            })?;

        let format = format_rx.recv().map_err(|_| {
            SessionError::DeviceUnavailable("capture thread exited unexpectedly".to_string())
        })??;

        self.stop_tx = Some(stop_tx);
        self.done_rx = Some(done_rx);
        Ok(format)
    }

    fn stop(&mut self) {
        // Dropping the sender unparks the capture thread.
        self.stop_tx = None;
        // Wait for the thread to drop the stream before returning. Callback
        // buffers in flight land in the ring first, so a drain that follows
        // stop sees the session tail.
        if let Some(done_rx) = self.done_rx.take() {
            let _ = done_rx.recv_timeout(Self::STOP_ACK_TIMEOUT);
        }
    }
}

impl Drop for CpalDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
