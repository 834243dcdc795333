//! Microphone capture using CPAL (Cross-Platform Audio Library).

use crate::audio::frame::{mix_to_mono, resample};
use crate::audio::input::{AudioInput, CaptureTap, ChunkSink};
use crate::defaults;
use crate::error::{ParleyError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
pub(crate) fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Suppress noisy JACK/ALSA error messages that occur during audio backend probing.
///
/// # Safety
/// This modifies environment variables which is safe when called before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for PipeWire/PulseAudio desktops.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

/// How long `acquire` waits for the first callback before falling back to
/// the device's native format.
const FIRST_CALLBACK_GRACE: Duration = Duration::from_millis(200);

pub(crate) fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

pub(crate) fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List input devices usable for voice, preferred ones marked "\[recommended\]".
///
/// # Errors
/// Returns `ParleyError::DeviceUnavailable` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| ParleyError::DeviceUnavailable {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Resolve an input device by exact name, or the best default.
fn find_input_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let devices = host
                .input_devices()
                .map_err(|e| ParleyError::DeviceUnavailable {
                    message: format!("Failed to enumerate devices: {}", e),
                })?;
            for dev in devices {
                if let Ok(dev_name) = dev.name()
                    && dev_name == name
                {
                    return Ok(dev);
                }
            }
            return Err(ParleyError::DeviceUnavailable {
                message: format!("input device not found: {}", name),
            });
        }

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| ParleyError::DeviceUnavailable {
                message: "no default input device".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is only created, paused and dropped from the thread
/// that owns the `CpalMicrophone`; the audio callback never touches it.
pub(crate) struct SendableStream(pub(crate) cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone capture producing 16 kHz mono frames.
///
/// Tries f32/16kHz/mono first, then falls back to the device's default
/// config with software channel mixing and resampling.
pub struct CpalMicrophone {
    device_name: Option<String>,
    stream: Option<SendableStream>,
    tap: Arc<Mutex<CaptureTap>>,
    callback_count: Arc<AtomicU64>,
}

impl CpalMicrophone {
    /// Create a microphone for `device_name`, or the best default when `None`.
    ///
    /// The device is not opened until `acquire`.
    pub fn new(device_name: Option<&str>) -> Self {
        Self {
            device_name: device_name.map(str::to_string),
            stream: None,
            tap: Arc::new(Mutex::new(CaptureTap::default())),
            callback_count: Arc::new(AtomicU64::new(0)),
        }
    }

    fn deliver(tap: &Arc<Mutex<CaptureTap>>, samples: &[f32]) {
        if let Ok(mut tap) = tap.lock() {
            tap.feed(samples);
        }
    }

    fn build_preferred_stream(&self, device: &cpal::Device) -> Option<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(defaults::CAPTURE_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };
        let tap = Arc::clone(&self.tap);
        let counter = Arc::clone(&self.callback_count);
        device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Self::deliver(&tap, data);
                },
                |err| tracing::warn!(error = %err, "input stream error"),
                None,
            )
            .ok()
    }

    /// Build a stream at the device's native config, mixing to mono and
    /// resampling to 16 kHz in the callback.
    fn build_native_stream(&self, device: &cpal::Device) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            device
                .default_input_config()
                .map_err(|e| ParleyError::DeviceUnavailable {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels() as usize;
        let target_rate = defaults::CAPTURE_SAMPLE_RATE;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        tracing::info!(
            channels = native_channels,
            rate = native_rate,
            format = ?default_config.sample_format(),
            "using native input format, converting in software"
        );

        let err_callback = |err| tracing::warn!(error = %err, "input stream error");
        let tap = Arc::clone(&self.tap);
        let counter = Arc::clone(&self.callback_count);

        let stream = match default_config.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    let mono = mix_to_mono(data, native_channels);
                    Self::deliver(&tap, &resample(&mono, native_rate, target_rate));
                },
                err_callback,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    let floats: Vec<f32> = data
                        .iter()
                        .map(|&s| s as f32 / defaults::PCM16_SCALE)
                        .collect();
                    let mono = mix_to_mono(&floats, native_channels);
                    Self::deliver(&tap, &resample(&mono, native_rate, target_rate));
                },
                err_callback,
                None,
            ),
            fmt => {
                return Err(ParleyError::DeviceUnavailable {
                    message: format!(
                        "Unsupported native sample format: {:?}. Try another device with --device.",
                        fmt
                    ),
                });
            }
        };

        stream.map_err(|e| ParleyError::DeviceUnavailable {
            message: format!("Failed to build input stream: {}", e),
        })
    }

    fn play(stream: &cpal::Stream) -> Result<()> {
        stream.play().map_err(|e| ParleyError::DeviceUnavailable {
            message: format!("Failed to start input stream: {}", e),
        })
    }
}

impl AudioInput for CpalMicrophone {
    fn acquire(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let device = find_input_device(self.device_name.as_deref())?;
        self.callback_count.store(0, Ordering::Relaxed);

        let stream = match self.build_preferred_stream(&device) {
            Some(stream) => {
                Self::play(&stream)?;
                // Some PipeWire-ALSA setups accept non-native configs but never deliver data.
                std::thread::sleep(FIRST_CALLBACK_GRACE);
                if self.callback_count.load(Ordering::Relaxed) == 0 {
                    drop(stream);
                    let native = self.build_native_stream(&device)?;
                    Self::play(&native)?;
                    native
                } else {
                    stream
                }
            }
            None => {
                let native = self.build_native_stream(&device)?;
                Self::play(&native)?;
                native
            }
        };

        tracing::debug!(device = ?device.name().ok(), "microphone acquired");
        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn start(&mut self, sink: Box<dyn ChunkSink>) -> Result<()> {
        if self.stream.is_none() {
            return Err(ParleyError::DeviceUnavailable {
                message: "microphone not acquired".to_string(),
            });
        }
        let mut tap = self.tap.lock().map_err(|e| ParleyError::DeviceUnavailable {
            message: format!("Failed to lock capture tap: {}", e),
        })?;
        tap.attach(sink);
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut tap) = self.tap.lock() {
            if tap.is_attached() {
                tracing::debug!(
                    frames = tap.delivered(),
                    dropped_samples = tap.dropped_samples(),
                    "capture stopped"
                );
            }
            tap.detach();
        }
        if let Some(stream) = self.stream.take()
            && let Err(e) = stream.0.pause()
        {
            tracing::warn!(error = %e, "failed to pause input stream");
        }
    }

    fn is_acquired(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51"));
        assert!(should_filter_device("front:CARD=PCH"));
        assert!(should_filter_device("HDMI Output"));
        assert!(should_filter_device("Digital Output S/PDIF"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("Built-in Audio"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("PipeWire"));
        assert!(is_preferred_device("PulseAudio"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    fn test_new_does_not_open_device() {
        let mic = CpalMicrophone::new(Some("NonExistentDevice12345"));
        assert!(!mic.is_acquired());
    }

    #[test]
    fn test_acquire_with_invalid_device_name() {
        let mut mic = CpalMicrophone::new(Some("NonExistentDevice12345"));
        match mic.acquire() {
            Err(ParleyError::DeviceUnavailable { message }) => {
                assert!(message.contains("NonExistentDevice12345") || message.contains("enumerate"));
            }
            Err(other) => panic!("Expected DeviceUnavailable, got {:?}", other),
            Ok(()) => panic!("Expected acquire to fail"),
        }
        assert!(!mic.is_acquired());
    }

    #[test]
    fn test_stop_without_acquire_is_noop() {
        let mut mic = CpalMicrophone::new(None);
        mic.stop();
        mic.stop();
        assert!(!mic.is_acquired());
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_acquire_and_stream_frames() {
        let mut mic = CpalMicrophone::new(None);
        mic.acquire().expect("Failed to acquire microphone");

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = move |chunk: crate::codec::EncodedAudioChunk| {
            let _ = tx.send(chunk);
        };
        mic.start(Box::new(sink)).expect("Failed to start capture");
        std::thread::sleep(Duration::from_millis(600));
        mic.stop();

        let chunks: Vec<_> = rx.try_iter().collect();
        assert!(!chunks.is_empty(), "Expected at least one 256ms frame");
        assert_eq!(chunks[0].sample_count().unwrap(), 4096);
    }
}
