//! Speaker output clock backed by a CPAL output stream.
//!
//! The audio callback owns a `Mixer`; the control side talks to it only
//! through a lock-free command channel, and reads the rendered frame count
//! from an atomic to answer `now()`.

use crate::audio::capture::{
    SendableStream, is_preferred_device, should_filter_device, with_suppressed_stderr,
};
use crate::audio::clock::{ClockFactory, EndedNotifier, OutputClock, SourceId};
use crate::audio::frame::resample;
use crate::defaults;
use crate::error::{ParleyError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

enum MixerCommand {
    Play {
        id: SourceId,
        start_frame: u64,
        samples: Vec<f32>,
    },
    Stop(SourceId),
}

struct Voice {
    id: SourceId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Sums scheduled voices into interleaved output blocks.
pub(crate) struct Mixer {
    voices: Vec<Voice>,
    commands: Receiver<MixerCommand>,
    channels: usize,
    frame: u64,
    frames_played: Arc<AtomicU64>,
    on_ended: EndedNotifier,
}

impl Mixer {
    fn new(
        commands: Receiver<MixerCommand>,
        channels: usize,
        frames_played: Arc<AtomicU64>,
        on_ended: EndedNotifier,
    ) -> Self {
        Self {
            voices: Vec::new(),
            commands,
            channels: channels.max(1),
            frame: 0,
            frames_played,
            on_ended,
        }
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                MixerCommand::Play {
                    id,
                    start_frame,
                    samples,
                } => {
                    // A start time that slipped into the past plays immediately, in full.
                    self.voices.push(Voice {
                        id,
                        start_frame: start_frame.max(self.frame),
                        samples,
                    });
                }
                MixerCommand::Stop(id) => self.voices.retain(|v| v.id != id),
            }
        }
    }

    /// Fill one interleaved output block and advance the timeline.
    pub(crate) fn render(&mut self, out: &mut [f32]) {
        self.apply_commands();
        out.fill(0.0);

        let frames = (out.len() / self.channels) as u64;
        let block_start = self.frame;
        let block_end = block_start + frames;

        for voice in &self.voices {
            let from = voice.start_frame.max(block_start);
            let to = voice.end_frame().min(block_end);
            for f in from..to {
                let sample = voice.samples[(f - voice.start_frame) as usize];
                let base = (f - block_start) as usize * self.channels;
                for slot in &mut out[base..base + self.channels] {
                    *slot += sample;
                }
            }
        }

        self.frame = block_end;
        self.frames_played.store(block_end, Ordering::Release);

        let on_ended = &self.on_ended;
        self.voices.retain(|voice| {
            let done = voice.end_frame() <= block_end;
            if done {
                on_ended(voice.id);
            }
            !done
        });
    }
}

/// List output devices, preferred ones marked "\[recommended\]".
pub fn list_output_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.output_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| ParleyError::AudioOutput {
        message: format!("Failed to enumerate output devices: {}", e),
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

fn find_output_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        if let Some(name) = device_name {
            let devices = host
                .output_devices()
                .map_err(|e| ParleyError::AudioOutput {
                    message: format!("Failed to enumerate output devices: {}", e),
                })?;
            for dev in devices {
                if let Ok(dev_name) = dev.name()
                    && dev_name == name
                {
                    return Ok(dev);
                }
            }
            return Err(ParleyError::AudioOutput {
                message: format!("output device not found: {}", name),
            });
        }
        if let Ok(devices) = host.output_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }
        host.default_output_device()
            .ok_or_else(|| ParleyError::AudioOutput {
                message: "no default output device".to_string(),
            })
    })
}

/// Output clock rendering scheduled buffers through the speakers.
pub struct CpalOutputClock {
    stream: Option<SendableStream>,
    commands: Sender<MixerCommand>,
    frames_played: Arc<AtomicU64>,
    sample_rate: u32,
    device_rate: u32,
}

impl CpalOutputClock {
    /// Open an output stream rendering `sample_rate` mono buffers.
    ///
    /// Uses f32/mono at `sample_rate` when the device accepts it, otherwise the
    /// device's default config with buffers resampled on schedule.
    pub fn open(
        device_name: Option<&str>,
        sample_rate: u32,
        on_ended: EndedNotifier,
    ) -> Result<Self> {
        let device = find_output_device(device_name)?;
        let frames_played = Arc::new(AtomicU64::new(0));
        let (commands, receiver) = crossbeam_channel::unbounded();

        let preferred = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let mut mixer = Mixer::new(
            receiver.clone(),
            1,
            Arc::clone(&frames_played),
            Arc::clone(&on_ended),
        );
        let err_callback = |err| tracing::warn!(error = %err, "output stream error");

        let (stream, device_rate) = match device.build_output_stream(
            &preferred,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| mixer.render(data),
            err_callback,
            None,
        ) {
            Ok(stream) => (stream, sample_rate),
            Err(e) => {
                tracing::info!(error = %e, "output device rejected {} Hz mono, using native format", sample_rate);
                Self::build_native(&device, receiver, Arc::clone(&frames_played), on_ended)?
            }
        };

        stream.play().map_err(|e| ParleyError::AudioOutput {
            message: format!("Failed to start output stream: {}", e),
        })?;

        Ok(Self {
            stream: Some(SendableStream(stream)),
            commands,
            frames_played,
            sample_rate,
            device_rate,
        })
    }

    fn build_native(
        device: &cpal::Device,
        receiver: Receiver<MixerCommand>,
        frames_played: Arc<AtomicU64>,
        on_ended: EndedNotifier,
    ) -> Result<(cpal::Stream, u32)> {
        use cpal::SampleFormat;

        let default_config =
            device
                .default_output_config()
                .map_err(|e| ParleyError::AudioOutput {
                    message: format!("Failed to query default output config: {}", e),
                })?;
        let device_rate = default_config.sample_rate().0;
        let channels = default_config.channels() as usize;
        let stream_config: cpal::StreamConfig = default_config.clone().into();
        let mut mixer = Mixer::new(receiver, channels, frames_played, on_ended);
        let err_callback = |err| tracing::warn!(error = %err, "output stream error");

        let stream = match default_config.sample_format() {
            SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| mixer.render(data),
                err_callback,
                None,
            ),
            SampleFormat::I16 => {
                let mut scratch: Vec<f32> = Vec::new();
                device.build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        scratch.resize(data.len(), 0.0);
                        mixer.render(&mut scratch);
                        for (out, &s) in data.iter_mut().zip(scratch.iter()) {
                            let scaled = (s * defaults::PCM16_SCALE).round();
                            *out = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                        }
                    },
                    err_callback,
                    None,
                )
            }
            fmt => {
                return Err(ParleyError::AudioOutput {
                    message: format!("Unsupported output sample format: {:?}", fmt),
                });
            }
        };

        let stream = stream.map_err(|e| ParleyError::AudioOutput {
            message: format!("Failed to build output stream: {}", e),
        })?;
        Ok((stream, device_rate))
    }
}

impl OutputClock for CpalOutputClock {
    fn now(&self) -> f64 {
        self.frames_played.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule(&mut self, id: SourceId, samples: Vec<f32>, start_at: f64) -> Result<()> {
        if self.stream.is_none() {
            return Err(ParleyError::AudioOutput {
                message: "output clock is closed".to_string(),
            });
        }
        let samples = if self.device_rate == self.sample_rate {
            samples
        } else {
            resample(&samples, self.sample_rate, self.device_rate)
        };
        let start_frame = (start_at.max(0.0) * self.device_rate as f64).round() as u64;
        self.commands
            .send(MixerCommand::Play {
                id,
                start_frame,
                samples,
            })
            .map_err(|_| ParleyError::AudioOutput {
                message: "output stream is gone".to_string(),
            })
    }

    fn stop_source(&mut self, id: SourceId) {
        if self.stream.is_some() {
            let _ = self.commands.send(MixerCommand::Stop(id));
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take()
            && let Err(e) = stream.0.pause()
        {
            tracing::warn!(error = %e, "failed to pause output stream");
        }
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl Drop for CpalOutputClock {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens one speaker clock per session on the configured output device.
pub struct CpalClockFactory {
    device_name: Option<String>,
    on_ended: EndedNotifier,
}

impl CpalClockFactory {
    pub fn new(device_name: Option<&str>, on_ended: EndedNotifier) -> Self {
        Self {
            device_name: device_name.map(str::to_string),
            on_ended,
        }
    }
}

impl ClockFactory for CpalClockFactory {
    fn create(&mut self, sample_rate: u32) -> Result<Box<dyn OutputClock>> {
        let clock = CpalOutputClock::open(
            self.device_name.as_deref(),
            sample_rate,
            Arc::clone(&self.on_ended),
        )?;
        Ok(Box::new(clock))
    }
}
