//! Microphone capture: cpal input stream, downmixed and resampled to
//! 16 kHz mono, delivered over a bounded channel.
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated
//! thread; the realtime callback only downmixes, resamples, and
//! `try_send`s; a full channel drops the newest chunk rather than
//! blocking the audio callback.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use tokio::sync::mpsc;

use crate::{Result, VoiceError};

/// Target sample rate for VAD and recognition.
pub const SAMPLE_RATE: u32 = 16_000;

/// Capacity of the frame channel (chunks, not samples).
const CHANNEL_CAPACITY: usize = 64;

/// Running microphone capture. Dropping it (or calling [`stop`]) ends the
/// stream thread.
pub struct MicCapture {
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
}

impl MicCapture {
    /// Open the default input device and start capturing. Returns the
    /// capture handle and the frame receiver.
    pub fn start() -> Result<(Self, mpsc::Receiver<Vec<f32>>)> {
        let (tx, rx) = mpsc::channel::<Vec<f32>>(CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<()>>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));

        let stop_flag = Arc::clone(&stop);
        let dropped_counter = Arc::clone(&dropped);
        let thread = std::thread::spawn(move || {
            let stream = match build_input_stream(tx, dropped_counter) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(error) => {
                    let _ = ready_tx.send(Err(error));
                    return;
                }
            };
            while !stop_flag.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok((
                Self {
                    stop,
                    thread: Some(thread),
                    dropped,
                },
                rx,
            )),
            Ok(Err(error)) => {
                let _ = thread.join();
                Err(error)
            }
            Err(_) => Err(VoiceError::Stream("capture thread died".into())),
        }
    }

    /// Chunks dropped because the consumer fell behind.
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop the stream and join the capture thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build_input_stream(
    tx: mpsc::Sender<Vec<f32>>,
    dropped: Arc<AtomicU64>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(VoiceError::NoInputDevice)?;
    let config = device
        .default_input_config()
        .map_err(|e| VoiceError::Stream(format!("failed to get default config: {e}")))?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;

    let stream = match config.sample_format() {
        SampleFormat::F32 => {
            let tx = tx.clone();
            device
                .build_input_stream(
                    &config.into(),
                    move |data: &[f32], _| {
                        deliver(&tx, &dropped, data, channels, sample_rate);
                    },
                    |err| tracing::error!("audio stream error: {}", err),
                    None,
                )
                .map_err(|e| VoiceError::Stream(e.to_string()))?
        }
        SampleFormat::I16 => {
            let tx = tx.clone();
            device
                .build_input_stream(
                    &config.into(),
                    move |data: &[i16], _| {
                        let float: Vec<f32> =
                            data.iter().map(|&s| s as f32 / 32768.0).collect();
                        deliver(&tx, &dropped, &float, channels, sample_rate);
                    },
                    |err| tracing::error!("audio stream error: {}", err),
                    None,
                )
                .map_err(|e| VoiceError::Stream(e.to_string()))?
        }
        format => {
            return Err(VoiceError::Stream(format!(
                "unsupported sample format: {format:?}"
            )));
        }
    };

    stream
        .play()
        .map_err(|e| VoiceError::Stream(format!("failed to start stream: {e}")))?;

    Ok(stream)
}

fn deliver(
    tx: &mpsc::Sender<Vec<f32>>,
    dropped: &AtomicU64,
    data: &[f32],
    channels: usize,
    sample_rate: u32,
) {
    let mono = downmix(data, channels);
    let samples = resample_linear(&mono, sample_rate, SAMPLE_RATE);
    match tx.try_send(samples) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            let count = dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 10 == 1 {
                tracing::warn!(dropped = count, "frame channel full, dropping audio");
            }
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

/// Average interleaved channels down to mono.
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample using linear interpolation.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio) as usize;
    let mut output = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let position = i as f64 / ratio;
        let index = position as usize;
        let fraction = position - index as f64;
        let a = samples[index.min(samples.len() - 1)];
        let b = samples[(index + 1).min(samples.len() - 1)];
        output.push(a + (b - a) * fraction as f32);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let stereo = [0.0, 1.0, 0.5, 0.5, -1.0, 1.0];
        let mono = downmix(&stereo, 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let samples = [0.1, 0.2, 0.3];
        assert_eq!(downmix(&samples, 1), samples.to_vec());
    }

    #[test]
    fn test_resample_halves_length() {
        let samples: Vec<f32> = (0..320).map(|i| i as f32).collect();
        let resampled = resample_linear(&samples, 32_000, 16_000);
        assert_eq!(resampled.len(), 160);
    }

    #[test]
    fn test_resample_same_rate_passthrough() {
        let samples = vec![0.1, 0.2];
        assert_eq!(resample_linear(&samples, 16_000, 16_000), samples);
    }
}
