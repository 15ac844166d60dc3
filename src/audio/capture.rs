use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{error, info, warn};

use crate::config::VAD_SAMPLE_RATES;
use crate::error::{PipelineError, PipelineResult};

/// Outcome of one frame read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRead {
    /// The frame buffer was filled.
    Ready,
    /// Not enough samples yet; poll again.
    Pending,
    /// Samples were lost since the last read (ring full). Not fatal.
    Overrun(usize),
    /// The source has no more audio.
    Closed,
}

/// Blocking frame source owned by the capture thread. Released on drop.
pub trait CaptureDevice {
    fn sample_rate(&self) -> u32;
    fn start(&mut self) -> PipelineResult<()>;
    fn stop(&mut self) -> PipelineResult<()>;
    fn read(&mut self, frame: &mut [i16]) -> PipelineResult<FrameRead>;
}

/// Default input device streaming mono `i16` into a lock-free ring.
/// The cpal stream is not `Send`; construct this on the thread that reads it.
pub struct CpalCapture {
    stream: cpal::Stream,
    consumer: HeapCons<i16>,
    dropped: Arc<AtomicUsize>,
    sample_rate: u32,
}

impl CpalCapture {
    pub fn open(preferred_rate: u32) -> PipelineResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| PipelineError::Device("No input device available".into()))?;

        info!("Audio Input Device: {}", device.name().unwrap_or_default());

        // Preferred rate first, then any other rate the VAD accepts.
        let mut target_rates = vec![preferred_rate];
        target_rates.extend(VAD_SAMPLE_RATES.iter().copied().filter(|r| *r != preferred_rate));

        let mut selected = None;
        for &rate in &target_rates {
            for range in device.supported_input_configs()? {
                if range.min_sample_rate().0 <= rate && range.max_sample_rate().0 >= rate {
                    selected = Some(range.with_sample_rate(cpal::SampleRate(rate)));
                    break;
                }
            }
            if selected.is_some() {
                break;
            }
        }

        let config = match selected {
            Some(c) => c,
            None => {
                let def = device.default_input_config()?;
                if !VAD_SAMPLE_RATES.contains(&def.sample_rate().0) {
                    return Err(PipelineError::Device(format!(
                        "Unsupported sample rate: {}. VAD requires 8k, 16k, 32k, or 48k.",
                        def.sample_rate().0
                    )));
                }
                def
            }
        };

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        info!("Audio Config Selected: Rate={}Hz, Channels={}", sample_rate, channels);

        // Two seconds of headroom.
        let ring = HeapRb::<i16>::new(sample_rate as usize * 2);
        let (mut producer, consumer) = ring.split();
        let dropped = Arc::new(AtomicUsize::new(0));
        let dropped_cb = dropped.clone();

        let err_fn = |err| error!("an error occurred on input stream: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| {
                    write_input(data, channels, |s: f32| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16, &mut producer, &dropped_cb)
                },
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &_| write_input(data, channels, |s: i16| s, &mut producer, &dropped_cb),
                err_fn,
                None,
            )?,
            other => {
                return Err(PipelineError::Device(format!("Unsupported sample format {:?}", other)))
            }
        };

        // Opened paused; the session starts it.
        stream.pause()?;

        Ok(Self {
            stream,
            consumer,
            dropped,
            sample_rate,
        })
    }
}

impl CaptureDevice for CpalCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self) -> PipelineResult<()> {
        // Discard audio buffered while stopped.
        self.consumer.clear();
        self.stream.play()?;
        Ok(())
    }

    fn stop(&mut self) -> PipelineResult<()> {
        self.stream.pause()?;
        Ok(())
    }

    fn read(&mut self, frame: &mut [i16]) -> PipelineResult<FrameRead> {
        let lost = self.dropped.swap(0, Ordering::AcqRel);
        if lost > 0 {
            return Ok(FrameRead::Overrun(lost));
        }
        if self.consumer.occupied_len() < frame.len() {
            return Ok(FrameRead::Pending);
        }
        let popped = self.consumer.pop_slice(frame);
        if popped < frame.len() {
            warn!("Short read from capture ring: {} of {}", popped, frame.len());
            return Ok(FrameRead::Pending);
        }
        Ok(FrameRead::Ready)
    }
}

/// Down-mix interleaved input to mono and push it; count what does not fit.
fn write_input<T: Copy>(
    input: &[T],
    channels: usize,
    convert: impl Fn(T) -> i16,
    producer: &mut HeapProd<i16>,
    dropped: &AtomicUsize,
) {
    let channels = channels.max(1);
    let mut lost = 0;
    for frame in input.chunks(channels) {
        let sum: i32 = frame.iter().map(|&s| convert(s) as i32).sum();
        let mono = (sum / frame.len() as i32) as i16;
        if producer.try_push(mono).is_err() {
            lost += 1;
        }
    }
    if lost > 0 {
        dropped.fetch_add(lost, Ordering::AcqRel);
    }
}

/// Pre-recorded frames, useful for replaying captured audio through the
/// segmentation path without a device.
pub struct ScriptedCapture {
    sample_rate: u32,
    samples: Vec<i16>,
    cursor: usize,
    running: bool,
}

impl ScriptedCapture {
    pub fn new(sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            sample_rate,
            samples,
            cursor: 0,
            running: false,
        }
    }
}

impl CaptureDevice for ScriptedCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self) -> PipelineResult<()> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> PipelineResult<()> {
        self.running = false;
        Ok(())
    }

    fn read(&mut self, frame: &mut [i16]) -> PipelineResult<FrameRead> {
        if !self.running {
            return Ok(FrameRead::Pending);
        }
        let remaining = self.samples.len() - self.cursor;
        if remaining < frame.len() {
            return Ok(FrameRead::Closed);
        }
        frame.copy_from_slice(&self.samples[self.cursor..self.cursor + frame.len()]);
        self.cursor += frame.len();
        Ok(FrameRead::Ready)
    }
}
