use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use rubato::{FftFixedIn, Resampler};
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, PipelineResult};

const RESAMPLE_CHUNK: usize = 1024;
// No ring progress for this long means the device stopped pulling.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);
const WAIT_SLICE: Duration = Duration::from_millis(5);

/// PCM returned by the synthesis collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Ordered output device.
#[async_trait]
pub trait AudioSink: Send {
    /// Queue a chunk behind everything written before it.
    async fn write(&mut self, chunk: &AudioChunk) -> PipelineResult<()>;
    /// Wait until everything written so far has been played.
    async fn drain(&mut self) -> PipelineResult<()>;
    /// Drop whatever is still queued.
    fn stop(&mut self);
}

/// Default output device behind a ring buffer. The cpal stream lives on its
/// own thread; this handle only holds the producer side.
pub struct CpalPlayback {
    producer: HeapProd<f32>,
    flush: Arc<AtomicBool>,
    device_rate: u32,
    shutdown: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalPlayback {
    pub fn open(preferred_rate: u32) -> PipelineResult<Self> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();
        let flush = Arc::new(AtomicBool::new(false));
        let flush_cb = flush.clone();

        let thread = std::thread::Builder::new()
            .name("playback".into())
            .spawn(move || {
                let opened = open_output(preferred_rate, flush_cb);
                let stream = match opened {
                    Ok((stream, producer, rate)) => {
                        let _ = ready_tx.send(Ok((producer, rate)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Hold the stream until the handle goes away.
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Playback stream released");
            })?;

        let (producer, device_rate) = ready_rx
            .recv()
            .map_err(|_| PipelineError::Device("playback thread exited during setup".into()))??;

        Ok(Self {
            producer,
            flush,
            device_rate,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    fn to_device_rate(&self, chunk: &AudioChunk) -> PipelineResult<Vec<f32>> {
        let input: Vec<f32> = chunk.samples.iter().map(|&s| s as f32 / 32768.0).collect();
        if chunk.sample_rate == self.device_rate || chunk.sample_rate == 0 {
            return Ok(input);
        }
        resample(&input, chunk.sample_rate, self.device_rate)
    }
}

#[async_trait]
impl AudioSink for CpalPlayback {
    async fn write(&mut self, chunk: &AudioChunk) -> PipelineResult<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let samples = self.to_device_rate(chunk)?;

        let mut offset = 0;
        let mut last_progress = Instant::now();
        while offset < samples.len() {
            let pushed = self.producer.push_slice(&samples[offset..]);
            if pushed > 0 {
                offset += pushed;
                last_progress = Instant::now();
                continue;
            }
            if last_progress.elapsed() > STALL_TIMEOUT {
                return Err(PipelineError::Playback(format!(
                    "output stalled with {} samples unwritten",
                    samples.len() - offset
                )));
            }
            tokio::time::sleep(WAIT_SLICE).await;
        }
        Ok(())
    }

    async fn drain(&mut self) -> PipelineResult<()> {
        let mut last_len = self.producer.occupied_len();
        let mut last_progress = Instant::now();
        while last_len > 0 {
            tokio::time::sleep(WAIT_SLICE).await;
            let len = self.producer.occupied_len();
            if len < last_len {
                last_progress = Instant::now();
            } else if last_progress.elapsed() > STALL_TIMEOUT {
                return Err(PipelineError::Playback(format!("drain stalled with {} samples queued", len)));
            }
            last_len = len;
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.flush.store(true, Ordering::Release);
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn open_output(
    preferred_rate: u32,
    flush: Arc<AtomicBool>,
) -> PipelineResult<(cpal::Stream, HeapProd<f32>, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PipelineError::Device("No output device available".into()))?;

    info!("Audio Output Device: {}", device.name().unwrap_or_default());

    let mut selected = None;
    for range in device.supported_output_configs()? {
        if range.min_sample_rate().0 <= preferred_rate && range.max_sample_rate().0 >= preferred_rate {
            selected = Some(range.with_sample_rate(cpal::SampleRate(preferred_rate)));
            break;
        }
    }
    let config = match selected {
        Some(c) => c,
        None => device.default_output_config()?,
    };

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    info!("Audio Output Selected: Rate={}Hz, Channels={}", sample_rate, channels);

    // Ten seconds of headroom; writers wait when it is full.
    let ring = HeapRb::<f32>::new(sample_rate as usize * 10);
    let (producer, mut consumer) = ring.split();

    let err_fn = |err| error!("an error occurred on output stream: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &_| fill_output(data, channels, |s| s, &mut consumer, &flush),
            err_fn,
            None,
        )?,
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config.into(),
            move |data: &mut [i16], _: &_| {
                fill_output(data, channels, |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16, &mut consumer, &flush)
            },
            err_fn,
            None,
        )?,
        other => return Err(PipelineError::Device(format!("Unsupported sample format {:?}", other))),
    };
    stream.play()?;

    Ok((stream, producer, sample_rate))
}

/// Copy mono ring samples to every channel; silence on underrun.
fn fill_output<T: Copy>(
    output: &mut [T],
    channels: usize,
    convert: impl Fn(f32) -> T,
    consumer: &mut HeapCons<f32>,
    flush: &AtomicBool,
) {
    if flush.swap(false, Ordering::AcqRel) {
        consumer.clear();
    }
    for frame in output.chunks_mut(channels.max(1)) {
        let value = convert(consumer.try_pop().unwrap_or(0.0));
        for sample in frame.iter_mut() {
            *sample = value;
        }
    }
}

/// Offline mono resample of one chunk.
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> PipelineResult<Vec<f32>> {
    let mut resampler = FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 2, 1)
        .map_err(|e| PipelineError::Playback(format!("resampler: {}", e)))?;

    let expected = (input.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut output = Vec::with_capacity(expected + RESAMPLE_CHUNK);
    let mut pos = 0;

    while input.len() - pos >= resampler.input_frames_next() {
        let take = resampler.input_frames_next();
        let frames: [&[f32]; 1] = [&input[pos..pos + take]];
        let out = resampler
            .process(&frames[..], None)
            .map_err(|e| PipelineError::Playback(format!("resample: {}", e)))?;
        output.extend_from_slice(&out[0]);
        pos += take;
    }
    if pos < input.len() {
        let frames: [&[f32]; 1] = [&input[pos..]];
        let out = resampler
            .process_partial(Some(&frames[..]), None)
            .map_err(|e| PipelineError::Playback(format!("resample: {}", e)))?;
        output.extend_from_slice(&out[0]);
    }

    // Trim the fixed FFT delay padding so chunks do not drift apart.
    if output.len() > expected {
        let delay = resampler.output_delay().min(output.len() - expected);
        output.drain(..delay);
        output.truncate(expected);
    } else if output.len() < expected {
        warn!("Resampler produced {} of {} samples", output.len(), expected);
    }
    Ok(output)
}
