/// Frame index since the capture stream started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tick {
    pub frame: u64,
}

impl Tick {
    pub fn new() -> Self {
        Tick { frame: 0 }
    }

    pub fn next(&self) -> Self {
        Tick { frame: self.frame + 1 }
    }
}

/// Fixed frame geometry shared by the capture loop and the Segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    pub sample_rate: u32,
    pub frame_ms: u32,
}

impl FrameTiming {
    pub fn new(sample_rate: u32, frame_ms: u32) -> Self {
        Self { sample_rate, frame_ms }
    }

    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as usize * self.frame_ms as usize) / 1000
    }

    /// Whole frames that fit in `ms` (never less than one).
    pub fn frames_for_ms(&self, ms: u32) -> usize {
        if self.frame_ms == 0 {
            return 1;
        }
        ((ms / self.frame_ms) as usize).max(1)
    }

    pub fn offset_ms(&self, tick: Tick) -> u64 {
        tick.frame * self.frame_ms as u64
    }
}
