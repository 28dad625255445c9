// AverageBuffer - fixed-size ring buffer with O(1) rolling average
//
// Used by the beat interpreter and both calibrators to keep bounded
// histories of amplitudes, deviations and inter-beat intervals. The
// average is maintained incrementally; max tracking is optional since
// only the brightness calibrator needs it.

/// Ring buffer over `f64` samples that maintains its average incrementally
/// and can optionally track the maximum element currently in the buffer.
#[derive(Debug, Clone)]
pub struct AverageBuffer {
    buffer: Vec<f64>,
    track_max: bool,

    head: usize,
    len: usize,

    total: f64,
    current_max: f64,
    current_max_index: Option<usize>,
}

impl AverageBuffer {
    /// Create a buffer of the given capacity with max tracking enabled.
    pub fn new(capacity: usize) -> Self {
        Self::with_max_tracking(capacity, true)
    }

    /// Create a buffer of the given capacity, choosing whether the maximum
    /// element should be tracked alongside the average.
    pub fn with_max_tracking(capacity: usize, track_max: bool) -> Self {
        assert!(capacity > 0, "AverageBuffer capacity must be positive");
        Self {
            buffer: vec![0.0; capacity],
            track_max,
            head: 0,
            len: 0,
            total: 0.0,
            current_max: f64::MIN,
            current_max_index: None,
        }
    }

    /// Push a sample, evicting the oldest one once the buffer is full.
    pub fn add(&mut self, value: f64) {
        let evicted = self.buffer[self.head];
        self.total -= evicted;

        self.buffer[self.head] = value;
        self.total += value;

        if self.track_max {
            // If the evicted slot held the max, rescan for the new one.
            if Some(self.head) == self.current_max_index {
                self.current_max = f64::MIN;
                self.current_max_index = None;
                for (i, &v) in self.buffer.iter().enumerate() {
                    if v > self.current_max {
                        self.current_max = v;
                        self.current_max_index = Some(i);
                    }
                }
            }

            if value > self.current_max {
                self.current_max = value;
                self.current_max_index = Some(self.head);
            }
        }

        if self.len < self.buffer.len() {
            self.len += 1;
        }

        self.head = (self.head + 1) % self.buffer.len();
    }

    /// Current average of the stored samples, or 0.0 when empty.
    pub fn average(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.total / self.len as f64
    }

    /// Maximum element currently stored.
    ///
    /// Only meaningful on buffers created with max tracking; panics otherwise
    /// since calling it would be a programming error.
    pub fn max_value(&self) -> f64 {
        assert!(self.track_max, "max tracking is disabled for this buffer");
        self.current_max
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.buffer.len()
    }

    /// Reset the buffer to its initial empty state.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.head = 0;
        self.len = 0;
        self.total = 0.0;
        self.current_max = f64::MIN;
        self.current_max_index = None;
    }
}
