//! Fixed-capacity rolling OHLCV buffer for a single asset.

use crate::domain::action::PriceBar;
use crate::domain::error::{BackflowError, Result};

/// Ring buffer of one numeric column. Unfilled slots hold NaN.
#[derive(Debug, Clone)]
struct RollingColumn {
    data: Vec<f64>,
    head: usize, // next write index
    len: usize,
}

impl RollingColumn {
    fn new(capacity: usize) -> Self {
        Self {
            data: vec![f64::NAN; capacity],
            head: 0,
            len: 0,
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Index (in `data`) of the oldest element.
    #[inline]
    fn start(&self) -> usize {
        (self.head + self.capacity() - self.len) % self.capacity()
    }

    #[inline]
    fn push(&mut self, v: f64) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }
        self.data[self.head] = v;
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
    }

    /// Element by position from oldest (0 = oldest).
    #[inline]
    fn get(&self, i: usize) -> Option<f64> {
        if i >= self.len {
            return None;
        }
        Some(self.data[(self.start() + i) % self.capacity()])
    }

    fn to_vec(&self) -> Vec<f64> {
        (0..self.len).filter_map(|i| self.get(i)).collect()
    }

    /// Full window, oldest first, NaN-padded where not yet filled.
    fn window(&self) -> Vec<f64> {
        let mut out = vec![f64::NAN; self.capacity() - self.len];
        out.extend(self.to_vec());
        out
    }

    fn clear(&mut self) {
        self.data.fill(f64::NAN);
        self.head = 0;
        self.len = 0;
    }
}

/// Rolling window of the most recent `capacity` bars of one asset, stored as
/// five parallel columns. Once full, each add evicts the oldest bar.
#[derive(Debug, Clone)]
pub struct PriceBarSeries {
    open: RollingColumn,
    high: RollingColumn,
    low: RollingColumn,
    close: RollingColumn,
    volume: RollingColumn,
}

impl PriceBarSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            open: RollingColumn::new(capacity),
            high: RollingColumn::new(capacity),
            low: RollingColumn::new(capacity),
            close: RollingColumn::new(capacity),
            volume: RollingColumn::new(capacity),
        }
    }

    pub fn add(&mut self, bar: &PriceBar) {
        self.add_values(bar.ohlcv());
    }

    /// Append `[open, high, low, close, volume]`.
    pub fn add_values(&mut self, values: [f64; 5]) {
        let [o, h, l, c, v] = values;
        self.open.push(o);
        self.high.push(h);
        self.low.push(l);
        self.close.push(c);
        self.volume.push(v);
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.close.capacity()
    }

    #[inline]
    #[doc(alias = "size")]
    pub fn len(&self) -> usize {
        self.close.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    pub fn clear(&mut self) {
        self.open.clear();
        self.high.clear();
        self.low.clear();
        self.close.clear();
        self.volume.clear();
    }

    pub fn open(&self) -> Vec<f64> {
        self.open.to_vec()
    }

    pub fn high(&self) -> Vec<f64> {
        self.high.to_vec()
    }

    pub fn low(&self) -> Vec<f64> {
        self.low.to_vec()
    }

    pub fn close(&self) -> Vec<f64> {
        self.close.to_vec()
    }

    pub fn volume(&self) -> Vec<f64> {
        self.volume.to_vec()
    }

    /// (high + low + close) / 3 per bar.
    pub fn typical(&self) -> Vec<f64> {
        (0..self.len())
            .filter_map(|i| {
                Some((self.high.get(i)? + self.low.get(i)? + self.close.get(i)?) / 3.0)
            })
            .collect()
    }

    /// The whole close window including unfilled slots, which read NaN.
    pub fn raw_close(&self) -> Vec<f64> {
        self.close.window()
    }

    /// `[open, high, low, close, volume]` at position `i`, 0 = oldest.
    pub fn get(&self, i: usize) -> Option<[f64; 5]> {
        Some([
            self.open.get(i)?,
            self.high.get(i)?,
            self.low.get(i)?,
            self.close.get(i)?,
            self.volume.get(i)?,
        ])
    }

    pub fn last(&self) -> Option<[f64; 5]> {
        let i = self.len().checked_sub(1)?;
        self.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = [f64; 5]> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Merge every run of `n` consecutive bars into one coarser bar.
    ///
    /// The result has capacity `len / n` and is full. A trailing group of
    /// fewer than `n` bars is dropped.
    pub fn aggregate(&self, n: usize) -> Result<PriceBarSeries> {
        if n == 0 {
            return Err(BackflowError::invalid_argument("aggregation size must be positive"));
        }
        let groups = self.len() / n;
        let mut out = PriceBarSeries::new(groups);
        let (open, high, low, close, volume) =
            (self.open(), self.high(), self.low(), self.close(), self.volume());

        for g in 0..groups {
            let range = g * n..(g + 1) * n;
            let h = high[range.clone()].iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let l = low[range.clone()].iter().copied().fold(f64::INFINITY, f64::min);
            let v: f64 = volume[range.clone()].iter().sum();
            out.add_values([open[range.start], h, l, close[range.end - 1], v]);
        }
        Ok(out)
    }
}
