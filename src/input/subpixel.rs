//! Sub-Pixel Accumulation
//!
//! Carries the fractional part of every delta forward so that rounding never
//! discards motion. The integer part is truncated toward zero, which keeps
//! the carried remainder strictly inside `(-1, 1)`:
//!
//! ```text
//! |Σ emitted − Σ input| = |remainder| < 1
//! ```
//!
//! Remainders are reset whenever a new gesture starts so stale fractions do
//! not bleed into unrelated motion.

/// Scalar sub-pixel accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SubPixelator {
    remainder: f64,
}

impl SubPixelator {
    /// Create an accumulator with zero remainder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` and return the integer part ready for emission
    pub fn accumulate(&mut self, delta: f64) -> i32 {
        if !delta.is_finite() {
            return 0;
        }

        let total = self.remainder + delta;
        let whole = total.trunc();
        self.remainder = total - whole;

        // Deltas beyond i32 are physically meaningless; saturate
        whole.clamp(i32::MIN as f64, i32::MAX as f64) as i32
    }

    /// Carried fractional remainder
    pub fn remainder(&self) -> f64 {
        self.remainder
    }

    /// Discard the carried remainder
    pub fn reset(&mut self) {
        self.remainder = 0.0;
    }
}

/// Two-axis sub-pixel accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VectorSubPixelator {
    x: SubPixelator,
    y: SubPixelator,
}

impl VectorSubPixelator {
    /// Create an accumulator with zero remainders
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `[dx, dy]` and return the integer parts
    pub fn accumulate(&mut self, delta: [f64; 2]) -> [i32; 2] {
        [self.x.accumulate(delta[0]), self.y.accumulate(delta[1])]
    }

    /// Carried remainders
    pub fn remainder(&self) -> [f64; 2] {
        [self.x.remainder(), self.y.remainder()]
    }

    /// Discard both remainders
    pub fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
    }
}
