// SPDX-License-Identifier: AGPL-3.0-only

//! Integer-only network layers.
//!
//! A linear layer stores its weights in one of two formats:
//!
//! * [`WeightFormat::ZeroPoint`]: each output row has a zero point subtracted
//!   from every weight before the multiply, and the accumulator is multiplied
//!   by a per-row integer scale before the bias is added.
//! * [`WeightFormat::PreScaled`]: weights are already affine and the bias is
//!   in accumulator units; the accumulator is used as is.
//!
//! An inter-layer [`QuantLayer`] brings the `i32` accumulators back to `i8`
//! either by multiply-then-arithmetic-shift or by exact integer division.
//! The two are not interchangeable for negative inputs: the shift floors,
//! the division truncates toward zero.

use crate::error::{ModelError, Result};

/// Widest layer the engine accepts.
pub const MAX_NEURONS: usize = 256;

/// Largest shift a multiply-shift requantizer may use.
pub const MAX_PRECISION_BITS: u8 = 30;

// ── Linear ───────────────────────────────────────────────────────────────────

/// How a linear layer's weights are encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightFormat {
    /// `acc = Σ x·(w - zp[o])`, `y = acc·scale[o] + bias[o]`.
    ZeroPoint {
        /// Per-output zero point.
        zero_point: Vec<i8>,
        /// Per-output integer scale.
        scale: Vec<i16>,
    },
    /// `y = Σ x·w + bias[o]`.
    PreScaled,
}

/// Fully connected layer, row-major `out × in` weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearLayer {
    in_features: usize,
    out_features: usize,
    weights: Vec<i8>,
    bias: Vec<i32>,
    format: WeightFormat,
}

impl LinearLayer {
    /// Zero-point layer. Shapes are checked by [`LinearLayer::validate`].
    #[must_use]
    pub fn zero_point(
        in_features: usize,
        out_features: usize,
        weights: Vec<i8>,
        bias: Vec<i32>,
        zero_point: Vec<i8>,
        scale: Vec<i16>,
    ) -> Self {
        Self {
            in_features,
            out_features,
            weights,
            bias,
            format: WeightFormat::ZeroPoint { zero_point, scale },
        }
    }

    /// Pre-scaled layer. Shapes are checked by [`LinearLayer::validate`].
    #[must_use]
    pub fn prescaled(in_features: usize, out_features: usize, weights: Vec<i8>, bias: Vec<i32>) -> Self {
        Self {
            in_features,
            out_features,
            weights,
            bias,
            format: WeightFormat::PreScaled,
        }
    }

    /// Input width.
    #[must_use]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Output width.
    #[must_use]
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Weight encoding.
    #[must_use]
    pub fn format(&self) -> &WeightFormat {
        &self.format
    }

    /// Check table sizes against the declared shape.
    ///
    /// # Errors
    ///
    /// Returns an error naming layer `index` if a width is zero or above
    /// [`MAX_NEURONS`], or any table has the wrong length.
    pub fn validate(&self, index: usize) -> Result<()> {
        for (what, n) in [("in_features", self.in_features), ("out_features", self.out_features)] {
            if n == 0 || n > MAX_NEURONS {
                return Err(ModelError::invalid_layer(
                    index,
                    format!("{what} = {n}, must be in 1..={MAX_NEURONS}"),
                ));
            }
        }
        let expect = self.in_features * self.out_features;
        if self.weights.len() != expect {
            return Err(ModelError::invalid_layer(
                index,
                format!("{} weights for {expect} connections", self.weights.len()),
            ));
        }
        if self.bias.len() != self.out_features {
            return Err(ModelError::invalid_layer(
                index,
                format!("{} biases for {} outputs", self.bias.len(), self.out_features),
            ));
        }
        if let WeightFormat::ZeroPoint { zero_point, scale } = &self.format {
            if zero_point.len() != self.out_features || scale.len() != self.out_features {
                return Err(ModelError::invalid_layer(
                    index,
                    format!(
                        "{} zero points / {} scales for {} outputs",
                        zero_point.len(),
                        scale.len(),
                        self.out_features
                    ),
                ));
            }
        }
        Ok(())
    }

    /// `output[o] = clamp_i32(Σ input·w' · s + bias)`.
    ///
    /// # Panics
    ///
    /// Panics if `input` or `output` is shorter than the layer's widths.
    #[allow(clippy::cast_possible_truncation)]
    pub fn forward(&self, input: &[i8], output: &mut [i32]) {
        let input = &input[..self.in_features];
        let rows = self.weights.chunks_exact(self.in_features);
        for (o, (row, out)) in rows.zip(output[..self.out_features].iter_mut()).enumerate() {
            let (zp, scale) = match &self.format {
                WeightFormat::ZeroPoint { zero_point, scale } => {
                    (i64::from(zero_point[o]), i64::from(scale[o]))
                }
                WeightFormat::PreScaled => (0, 1),
            };
            let acc: i64 = input
                .iter()
                .zip(row)
                .map(|(&x, &w)| i64::from(x) * (i64::from(w) - zp))
                .sum();
            let y = acc * scale + i64::from(self.bias[o]);
            *out = y.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        }
    }

    /// Fold zero points and scales into the weights.
    ///
    /// The result computes identical outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if a folded weight `(w - zp)·scale` leaves `i8`.
    pub fn to_prescaled(&self) -> Result<Self> {
        let WeightFormat::ZeroPoint { zero_point, scale } = &self.format else {
            return Ok(self.clone());
        };
        let mut weights = Vec::with_capacity(self.weights.len());
        for (o, row) in self.weights.chunks_exact(self.in_features).enumerate() {
            for (i, &w) in row.iter().enumerate() {
                let folded = (i32::from(w) - i32::from(zero_point[o])) * i32::from(scale[o]);
                let w = i8::try_from(folded).map_err(|_| {
                    ModelError::conversion_failed(format!(
                        "folded weight [{o}, {i}] = {folded} does not fit i8"
                    ))
                })?;
                weights.push(w);
            }
        }
        Ok(Self::prescaled(
            self.in_features,
            self.out_features,
            weights,
            self.bias.clone(),
        ))
    }
}

// ── Requantization ───────────────────────────────────────────────────────────

/// Per-channel scale applied before the zero point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requant {
    /// `(x·scale) >> precision_bits`, arithmetic shift.
    Shift {
        /// Per-channel multiplier.
        scale: Vec<i16>,
        /// Fractional bits of the multiplier.
        precision_bits: u8,
    },
    /// `x / divisor`, truncating toward zero.
    Divide {
        /// Per-channel divisor.
        divisor: Vec<i32>,
    },
}

/// Inter-layer `i32 → i8` quantization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantLayer {
    requant: Requant,
    zero_point: Vec<i8>,
    qmin: i8,
    qmax: i8,
}

impl QuantLayer {
    /// Multiply-shift requantizer over the full `i8` range.
    #[must_use]
    pub fn shift(scale: Vec<i16>, precision_bits: u8, zero_point: Vec<i8>) -> Self {
        Self {
            requant: Requant::Shift {
                scale,
                precision_bits,
            },
            zero_point,
            qmin: i8::MIN,
            qmax: i8::MAX,
        }
    }

    /// Divide requantizer over the full `i8` range.
    #[must_use]
    pub fn divide(divisor: Vec<i32>, zero_point: Vec<i8>) -> Self {
        Self {
            requant: Requant::Divide { divisor },
            zero_point,
            qmin: i8::MIN,
            qmax: i8::MAX,
        }
    }

    /// Narrow the output range.
    #[must_use]
    pub fn with_range(mut self, qmin: i8, qmax: i8) -> Self {
        self.qmin = qmin;
        self.qmax = qmax;
        self
    }

    /// Number of channels.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.zero_point.len()
    }

    /// Scale representation.
    #[must_use]
    pub fn requant(&self) -> &Requant {
        &self.requant
    }

    /// Check table sizes and parameters.
    ///
    /// # Errors
    ///
    /// Returns an error naming layer `index` on a length mismatch, an empty
    /// range, a zero divisor, or a precision above [`MAX_PRECISION_BITS`].
    pub fn validate(&self, index: usize) -> Result<()> {
        let n = self.zero_point.len();
        if n == 0 || n > MAX_NEURONS {
            return Err(ModelError::invalid_layer(
                index,
                format!("{n} quantization channels, must be in 1..={MAX_NEURONS}"),
            ));
        }
        if self.qmin > self.qmax {
            return Err(ModelError::invalid_layer(
                index,
                format!("empty range [{}, {}]", self.qmin, self.qmax),
            ));
        }
        match &self.requant {
            Requant::Shift {
                scale,
                precision_bits,
            } => {
                if scale.len() != n {
                    return Err(ModelError::invalid_layer(
                        index,
                        format!("{} scales for {n} channels", scale.len()),
                    ));
                }
                if *precision_bits > MAX_PRECISION_BITS {
                    return Err(ModelError::invalid_layer(
                        index,
                        format!("precision_bits {precision_bits} exceeds {MAX_PRECISION_BITS}"),
                    ));
                }
            }
            Requant::Divide { divisor } => {
                if divisor.len() != n {
                    return Err(ModelError::invalid_layer(
                        index,
                        format!("{} divisors for {n} channels", divisor.len()),
                    ));
                }
                if let Some(c) = divisor.iter().position(|&d| d == 0) {
                    return Err(ModelError::invalid_layer(index, format!("channel {c} divides by zero")));
                }
            }
        }
        Ok(())
    }

    /// Requantize, add the zero point, clamp to `i8` then to `[qmin, qmax]`.
    ///
    /// # Panics
    ///
    /// Panics if `input` or `output` is shorter than [`QuantLayer::channels`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn forward(&self, input: &[i32], output: &mut [i8]) {
        let n = self.channels();
        for (ch, (&x, out)) in input[..n].iter().zip(output[..n].iter_mut()).enumerate() {
            let scaled = match &self.requant {
                Requant::Shift {
                    scale,
                    precision_bits,
                } => (i64::from(x) * i64::from(scale[ch])) >> precision_bits,
                Requant::Divide { divisor } => i64::from(x) / i64::from(divisor[ch]),
            };
            let q = scaled.saturating_add(i64::from(self.zero_point[ch]));
            let q = q.clamp(i64::from(i8::MIN), i64::from(i8::MAX)) as i8;
            *out = q.clamp(self.qmin, self.qmax);
        }
    }

    /// Equivalent divide-form requantizer.
    ///
    /// Exact only for non-negative inputs; for negative inputs the shift
    /// floors where the division truncates, so results may differ by one.
    ///
    /// # Errors
    ///
    /// Returns an error if `precision_bits` exceeds [`MAX_PRECISION_BITS`]
    /// or any scale does not divide `2^precision_bits`.
    pub fn to_divisor(&self) -> Result<Self> {
        let Requant::Shift {
            scale,
            precision_bits,
        } = &self.requant
        else {
            return Ok(self.clone());
        };
        if *precision_bits > MAX_PRECISION_BITS {
            return Err(ModelError::conversion_failed(format!(
                "precision_bits {precision_bits} exceeds {MAX_PRECISION_BITS}"
            )));
        }
        let unit = 1i32 << precision_bits;
        let divisor = scale
            .iter()
            .enumerate()
            .map(|(ch, &s)| {
                let s = i32::from(s);
                if s != 0 && unit % s == 0 {
                    Ok(unit / s)
                } else {
                    Err(ModelError::conversion_failed(format!(
                        "channel {ch}: scale {s} does not divide 2^{precision_bits}"
                    )))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            requant: Requant::Divide { divisor },
            zero_point: self.zero_point.clone(),
            qmin: self.qmin,
            qmax: self.qmax,
        })
    }
}

/// Zero-floor in place.
pub fn relu(data: &mut [i8]) {
    for x in data {
        *x = (*x).max(0);
    }
}
