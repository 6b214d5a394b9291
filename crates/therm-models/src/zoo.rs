// SPDX-License-Identifier: AGPL-3.0-only

//! Compiled network tables.
//!
//! | Model | Shape | Layer formats | Purpose |
//! |-------|-------|---------------|---------|
//! | `toy_3_2_1` | 3→2→1 | zero-point, zero-point | Hand-checked golden vectors |
//! | `demo_28_2_14` | 28→2→14 | zero-point, pre-scaled | Mixed-format pipeline check |
//! | `persistence_28_14_14` | 28→14→14 | zero-point, pre-scaled | Predicts the current thermal code |
//!
//! Inputs of the 28-wide models follow the codec layout: 14 power channels,
//! then 14 thermal channels.

use crate::engine::QuantizedMlp;
use crate::error::{ModelError, Result};
use crate::layer::{LinearLayer, QuantLayer};
use std::str::FromStr;
use therm_chip::NUM_SENSORS;

/// Models compiled into the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZooModel {
    /// 3→2→1 reference network.
    Toy321,
    /// 28→2→14 network mixing both weight formats.
    Demo28_2_14,
    /// 28→14→14 baseline that echoes each sensor's thermal input.
    Persistence28_14_14,
}

impl ZooModel {
    /// All compiled models.
    pub const ALL: [Self; 3] = [Self::Toy321, Self::Demo28_2_14, Self::Persistence28_14_14];

    /// Lookup name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Toy321 => "toy_3_2_1",
            Self::Demo28_2_14 => "demo_28_2_14",
            Self::Persistence28_14_14 => "persistence_28_14_14",
        }
    }

    /// One-line description.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Toy321 => "3→2→1 reference network with hand-checked outputs",
            Self::Demo28_2_14 => "28→2→14 network mixing zero-point and pre-scaled layers",
            Self::Persistence28_14_14 => "28→14→14 baseline predicting the current thermal code",
        }
    }

    /// Whether the model consumes the full per-sensor input vector.
    #[must_use]
    pub const fn fits_sensor_array(&self) -> bool {
        !matches!(self, Self::Toy321)
    }

    /// Assemble and validate the network.
    ///
    /// # Errors
    ///
    /// Returns an error if the compiled tables fail validation.
    pub fn build(&self) -> Result<QuantizedMlp> {
        match self {
            Self::Toy321 => toy_3_2_1(),
            Self::Demo28_2_14 => demo_28_2_14(),
            Self::Persistence28_14_14 => persistence_28_14_14(),
        }
    }
}

impl FromStr for ZooModel {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| ModelError::UnknownModel { name: s.to_string() })
    }
}

impl std::fmt::Display for ZooModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Tables ───────────────────────────────────────────────────────────────────

fn toy_3_2_1() -> Result<QuantizedMlp> {
    let l0 = LinearLayer::zero_point(
        3,
        2,
        vec![
            2, -1, 3, //
            -4, 5, 1,
        ],
        vec![10, -6],
        vec![1, 0],
        vec![3, 2],
    );
    let q0 = QuantLayer::shift(vec![64, 32], 7, vec![-3, 4]);
    let l1 = LinearLayer::zero_point(2, 1, vec![7, -2], vec![5], vec![0], vec![1]);
    QuantizedMlp::new(vec![l0, l1], vec![q0])
}

fn demo_28_2_14() -> Result<QuantizedMlp> {
    let n = NUM_SENSORS;
    // Hidden 0 sums power, hidden 1 sums twice the thermal inputs.
    let mut w0 = vec![0i8; 2 * 2 * n];
    w0[..n].fill(1);
    w0[3 * n..].fill(2);
    let l0 = LinearLayer::zero_point(2 * n, 2, w0, vec![2000, 100], vec![0, 0], vec![1, 1]);
    let q0 = QuantLayer::shift(vec![1, 1], 4, vec![0, 0]);

    let mut w1 = Vec::with_capacity(2 * n);
    let mut b1 = Vec::with_capacity(n);
    for j in 0..n {
        let j = i8::try_from(j).map_err(|_| ModelError::invalid_network("too many sensors"))?;
        w1.extend_from_slice(&[j - 7, 3]);
        b1.push(4 * i32::from(j));
    }
    let l1 = LinearLayer::prescaled(2, n, w1, b1);
    QuantizedMlp::new(vec![l0, l1], vec![q0])
}

fn persistence_28_14_14() -> Result<QuantizedMlp> {
    let n = NUM_SENSORS;
    // h[i] = q_thermal[i] + 128, halved by the quantizer, doubled back out.
    let mut w0 = vec![0i8; n * 2 * n];
    for i in 0..n {
        w0[i * 2 * n + n + i] = 1;
    }
    let l0 = LinearLayer::zero_point(2 * n, n, w0, vec![128; n], vec![0; n], vec![1; n]);
    let q0 = QuantLayer::shift(vec![1; n], 1, vec![0; n]);

    let mut w1 = vec![0i8; n * n];
    for i in 0..n {
        w1[i * n + i] = 2;
    }
    let l1 = LinearLayer::prescaled(n, n, w1, vec![-128; n]);
    QuantizedMlp::new(vec![l0, l1], vec![q0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::WeightFormat;

    #[test]
    fn all_models_build() {
        for m in ZooModel::ALL {
            let mlp = m.build().unwrap_or_else(|e| panic!("{m}: {e}"));
            if m.fits_sensor_array() {
                assert_eq!(mlp.input_size(), 2 * NUM_SENSORS, "{m}");
                assert_eq!(mlp.output_size(), NUM_SENSORS, "{m}");
            }
        }
    }

    #[test]
    fn names_resolve() {
        for m in ZooModel::ALL {
            assert_eq!(m.name().parse::<ZooModel>().unwrap(), m);
        }
        assert!("resnet".parse::<ZooModel>().is_err());
    }

    #[test]
    fn demo_mixes_formats() {
        let mlp = ZooModel::Demo28_2_14.build().unwrap();
        let formats: Vec<_> = mlp.linear_layers().iter().map(LinearLayer::format).collect();
        assert!(matches!(formats[0], WeightFormat::ZeroPoint { .. }));
        assert_eq!(formats[1], &WeightFormat::PreScaled);
    }

    #[test]
    fn demo_golden_outputs() {
        let mlp = ZooModel::Demo28_2_14.build().unwrap();
        let mut input = [1i8; 28];
        input[..14].fill(-128);
        let expected: Vec<i32> = (0..14).map(|j| 17 * j - 67).collect();
        assert_eq!(mlp.infer(&input), expected);
    }

    #[test]
    fn persistence_echoes_thermal() {
        let mlp = ZooModel::Persistence28_14_14.build().unwrap();
        let mut input = [0i8; 28];
        input[..14].fill(-128);
        for (i, x) in input[14..].iter_mut().enumerate() {
            *x = i8::try_from(i * 9).unwrap() - 60;
        }
        let out = mlp.infer(&input);
        for (i, &y) in out.iter().enumerate() {
            let x = i32::from(input[14 + i]);
            // Halving in the hidden layer drops the low bit.
            assert!(y == x || y == x - 1, "sensor {i}: {x} → {y}");
        }
    }
}
