// SPDX-License-Identifier: AGPL-3.0-only

//! Quantized MLP executor.
//!
//! ```text
//! Linear(0) → Quant(0) → ReLU → Linear(1) → Quant(1) → ReLU → … → Linear(last)
//! ```
//!
//! The final linear layer's `i32` output is returned untouched. All shape
//! checks happen in [`QuantizedMlp::new`]; [`QuantizedMlp::forward`] has no
//! error path.

use crate::error::{ModelError, Result};
use crate::layer::{relu, LinearLayer, QuantLayer, MAX_NEURONS};
use tracing::info;

/// Most linear layers a network may have.
pub const MAX_LAYERS: usize = 6;

/// Fewest linear layers a network may have.
pub const MIN_LAYERS: usize = 2;

/// Validated, immutable network tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedMlp {
    linear: Vec<LinearLayer>,
    quant: Vec<QuantLayer>,
}

/// Reusable intermediate buffers for [`QuantizedMlp::forward`].
#[derive(Debug, Clone)]
pub struct Scratch {
    acc: Vec<i32>,
    act: Vec<i8>,
    next: Vec<i8>,
}

impl Scratch {
    /// Buffers wide enough for any network the engine accepts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            acc: vec![0; MAX_NEURONS],
            act: vec![0; MAX_NEURONS],
            next: vec![0; MAX_NEURONS],
        }
    }
}

impl Default for Scratch {
    fn default() -> Self {
        Self::new()
    }
}

impl QuantizedMlp {
    /// Validate and assemble a network.
    ///
    /// `quant[i]` sits between `linear[i]` and `linear[i + 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer count is outside
    /// `MIN_LAYERS..=MAX_LAYERS`, the quantization layer count is not one
    /// less, any layer fails its own validation, or adjacent widths disagree.
    pub fn new(linear: Vec<LinearLayer>, quant: Vec<QuantLayer>) -> Result<Self> {
        if !(MIN_LAYERS..=MAX_LAYERS).contains(&linear.len()) {
            return Err(ModelError::invalid_network(format!(
                "{} linear layers, must be in {MIN_LAYERS}..={MAX_LAYERS}",
                linear.len()
            )));
        }
        if quant.len() + 1 != linear.len() {
            return Err(ModelError::invalid_network(format!(
                "{} quantization layers for {} linear layers",
                quant.len(),
                linear.len()
            )));
        }
        for (i, l) in linear.iter().enumerate() {
            l.validate(i)?;
        }
        for (i, (q, pair)) in quant.iter().zip(linear.windows(2)).enumerate() {
            q.validate(i)?;
            let width = pair[0].out_features();
            if q.channels() != width {
                return Err(ModelError::invalid_layer(
                    i,
                    format!("{} quantization channels after {width} outputs", q.channels()),
                ));
            }
            if pair[1].in_features() != width {
                return Err(ModelError::invalid_layer(
                    i + 1,
                    format!("takes {} inputs, previous layer gives {width}", pair[1].in_features()),
                ));
            }
        }

        let mlp = Self { linear, quant };
        info!(
            layers = mlp.linear.len(),
            input = mlp.input_size(),
            output = mlp.output_size(),
            "Quantized MLP ready"
        );
        Ok(mlp)
    }

    /// Network input width.
    #[must_use]
    pub fn input_size(&self) -> usize {
        self.linear[0].in_features()
    }

    /// Network output width.
    #[must_use]
    pub fn output_size(&self) -> usize {
        self.linear[self.linear.len() - 1].out_features()
    }

    /// Linear layers in execution order.
    #[must_use]
    pub fn linear_layers(&self) -> &[LinearLayer] {
        &self.linear
    }

    /// Inter-layer quantizers in execution order.
    #[must_use]
    pub fn quant_layers(&self) -> &[QuantLayer] {
        &self.quant
    }

    /// Run one inference.
    ///
    /// Deterministic: the result depends only on `input` and the tables,
    /// never on what `scratch` held before.
    ///
    /// # Panics
    ///
    /// Panics if `input.len() != input_size()` or
    /// `output.len() != output_size()`.
    pub fn forward(&self, input: &[i8], output: &mut [i32], scratch: &mut Scratch) {
        assert_eq!(input.len(), self.input_size(), "input width mismatch");
        assert_eq!(output.len(), self.output_size(), "output width mismatch");

        let Scratch { acc, act, next } = scratch;
        act[..input.len()].copy_from_slice(input);
        let mut width = input.len();

        for (layer, quant) in self.linear.iter().zip(&self.quant) {
            let out = layer.out_features();
            layer.forward(&act[..width], &mut acc[..out]);
            quant.forward(&acc[..out], &mut next[..out]);
            relu(&mut next[..out]);
            std::mem::swap(act, next);
            width = out;
        }

        self.linear[self.linear.len() - 1].forward(&act[..width], output);
    }

    /// Allocating convenience wrapper around [`QuantizedMlp::forward`].
    ///
    /// # Panics
    ///
    /// Panics if `input.len() != input_size()`.
    #[must_use]
    pub fn infer(&self, input: &[i8]) -> Vec<i32> {
        let mut out = vec![0; self.output_size()];
        self.forward(input, &mut out, &mut Scratch::new());
        out
    }

    /// Same network with every linear layer folded to pre-scaled weights.
    ///
    /// # Errors
    ///
    /// Returns an error if any folded weight leaves `i8`.
    pub fn to_prescaled(&self) -> Result<Self> {
        let linear = self
            .linear
            .iter()
            .map(LinearLayer::to_prescaled)
            .collect::<Result<Vec<_>>>()?;
        Self::new(linear, self.quant.clone())
    }

    /// Same network with every quantizer in divide form.
    ///
    /// # Errors
    ///
    /// Returns an error if a shift scale has no exact divisor.
    pub fn to_divisor(&self) -> Result<Self> {
        let quant = self
            .quant
            .iter()
            .map(QuantLayer::to_divisor)
            .collect::<Result<Vec<_>>>()?;
        Self::new(self.linear.clone(), quant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zoo::ZooModel;

    fn toy() -> QuantizedMlp {
        ZooModel::Toy321.build().unwrap()
    }

    #[test]
    fn toy_golden_outputs() {
        let mlp = toy();
        assert_eq!(mlp.infer(&[6, -7, 15]), vec![544]);
        assert_eq!(mlp.infer(&[12, -7, 30]), vec![894]);
        assert_eq!(mlp.infer(&[-5, 9, -20]), vec![-45]);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let mlp = toy();
        let mut scratch = Scratch::new();
        let mut first = [0i32; 1];
        mlp.forward(&[6, -7, 15], &mut first, &mut scratch);
        // Dirty the scratch with a different input in between.
        let mut other = [0i32; 1];
        mlp.forward(&[127, 127, 127], &mut other, &mut scratch);
        let mut again = [0i32; 1];
        mlp.forward(&[6, -7, 15], &mut again, &mut scratch);
        assert_eq!(first, again);
    }

    #[test]
    fn weight_variants_agree() {
        let zp = toy();
        let pre = zp.to_prescaled().unwrap();
        let div = zp.to_divisor().unwrap();
        for x in [[6, -7, 15], [12, -7, 30], [-5, 9, -20], [0, 0, 0], [-128, 127, -128]] {
            let a = zp.infer(&x)[0];
            assert_eq!(pre.infer(&x)[0], a, "pre-scaled diverged on {x:?}");
            // Each hidden value moves by at most one, so |7| + |-2| bounds the drift.
            let d = div.infer(&x)[0];
            assert!((a - d).abs() <= 9, "divide form diverged on {x:?}: {a} vs {d}");
        }
    }

    #[test]
    fn layer_count_limits() {
        let l = || LinearLayer::prescaled(1, 1, vec![1], vec![0]);
        let q = || QuantLayer::shift(vec![1], 0, vec![0]);
        assert!(QuantizedMlp::new(vec![l()], vec![]).is_err());
        assert!(QuantizedMlp::new(vec![l(); 7], vec![q(); 6]).is_err());
        assert!(QuantizedMlp::new(vec![l(); 6], vec![q(); 5]).is_ok());
        assert!(QuantizedMlp::new(vec![l(); 3], vec![q(); 1]).is_err());
    }

    #[test]
    fn width_mismatch_rejected() {
        let l0 = LinearLayer::prescaled(2, 3, vec![0; 6], vec![0; 3]);
        let l1 = LinearLayer::prescaled(2, 1, vec![0; 2], vec![0]);
        let q = QuantLayer::shift(vec![1; 3], 0, vec![0; 3]);
        let err = QuantizedMlp::new(vec![l0.clone(), l1], vec![q]).unwrap_err();
        assert!(err.to_string().contains("layer 1"), "{err}");

        let l1 = LinearLayer::prescaled(3, 1, vec![0; 3], vec![0]);
        let q = QuantLayer::shift(vec![1; 2], 0, vec![0; 2]);
        let err = QuantizedMlp::new(vec![l0, l1], vec![q]).unwrap_err();
        assert!(err.to_string().contains("layer 0"), "{err}");
    }

    #[test]
    #[should_panic(expected = "input width mismatch")]
    fn wrong_input_width_panics() {
        let _ = toy().infer(&[1, 2]);
    }
}
