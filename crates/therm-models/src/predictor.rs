// SPDX-License-Identifier: AGPL-3.0-only

//! Owned inference context: codec, network and every buffer a prediction
//! needs, allocated once at construction.

use crate::engine::{QuantizedMlp, Scratch};
use crate::error::{ModelError, Result};
use crate::quant::ScalingParams;
use therm_chip::SensorRecord;
use tracing::{debug, info};

/// Sensor records in, thermal predictions out.
#[derive(Debug, Clone)]
pub struct Predictor {
    model: QuantizedMlp,
    scaling: ScalingParams,
    num_sensors: usize,
    power: Vec<u32>,
    thermal: Vec<u16>,
    input: Vec<i8>,
    raw: Vec<i32>,
    scratch: Scratch,
}

impl Predictor {
    /// Bind a network to a codec for `num_sensors` sensors.
    ///
    /// # Errors
    ///
    /// Returns an error if `scaling` is invalid, or the network does not take
    /// `2 × num_sensors` inputs and give `num_sensors` outputs.
    pub fn new(model: QuantizedMlp, scaling: ScalingParams, num_sensors: usize) -> Result<Self> {
        scaling.validate()?;
        if model.input_size() != 2 * num_sensors || model.output_size() != num_sensors {
            return Err(ModelError::invalid_network(format!(
                "{}→{} network cannot serve {num_sensors} sensors",
                model.input_size(),
                model.output_size()
            )));
        }
        info!(num_sensors, "Predictor initialised");
        Ok(Self {
            model,
            scaling,
            num_sensors,
            power: vec![0; num_sensors],
            thermal: vec![0; num_sensors],
            input: vec![0; 2 * num_sensors],
            raw: vec![0; num_sensors],
            scratch: Scratch::new(),
        })
    }

    /// Sensor count served.
    #[must_use]
    pub fn num_sensors(&self) -> usize {
        self.num_sensors
    }

    /// Network tables.
    #[must_use]
    pub fn model(&self) -> &QuantizedMlp {
        &self.model
    }

    /// Codec parameters.
    #[must_use]
    pub fn scaling(&self) -> &ScalingParams {
        &self.scaling
    }

    /// Quantized network input from the last call.
    #[must_use]
    pub fn last_input(&self) -> &[i8] {
        &self.input
    }

    /// Raw network output from the last call.
    #[must_use]
    pub fn last_raw_output(&self) -> &[i32] {
        &self.raw
    }

    /// Quantize, infer and dequantize.
    ///
    /// # Panics
    ///
    /// Panics if any slice length differs from [`Predictor::num_sensors`].
    pub fn predict(&mut self, power: &[u32], thermal: &[u16], out: &mut [u16]) {
        self.scaling.quantize(power, thermal, &mut self.input);
        self.model.forward(&self.input, &mut self.raw, &mut self.scratch);
        self.scaling.dequantize_all(&self.raw, out);
        debug!(input = ?self.input, raw = ?self.raw, "prediction");
    }

    /// [`Predictor::predict`] on the power and thermal fields of records.
    ///
    /// # Panics
    ///
    /// Panics if `records` or `out` differ in length from
    /// [`Predictor::num_sensors`].
    pub fn predict_records(&mut self, records: &[SensorRecord], out: &mut [u16]) {
        assert_eq!(records.len(), self.num_sensors, "record count mismatch");
        for ((p, t), r) in self.power.iter_mut().zip(self.thermal.iter_mut()).zip(records) {
            *p = r.power();
            *t = r.thermal();
        }
        let (power, thermal) = (std::mem::take(&mut self.power), std::mem::take(&mut self.thermal));
        self.predict(&power, &thermal, out);
        self.power = power;
        self.thermal = thermal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zoo::ZooModel;
    use therm_chip::NUM_SENSORS;

    fn demo() -> Predictor {
        let mlp = ZooModel::Demo28_2_14.build().unwrap();
        Predictor::new(mlp, ScalingParams::default(), NUM_SENSORS).unwrap()
    }

    #[test]
    fn shape_mismatch_rejected() {
        let toy = ZooModel::Toy321.build().unwrap();
        assert!(Predictor::new(toy, ScalingParams::default(), NUM_SENSORS).is_err());
    }

    #[test]
    fn invalid_scaling_rejected() {
        let mlp = ZooModel::Demo28_2_14.build().unwrap();
        let mut s = ScalingParams::default();
        s.thermal.data_min = 5000;
        assert!(Predictor::new(mlp, s, NUM_SENSORS).is_err());
    }

    #[test]
    fn records_golden_predictions() {
        let mut p = demo();
        let records = [SensorRecord::new(516, 467, 8, 3736); NUM_SENSORS];
        let mut out = [0u16; NUM_SENSORS];
        p.predict_records(&records, &mut out);
        assert_eq!(&p.last_input()[..NUM_SENSORS], &[-128; NUM_SENSORS]);
        assert_eq!(&p.last_input()[NUM_SENSORS..], &[1; NUM_SENSORS]);
        assert_eq!(
            out,
            [244, 312, 380, 448, 516, 584, 652, 720, 788, 856, 924, 992, 1023, 1023]
        );
    }

    #[test]
    fn context_carries_no_state_between_calls() {
        let mut p = demo();
        let mut a = [0u16; NUM_SENSORS];
        let mut b = [0u16; NUM_SENSORS];
        p.predict(&[3736; NUM_SENSORS], &[516; NUM_SENSORS], &mut a);
        p.predict(&[1 << 25; NUM_SENSORS], &[1000; NUM_SENSORS], &mut b);
        p.predict(&[3736; NUM_SENSORS], &[516; NUM_SENSORS], &mut b);
        assert_eq!(a, b);
    }
}
