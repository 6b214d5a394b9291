// SPDX-License-Identifier: AGPL-3.0-only

//! Sensor-to-prediction pipeline.
//!
//! One iteration, each stage gated by its own handshake channel:
//!
//! ```text
//! store-sensor     frequency + ps-code buffers ─► reconstruct ─► sensor-data buffer
//! compute          sensor-data buffer ─► quantize ─► MLP ─► dequantize ─► prediction buffer
//! store-pred       prediction buffer ─► host
//! store-action     action word ─► host                       (scheduler enabled only)
//! ```
//!
//! Every stage is also callable on its own. After an interrupted wait, retry
//! the stage that failed rather than the whole iteration: the thermal top
//! does not restart a round it has already raised.

use crate::config::PipelineConfig;
use crate::error::{Result, ThermError};
use crate::handshake::{CancelToken, HandshakeCoordinator};
use crate::mmio::{regs, MemoryBus};
use therm_chip::record::THERMAL_MAX;
use therm_chip::{Channel, FrequencyTriple, SensorRecord, TopConfig};
use therm_models::{CalibrationTable, Predictor};
use tracing::{debug, info, warn};

/// What one iteration produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationReport {
    /// Zero-based iteration index.
    pub iteration: u64,
    /// Oscillator counts read in store-sensor.
    pub frequencies: Vec<FrequencyTriple>,
    /// Records written in store-sensor.
    pub records: Vec<SensorRecord>,
    /// Prediction words read back in store-pred, if served.
    pub predictions: Option<Vec<u16>>,
    /// Scheduler action word, if served.
    pub action: Option<u64>,
}

impl IterationReport {
    /// `S<itr>:T,V,C,P|…` line for the host.
    pub fn sensor_line(&self) -> String {
        let body: String = self
            .records
            .iter()
            .map(|r| format!("{},{},{},{}|", r.thermal(), r.voltage(), r.current(), r.power()))
            .collect();
        format!("S{}:{body}", self.iteration)
    }

    /// `F<itr>:F0,F1,F2|…` line for the host.
    pub fn frequency_line(&self) -> String {
        let body: String = self
            .frequencies
            .iter()
            .map(|f| format!("{},{},{}|", f.f0, f.f1, f.f2))
            .collect();
        format!("F{}:{body}", self.iteration)
    }

    /// `P<itr>:code|…` line for the host, if predictions were served.
    pub fn prediction_line(&self) -> Option<String> {
        let body: String = self.predictions.as_ref()?.iter().map(|p| format!("{p}|")).collect();
        Some(format!("P{}:{body}", self.iteration))
    }
}

/// Owns everything one CPU needs to serve the thermal top.
#[derive(Debug, Clone)]
pub struct ThermalPipeline {
    config: PipelineConfig,
    calibration: CalibrationTable,
    predictor: Predictor,
    coordinator: HandshakeCoordinator,
    frequencies: Vec<FrequencyTriple>,
    records: Vec<SensorRecord>,
    predictions: Vec<u16>,
    readback: Vec<u16>,
    iteration: u64,
}

impl ThermalPipeline {
    /// Bind configuration, calibration and predictor.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, or the predictor or
    /// calibration table does not cover `config.num_sensors` sensors.
    pub fn new(
        config: PipelineConfig,
        calibration: CalibrationTable,
        predictor: Predictor,
    ) -> Result<Self> {
        config.validate()?;
        let n = config.num_sensors;
        if predictor.num_sensors() != n {
            return Err(ThermError::invalid_config(format!(
                "predictor serves {} sensors, pipeline has {n}",
                predictor.num_sensors()
            )));
        }
        if calibration.len() < n {
            return Err(ThermError::invalid_config(format!(
                "calibration covers {} sensors, pipeline has {n}",
                calibration.len()
            )));
        }

        info!(
            num_sensors = n,
            wait = ?config.wait,
            predictions = config.service_predictions,
            action = config.service_action,
            "Thermal pipeline ready"
        );

        Ok(Self {
            coordinator: HandshakeCoordinator::new(config.wait),
            config,
            calibration,
            predictor,
            frequencies: vec![FrequencyTriple::default(); n],
            records: vec![SensorRecord::default(); n],
            predictions: vec![0; n],
            readback: vec![0; n],
            iteration: 0,
        })
    }

    /// Abort waits when `token` is cancelled. Channel state and round
    /// counts carry over.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.coordinator.set_cancel(token);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Handshake state.
    pub fn coordinator(&self) -> &HandshakeCoordinator {
        &self.coordinator
    }

    /// Iterations completed.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Records from the last store-sensor stage.
    pub fn records(&self) -> &[SensorRecord] {
        &self.records
    }

    /// Predictions from the last compute stage.
    pub fn predictions(&self) -> &[u16] {
        &self.predictions
    }

    /// Write calibration, standardization and top-config words.
    ///
    /// The top regfile goes last, word 0 last of all: it carries the start
    /// bit that sets the thermal top running.
    #[allow(clippy::cast_sign_loss)]
    pub fn initialize<B: MemoryBus + ?Sized>(&self, bus: &mut B) {
        if let Some(weights) = self.calibration.sensor(0) {
            for (i, w) in weights.to_buffer_words().iter().enumerate() {
                regs::SENSOR_WEIGHTS.index(i).write(bus, *w as u64);
            }
        }

        let (quant, dequant) = self.predictor.scaling().regfile_entries();
        for i in 0..self.config.num_sensors {
            regs::QUANT_CONFIG.index(i).write(bus, quant.to_word());
            regs::DEQUANT_CONFIG.index(i).write(bus, dequant.to_word());
        }

        let words = self.config.top.to_words();
        for i in TopConfig::write_order() {
            regs::TOP_CONFIG.index(i).write(bus, words[i]);
        }
        info!(
            num_itr = self.config.top.num_itr,
            word0 = format_args!("{:#018x}", words[0]),
            "Thermal top configured"
        );
    }

    /// Store-sensor stage: read counts, reconstruct, write records.
    ///
    /// # Errors
    ///
    /// Returns an error if the start wait times out or is cancelled.
    pub fn store_sensors<B: MemoryBus + ?Sized>(&mut self, bus: &mut B) -> Result<&[SensorRecord]> {
        let Self {
            coordinator,
            calibration,
            frequencies,
            records,
            ..
        } = self;
        coordinator.rendezvous(bus, Channel::StoreSensor, |bus| {
            for (i, (f, r)) in frequencies.iter_mut().zip(records.iter_mut()).enumerate() {
                *f = FrequencyTriple::unpack(regs::FREQUENCY.index(i).read(bus));
                let ps_code = regs::PS_CODE.index(i).read(bus);
                *r = calibration.reconstruct(i, *f, ps_code);
                regs::SENSOR_DATA.index(i).write(bus, r.pack());
            }
        })?;
        Ok(&self.records)
    }

    /// Compute stage: records in, prediction words out.
    ///
    /// # Errors
    ///
    /// Returns an error if the start wait times out or is cancelled.
    pub fn compute<B: MemoryBus + ?Sized>(&mut self, bus: &mut B) -> Result<&[u16]> {
        let Self {
            coordinator,
            predictor,
            records,
            predictions,
            ..
        } = self;
        coordinator.rendezvous(bus, Channel::Compute, |bus| {
            for (i, r) in records.iter_mut().enumerate() {
                *r = SensorRecord::unpack(regs::SENSOR_DATA.index(i).read(bus));
            }
            predictor.predict_records(records, predictions);
            for (i, &p) in predictions.iter().enumerate() {
                regs::PREDICTION.index(i).write(bus, u64::from(p));
            }
        })?;
        debug!(predictions = ?self.predictions, "compute");
        Ok(&self.predictions)
    }

    /// Store-prediction stage: read the prediction buffer back.
    ///
    /// # Errors
    ///
    /// Returns an error if the start wait times out or is cancelled.
    #[allow(clippy::cast_possible_truncation)]
    pub fn store_predictions<B: MemoryBus + ?Sized>(&mut self, bus: &mut B) -> Result<&[u16]> {
        let Self {
            coordinator,
            readback,
            ..
        } = self;
        coordinator.rendezvous(bus, Channel::StorePrediction, |bus| {
            for (i, p) in readback.iter_mut().enumerate() {
                *p = (regs::PREDICTION.index(i).read(bus) & u64::from(THERMAL_MAX)) as u16;
            }
        })?;
        Ok(&self.readback)
    }

    /// Store-action stage: read and acknowledge the scheduler's action.
    ///
    /// # Errors
    ///
    /// Returns an error if the start wait times out or is cancelled.
    pub fn store_action<B: MemoryBus + ?Sized>(&mut self, bus: &mut B) -> Result<u64> {
        self.coordinator
            .rendezvous(bus, Channel::StoreAction, |bus| regs::ACTION.read(bus))
    }

    /// Run every enabled stage once, in pipeline order.
    ///
    /// # Errors
    ///
    /// Returns the first stage error; later stages do not run.
    pub fn run_iteration<B: MemoryBus + ?Sized>(&mut self, bus: &mut B) -> Result<IterationReport> {
        self.store_sensors(bus)?;

        let predictions = if self.config.service_predictions {
            self.compute(bus)?;
            Some(self.store_predictions(bus)?.to_vec())
        } else {
            None
        };

        let action = if self.config.service_action {
            Some(self.store_action(bus)?)
        } else {
            None
        };

        let report = IterationReport {
            iteration: self.iteration,
            frequencies: self.frequencies.clone(),
            records: self.records.clone(),
            predictions,
            action,
        };
        self.iteration += 1;
        debug!(iteration = report.iteration, "iteration complete");
        Ok(report)
    }

    /// Initialize, then serve the `config.top.num_itr` iterations the
    /// thermal top was told to run, collecting the reports.
    ///
    /// # Errors
    ///
    /// Returns the first stage error. Reports of iterations finished before
    /// it are dropped; use [`ThermalPipeline::run_with`] to keep them.
    pub fn run<B: MemoryBus + ?Sized>(&mut self, bus: &mut B) -> Result<Vec<IterationReport>> {
        let mut reports = Vec::new();
        self.run_with(bus, |report| reports.push(report))?;
        Ok(reports)
    }

    /// Initialize, then serve `config.top.num_itr` iterations, handing each
    /// report to `on_report` as soon as its iteration completes.
    ///
    /// Returns the number of iterations served.
    ///
    /// # Errors
    ///
    /// Returns the first stage error. Every iteration completed before it
    /// has already been passed to `on_report`.
    pub fn run_with<B, F>(&mut self, bus: &mut B, mut on_report: F) -> Result<u32>
    where
        B: MemoryBus + ?Sized,
        F: FnMut(IterationReport),
    {
        self.initialize(bus);
        let iterations = self.config.top.num_itr;
        for done in 0..iterations {
            match self.run_iteration(bus) {
                Ok(report) => on_report(report),
                Err(e) => {
                    warn!(completed = done, iterations, error = %e, "Pipeline run interrupted");
                    return Err(e);
                }
            }
        }
        info!(iterations, "Pipeline run complete");
        Ok(iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{FakeMemory, SimulatedChip, Stimulus};
    use crate::handshake::{ChannelState, WaitPolicy};
    use therm_chip::{map, NUM_SENSORS};
    use therm_models::{CalibrationWeights, ScalingParams, ZooModel};

    fn predictor(n: usize) -> Predictor {
        let mlp = ZooModel::Persistence28_14_14.build().unwrap();
        Predictor::new(mlp, ScalingParams::default(), n).unwrap()
    }

    fn pipeline() -> ThermalPipeline {
        ThermalPipeline::new(
            PipelineConfig::default(),
            CalibrationTable::uniform(CalibrationWeights::factory(), NUM_SENSORS),
            predictor(NUM_SENSORS),
        )
        .unwrap()
    }

    #[test]
    fn sensor_count_mismatch_rejected() {
        let err = ThermalPipeline::new(
            PipelineConfig::default().with_num_sensors(4),
            CalibrationTable::uniform(CalibrationWeights::factory(), NUM_SENSORS),
            predictor(NUM_SENSORS),
        )
        .unwrap_err();
        assert!(matches!(err, ThermError::InvalidConfig { .. }), "{err}");

        let err = ThermalPipeline::new(
            PipelineConfig::default(),
            CalibrationTable::uniform(CalibrationWeights::factory(), 3),
            predictor(NUM_SENSORS),
        )
        .unwrap_err();
        assert!(err.to_string().contains("calibration"), "{err}");
    }

    #[test]
    #[allow(clippy::cast_possible_wrap)]
    fn initialize_writes_calibration_and_config() {
        let mut mem = FakeMemory::shared_window();
        pipeline().initialize(&mut mem);

        let words: Vec<i64> = (0..map::SENSOR_WEIGHT_WORDS)
            .map(|i| regs::SENSOR_WEIGHTS.index(i).read(&mut mem) as i64)
            .collect();
        assert_eq!(
            CalibrationWeights::from_buffer_words(&words).unwrap(),
            CalibrationWeights::factory()
        );

        let top: [u64; 4] = std::array::from_fn(|i| regs::TOP_CONFIG.index(i).read(&mut mem));
        assert_eq!(TopConfig::from_words(top), TopConfig::default());

        let (q, d) = ScalingParams::default().regfile_entries();
        assert_eq!(regs::QUANT_CONFIG.index(13).read(&mut mem), q.to_word());
        assert_eq!(regs::DEQUANT_CONFIG.index(13).read(&mut mem), d.to_word());
        assert_eq!(regs::QUANT_CONFIG.index(14).read(&mut mem), 0);
    }

    #[test]
    fn attaching_cancel_keeps_channel_state() {
        let mut chip = SimulatedChip::new(Stimulus::default());
        let mut p = pipeline();
        p.initialize(&mut chip);
        p.store_sensors(&mut chip).unwrap();

        let p = p.with_cancel(CancelToken::new());
        assert_eq!(p.coordinator().rounds(Channel::StoreSensor), 1);
        assert_eq!(
            p.coordinator().state(Channel::StoreSensor),
            ChannelState::AwaitingFinishAck
        );
    }

    #[test]
    fn run_with_hands_over_reports_before_failing() {
        let token = CancelToken::new();
        let config = PipelineConfig::default()
            .with_iterations(3)
            .with_wait(WaitPolicy::MaxPolls(10_000));
        let mut p = ThermalPipeline::new(
            config,
            CalibrationTable::uniform(CalibrationWeights::factory(), NUM_SENSORS),
            predictor(NUM_SENSORS),
        )
        .unwrap()
        .with_cancel(token.clone());
        let mut chip = SimulatedChip::new(Stimulus::default());

        let mut seen = Vec::new();
        let err = p
            .run_with(&mut chip, |report| {
                seen.push(report.iteration);
                token.cancel();
            })
            .unwrap_err();
        assert!(
            matches!(
                err,
                ThermError::Cancelled {
                    channel: Channel::StoreSensor
                }
            ),
            "{err}"
        );
        assert_eq!(seen, vec![0]);
        assert_eq!(p.iteration(), 1);
    }

    #[test]
    fn run_serves_configured_iteration_count() {
        let config = PipelineConfig::default()
            .with_iterations(2)
            .with_wait(WaitPolicy::MaxPolls(10_000));
        let mut p = ThermalPipeline::new(
            config,
            CalibrationTable::uniform(CalibrationWeights::factory(), NUM_SENSORS),
            predictor(NUM_SENSORS),
        )
        .unwrap();
        let mut chip = SimulatedChip::new(Stimulus::default());
        let reports = p.run(&mut chip).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(chip.is_done());
    }

    #[test]
    fn host_lines() {
        let report = IterationReport {
            iteration: 3,
            frequencies: vec![FrequencyTriple::new(10, 20, 21); 2],
            records: vec![SensorRecord::new(516, 467, 8, 3736); 2],
            predictions: Some(vec![516, 1023]),
            action: None,
        };
        assert_eq!(report.sensor_line(), "S3:516,467,8,3736|516,467,8,3736|");
        assert_eq!(report.frequency_line(), "F3:10,20,21|10,20,21|");
        assert_eq!(report.prediction_line().unwrap(), "P3:516|1023|");

        let no_pred = IterationReport {
            predictions: None,
            ..report
        };
        assert!(no_pred.prediction_line().is_none());
    }
}
