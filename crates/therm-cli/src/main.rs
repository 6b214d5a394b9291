// SPDX-License-Identifier: AGPL-3.0-only

//! `therm` — command-line front end for the thermal-prediction pipeline.
//!
//! ```text
//! USAGE:
//!   therm simulate [--iterations N] [--timeout-ms T] [--model NAME] [--action] [--ramp STEP]
//!   therm decode <word>                 Unpack a sensor-record word
//!   therm reconstruct --f0 --f1 --f2    One sample through factory calibration
//!   therm regfile                       Default configuration words
//!   therm model [NAME]                  Model summary (all models if omitted)
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use therm_chip::{FrequencyTriple, SensorRecord, TopConfig, NUM_SENSORS};
use therm_driver::{PipelineConfig, SimulatedChip, Stimulus, ThermalPipeline, WaitPolicy};
use therm_models::{
    reconstruct, CalibrationTable, CalibrationWeights, Predictor, Requant, ScalingParams,
    WeightFormat, ZooModel,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "therm", about = "Thermal-prediction test chip CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the pipeline against the simulated thermal top.
    Simulate {
        /// Iterations to run.
        #[arg(long, default_value_t = 3)]
        iterations: u32,
        /// Bound each handshake wait (overrides THERM_WAIT_TIMEOUT_MS).
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Compiled model to run.
        #[arg(long, default_value = "persistence_28_14_14")]
        model: String,
        /// Serve the scheduler's store-action channel.
        #[arg(long)]
        action: bool,
        /// Ramp the oscillator counts by this step per iteration and sensor.
        #[arg(long)]
        ramp: Option<u16>,
    },
    /// Unpack a 64-bit sensor-record word (hex with 0x prefix, or decimal).
    Decode {
        /// Record word.
        word: String,
    },
    /// Reconstruct one sample with the factory calibration.
    Reconstruct {
        /// Ring-oscillator count 0 (10 bits).
        #[arg(long)]
        f0: u16,
        /// Ring-oscillator count 1 (11 bits).
        #[arg(long)]
        f1: u16,
        /// Ring-oscillator count 2 (11 bits).
        #[arg(long)]
        f2: u16,
        /// Power-switch code.
        #[arg(long, default_value_t = 1)]
        ps_code: u32,
    },
    /// Print the packed top / quant / dequant words for the default configuration.
    Regfile,
    /// Print a model summary.
    Model {
        /// Model name; lists every compiled model if omitted.
        name: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Simulate {
            iterations,
            timeout_ms,
            model,
            action,
            ramp,
        } => cmd_simulate(iterations, timeout_ms, &model, action, ramp)?,
        Cmd::Decode { word } => cmd_decode(&word)?,
        Cmd::Reconstruct { f0, f1, f2, ps_code } => cmd_reconstruct(f0, f1, f2, ps_code),
        Cmd::Regfile => cmd_regfile(),
        Cmd::Model { name } => cmd_model(name.as_deref())?,
    }

    Ok(())
}

fn cmd_simulate(
    iterations: u32,
    timeout_ms: Option<u64>,
    model: &str,
    action: bool,
    ramp: Option<u16>,
) -> Result<()> {
    let model: ZooModel = model.parse()?;
    if !model.fits_sensor_array() {
        bail!("{model} does not take {NUM_SENSORS} sensors; pick a 28-input model");
    }

    let mut config = PipelineConfig::from_env()?
        .with_iterations(iterations)
        .with_action(action);
    if let Some(ms) = timeout_ms {
        config = config.with_wait(WaitPolicy::Timeout(Duration::from_millis(ms)));
    }

    let stimulus = match ramp {
        Some(step) => Stimulus::Ramp {
            base: FrequencyTriple::new(300, 600, 700),
            step,
            ps_code: 32,
        },
        None => Stimulus::default(),
    };

    let predictor = Predictor::new(model.build()?, ScalingParams::default(), config.num_sensors)?;
    let calibration = CalibrationTable::uniform(CalibrationWeights::factory(), config.num_sensors);
    let mut pipeline = ThermalPipeline::new(config, calibration, predictor)?;
    let mut chip = SimulatedChip::new(stimulus);
    tracing::info!(%model, iterations, ?stimulus, "Starting simulation");

    let served = pipeline
        .run_with(&mut chip, |report| {
            println!("{}", report.sensor_line());
            println!("{}", report.frequency_line());
            if let Some(line) = report.prediction_line() {
                println!("{line}");
            }
            if let Some(a) = report.action {
                println!("A{}:{a}", report.iteration);
            }
        })
        .context("simulated run failed")?;

    if let Some(stats) = pipeline.coordinator().last_round() {
        eprintln!(
            "{served} iterations, last round {} ({} polls, {} cycles)",
            stats.channel,
            stats.polls,
            stats.cycles
        );
    }
    Ok(())
}

fn parse_word(s: &str) -> Result<u64> {
    let s = s.trim().replace('_', "");
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.with_context(|| format!("not a 64-bit word: {s}"))
}

fn cmd_decode(word: &str) -> Result<()> {
    let w = parse_word(word)?;
    let r = SensorRecord::unpack(w);
    println!("Word    : {w:#018x}");
    println!("Thermal : {}", r.thermal());
    println!("Voltage : {}", r.voltage());
    println!("Current : {}", r.current());
    println!("Power   : {}", r.power());
    if r.pack() != w {
        println!("Note    : reserved bits [63:62] set");
    }
    Ok(())
}

fn cmd_reconstruct(f0: u16, f1: u16, f2: u16, ps_code: u32) {
    let triple = FrequencyTriple::new(f0, f1, f2);
    if triple != (FrequencyTriple { f0, f1, f2 }) {
        eprintln!("counts truncated to field widths: {triple:?}");
    }
    let r = reconstruct(triple, &CalibrationWeights::factory(), ps_code);
    println!("Frequency word : {:#010x}", triple.pack());
    println!("Record word    : {:#018x}", r.pack());
    println!(
        "T,V,C,P        : {},{},{},{}",
        r.thermal(),
        r.voltage(),
        r.current(),
        r.power()
    );
}

fn cmd_regfile() {
    let top = TopConfig::default();
    let words = top.to_words();
    println!("Top config (write order {:?}):", TopConfig::write_order());
    for (i, w) in words.iter().enumerate() {
        println!("  word {i} : {w:#018x}");
    }

    let (quant, dequant) = ScalingParams::default().regfile_entries();
    println!("Quant entry   : {:#018x}  {quant:?}", quant.to_word());
    println!("Dequant entry : {:#018x}  {dequant:?}", dequant.to_word());
}

fn cmd_model(name: Option<&str>) -> Result<()> {
    let Some(name) = name else {
        for m in ZooModel::ALL {
            println!("{:<22} {}", m.name(), m.description());
        }
        return Ok(());
    };

    let model: ZooModel = name.parse()?;
    let mlp = model.build()?;
    println!("{model}: {}", model.description());
    println!("Input {} → output {}", mlp.input_size(), mlp.output_size());

    for (i, layer) in mlp.linear_layers().iter().enumerate() {
        let format = match layer.format() {
            WeightFormat::ZeroPoint { .. } => "zero-point",
            WeightFormat::PreScaled => "pre-scaled",
        };
        println!(
            "  linear[{i}] {:>3} → {:<3} {format}",
            layer.in_features(),
            layer.out_features()
        );
        if let Some(q) = mlp.quant_layers().get(i) {
            let kind = match q.requant() {
                Requant::Shift { precision_bits, .. } => format!("shift, {precision_bits} bits"),
                Requant::Divide { .. } => "divide".to_string(),
            };
            println!("  quant[{i}]  {:>3} channels  {kind}", q.channels());
        }
    }
    Ok(())
}
