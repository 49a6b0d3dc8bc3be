use clap::{ArgAction, Parser, Subcommand};

use dc310s::{
    ApplyOutcome, Controller, JsonPolicyStore, JsonPresetStore, PolicyStore, PresetStore,
    SerialTransport, TICK_INTERVAL,
};
use std::time::Duration;

#[derive(Parser)]
struct Args {
    /// Serial device, e.g. /dev/ttyUSB0 or COM3.
    device: String,
    #[arg(default_value_t = dc310s::DEFAULT_BAUD)]
    baud_rate: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll measurements once per second and print them.
    Monitor,
    GetVoltage,
    SetVoltage {
        voltage: f64,
    },
    GetCurrent,
    SetCurrent {
        amps: f64,
    },
    MeasureVoltage,
    MeasureCurrent,
    SetOutput {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    ListPresets,
    SavePreset {
        name: String,
        voltage: f64,
        amps: f64,
    },
    /// Apply a saved preset. While the output is live, pass --confirm.
    ApplyPreset {
        name: String,
        #[arg(long)]
        confirm: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
    let args = Args::parse();

    let mut controller = Controller::<SerialTransport>::default();
    let policy_store = JsonPolicyStore::new("reset_settings.json");
    let mut preset_store = JsonPresetStore::new("presets.json");
    controller.set_policy(policy_store.load().unwrap());

    let settings = controller
        .connect(&args.device, args.baud_rate, Duration::from_secs(1))
        .unwrap_or_else(|| {
            eprintln!(
                "connect failed: {}",
                controller
                    .last_error()
                    .map(|e| e.to_string())
                    .unwrap_or_default()
            );
            std::process::exit(1);
        });

    match args.command {
        Commands::Monitor => loop {
            controller.tick();
            let snapshot = controller.snapshot();
            let accumulator = snapshot.accumulator;
            let (h, m, s) = (
                accumulator.elapsed_seconds / 3600,
                (accumulator.elapsed_seconds % 3600) / 60,
                accumulator.elapsed_seconds % 60,
            );
            let fmt = |value: f64, valid: bool| {
                if valid {
                    format!("{value:.3}")
                } else {
                    "---".to_string()
                }
            };
            println!(
                "{} V  {} A  {} W  | {:5} | {h:02}:{m:02}:{s:02}  {:.2} Wh / {:.2} J",
                fmt(snapshot.sample.voltage, snapshot.sample.voltage_valid),
                fmt(snapshot.sample.current, snapshot.sample.current_valid),
                snapshot
                    .sample
                    .power()
                    .map(|p| format!("{p:.2}"))
                    .unwrap_or_else(|| "---".to_string()),
                if snapshot.output_active { "ON" } else { "off" },
                accumulator.energy_joules / 3600.0,
                accumulator.energy_joules,
            );
            std::thread::sleep(TICK_INTERVAL);
        },
        Commands::GetVoltage => println!("{:?}", settings.voltage),
        Commands::SetVoltage { voltage } => {
            if !controller.set_voltage(voltage) {
                eprintln!("voltage command not confirmed");
            }
        }
        Commands::GetCurrent => println!("{:?}", settings.current),
        Commands::SetCurrent { amps } => {
            if !controller.set_current(amps) {
                eprintln!("current command not confirmed");
            }
        }
        Commands::MeasureVoltage => {
            controller.tick();
            println!("{:.3}", controller.snapshot().sample.voltage);
        }
        Commands::MeasureCurrent => {
            controller.tick();
            println!("{:.3}", controller.snapshot().sample.current);
        }
        Commands::SetOutput { enabled } => {
            if !controller.set_output(enabled) {
                eprintln!("output command not confirmed");
            }
        }
        Commands::ListPresets => {
            for (name, preset) in preset_store.load_all().unwrap() {
                println!("{name} ({}V, {}A)", preset.voltage, preset.current);
            }
        }
        Commands::SavePreset {
            name,
            voltage,
            amps,
        } => {
            if !controller
                .save_preset(&mut preset_store, &name, voltage, amps)
                .unwrap()
            {
                eprintln!("rejected: voltage and current must be positive finite numbers");
            }
        }
        Commands::ApplyPreset { name, confirm } => {
            let presets = preset_store.load_all().unwrap();
            let Some(preset) = presets.get(&name) else {
                eprintln!("no preset named {name:?}");
                std::process::exit(1);
            };
            // One tick so output-active reflects the instrument.
            controller.tick();
            let mut outcome = controller.request_apply(preset).unwrap();
            if outcome == ApplyOutcome::ConfirmRequired && confirm {
                outcome = controller.request_apply(preset).unwrap();
            }
            match outcome {
                ApplyOutcome::ConfirmRequired => {
                    eprintln!("output is live; re-run with --confirm to apply")
                }
                ApplyOutcome::Applied {
                    voltage_confirmed,
                    current_confirmed,
                } => {
                    if !(voltage_confirmed && current_confirmed) {
                        eprintln!("warning: apply not fully confirmed");
                    }
                }
            }
        }
    }
}
