//! Surround Router - route a 5.1 capture device to stereo outputs
//!
//! Loads the routing preset from the config file, starts the session and
//! runs until `q` or end of input on stdin.
//!
//! ## Command line flags
//!
//! - `--list-devices`: Print usable input and output devices, then exit
//! - `--config <path>`: Use another config file
//! - `--input <name>`: Override the preset's input device
//! - `--save`: Write the routing back to the config file on exit

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use router_core::audio::{CpalBackend, DeviceId};
use router_core::config::{self, RouterConfig};
use router_core::{LevelBroadcaster, Router};

struct Args {
    list_devices: bool,
    config_path: PathBuf,
    input: Option<String>,
    save: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        list_devices: false,
        config_path: config::default_config_path(),
        input: None,
        save: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--list-devices" => args.list_devices = true,
            "--save" => args.save = true,
            "--config" => {
                args.config_path = iter.next().context("--config needs a path")?.into();
            }
            "--input" => {
                args.input = Some(iter.next().context("--input needs a device name")?);
            }
            other => bail!("Unknown argument: {}", other),
        }
    }
    Ok(args)
}

fn list_devices(router: &Router) -> Result<()> {
    println!("Inputs (>= 6 channels):");
    for device in router.input_devices()? {
        println!("  {}", device);
    }
    println!("Outputs (>= 2 channels):");
    for device in router.output_devices()? {
        println!("  {}", device);
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let config: RouterConfig = config::load_config(&args.config_path);
    let router = Arc::new(Router::new(Arc::new(CpalBackend::new()), config.engine.clone()));

    if args.list_devices {
        return list_devices(&router);
    }

    router.apply_preset(&config.routing);

    let input = args
        .input
        .map(DeviceId::new)
        .or_else(|| router.input_device())
        .context("No input device configured (use --input or set routing.input_device)")?;
    router
        .start(&input)
        .with_context(|| format!("Failed to start with input {}", input))?;

    let broadcaster = LevelBroadcaster::spawn(&router, config.engine.meter_interval())
        .context("Failed to spawn level broadcast thread")?;
    let levels = broadcaster.subscribe(1);
    thread::Builder::new()
        .name("level-log".to_string())
        .spawn(move || {
            for update in levels {
                log::debug!("Levels: in {:?} out {:?}", update.input_levels, update.output_levels);
            }
        })
        .context("Failed to spawn level log thread")?;

    println!("Routing {} - 's' prints the state, 'q' quits", input);
    for line in std::io::stdin().lock().lines() {
        match line?.trim() {
            "q" => break,
            "s" => println!("{}", serde_json::to_string_pretty(&router.snapshot())?),
            _ => {}
        }
    }

    drop(broadcaster);
    router.stop();

    if args.save {
        let saved = RouterConfig {
            routing: router.preset(),
            ..config
        };
        config::save_config(&saved, &args.config_path)?;
        log::info!("Routing saved to {:?}", args.config_path);
    }
    Ok(())
}
