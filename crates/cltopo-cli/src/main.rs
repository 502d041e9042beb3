//! cltopo - inspect the compute platforms and devices of this machine
//!
//! Reads a TOML configuration, builds a registry over the configured
//! runtime, and prints the detected topology as text or JSON.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cltopo_core::{
    ComputeApi, Device, DeviceSummary, DeviceType, FixtureApi, Platform, Registry, TopologyReport,
};
use serde_json::json;
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{BackendKind, Config, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "cltopo")]
#[command(about = "Compute platform and device inspector")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "cltopo.toml")]
    config: PathBuf,

    /// Use this fixture file instead of the configured backend
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Device classes to enumerate, e.g. `gpu,cpu`
    #[arg(long = "type", value_delimiter = ',')]
    device_types: Vec<DeviceType>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every platform and its devices
    List,
    /// Show the attributes of one device
    Show {
        /// Platform index in enumeration order
        #[arg(short, long, default_value_t = 0)]
        platform: usize,
        /// Device index within the platform
        #[arg(short, long, default_value_t = 0)]
        device: usize,
    },
    /// Split one device into sub-devices
    Partition {
        #[arg(short, long, default_value_t = 0)]
        platform: usize,
        #[arg(short, long, default_value_t = 0)]
        device: usize,
        /// Compute units per sub-device
        #[arg(long, conflicts_with = "counts")]
        equally: Option<u32>,
        /// Compute units of each sub-device, e.g. `4,8`
        #[arg(long, value_delimiter = ',')]
        counts: Vec<u32>,
    },
    /// Show the default platform and device
    Defaults,
    /// Write a default configuration file
    Init,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("cltopo v{}", env!("CARGO_PKG_VERSION"));

    if let Command::Init = args.command {
        config::save_default_config(&args.config)
            .with_context(|| format!("writing {}", args.config.display()))?;
        println!("Wrote default configuration to {}", args.config.display());
        return Ok(());
    }

    let mut config = config::load_config(&args.config)?;

    // Command-line flags override the file
    if let Some(fixture) = args.fixture {
        config.backend.kind = BackendKind::Fixture;
        config.backend.fixture = fixture;
    }
    if !args.device_types.is_empty() {
        config.registry.device_types = args.device_types;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }

    debug!(
        backend = ?config.backend.kind,
        filter = %config.registry.device_filter(),
        "Configuration loaded"
    );

    let registry = Registry::install_global(build_registry(&config)?)?;
    let format = config.output.format;

    match args.command {
        Command::List => {
            let report = TopologyReport::collect(&*registry.get_all()?)?;
            match format {
                OutputFormat::Text => print!("{}", report),
                OutputFormat::Json => println!("{}", report.to_json()?),
            }
        }
        Command::Show { platform, device } => {
            let device = select_device(registry, platform, device)?;
            show_device(&device, format)?;
        }
        Command::Partition {
            platform,
            device,
            equally,
            counts,
        } => {
            let device = select_device(registry, platform, device)?;
            let subs = match equally {
                Some(units) => device.subdevices_equally(units)?,
                None if !counts.is_empty() => device.subdevices(&counts)?,
                None => bail!("pass --equally <units> or --counts <n,...>"),
            };
            let summaries = subs
                .iter()
                .map(DeviceSummary::from_device)
                .collect::<cltopo_core::Result<Vec<_>>>()?;
            match format {
                OutputFormat::Text => {
                    println!("{} split into {} sub-device(s):", device.name()?, summaries.len());
                    for summary in &summaries {
                        println!("    {}", summary);
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
            }
        }
        Command::Defaults => {
            let platform = Platform::get_default()?;
            let device = Device::get_default()?;
            match format {
                OutputFormat::Text => {
                    println!("platform: {} {}", platform.id(), platform.name()?);
                    println!("device:   {} {}", device.id(), device.name()?);
                }
                OutputFormat::Json => {
                    let value = json!({
                        "platform": { "id": platform.id(), "name": platform.name()? },
                        "device": { "id": device.id(), "name": device.name()? },
                    });
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
            }
        }
        // Written before the registry is built
        Command::Init => {}
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    // Logs go to stderr so JSON output stays parseable
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(true)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(());
    }

    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn build_registry(config: &Config) -> Result<Registry> {
    let api: Arc<dyn ComputeApi> = match config.backend.kind {
        BackendKind::Fixture => {
            let path = &config.backend.fixture;
            let api = FixtureApi::from_file(path)
                .with_context(|| format!("loading fixture {}", path.display()))?;
            Arc::new(api)
        }
        BackendKind::Opencl => native_api()?,
    };
    Ok(Registry::with_options(api, config.registry.clone()))
}

#[cfg(feature = "opencl")]
fn native_api() -> Result<Arc<dyn ComputeApi>> {
    Ok(Arc::new(cltopo_core::OpenClApi::new()))
}

#[cfg(not(feature = "opencl"))]
fn native_api() -> Result<Arc<dyn ComputeApi>> {
    bail!("built without the `opencl` feature; configure a fixture backend instead")
}

fn select_device(registry: &Registry, platform: usize, device: usize) -> Result<Device> {
    let epoch = registry.get_all()?;
    let Some(platform) = epoch.platforms().get(platform) else {
        bail!("no platform at index {} ({} detected)", platform, epoch.len());
    };
    let Some(found) = platform.devices().get(device) else {
        bail!(
            "platform {} has no device at index {} ({} enumerated)",
            platform.id(),
            device,
            platform.device_count()
        );
    };
    Ok(found.clone())
}

fn show_device(device: &Device, format: OutputFormat) -> Result<()> {
    let summary = DeviceSummary::from_device(device)?;
    let version = device.version()?;
    let extensions = device.extensions()?;
    let single = device.has_single_precision()?;
    let double = device.has_double_precision()?;
    let max_work_group = device.max_work_group_size().ok();
    // Vendor attributes are absent on most devices
    let compute_capability = device.compute_capability_nv().ok();
    let warp_size = device.warp_size_nv().ok();

    match format {
        OutputFormat::Text => {
            println!("{}", summary);
            println!("  version:      {}", version);
            println!("  precision:    single={} double={}", single, double);
            if let Some(size) = max_work_group {
                println!("  work group:   {}", size);
            }
            if let Some((major, minor)) = compute_capability {
                println!("  compute cap:  {}.{}", major, minor);
            }
            if let Some(warp) = warp_size {
                println!("  warp size:    {}", warp);
            }
            println!("  extensions:   {}", extensions.join(" "));
        }
        OutputFormat::Json => {
            let value = json!({
                "device": summary,
                "version": version,
                "single_precision": single,
                "double_precision": double,
                "max_work_group_size": max_work_group,
                "compute_capability_nv": compute_capability,
                "warp_size_nv": warp_size,
                "extensions": extensions,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}
