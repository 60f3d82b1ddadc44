//! Flexvolume driver binary.
//!
//! Invoked by the kubelet once per operation with a verb and its
//! positional arguments. The response envelope is printed to stdout as
//! JSON; logs go to stderr so they never mix with the response.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{Level, error};
use tracing_subscriber::FmtSubscriber;

use flexvolume_driver::{DriverResponse, Result, VolumeDriver, default_registry};

/// CLI arguments for the flexvolume driver
#[derive(Parser, Debug)]
#[command(name = "flexvolume")]
#[command(about = "Flexvolume driver for cloud disk volumes")]
struct Args {
    /// Storage backend to dispatch to
    #[arg(long, default_value = flexvolume_driver::disk::DRIVER_NAME)]
    driver: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "FLEXVOLUME_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe issued by the kubelet at plugin discovery
    Init,
    /// Resolve the device path for a volume attached to this node
    Attach { options: String, node_name: String },
    /// Report success; detach is performed by the cloud control plane
    Detach {
        volume_name: String,
        node_name: String,
    },
    /// Mount a volume (not supported by the disk backend)
    Mount {
        mount_path: String,
        options: String,
    },
    /// Tear down a mount path and its legacy twin
    Unmount { mount_path: String },
    /// Echo the volume name from the options bag
    #[command(name = "getvolumename")]
    GetVolumeName { options: String },
    /// Validate the device path reported by attach
    #[command(name = "waitforattach")]
    WaitForAttach {
        device_path: String,
        options: String,
    },
    /// Mount the attached device (not supported by the disk backend)
    #[command(name = "mountdevice")]
    MountDevice {
        mount_path: String,
        device_path: String,
        options: String,
    },
}

fn dispatch(driver: &dyn VolumeDriver, command: &Command) -> Result<DriverResponse> {
    match command {
        Command::Init => driver.init(),
        Command::Attach { options, node_name } => driver.attach(options, node_name),
        Command::Detach {
            volume_name,
            node_name,
        } => driver.detach(volume_name, node_name),
        Command::Mount {
            mount_path,
            options,
        } => driver.mount(mount_path, options),
        Command::Unmount { mount_path } => driver.unmount(mount_path),
        Command::GetVolumeName { options } => driver.get_volume_name(options),
        Command::WaitForAttach {
            device_path,
            options,
        } => driver.wait_for_attach(device_path, options),
        Command::MountDevice {
            mount_path,
            device_path,
            options,
        } => driver.mount_device(mount_path, device_path, options),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the response JSON consumed by the kubelet.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to initialize logging");
    }

    let registry = default_registry();
    let result = match registry.get(&args.driver) {
        Some(driver) => dispatch(driver, &args.command),
        None => {
            error!(driver = %args.driver, "Unknown driver");
            let response = DriverResponse::failure(format!("unknown driver '{}'", args.driver));
            return emit(&response, ExitCode::FAILURE);
        }
    };

    match result {
        Ok(response) => emit(&response, ExitCode::SUCCESS),
        Err(e) => {
            error!(error = %e, "Operation failed");
            emit(&DriverResponse::failure(e.to_string()), ExitCode::FAILURE)
        }
    }
}

fn emit(response: &DriverResponse, code: ExitCode) -> ExitCode {
    match serde_json::to_string(response) {
        Ok(body) => {
            println!("{}", body);
            code
        }
        Err(e) => {
            error!(error = %e, "Failed to encode response");
            ExitCode::FAILURE
        }
    }
}
