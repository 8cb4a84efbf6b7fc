//! ifpipe command - pipe a TAP or macvtap interface through stdin/stdout.

use std::path::PathBuf;

use clap::Parser;
use ifpipe::{Config, DEFAULT_BUFFER_SIZE, Device, TUN_DEVICE_PATH};

#[derive(Parser, Debug)]
#[command(
    name = "ifpipe",
    version,
    about = "Pipe a TAP or macvtap interface through stdin/stdout",
    long_about = "Frames read from the interface are written to stdout, data read from stdin \
                  is written to the interface. Exits successfully when stdin is closed."
)]
struct Cli {
    /// Packet buffer size in bytes.
    #[arg(
        short = 's',
        value_name = "BUFSIZE",
        default_value_t = DEFAULT_BUFFER_SIZE,
        value_parser = ifpipe::parse_buffer_size
    )]
    buffer_size: usize,

    /// Tunnel control device.
    #[arg(
        short = 'd',
        value_name = "DEVICE",
        default_value = TUN_DEVICE_PATH,
        value_parser = parse_tun_device
    )]
    tun_device: PathBuf,

    /// Don't set IFF_NO_PI on TAP devices.
    #[arg(long = "pi", overrides_with = "no_pi")]
    pi: bool,

    /// Set IFF_NO_PI on TAP devices (default).
    #[arg(long = "no-pi", overrides_with = "pi")]
    no_pi: bool,

    /// Set IFF_VNET_HDR on macvtap devices.
    #[arg(long = "vnet-hdr", overrides_with = "no_vnet_hdr")]
    vnet_hdr: bool,

    /// Clear IFF_VNET_HDR on macvtap devices (default).
    #[arg(long = "no-vnet-hdr", overrides_with = "vnet_hdr")]
    no_vnet_hdr: bool,

    /// Interface name or macvtap character device path.
    #[arg(value_name = "IFNAME")]
    interface: String,
}

impl Cli {
    fn config(&self) -> ifpipe::Result<Config> {
        Config::builder()
            .buffer_size(self.buffer_size)
            .tun_device(&self.tun_device)
            .packet_info(self.pi && !self.no_pi)
            .vnet_hdr(self.vnet_hdr && !self.no_vnet_hdr)
            .build()
    }
}

fn parse_tun_device(s: &str) -> Result<PathBuf, String> {
    if s.is_empty() {
        return Err("tunnel device name expected".to_string());
    }
    Ok(PathBuf::from(s))
}

fn main() -> anyhow::Result<()> {
    // stdout carries frames, so logs must go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    let config = cli.config()?;
    tracing::debug!(?config, interface = %cli.interface, "starting");

    let device = Device::open(&cli.interface, &config)?;

    let reason = ifpipe::run_stdio(device, &config)
        .map_err(|e| anyhow::anyhow!("failed to duplicate stdio: {}", e))?;
    if !reason.is_clean() {
        eprintln!("Error: {}", reason);
    }

    Ok(reason.exit_code())
}
