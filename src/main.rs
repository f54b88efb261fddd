use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info};
use usb_stream::config::{get_default_config_path, Config, ConfigLoader};
use usb_stream::port::{
    device_path, LoopbackOpener, OpenStatus, PortTransport, TransportMode,
};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "usb-stream",
    version,
    about = "Open, probe and exercise USB-CDC serial ports.",
    long_about = "Opens a USB-CDC serial device with either the blocking or the event-driven transfer model and moves raw bytes over it. Settings come from usb-stream.toml, USB_STREAM_* environment variables and the flags below."
)]
struct Cli {
    /// Configuration file to use instead of the standard lookup.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the event-driven transport.
    #[arg(short, long, global = true)]
    event_driven: bool,

    /// Baud rate; unsupported rates fall back to 115200.
    #[arg(short, long, global = true)]
    baud: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a device and print the open status code.
    Probe {
        /// Device suffix ("0", "3") or full path.
        device: Option<String>,
    },
    /// Write bytes to a device.
    Send {
        device: String,
        data: String,
        /// Interpret DATA as hex, e.g. "f7 7b 00 00".
        #[arg(long)]
        hex: bool,
    },
    /// Print bytes received from a device.
    Listen {
        device: Option<String>,
        /// Stop after this many milliseconds; run until interrupted when omitted.
        #[arg(long)]
        duration_ms: Option<u64>,
        /// Print received bytes as hex.
        #[arg(long)]
        hex: bool,
    },
    /// Round-trip a pattern through the in-memory loopback in both modes.
    EchoTest,
    /// Show the resolved configuration, or write it to the default location.
    Config {
        #[arg(long)]
        write: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let loader = match load_config(cli.config.as_ref()) {
        Ok(loader) => loader,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };

    let mut config = loader.config().clone();
    if cli.event_driven {
        config.port.event_driven = true;
    }
    if let Some(baud) = cli.baud {
        config.port.baud_rate = baud;
    }

    if let Err(e) = usb_stream::logging::init(&config.logging) {
        eprintln!("warning: logging disabled: {e}");
    }

    let code = match run(cli.command, &config, &loader) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {e}");
            1
        }
    };
    std::process::exit(code);
}

fn load_config(path: Option<&PathBuf>) -> Result<ConfigLoader, usb_stream::ConfigError> {
    match path {
        Some(path) => ConfigLoader::load_from(path),
        None => ConfigLoader::load(),
    }
}

type CliResult = Result<i32, Box<dyn std::error::Error>>;

fn run(command: Command, config: &Config, loader: &ConfigLoader) -> CliResult {
    match command {
        Command::Probe { device } => probe(config, device),
        Command::Send { device, data, hex } => send(config, &device, &data, hex),
        Command::Listen {
            device,
            duration_ms,
            hex,
        } => listen(config, device, duration_ms.map(Duration::from_millis), hex),
        Command::EchoTest => echo_test(config),
        Command::Config { write } => show_config(config, loader, write),
    }
}

fn resolve_device(config: &Config, device: Option<String>) -> Result<String, String> {
    device
        .or_else(|| config.port.device.clone())
        .ok_or_else(|| "no device given and [port] device is not set".to_string())
}

fn probe(config: &Config, device: Option<String>) -> CliResult {
    let device = resolve_device(config, device)?;
    let mut port = PortTransport::from_config(config);
    let status = port.open(&device);

    println!("{} {} ({status})", device_path(&device), status.code());
    if status.is_ok() {
        let settings = port.settings();
        println!(
            "mode={:?} baud={} data_bits={} parity={:?} stop_bits={} flow={:?}",
            port.mode(),
            settings.baud_rate.get(),
            settings.data_bits.code(),
            settings.parity,
            settings.stop_bits.code(),
            settings.flow_control,
        );
    }
    Ok(status.code())
}

fn send(config: &Config, device: &str, data: &str, hex: bool) -> CliResult {
    let payload = if hex {
        parse_hex(data)?
    } else {
        data.as_bytes().to_vec()
    };

    let mut port = PortTransport::from_config(config);
    port.try_open(device)?;
    let written = port.try_write(&payload)?;
    info!(device = %device, written, requested = payload.len(), "sent");
    println!("{written}/{} bytes written", payload.len());

    Ok(if written == payload.len() { 0 } else { 1 })
}

fn listen(config: &Config, device: Option<String>, duration: Option<Duration>, hex: bool) -> CliResult {
    let device = resolve_device(config, device)?;
    let mut port = PortTransport::from_config(config);
    port.try_open(&device)?;

    let deadline = duration.and_then(|d| Instant::now().checked_add(d));
    let mut buffer = [0u8; 512];
    let mut stdout = std::io::stdout().lock();
    let mut total = 0usize;

    while deadline.map_or(true, |d| Instant::now() < d) {
        let n = port.try_read_timeout(&mut buffer, Duration::from_millis(10))?;
        if n == 0 {
            continue;
        }
        total += n;
        if hex {
            writeln!(stdout, "{}", format_hex(&buffer[..n]))?;
        } else {
            stdout.write_all(&buffer[..n])?;
        }
        stdout.flush()?;
    }

    info!(device = %device, total, "listen finished");
    Ok(0)
}

fn echo_test(config: &Config) -> CliResult {
    const PATTERN: &[u8] = &[0xf7, 0x7b, 0x00, 0x00, 0x55, 0xaa, 0x01, 0x02];
    let mut failures = 0;

    for mode in [TransportMode::Blocking, TransportMode::EventDriven] {
        let mut config = config.clone();
        config.port.event_driven = mode == TransportMode::EventDriven;

        let opener = LoopbackOpener::new();
        let peer = opener.register(device_path("0"));
        let mut port = PortTransport::from_config_with_opener(&config, opener);

        let status = port.open("0");
        if status != OpenStatus::Ok {
            println!("{mode:?}: open failed ({status})");
            failures += 1;
            continue;
        }

        let written = port.write(PATTERN);
        let mut reply = [0u8; PATTERN.len()];
        let read = port.read_timeout(&mut reply, Duration::from_millis(100));

        let ok = written == PATTERN.len() && read == PATTERN.len() && &reply[..] == PATTERN;
        println!(
            "{mode:?}: wrote {written}, read {read}, peer saw {} -> {}",
            peer.written().len(),
            if ok { "ok" } else { "FAILED" }
        );
        if !ok {
            failures += 1;
        }
    }

    Ok(if failures == 0 { 0 } else { 1 })
}

fn show_config(config: &Config, loader: &ConfigLoader, write: bool) -> CliResult {
    if write {
        let path = loader
            .config_path
            .clone()
            .or_else(get_default_config_path)
            .ok_or("no config directory available")?;
        let mut resolved = loader.clone();
        *resolved.config_mut() = config.clone();
        resolved.save_to(&path)?;
        println!("wrote {}", path.display());
    } else {
        match &loader.config_path {
            Some(path) => println!("# {}", path.display()),
            None => println!("# built-in defaults"),
        }
        print!("{}", toml::to_string_pretty(config)?);
    }
    Ok(0)
}

/// Parse "f77b", "f7 7b" or "0xf7,0x7b" into bytes.
fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let digits: String = input
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|tok| tok.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();

    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{input}'"));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex byte at offset {i} in '{input}'"))
        })
        .collect()
}

fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
