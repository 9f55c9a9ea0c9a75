use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use adb_transport::config::Config;
use adb_transport::session::SessionManager;
use adb_transport::signer::RsaAdbSigner;
use adb_transport::stream::Chunk;
use adb_transport::usb::{DeviceSelector, UsbLink};
use adb_transport::util::logging::{init_logger, LogVerbosity};

#[derive(Debug, Parser)]
#[command(name = "adb-usb", version, about = "Open an ADB service stream over USB")]
struct Cli {
    /// Device index among matching ADB interfaces
    #[arg(long, default_value_t = 0)]
    device_index: usize,

    /// USB bulk transfer timeout, in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Path to a PKCS#8 RSA private key (adbkey). Falls back to the
    /// configured default, then generates an ephemeral key if that's absent.
    #[arg(long)]
    adb_key: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Service string to open, e.g. "shell:echo hi" or "sync:"
    #[arg(default_value = "shell:")]
    service: String,
}

impl Cli {
    fn config(&self) -> Config {
        let defaults = Config::default();
        Config {
            link_timeout: Duration::from_millis(self.timeout_ms),
            device_index: self.device_index,
            adb_key_path: self.adb_key.clone().or(defaults.adb_key_path),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(match cli.verbose {
        0 => LogVerbosity::Normal,
        1 => LogVerbosity::Verbose,
        _ => LogVerbosity::Debug,
    });

    let config = cli.config();
    let signer = load_signer(config.adb_key_path.as_deref()).context("preparing ADB signer")?;
    let link_factory = move || {
        UsbLink::open(DeviceSelector::Index(config.device_index), config.link_timeout)
            .map(|link| Box::new(link) as Box<dyn adb_transport::LinkEndpoint>)
            .map_err(Into::into)
    };

    let manager = SessionManager::new(Box::new(link_factory), vec![Box::new(signer)]);
    let stream = manager.open(cli.service.as_bytes()).context("opening ADB service stream")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    loop {
        match stream.recv() {
            Some(Chunk::Data(bytes)) => {
                out.write_all(&bytes)?;
                out.flush()?;
            }
            Some(Chunk::Empty) => std::thread::sleep(Duration::from_millis(20)),
            None => break,
        }
    }

    manager.shutdown();
    Ok(())
}

fn load_signer(path: Option<&std::path::Path>) -> Result<RsaAdbSigner> {
    if let Some(path) = path {
        let pem = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        return RsaAdbSigner::from_pkcs8_pem(&pem).context("parsing PKCS#8 private key");
    }
    eprintln!("No --adb-key given; generating an ephemeral RSA key (device will require fingerprint approval)");
    RsaAdbSigner::generate(2048).context("generating RSA key")
}
