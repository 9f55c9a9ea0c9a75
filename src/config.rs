//! Ambient knobs a real deployment needs: link timeout, device selection,
//! and an RSA key path. Mirrors the shape of a `Cli` struct's defaults
//! without pulling `clap` into the core library itself.

use std::time::Duration;

/// Configuration for one `SessionManager` / `UsbLink` pairing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bulk transfer timeout for both reads and writes.
    pub link_timeout: Duration,
    /// Which attached ADB interface to use when more than one is present.
    pub device_index: usize,
    /// Path to a PKCS#8 RSA private key (`adbkey`) used for AUTH, if any.
    pub adb_key_path: Option<std::path::PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            link_timeout: Duration::from_millis(5000),
            device_index: 0,
            adb_key_path: dirs_home_adbkey(),
        }
    }
}

fn dirs_home_adbkey() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(|home| std::path::PathBuf::from(home).join(".android").join("adbkey"))
}
