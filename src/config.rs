//! Persisted configuration: where the remote lives, how to reach it, and
//! the knobs that shape scanning and transfer behaviour.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

fn default_scan_interval_secs() -> u64 {
    300
}

fn default_min_glibc() -> String {
    "2.31".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub remote_address: String,
    pub remote_port: u16,
    pub remote_user: String,
    pub pub_key_path: PathBuf,
    pub scan_root: String,
    pub local_download_dir: PathBuf,
    pub native_helper_path: PathBuf,
    pub portable_helper_path: PathBuf,
    pub remote_helper_install_path: String,
    pub engine_binary_path: PathBuf,
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_min_glibc")]
    pub min_glibc_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            remote_address: String::new(),
            remote_port: 22,
            remote_user: String::new(),
            pub_key_path: dirs::home_dir().unwrap_or_default().join(".ssh").join("id_rsa.pub"),
            scan_root: "~/".to_string(),
            local_download_dir: PathBuf::from("."),
            native_helper_path: PathBuf::from("scanfs"),
            portable_helper_path: PathBuf::from("scanfs.py"),
            remote_helper_install_path: "/tmp/.seedsync/scanfs".to_string(),
            engine_binary_path: PathBuf::from("lftp"),
            scan_interval_secs: default_scan_interval_secs(),
            min_glibc_version: default_min_glibc(),
        }
    }
}

impl Config {
    /// Loads the config from `~/.seedsync-core/config.json`, writing out
    /// the default on first run so the file exists for the user to edit.
    pub fn load() -> Self {
        let dir = config_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            eprintln!("warning: could not create config directory {}: {}", dir.display(), e);
        }
        let path = dir.join("config.json");
        if !path.exists() {
            Config::default().save_to(&path);
        }
        Config::read_from(&path)
    }

    pub fn save(&self) {
        self.save_to(config_dir().join("config.json"));
    }

    fn save_to<P: AsRef<Path>>(&self, path: P) {
        match serde_json::to_string_pretty(self) {
            Ok(s) => {
                if let Err(e) = std::fs::write(path, s) {
                    eprintln!("warning: could not write config: {e}");
                }
            }
            Err(e) => eprintln!("warning: could not serialize config: {e}"),
        }
    }

    fn read_from<P: AsRef<Path>>(path: P) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
            Err(_) => Config::default(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".seedsync-core")
}
