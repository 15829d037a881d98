use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub inspector: Inspector,
    #[serde(default)]
    pub toolchains: Toolchains,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
}
impl Default for Server {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".into(),
            upload_dir: "uploads".into(),
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Inspector {
    pub dwgread_exe: String,
    /// Load statuses above this value are fatal.
    pub fatal_threshold: u32,
}
impl Default for Inspector {
    fn default() -> Self {
        Self {
            dwgread_exe: "dwgread".into(),
            fatal_threshold: 127,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl StageSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolchains {
    /// 0 disables the per-stage timeout.
    pub timeout_seconds: u64,
    pub dwg: Vec<StageSpec>,
    pub step: Vec<StageSpec>,
}
impl Default for Toolchains {
    fn default() -> Self {
        Self {
            timeout_seconds: 0,
            dwg: vec![
                StageSpec::new("dwg2dxf", &["-y", "-o", "{intermediate}", "{input}"]),
                StageSpec::new("openscad", &["-o", "{output}", "{intermediate}"]),
            ],
            step: vec![StageSpec::new(
                "freecadcmd",
                &["--convert", "{input}", "{output}"],
            )],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
