use super::{DrawingHandle, DrawingReader, DwgStatus, LoadOutcome, ObjectRecord, Supertype};
use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Reads drawings through LibreDWG's `dwgread -O JSON`.
pub struct DwgReadTool {
    exe: PathBuf,
    fatal_threshold: u32,
}

impl DwgReadTool {
    pub fn new(cfg: &Config) -> Self {
        Self {
            exe: PathBuf::from(&cfg.inspector.dwgread_exe),
            fatal_threshold: cfg.inspector.fatal_threshold,
        }
    }

    /// Status for a run whose stdout held no usable drawing.
    ///
    /// A status already at or past `fatal_threshold` is left alone;
    /// anything below gains INVALIDDWG.
    fn status_without_drawing(&self, status: DwgStatus) -> DwgStatus {
        if status.is_fatal(self.fatal_threshold) {
            status
        } else {
            status | DwgStatus::INVALIDDWG
        }
    }
}

impl DrawingReader for DwgReadTool {
    fn load(&self, path: &Path) -> Result<LoadOutcome> {
        // dwgread reports the same status for unreadable input; skip the spawn.
        if let Err(err) = std::fs::File::open(path) {
            debug!("open {}: {err}", path.display());
            return Ok(LoadOutcome {
                status: DwgStatus::IOERROR,
                drawing: DrawingHandle::empty(),
            });
        }

        debug!("dwgread {} -O JSON {}", self.exe.display(), path.display());
        let output = Command::new(&self.exe)
            .arg("-O")
            .arg("JSON")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("spawning {}", self.exe.display()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("dwgread stderr: {}", stderr.trim());
        }

        let reported = parse_error_code(&stderr)?;
        let mut status = match reported {
            Some(code) => DwgStatus(code),
            None if output.status.success() => DwgStatus::NOERR,
            None => DwgStatus::INVALIDDWG,
        };

        let drawing = match parse_dwg_json(&output.stdout) {
            Ok(drawing) => drawing,
            Err(err) => {
                if !status.is_fatal(self.fatal_threshold) {
                    warn!("dwgread produced no usable JSON: {err:#}");
                }
                status = self.status_without_drawing(status);
                DrawingHandle::empty()
            }
        };

        Ok(LoadOutcome { status, drawing })
    }
}

/// Extracts the `ERROR 0x<hex>` status dwgread prints on stderr.
pub fn parse_error_code(stderr: &str) -> Result<Option<u32>> {
    let re = Regex::new(r"ERROR 0x([0-9A-Fa-f]+)")?;
    let Some(caps) = re.captures(stderr) else {
        return Ok(None);
    };
    let code = u32::from_str_radix(&caps[1], 16)
        .with_context(|| format!("parsing dwgread error code: {}", &caps[1]))?;
    Ok(Some(code))
}

pub fn parse_dwg_json(raw: &[u8]) -> Result<DrawingHandle> {
    let doc: Value = serde_json::from_slice(raw).with_context(|| "parsing dwgread JSON output")?;

    let version = ["/FILEHEADER/version", "/HEADER/version", "/HEADER/ACADVER"]
        .iter()
        .find_map(|p| doc.pointer(p).and_then(Value::as_str))
        .unwrap_or("unknown")
        .to_string();

    let objects = doc
        .get("OBJECTS")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("dwgread JSON has no OBJECTS array"))?;

    Ok(DrawingHandle::new(
        version,
        objects.iter().map(object_record).collect(),
    ))
}

fn object_record(v: &Value) -> ObjectRecord {
    let (supertype, name) = if let Some(name) = v.get("entity").and_then(Value::as_str) {
        (Supertype::Entity, name)
    } else if let Some(name) = v.get("object").and_then(Value::as_str) {
        (Supertype::Object, name)
    } else {
        (Supertype::Unknown, "")
    };

    let type_code = v
        .get("type")
        .and_then(Value::as_u64)
        .and_then(|t| u32::try_from(t).ok())
        .unwrap_or(0);

    ObjectRecord {
        supertype,
        type_code,
        type_name: name.to_string(),
    }
}
