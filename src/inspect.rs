use crate::{
    config::Config,
    drawing::{DrawingReader, DwgStatus, ObjectRecord},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectReport {
    pub input: String,
    pub status: DwgStatus,
    pub version: String,
    pub num_objects: usize,
    pub objects: Vec<ObjectRecord>,
}

#[derive(Debug, Clone)]
pub enum Inspection {
    /// The load status crossed the fatal threshold; nothing else was read.
    Fatal(DwgStatus),
    Loaded(InspectReport),
}

pub fn inspect(cfg: &Config, reader: &dyn DrawingReader, input: &Path) -> Result<Inspection> {
    let outcome = reader
        .load(input)
        .with_context(|| format!("loading drawing: {}", input.display()))?;
    let status = outcome.status;

    if status.is_fatal(cfg.inspector.fatal_threshold) {
        return Ok(Inspection::Fatal(status));
    }
    if !status.is_ok() {
        warn!("load status {status}; continuing with partial data");
    }

    let drawing = outcome.drawing;
    info!(
        "loaded {} version={} objects={}",
        input.display(),
        drawing.version(),
        drawing.object_count()
    );

    Ok(Inspection::Loaded(InspectReport {
        input: input.display().to_string(),
        status,
        version: drawing.version().to_string(),
        num_objects: drawing.object_count(),
        objects: drawing.objects().to_vec(),
    }))
}

pub fn write_fatal<W: Write>(w: &mut W, status: DwgStatus) -> Result<()> {
    writeln!(w, "Error: {status}")?;
    Ok(())
}

pub fn write_text<W: Write>(w: &mut W, report: &InspectReport) -> Result<()> {
    writeln!(w, ".dwg version: {}", report.version)?;
    writeln!(w, "Num objects: {}", report.num_objects)?;
    for obj in &report.objects {
        writeln!(w, " Supertype: {}", obj.supertype)?;
        if obj.type_name.is_empty() {
            writeln!(w, "      Type: {}", obj.type_code)?;
        } else {
            writeln!(w, "      Type: {} ({})", obj.type_name, obj.type_code)?;
        }
    }
    Ok(())
}
