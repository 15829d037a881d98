//! Upload validation and conversion job planning.
//!
//! A job moves `Received → Validated → Persisted → Dispatched` and ends in
//! success or failure; nothing moves backwards and nothing is retried.

pub mod toolchain;

use crate::config::Toolchains;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use toolchain::{ProcessRunner, Stage, StageOutput, StageRunner, ToolError};

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("no file provided")]
    NoFile,

    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error("more than one `file` field")]
    MultipleFiles,

    #[error("upload exceeds the body limit: {0}")]
    TooLarge(String),

    #[error("unsupported file type: {0:?}")]
    UnsupportedType(String),

    #[error("saving upload to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Tool(#[from] ToolError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Dwg,
    Step,
}

impl SourceFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "dwg" => Some(SourceFormat::Dwg),
            "step" => Some(SourceFormat::Step),
            _ => None,
        }
    }

    pub fn output_extension(self) -> &'static str {
        match self {
            SourceFormat::Dwg => "stl",
            SourceFormat::Step => "obj",
        }
    }

    /// Extension of the file handed between stages, if the chain has one.
    pub fn intermediate_extension(self) -> Option<&'static str> {
        match self {
            SourceFormat::Dwg => Some("dxf"),
            SourceFormat::Step => None,
        }
    }

    pub fn stages(self, toolchains: &Toolchains) -> &[crate::config::StageSpec] {
        match self {
            SourceFormat::Dwg => &toolchains.dwg,
            SourceFormat::Step => &toolchains.step,
        }
    }
}

/// Text after the final `.`, lower-cased. `None` when there is no `.`.
pub fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Reduces a client-supplied name to its final path component.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let normalized = raw.replace('\\', "/");
    let name = Path::new(&normalized).file_name()?.to_str()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub format: SourceFormat,
    pub input: PathBuf,
    pub output: PathBuf,
    pub intermediate: Option<PathBuf>,
    pub stages: Vec<Stage>,
}

impl ConversionJob {
    /// Validates `file_name` and derives every path of the job from it.
    ///
    /// Output and intermediate names keep the input stem, so converting the
    /// same name twice targets the same files.
    pub fn plan(
        upload_dir: &Path,
        file_name: &str,
        toolchains: &Toolchains,
    ) -> Result<Self, ConvertError> {
        let file_name = sanitize_file_name(file_name).ok_or(ConvertError::NoFile)?;
        let ext = extension_of(&file_name).unwrap_or_default();
        let format =
            SourceFormat::from_extension(&ext).ok_or_else(|| ConvertError::UnsupportedType(ext))?;

        let stem = file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(file_name.as_str());

        let input = upload_dir.join(&file_name);
        let output = upload_dir.join(format!("{stem}.{}", format.output_extension()));
        let intermediate = format
            .intermediate_extension()
            .map(|e| upload_dir.join(format!("{stem}.{e}")));

        let stages = format
            .stages(toolchains)
            .iter()
            .map(|spec| Stage::from_spec(spec, &input, &output, intermediate.as_deref()))
            .collect();

        Ok(Self {
            format,
            input,
            output,
            intermediate,
            stages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_after_last_dot_and_lowercased() {
        assert_eq!(extension_of("a.b.DWG").as_deref(), Some("dwg"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("trailing.").as_deref(), Some(""));
    }

    #[test]
    fn sanitize_keeps_final_component() {
        assert_eq!(sanitize_file_name("../../etc/x.dwg").as_deref(), Some("x.dwg"));
        assert_eq!(sanitize_file_name("C:\\cad\\part.step").as_deref(), Some("part.step"));
        assert_eq!(sanitize_file_name(""), None);
        assert_eq!(sanitize_file_name(".."), None);
    }

    #[test]
    fn dwg_job_paths() {
        let job = ConversionJob::plan(Path::new("uploads"), "drawing.dwg", &Toolchains::default())
            .unwrap();
        assert_eq!(job.format, SourceFormat::Dwg);
        assert_eq!(job.input, Path::new("uploads/drawing.dwg"));
        assert_eq!(job.output, Path::new("uploads/drawing.stl"));
        assert_eq!(job.intermediate.as_deref(), Some(Path::new("uploads/drawing.dxf")));
        assert_eq!(job.stages.len(), 2);
        assert_eq!(job.stages[0].program, "dwg2dxf");
        assert_eq!(
            job.stages[0].args,
            vec!["-y", "-o", "uploads/drawing.dxf", "uploads/drawing.dwg"]
        );
        assert_eq!(
            job.stages[1].args,
            vec!["-o", "uploads/drawing.stl", "uploads/drawing.dxf"]
        );
    }

    #[test]
    fn step_job_is_single_stage() {
        let job =
            ConversionJob::plan(Path::new("uploads"), "Part.STEP", &Toolchains::default()).unwrap();
        assert_eq!(job.output, Path::new("uploads/Part.obj"));
        assert!(job.intermediate.is_none());
        assert_eq!(job.stages.len(), 1);
        assert_eq!(
            job.stages[0].args,
            vec!["--convert", "uploads/Part.STEP", "uploads/Part.obj"]
        );
    }

    #[test]
    fn unsupported_and_missing_names() {
        let tc = Toolchains::default();
        assert!(matches!(
            ConversionJob::plan(Path::new("u"), "model.xyz", &tc),
            Err(ConvertError::UnsupportedType(ext)) if ext == "xyz"
        ));
        assert!(matches!(
            ConversionJob::plan(Path::new("u"), "README", &tc),
            Err(ConvertError::UnsupportedType(_))
        ));
        assert!(matches!(
            ConversionJob::plan(Path::new("u"), "", &tc),
            Err(ConvertError::NoFile)
        ));
    }

    #[test]
    fn filename_with_spaces_stays_one_argument() {
        let tc = Toolchains::default();
        let job = ConversionJob::plan(Path::new("uploads"), "my part; rm -rf.step", &tc).unwrap();
        assert_eq!(job.stages[0].args[1], "uploads/my part; rm -rf.step");
    }

    #[test]
    fn braced_filename_is_passed_through_literally() {
        let tc = Toolchains::default();
        let job = ConversionJob::plan(Path::new("uploads"), "{output}.step", &tc).unwrap();
        assert_eq!(job.input, Path::new("uploads/{output}.step"));
        assert_eq!(
            job.stages[0].args,
            vec!["--convert", "uploads/{output}.step", "uploads/{output}.obj"]
        );

        let job = ConversionJob::plan(Path::new("uploads"), "{input}.dwg", &tc).unwrap();
        assert_eq!(
            job.stages[0].args,
            vec!["-y", "-o", "uploads/{input}.dxf", "uploads/{input}.dwg"]
        );
        assert_eq!(
            job.stages[1].args,
            vec!["-o", "uploads/{input}.stl", "uploads/{input}.dxf"]
        );
    }
}
