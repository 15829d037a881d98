use crate::{
    config::Config,
    drawing::dwgread::DwgReadTool,
    inspect::{self, Inspection},
    util::{ensure_dir, now_rfc3339},
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "cadpipe")]
#[command(about = "DWG inspection and CAD format conversion service")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./cadpipe.toml if present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print version, object count and per-object types of a drawing.
    Inspect {
        file: PathBuf,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run the conversion HTTP service.
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        upload_dir: Option<PathBuf>,
    },
    /// Check that the external tools resolve on PATH.
    Doctor {},
}

pub fn dispatch(args: Args) -> Result<ExitCode> {
    let mut cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Inspect { file, json } => inspect_cmd(&cfg, file, *json),
        Command::Serve { bind, upload_dir } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind.clone();
            }
            if let Some(dir) = upload_dir {
                cfg.server.upload_dir = dir.display().to_string();
            }
            serve_cmd(&cfg)
        }
        Command::Doctor {} => doctor(&cfg),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["cadpipe.toml", "cadpipe.example.toml"]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(
    args: &Args,
    cfg: &Config,
    file_path: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Diagnostics go to stderr; stdout carries inspection output.
    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from("logs").join("cadpipe.log"))
}

fn inspect_cmd(cfg: &Config, file: &Path, json: bool) -> Result<ExitCode> {
    let reader = DwgReadTool::new(cfg);
    let inspection = inspect::inspect(cfg, &reader, file)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let code = match inspection {
        Inspection::Fatal(status) => {
            inspect::write_fatal(&mut out, status)?;
            ExitCode::FAILURE
        }
        Inspection::Loaded(report) => {
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                inspect::write_text(&mut out, &report)?;
            }
            ExitCode::SUCCESS
        }
    };
    out.flush()?;
    Ok(code)
}

fn serve_cmd(cfg: &Config) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .with_context(|| "building tokio runtime")?;
    runtime.block_on(crate::server::serve(cfg))?;
    Ok(ExitCode::SUCCESS)
}

fn doctor(cfg: &Config) -> Result<ExitCode> {
    let mut programs = vec![cfg.inspector.dwgread_exe.clone()];
    for stage in cfg.toolchains.dwg.iter().chain(&cfg.toolchains.step) {
        if !programs.contains(&stage.program) {
            programs.push(stage.program.clone());
        }
    }

    let tools: Vec<_> = programs
        .iter()
        .map(|program| match which::which(program) {
            Ok(path) => serde_json::json!({ "program": program, "found": true, "path": path }),
            Err(_) => serde_json::json!({ "program": program, "found": false, "path": null }),
        })
        .collect();
    let ok = tools.iter().all(|t| t["found"] == true);
    info!("doctor checked {} tools ok={ok}", tools.len());

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "checked_at": now_rfc3339(),
            "ok": ok,
            "tools": tools,
        }))?
    );
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
