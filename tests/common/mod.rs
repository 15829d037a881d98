#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cadpipe::config::Toolchains;
use cadpipe::convert::{Stage, StageOutput, StageRunner, ToolError};
use cadpipe::server::{build_router, AppState};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const BOUNDARY: &str = "cadpipe-test-boundary";

/// Records stages and writes a deterministic output for the final one.
#[derive(Default)]
pub struct FakeRunner {
    pub calls: Mutex<Vec<Stage>>,
    pub fail_program: Option<String>,
}

impl FakeRunner {
    pub fn failing_on(program: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_program: Some(program.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<Stage> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StageRunner for FakeRunner {
    async fn run(&self, stage: &Stage) -> Result<StageOutput, ToolError> {
        self.calls.lock().unwrap().push(stage.clone());
        if self.fail_program.as_deref() == Some(stage.program.as_str()) {
            return Err(ToolError::Failed {
                program: stage.program.clone(),
                status: "exit code 1".into(),
                stderr: "boom".into(),
            });
        }
        // Every default template puts the file it writes right after `-o` or last.
        let target = stage
            .args
            .iter()
            .position(|a| a == "-o")
            .and_then(|i| stage.args.get(i + 1))
            .or_else(|| stage.args.last());
        if let Some(target) = target {
            std::fs::write(target, format!("converted by {}", stage.program)).unwrap();
        }
        Ok(StageOutput::default())
    }
}

pub struct TestApp {
    pub router: Router,
    pub runner: Arc<FakeRunner>,
    pub upload_dir: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestApp {
    pub fn new(runner: FakeRunner) -> Self {
        Self::with_limit(runner, 16 * 1024 * 1024)
    }

    pub fn with_limit(runner: FakeRunner, max_upload_bytes: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let upload_dir = dir.path().join("uploads");
        let runner = Arc::new(runner);
        let state = AppState {
            upload_dir: upload_dir.clone(),
            toolchains: Toolchains::default(),
            runner: runner.clone(),
        };
        Self {
            router: build_router(state, max_upload_bytes),
            runner,
            upload_dir,
            _dir: dir,
        }
    }

    pub fn upload_path(&self, name: &str) -> PathBuf {
        self.upload_dir.join(name)
    }

    pub fn upload_dir_entries(&self) -> Vec<String> {
        match std::fs::read_dir(&self.upload_dir) {
            Ok(rd) => {
                let mut names: Vec<String> = rd
                    .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                    .collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn upload(
        &self,
        field: &str,
        file_name: Option<&str>,
        data: &[u8],
    ) -> (StatusCode, Value) {
        self.send(multipart_request(field, file_name, data)).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }
}

/// One multipart part: field name, optional filename, content.
pub type Part<'a> = (&'a str, Option<&'a str>, &'a [u8]);

pub fn multipart_body(field: &str, file_name: Option<&str>, data: &[u8]) -> Vec<u8> {
    multipart_parts_body(&[(field, file_name, data)])
}

pub fn multipart_parts_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, file_name, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match file_name {
            Some(name) => format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\n"
            ),
            None => format!("Content-Disposition: form-data; name=\"{field}\"\r\n"),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(field: &str, file_name: Option<&str>, data: &[u8]) -> Request<Body> {
    multipart_parts_request(&[(field, file_name, data)])
}

pub fn multipart_parts_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::post("/convert")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_parts_body(parts)))
        .unwrap()
}

pub fn message_path(body: &Value) -> &str {
    body["message"]
        .as_str()
        .and_then(|m| m.strip_prefix("File converted successfully to "))
        .unwrap_or("")
}

pub fn ends_with(path: &str, suffix: &str) -> bool {
    Path::new(path).ends_with(suffix)
}
