// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Image download into the job's temporary directory

use async_trait::async_trait;
use lava_core::{Action, Connection, LavaError, Parameters, RunContext, ValidateContext};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const SCHEMES: [&str; 3] = ["http", "https", "file"];

/// Downloads one entry of the deploy block's `images`.
///
/// Stores the local path under `download-action/{image}/file` and the
/// digest under `download-action/{image}/sha256`.
pub struct DownloadAction {
    image: String,
}

impl DownloadAction {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }

    fn spec<'p>(&self, parameters: &'p Parameters) -> Option<&'p Value> {
        parameters.get("images")?.get(&self.image)
    }
}

fn scheme(url: &str) -> Option<&str> {
    url.split_once("://").map(|(scheme, _)| scheme)
}

fn file_name(url: &str, fallback: &str) -> String {
    let path = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = path.split(['?', '#']).next().unwrap_or(path);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => fallback.to_string(),
    }
}

// Hex encoding helper
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Copy the source into `dest`, returning the size and sha256 digest
fn fetch(url: &str, dest: &Path) -> Result<(u64, String), LavaError> {
    let failed = |e: &dyn std::fmt::Display| {
        LavaError::infrastructure(format!("Unable to download {}: {}", url, e))
    };

    let mut response;
    let mut reader: Box<dyn Read + '_> = match url.strip_prefix("file://") {
        Some(path) => Box::new(std::fs::File::open(path).map_err(|e| failed(&e))?),
        None => {
            response = ureq::get(url).call().map_err(|e| failed(&e))?;
            Box::new(response.body_mut().as_reader())
        }
    };

    let mut out = std::fs::File::create(dest).map_err(|e| {
        LavaError::infrastructure(format!("Unable to write {}: {}", dest.display(), e))
    })?;
    let mut hasher = Sha256::new();
    let mut size = 0u64;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| failed(&e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        out.write_all(&buf[..n]).map_err(|e| {
            LavaError::infrastructure(format!("Unable to write {}: {}", dest.display(), e))
        })?;
        size += n as u64;
    }
    Ok((size, hex_encode(&hasher.finalize())))
}

#[async_trait]
impl Action for DownloadAction {
    fn name(&self) -> &str {
        "download-action"
    }

    fn summary(&self) -> &str {
        "download-action"
    }

    fn description(&self) -> &str {
        "download action"
    }

    fn validate(&mut self, cx: &mut ValidateContext<'_>) -> Result<(), LavaError> {
        let Some(spec) = self.spec(cx.parameters()) else {
            return Err(LavaError::job(format!("No image named {}", self.image)));
        };
        let Some(url) = spec.get("url").and_then(Value::as_str) else {
            return Err(LavaError::job(format!("Missing url for image {}", self.image)));
        };
        match scheme(url) {
            Some(scheme) if SCHEMES.contains(&scheme) => Ok(()),
            other => Err(LavaError::job(format!(
                "Unsupported url protocol scheme: {}",
                other.unwrap_or(url)
            ))),
        }
    }

    async fn run(
        &mut self,
        cx: &mut RunContext<'_>,
        _connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<Option<Box<dyn Connection>>, LavaError> {
        let spec = self.spec(cx.parameters()).cloned().unwrap_or(Value::Null);
        let url = spec
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| LavaError::job(format!("Missing url for image {}", self.image)))?
            .to_string();
        let expected = spec.get("sha256sum").and_then(Value::as_str).map(str::to_string);

        let dir = cx.env().tmp_dir.join(&self.image);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            LavaError::infrastructure(format!("Unable to create {}: {}", dir.display(), e))
        })?;
        let dest: PathBuf = dir.join(file_name(&url, &self.image));

        tracing::info!(image = %self.image, "downloading {} to {}", url, dest.display());
        let started = std::time::Instant::now();
        let (size, sha256) = {
            let url = url.clone();
            let dest = dest.clone();
            tokio::task::spawn_blocking(move || fetch(&url, &dest))
                .await
                .map_err(|e| LavaError::bug(format!("download task failed: {}", e)))??
        };
        let elapsed = started.elapsed().as_secs_f64();
        tracing::info!(
            image = %self.image,
            size,
            elapsed_ms = (elapsed * 1000.0) as u64,
            "downloaded {} bytes",
            size
        );

        cx.set_result("label", json!(self.image));
        cx.set_result("size", json!(size));
        cx.set_result("sha256sum", json!(sha256));
        if let Some(expected) = expected {
            if expected != sha256 {
                tracing::error!(image = %self.image, expected = %expected, actual = %sha256, "sha256sum mismatch");
                return Err(LavaError::job(format!(
                    "Unable to match sha256sum for {}: expected {}, got {}",
                    self.image, expected, sha256
                )));
            }
        }

        let image = self.image.clone();
        cx.set_namespace_data(
            "download-action",
            &image,
            "file",
            json!(dest.to_string_lossy()),
        );
        cx.set_namespace_data("download-action", &image, "sha256", json!(sha256));
        Ok(None)
    }
}

#[cfg(test)]
#[path = "download_tests.rs"]
mod tests;
