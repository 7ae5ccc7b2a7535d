//! Extractor-Delegate: hand page-hosted media to an extraction engine
//! (yt-dlp command line) and collect what it produced

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::registry::BackendKind;
use super::traits::{AcquireContext, Acquired, Backend};
use crate::config::{BackendConfig, ExtractorConfig};
use crate::error::{AcquireError, Result};
use crate::target::AcquisitionTarget;
use crate::worker::process;

const OUTPUT_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";
const PRINT_AFTER_MOVE: &str = "after_move:%(.{title,ext,filepath})j";
const LEFTOVER_SUFFIXES: [&str; 4] = [".part", ".ytdl", ".temp", ".tmp"];

/// One line of the engine's post-processing report
#[derive(Debug, Deserialize)]
struct ExtractedFile {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    filepath: Option<PathBuf>,
}

pub struct ExtractorDelegate {
    program: String,
    timeout: Duration,
}

impl ExtractorDelegate {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: config.timeout.as_duration(),
        }
    }

    pub fn build_args(&self, url: &str, config: &BackendConfig, dir: &Path) -> Vec<String> {
        let mut args = vec![
            "--no-progress".to_string(),
            "--no-simulate".to_string(),
            "--print".to_string(),
            PRINT_AFTER_MOVE.to_string(),
            "-f".to_string(),
            config.format.clone(),
            "-x".to_string(),
            "--audio-format".to_string(),
            config.audio_format.clone(),
            "--audio-quality".to_string(),
            format!("{}K", config.audio_quality),
            "-o".to_string(),
            dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned(),
            "--retries".to_string(),
            config.max_retries.to_string(),
        ];

        if let Some(referer) = &config.referer {
            args.push("--referer".to_string());
            args.push(referer.clone());
        }
        for (name, value) in &config.headers {
            args.push("--add-header".to_string());
            args.push(format!("{name}:{value}"));
        }

        if config.ignore_errors {
            args.push("--ignore-errors".to_string());
        }
        args.push(if config.write_thumbnail {
            "--write-thumbnail".to_string()
        } else {
            "--no-write-thumbnail".to_string()
        });
        if config.flat_playlist {
            args.push("--flat-playlist".to_string());
        }

        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl Backend for ExtractorDelegate {
    fn kind(&self) -> BackendKind {
        BackendKind::ExtractorDelegate
    }

    async fn acquire(
        &self,
        target: &AcquisitionTarget,
        config: &BackendConfig,
        ctx: &AcquireContext,
    ) -> Result<Acquired> {
        let work = ctx.output.work_dir("extract")?;
        let args = self.build_args(&target.url, config, work.path());

        debug!(url = %target.url, program = %self.program, "Running extractor");
        let output = process::run(&self.program, &args, Some(work.path()), self.timeout, &ctx.cancel).await?;

        let produced = produced_files(&output.stdout, work.path());

        if !output.success() {
            let stderr = output.stderr_tail(5);
            if stderr.contains("Unsupported URL") {
                return Err(AcquireError::UnsupportedSource(target.url.clone()));
            }
            if !(config.ignore_errors && !produced.is_empty()) {
                return Err(AcquireError::Extraction(if stderr.is_empty() {
                    format!("{} exited with {:?}", self.program, output.code())
                } else {
                    stderr
                }));
            }
            warn!(url = %target.url, stderr = %stderr, "Extractor reported errors, keeping produced files");
        }

        let mut placed = Vec::with_capacity(produced.len());
        for file in produced {
            placed.push(ctx.output.relocate(&file)?);
        }

        let acquired = Acquired::from_paths(placed)
            .ok_or_else(|| AcquireError::Extraction("no extractable media".to_string()))?;

        info!(
            url = %target.url,
            path = %acquired.path.display(),
            additional = acquired.additional.len(),
            "Extraction complete"
        );
        Ok(acquired)
    }
}

/// Files named in the engine's report, else whatever finished files sit in
/// the work directory
fn produced_files(stdout: &str, dir: &Path) -> Vec<PathBuf> {
    let mut reported: Vec<PathBuf> = Vec::new();

    for line in stdout.lines().map(str::trim).filter(|l| l.starts_with('{')) {
        match serde_json::from_str::<ExtractedFile>(line) {
            Ok(ExtractedFile {
                filepath: Some(path),
                title,
                ext,
            }) => {
                debug!(title = ?title, ext = ?ext, path = %path.display(), "Extractor produced file");
                let path = if path.is_absolute() { path } else { dir.join(path) };
                if path.starts_with(dir) && path.is_file() && !reported.contains(&path) {
                    reported.push(path);
                }
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Skipping unparseable extractor line"),
        }
    }

    if !reported.is_empty() {
        return reported;
    }

    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            let name = path.to_string_lossy().to_ascii_lowercase();
            !LEFTOVER_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
        })
        .collect()
}
