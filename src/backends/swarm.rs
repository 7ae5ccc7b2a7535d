//! Swarm-Transfer: peer-to-peer downloads through aria2c

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::BackendKind;
use super::traits::{AcquireContext, Acquired, Backend};
use crate::config::{BackendConfig, SwarmConfig};
use crate::error::{AcquireError, Result};
use crate::output::scan_media;
use crate::source::is_torrent_file_url;
use crate::target::AcquisitionTarget;
use crate::worker::http::HttpClient;
use crate::worker::process::{self, tail};

const TORRENT_FILE_NAME: &str = "input.torrent";
/// Engine options that never vary: stop once complete, use DHT, no
/// pre-allocation
const FIXED_ARGS: [&str; 5] = [
    "--seed-time=0",
    "--enable-dht=true",
    "--file-allocation=none",
    "--summary-interval=0",
    "--console-log-level=warn",
];

pub struct SwarmTransfer {
    http: HttpClient,
    config: SwarmConfig,
}

impl SwarmTransfer {
    pub fn new(config: &SwarmConfig, http: HttpClient) -> Self {
        Self {
            http,
            config: config.clone(),
        }
    }

    fn timeout(&self) -> Duration {
        self.config.timeout.as_duration()
    }

    pub fn build_args(&self, input: &str, dir: &Path) -> Vec<String> {
        let c = &self.config;
        let mut args = vec![
            format!("--dir={}", dir.display()),
            format!("--max-connection-per-server={}", c.max_connections_per_peer),
            format!("--split={}", c.split),
            format!("--bt-max-peers={}", c.max_peers),
        ];
        args.extend(FIXED_ARGS.iter().map(|arg| arg.to_string()));
        args.push(input.to_string());
        args
    }

    /// Magnets go straight to the engine; `.torrent` URLs are fetched into
    /// the work directory first
    async fn input_for(
        &self,
        target: &AcquisitionTarget,
        config: &BackendConfig,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if !is_torrent_file_url(&target.url) {
            return Ok(target.url.clone());
        }

        let bytes = self
            .http
            .with_max_retries(config.max_retries)
            .download(&target.url, &config.request_headers(), cancel)
            .await?;
        let path = dir.join(TORRENT_FILE_NAME);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AcquireError::io("write torrent file", e))?;
        debug!(url = %target.url, bytes = bytes.len(), "Torrent file fetched");
        Ok(path.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl Backend for SwarmTransfer {
    fn kind(&self) -> BackendKind {
        BackendKind::SwarmTransfer
    }

    async fn acquire(
        &self,
        target: &AcquisitionTarget,
        config: &BackendConfig,
        ctx: &AcquireContext,
    ) -> Result<Acquired> {
        let work = ctx.output.work_dir("swarm")?;
        let input = self.input_for(target, config, work.path(), &ctx.cancel).await?;
        let args = self.build_args(&input, work.path());

        info!(url = %target.url, "Starting swarm transfer");
        let output = process::run(
            &self.config.program,
            &args,
            Some(work.path()),
            self.timeout(),
            &ctx.cancel,
        )
        .await?;

        if !output.success() {
            let stderr = match output.stderr_tail(5) {
                s if s.is_empty() => tail(&output.stdout, 5),
                s => s,
            };
            return Err(AcquireError::BackendExecution {
                program: self.config.program.clone(),
                code: output.code(),
                stderr,
            });
        }

        let media = scan_media(work.path(), &self.config.media_extensions)?;
        if media.is_empty() {
            return Err(AcquireError::NoMediaFound(work.path().to_path_buf()));
        }

        let mut placed = Vec::with_capacity(media.len());
        for file in &media {
            placed.push(ctx.output.relocate(file)?);
        }

        let acquired = Acquired::from_paths(placed)
            .ok_or_else(|| AcquireError::NoMediaFound(work.path().to_path_buf()))?;
        info!(
            url = %target.url,
            files = acquired.additional.len() + 1,
            "Swarm transfer complete"
        );
        Ok(acquired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, HttpConfig};
    use crate::source::SourceType;

    fn transfer(program: &str) -> SwarmTransfer {
        let config = SwarmConfig {
            program: program.to_string(),
            timeout: crate::humanize::HumanDuration::from_secs(10),
            ..SwarmConfig::default()
        };
        SwarmTransfer::new(&config, HttpClient::new(&HttpConfig::default()).unwrap())
    }

    fn backend_config() -> BackendConfig {
        Config::default().backend_resolver().resolve(SourceType::SwarmTransfer)
    }

    #[test]
    fn test_engine_args() {
        let args = transfer("aria2c").build_args("magnet:?xt=urn:btih:abc", Path::new("/tmp/w"));
        assert_eq!(
            args,
            vec![
                "--dir=/tmp/w",
                "--max-connection-per-server=16",
                "--split=16",
                "--bt-max-peers=55",
                "--seed-time=0",
                "--enable-dht=true",
                "--file-allocation=none",
                "--summary-interval=0",
                "--console-log-level=warn",
                "magnet:?xt=urn:btih:abc",
            ]
        );
    }

    #[test]
    fn test_fixed_options_not_configurable() {
        let config: Config = toml::from_str("[swarm]\nseed_time = 3600\nmax_peers = 20\n").unwrap();
        let http = HttpClient::new(&HttpConfig::default()).unwrap();
        let args = SwarmTransfer::new(&config.swarm, http).build_args("magnet:?x", Path::new("/w"));

        assert!(args.contains(&"--seed-time=0".to_string()));
        assert!(args.contains(&"--bt-max-peers=20".to_string()));
        assert_eq!(args.iter().filter(|a| a.starts_with("--seed-time")).count(), 1);
    }

    #[tokio::test]
    async fn test_magnet_passed_through() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = AcquisitionTarget::builder().url("magnet:?xt=urn:btih:abc").build();
        let input = transfer("aria2c")
            .input_for(&target, &backend_config(), dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(input, "magnet:?xt=urn:btih:abc");
    }

    #[tokio::test]
    async fn test_torrent_file_fetched() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/album.torrent"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"d8:announce0:e".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let target = AcquisitionTarget::builder()
            .url(format!("{}/album.torrent", server.uri()))
            .build();
        let input = transfer("aria2c")
            .input_for(&target, &backend_config(), dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(Path::new(&input), dir.path().join(TORRENT_FILE_NAME));
        assert_eq!(std::fs::read(&input).unwrap(), b"d8:announce0:e");
    }

    #[tokio::test]
    async fn test_torrent_fetch_honours_cancel() {
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let dir = tempfile::TempDir::new().unwrap();
        let target = AcquisitionTarget::builder()
            .url(format!("{}/album.torrent", server.uri()))
            .build();
        let started = std::time::Instant::now();
        let err = transfer("aria2c")
            .input_for(&target, &backend_config(), dir.path(), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    mod engine {
        use super::*;
        use crate::output::OutputDir;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Arc;
        use tokio_util::sync::CancellationToken;

        fn fake_engine(dir: &Path, body: &str) -> String {
            let script = dir.join("fake-aria2c");
            std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            script.to_string_lossy().into_owned()
        }

        fn context(dir: &Path) -> AcquireContext {
            AcquireContext {
                output: Arc::new(OutputDir::prepare(dir.join("out"), ".staging").unwrap()),
                cancel: CancellationToken::new(),
            }
        }

        fn magnet() -> AcquisitionTarget {
            AcquisitionTarget::builder().url("magnet:?xt=urn:btih:abc").build()
        }

        #[tokio::test]
        async fn test_media_relocated() {
            let dir = tempfile::TempDir::new().unwrap();
            let program = fake_engine(
                dir.path(),
                r#"mkdir -p Album
printf 'a' > Album/01.flac
printf 'b' > Album/02.flac
printf 'c' > Album/cover.jpg"#,
            );
            let ctx = context(dir.path());

            let acquired = transfer(&program)
                .acquire(&magnet(), &backend_config(), &ctx)
                .await
                .unwrap();

            assert_eq!(acquired.path, ctx.output.root().join("01.flac"));
            assert_eq!(acquired.additional, vec![ctx.output.root().join("02.flac")]);
            assert!(!ctx.output.root().join("cover.jpg").exists());
            assert_eq!(std::fs::read_dir(ctx.output.staging()).unwrap().count(), 0);
        }

        #[tokio::test]
        async fn test_no_media() {
            let dir = tempfile::TempDir::new().unwrap();
            let program = fake_engine(dir.path(), "printf 'x' > readme.txt");
            let err = transfer(&program)
                .acquire(&magnet(), &backend_config(), &context(dir.path()))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::NoMediaFound);
        }

        #[tokio::test]
        async fn test_engine_failure() {
            let dir = tempfile::TempDir::new().unwrap();
            let program = fake_engine(dir.path(), "echo 'errorCode=1 tracker unreachable'\nexit 1");
            let err = transfer(&program)
                .acquire(&magnet(), &backend_config(), &context(dir.path()))
                .await
                .unwrap_err();

            match err {
                AcquireError::BackendExecution { code, stderr, .. } => {
                    assert_eq!(code, Some(1));
                    assert!(stderr.contains("tracker unreachable"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_missing_engine() {
            let dir = tempfile::TempDir::new().unwrap();
            let err = transfer("mediafetch-no-such-aria2c")
                .acquire(&magnet(), &backend_config(), &context(dir.path()))
                .await
                .unwrap_err();
            assert!(matches!(err, AcquireError::ProgramNotFound(_)));
        }
    }
}
