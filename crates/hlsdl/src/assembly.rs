// Assembly Port: joins the ordered segment files into one output file.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{AssemblyConfig, AssemblyStrategy};
use crate::error::DownloadError;
use crate::files::absolute;

/// Name of the transient concat list written next to the segments.
pub const CONCAT_LIST_NAME: &str = "concat.txt";

#[async_trait]
pub trait Assembler: Send + Sync {
    /// Verify the assembler can run, before any segment is downloaded.
    async fn check(&self) -> Result<(), DownloadError> {
        Ok(())
    }

    /// Join `files` in the given order into `output` and return its path.
    async fn assemble(&self, files: &[PathBuf], output: &Path) -> Result<PathBuf, DownloadError>;
}

/// Build the assembler selected by `config`.
pub fn assembler_for(config: &AssemblyConfig) -> Box<dyn Assembler> {
    match config.strategy {
        AssemblyStrategy::Ffmpeg => Box::new(FfmpegAssembler::new(
            config.ffmpeg_path.clone(),
            config.ffmpeg_options.clone(),
        )),
        AssemblyStrategy::Concat => Box::new(ConcatAssembler),
    }
}

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// `tokio::process::Command` that does not pop up a console window on Windows.
fn command(program: impl AsRef<OsStr>) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(program);
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

/// Remuxes through ffmpeg's concat demuxer.
pub struct FfmpegAssembler {
    ffmpeg_path: String,
    options: Vec<String>,
}

impl FfmpegAssembler {
    pub fn new(ffmpeg_path: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            options,
        }
    }

    /// Check that the ffmpeg binary can be executed.
    pub async fn probe(&self) -> Result<(), DownloadError> {
        let result = command(&self.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(DownloadError::AssemblerUnavailable {
                program: self.ffmpeg_path.clone(),
                reason: format!("`-version` exited with {status}"),
            }),
            Err(e) => Err(DownloadError::AssemblerUnavailable {
                program: self.ffmpeg_path.clone(),
                reason: if e.kind() == std::io::ErrorKind::NotFound {
                    "not found in PATH".to_owned()
                } else {
                    e.to_string()
                },
            }),
        }
    }

    fn build_args(&self, list: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_owned(),
            "-f".to_owned(),
            "concat".to_owned(),
            "-safe".to_owned(),
            "0".to_owned(),
            "-i".to_owned(),
            list.to_string_lossy().into_owned(),
        ];
        args.extend(self.options.iter().cloned());
        args.push(output.to_string_lossy().into_owned());
        args
    }

    async fn run(&self, list: &Path, output: &Path) -> Result<(), DownloadError> {
        let args = self.build_args(list, output);
        debug!(?args, "FFmpeg args");

        let result = command(&self.ffmpeg_path)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DownloadError::AssemblerUnavailable {
                program: self.ffmpeg_path.clone(),
                reason: e.to_string(),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let last_line = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("unknown ffmpeg error");
            return Err(DownloadError::assembly(format!(
                "ffmpeg exited with code {}: {}",
                result.status.code().unwrap_or(-1),
                last_line
            )));
        }
        Ok(())
    }
}

/// Contents of an ffmpeg concat list for `files`.
pub fn concat_list(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|path| {
            let path = absolute(path);
            // Single quotes inside a quoted path are written as '\''
            let escaped = path.to_string_lossy().replace('\'', r"'\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}

#[async_trait]
impl Assembler for FfmpegAssembler {
    async fn check(&self) -> Result<(), DownloadError> {
        self.probe().await?;
        debug!(program = %self.ffmpeg_path, "ffmpeg is available");
        Ok(())
    }

    async fn assemble(&self, files: &[PathBuf], output: &Path) -> Result<PathBuf, DownloadError> {
        let Some(first) = files.first() else {
            return Err(DownloadError::assembly("no segment files to assemble"));
        };

        let list_dir = first.parent().unwrap_or(Path::new("."));
        let list_path = list_dir.join(CONCAT_LIST_NAME);
        tokio::fs::write(&list_path, concat_list(files))
            .await
            .map_err(|source| DownloadError::WriteFailed {
                path: list_path.clone(),
                source,
            })?;

        let started = Instant::now();
        info!(segments = files.len(), output = %output.display(), "Assembling with ffmpeg");
        let result = self.run(&list_path, output).await;

        if let Err(e) = tokio::fs::remove_file(&list_path).await {
            warn!(path = %list_path.display(), error = %e, "Failed to remove concat list");
        }
        result?;

        validate_output(output).await?;
        info!(
            output = %output.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Assembly finished"
        );
        Ok(output.to_path_buf())
    }
}

/// Appends the segment files byte for byte.
#[derive(Debug, Default)]
pub struct ConcatAssembler;

#[async_trait]
impl Assembler for ConcatAssembler {
    async fn assemble(&self, files: &[PathBuf], output: &Path) -> Result<PathBuf, DownloadError> {
        if files.is_empty() {
            return Err(DownloadError::assembly("no segment files to assemble"));
        }

        let write_failed = |source| DownloadError::WriteFailed {
            path: output.to_path_buf(),
            source,
        };

        let mut out = tokio::fs::File::create(output).await.map_err(write_failed)?;
        for path in files {
            let mut input = tokio::fs::File::open(path).await?;
            tokio::io::copy(&mut input, &mut out).await.map_err(write_failed)?;
        }
        out.flush().await.map_err(write_failed)?;
        drop(out);

        validate_output(output).await?;
        info!(segments = files.len(), output = %output.display(), "Concatenated segments");
        Ok(output.to_path_buf())
    }
}

async fn validate_output(output: &Path) -> Result<(), DownloadError> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(DownloadError::assembly(format!(
            "output {} is empty",
            output.display()
        ))),
        Err(e) => Err(DownloadError::assembly(format!(
            "output {} was not created: {e}",
            output.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn concat_list_quotes_paths() {
        let list = concat_list(&[
            PathBuf::from("/data/show/00001.ts"),
            PathBuf::from("/data/it's/00002.ts"),
        ]);
        assert_eq!(
            list,
            "file '/data/show/00001.ts'\nfile '/data/it'\\''s/00002.ts'\n"
        );
    }

    #[test]
    fn ffmpeg_args_put_options_before_output() {
        let assembler = FfmpegAssembler::new(
            "ffmpeg",
            vec!["-c".into(), "copy".into(), "-y".into()],
        );
        let args = assembler.build_args(Path::new("/tmp/concat.txt"), Path::new("/tmp/out.mp4"));
        assert_eq!(
            args,
            [
                "-hide_banner", "-f", "concat", "-safe", "0", "-i", "/tmp/concat.txt", "-c",
                "copy", "-y", "/tmp/out.mp4"
            ]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let assembler = FfmpegAssembler::new("definitely-not-an-ffmpeg-binary", Vec::new());
        let err = assembler.check().await.unwrap_err();
        assert!(matches!(err, DownloadError::AssemblerUnavailable { .. }));
    }

    #[tokio::test]
    async fn concat_assembler_preserves_order() {
        let dir = TempDir::new().unwrap();
        let mut files = Vec::new();
        for (i, chunk) in [b"aa", b"bb", b"cc"].iter().enumerate() {
            let path = dir.path().join(format!("{:05}.ts", i + 1));
            std::fs::write(&path, chunk).unwrap();
            files.push(path);
        }

        let output = dir.path().join("out.ts");
        let produced = ConcatAssembler.assemble(&files, &output).await.unwrap();
        assert_eq!(produced, output);
        assert_eq!(std::fs::read(&output).unwrap(), b"aabbcc");
    }

    #[tokio::test]
    async fn empty_file_list_fails() {
        let dir = TempDir::new().unwrap();
        let err = ConcatAssembler
            .assemble(&[], &dir.path().join("out.ts"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::AssemblyFailed { .. }));
    }
}
