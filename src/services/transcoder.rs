//! On-demand video transcoder (component G). Shells out to `ffmpeg` the way
//! the teacher's media pipeline never had to (the teacher only sanitised
//! HTML), so this is grounded on the ambient pattern of this corpus'
//! subprocess-backed services instead: `tokio::process::Command` with a
//! `tokio::time::timeout`, temp files in, temp files out, both cleaned on
//! every exit path.
use crate::services::states::config::{TranscoderConfig, TranscoderQualityPreset};
use std::time::Duration;
use std::time::Instant;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum TranscoderError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("transcoder exceeded its {0:?} timeout")]
    Timeout(Duration),
    #[error("ffmpeg exited with status {0}")]
    NonZeroExit(std::process::ExitStatus),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum QualityPreset {
    Low,
    Medium,
    High,
}

impl QualityPreset {
    fn resolve(self, cfg: &TranscoderConfig) -> TranscoderQualityPreset {
        match self {
            Self::Low => cfg.low,
            Self::Medium => cfg.medium,
            Self::High => cfg.high,
        }
    }
}

pub struct TranscodeOutcome {
    pub bytes: Vec<u8>,
    pub original_size: usize,
    pub converted_size: usize,
    pub processing_ms: u128,
}

pub struct Transcoder {
    config: TranscoderConfig,
}

impl Transcoder {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Converts `input` (declared as `source_mime`) to web-compatible MP4 at
    /// `preset`. On any failure the caller should fall through to serving the
    /// original bytes; this never partially writes a corrupt cache entry.
    pub async fn transcode(
        &self,
        input: &[u8],
        preset: QualityPreset,
    ) -> Result<TranscodeOutcome, TranscoderError> {
        let started = Instant::now();
        let preset = preset.resolve(&self.config);
        let in_file = tempfile::NamedTempFile::new()?;
        let out_file = tempfile::NamedTempFile::new()?;
        tokio::fs::write(in_file.path(), input).await?;

        let scale_filter = format!(
            "scale=-2:'min({},ih)':force_original_aspect_ratio=decrease,pad=ceil(iw/2)*2:ceil(ih/2)*2",
            preset.height
        );
        let mut cmd = Command::new(self.config.binary_path.as_ref());
        cmd.arg("-y")
            .arg("-i")
            .arg(in_file.path())
            .args(["-c:v", "libx264"])
            .args(["-preset", "fast"])
            .args(["-crf", "23"])
            .args(["-vf", &scale_filter])
            .args(["-b:v", &format!("{}k", preset.bitrate_kbps)])
            .args(["-c:a", "aac"])
            .args(["-movflags", "+faststart"])
            .arg("-f")
            .arg("mp4")
            .arg(out_file.path())
            .kill_on_drop(true);

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let status = match tokio::time::timeout(timeout, cmd.status()).await {
            Ok(result) => result?,
            Err(_) => return Err(TranscoderError::Timeout(timeout)),
        };
        if !status.success() {
            return Err(TranscoderError::NonZeroExit(status));
        }
        let bytes = tokio::fs::read(out_file.path()).await?;
        Ok(TranscodeOutcome {
            converted_size: bytes.len(),
            original_size: input.len(),
            bytes,
            processing_ms: started.elapsed().as_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::states::config::TranscoderConfig;

    #[test]
    fn each_preset_resolves_to_its_own_config_entry() {
        let cfg = TranscoderConfig::default();
        assert_eq!(QualityPreset::Low.resolve(&cfg).height, cfg.low.height);
        assert_eq!(QualityPreset::Medium.resolve(&cfg).height, cfg.medium.height);
        assert_eq!(QualityPreset::High.resolve(&cfg).height, cfg.high.height);
    }

    #[test]
    fn presets_strictly_increase_in_bitrate() {
        let cfg = TranscoderConfig::default();
        assert!(cfg.low.bitrate_kbps < cfg.medium.bitrate_kbps);
        assert!(cfg.medium.bitrate_kbps < cfg.high.bitrate_kbps);
    }
}
