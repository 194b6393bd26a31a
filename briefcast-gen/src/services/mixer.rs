//! Audio mixing
//!
//! Overlays narration with intro/outro music beds via an ffmpeg filter
//! graph, probing durations with ffprobe. Timing rules:
//! - intro bed plays from the mix start; narration is delayed by a fixed
//!   lead-in so the music opens solo
//! - the outro bed is delayed so its midpoint aligns with the end of
//!   narration, half under the closing dialogue and half lingering after
//! - tracks mix with explicit weights and normalization disabled so adding
//!   beds never attenuates narration, then loudness-normalize
//! - an optional epilogue narration gets its own bed (trimmed to epilogue
//!   length plus a short tail) and is appended after a silence gap using
//!   delay+mix rather than concatenation
//!
//! Mixing is strictly best-effort: any failure falls back to the unmixed
//! narration. Temp files live in a scratch dir removed on every exit path.

use anyhow::{Context, Result};
use briefcast_common::config::AudioConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::subprocess::SubprocessRunner;

/// Narration is delayed this long when an intro bed opens the mix
const INTRO_LEAD_IN_MS: u64 = 2500;
/// Relative track weights in amix: narration dominant, beds fractional
const NARRATION_WEIGHT: &str = "1";
const BED_WEIGHT: &str = "0.35";
/// Bed pre-attenuation before mixing
const BED_VOLUME: &str = "0.4";
/// Loudness normalization target for the final mix
const LOUDNORM: &str = "loudnorm=I=-16:TP=-1.5:LRA=11";
/// Epilogue bed runs this much past the epilogue narration
const EPILOGUE_TAIL_SECS: f64 = 2.0;
/// Silence between the main mix and the epilogue
const EPILOGUE_GAP_SECS: f64 = 1.5;
/// Duration estimate when probing fails, from the TTS output bitrate
const FALLBACK_BITRATE_BPS: f64 = 128_000.0;

/// Final mixed audio plus its duration
#[derive(Debug, Clone)]
pub struct MixResult {
    pub audio: Vec<u8>,
    pub duration_secs: f64,
}

/// Episode audio mixer
pub struct AudioMixer {
    runner: Arc<dyn SubprocessRunner>,
    config: AudioConfig,
    timeout: Duration,
}

impl AudioMixer {
    pub fn new(runner: Arc<dyn SubprocessRunner>, config: AudioConfig) -> Self {
        let timeout = Duration::from_secs(config.subprocess_timeout_secs());
        Self {
            runner,
            config,
            timeout,
        }
    }

    /// Mix narration with the configured beds, appending an optional
    /// epilogue. Never fails: every mixing error degrades to the unmixed
    /// narration buffer.
    pub async fn mix_episode(&self, narration: &[u8], epilogue: Option<&[u8]>) -> MixResult {
        match self.mix_inner(narration, epilogue).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(error = %err, "Audio mixing failed, falling back to unmixed narration");
                MixResult {
                    audio: narration.to_vec(),
                    duration_secs: estimate_duration_secs(narration.len()),
                }
            }
        }
    }

    async fn mix_inner(&self, narration: &[u8], epilogue: Option<&[u8]>) -> Result<MixResult> {
        // Scratch dir is removed when dropped, on every exit path
        let scratch = tempfile::tempdir().context("creating scratch dir")?;
        let narration_path = scratch.path().join("narration.mp3");
        std::fs::write(&narration_path, narration).context("writing narration")?;

        let narration_dur = self.probe_duration(&narration_path).await.unwrap_or_else(|err| {
            tracing::debug!(error = %err, "Narration probe failed, estimating from size");
            estimate_duration_secs(narration.len())
        });

        let intro = self.existing_bed(self.config.intro_bed.as_deref());
        let outro = self.existing_bed(self.config.outro_bed.as_deref());

        // Main mix; any failure keeps the plain narration
        let (mut final_path, mut final_dur) = if intro.is_some() || outro.is_some() {
            match self
                .mix_main(scratch.path(), &narration_path, narration_dur, intro, outro)
                .await
            {
                Ok(done) => done,
                Err(err) => {
                    tracing::warn!(error = %err, "Bed mix failed, using plain narration");
                    (narration_path.clone(), narration_dur)
                }
            }
        } else {
            (narration_path.clone(), narration_dur)
        };

        // Optional epilogue with its own bed; failure skips the epilogue
        if let Some(epilogue_bytes) = epilogue {
            match self
                .append_epilogue(scratch.path(), &final_path, final_dur, epilogue_bytes)
                .await
            {
                Ok(done) => (final_path, final_dur) = done,
                Err(err) => {
                    tracing::warn!(error = %err, "Epilogue mix failed, keeping main mix only");
                }
            }
        }

        let audio = std::fs::read(&final_path).context("reading final mix")?;
        if let Ok(probed) = self.probe_duration(&final_path).await {
            final_dur = probed;
        }

        Ok(MixResult {
            audio,
            duration_secs: final_dur,
        })
    }

    fn existing_bed<'a>(&self, bed: Option<&'a Path>) -> Option<&'a Path> {
        match bed {
            Some(path) if path.exists() => Some(path),
            Some(path) => {
                tracing::warn!(bed = %path.display(), "Configured music bed missing, skipping");
                None
            }
            None => None,
        }
    }

    /// Overlay intro/outro beds on the narration
    async fn mix_main(
        &self,
        scratch: &Path,
        narration_path: &Path,
        narration_dur: f64,
        intro: Option<&Path>,
        outro: Option<&Path>,
    ) -> Result<(PathBuf, f64)> {
        let outro_dur = match outro {
            Some(path) => Some(self.probe_duration(path).await?),
            None => None,
        };

        let filter = build_main_filter(narration_dur, intro.is_some(), outro_dur);
        let out_path = scratch.join("mixed.mp3");

        let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into(), "-nostats".into()];
        args.extend(["-i".into(), path_arg(narration_path)]);
        if let Some(intro) = intro {
            args.extend(["-i".into(), path_arg(intro)]);
        }
        if let Some(outro) = outro {
            args.extend(["-i".into(), path_arg(outro)]);
        }
        args.extend([
            "-filter_complex".into(),
            filter,
            "-map".into(),
            "[out]".into(),
            "-codec:a".into(),
            "libmp3lame".into(),
            "-b:a".into(),
            "128k".into(),
            path_arg(&out_path),
        ]);

        self.run_ffmpeg(&args).await?;

        let duration = expected_main_duration(narration_dur, intro.is_some(), outro_dur);
        Ok((out_path, duration))
    }

    /// Mix the epilogue against its bed and append it after the gap
    async fn append_epilogue(
        &self,
        scratch: &Path,
        main_path: &Path,
        main_dur: f64,
        epilogue: &[u8],
    ) -> Result<(PathBuf, f64)> {
        let raw_path = scratch.join("epilogue_raw.mp3");
        std::fs::write(&raw_path, epilogue).context("writing epilogue")?;
        let epilogue_dur = self
            .probe_duration(&raw_path)
            .await
            .unwrap_or_else(|_| estimate_duration_secs(epilogue.len()));

        // Epilogue against its own bed, when one is configured
        let epilogue_path = match self.existing_bed(self.config.epilogue_bed.as_deref()) {
            Some(bed) => {
                let mixed = scratch.join("epilogue_mixed.mp3");
                let filter = build_epilogue_filter(epilogue_dur);
                let args: Vec<String> = vec![
                    "-y".into(),
                    "-hide_banner".into(),
                    "-nostats".into(),
                    "-i".into(),
                    path_arg(&raw_path),
                    "-i".into(),
                    path_arg(bed),
                    "-filter_complex".into(),
                    filter,
                    "-map".into(),
                    "[out]".into(),
                    "-codec:a".into(),
                    "libmp3lame".into(),
                    "-b:a".into(),
                    "128k".into(),
                    path_arg(&mixed),
                ];
                self.run_ffmpeg(&args).await?;
                mixed
            }
            None => raw_path,
        };

        // Delay+mix instead of concatenation avoids cross-fade artifacts
        let delay_ms = ((main_dur + EPILOGUE_GAP_SECS) * 1000.0).round() as u64;
        let out_path = scratch.join("with_epilogue.mp3");
        let filter = format!(
            "[1:a]adelay={delay_ms}|{delay_ms}[epi];\
             [0:a][epi]amix=inputs=2:duration=longest:normalize=0[out]"
        );
        let args: Vec<String> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-nostats".into(),
            "-i".into(),
            path_arg(main_path),
            "-i".into(),
            path_arg(&epilogue_path),
            "-filter_complex".into(),
            filter,
            "-map".into(),
            "[out]".into(),
            "-codec:a".into(),
            "libmp3lame".into(),
            "-b:a".into(),
            "128k".into(),
            path_arg(&out_path),
        ];
        self.run_ffmpeg(&args).await?;

        let total = main_dur + EPILOGUE_GAP_SECS + epilogue_dur + EPILOGUE_TAIL_SECS;
        Ok((out_path, total))
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        let output = self.runner.run("ffmpeg", args, self.timeout).await?;
        if !output.success() {
            anyhow::bail!("ffmpeg exited {:?}: {}", output.exit_code, output.stderr_text());
        }
        Ok(())
    }

    /// Query a media file's duration via ffprobe (JSON output)
    pub async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let args: Vec<String> = vec![
            "-v".into(),
            "error".into(),
            "-show_entries".into(),
            "format=duration".into(),
            "-of".into(),
            "json".into(),
            path_arg(path),
        ];
        let output = self.runner.run("ffprobe", &args, self.timeout).await?;
        if !output.success() {
            anyhow::bail!("ffprobe exited {:?}: {}", output.exit_code, output.stderr_text());
        }
        parse_probe_duration(&output.stdout)
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Parse `{"format": {"duration": "12.345"}}`
fn parse_probe_duration(stdout: &[u8]) -> Result<f64> {
    let value: serde_json::Value =
        serde_json::from_slice(stdout).context("parsing ffprobe output")?;
    value
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(|d| d.as_str())
        .and_then(|d| d.parse::<f64>().ok())
        .context("ffprobe output missing format.duration")
}

/// Outro bed delay: midpoint aligned with the end of narration, clamped to
/// zero when the bed is longer than the narration implies.
fn outro_delay_ms(narration_end_secs: f64, outro_dur_secs: f64) -> u64 {
    let delay = narration_end_secs - outro_dur_secs / 2.0;
    (delay.max(0.0) * 1000.0).round() as u64
}

/// Build the main-mix filter graph.
///
/// Input 0 is narration; beds follow in intro, outro order.
fn build_main_filter(narration_dur: f64, has_intro: bool, outro_dur: Option<f64>) -> String {
    let mut stages: Vec<String> = Vec::new();
    let mut mix_inputs: Vec<String> = Vec::new();
    let mut weights: Vec<&str> = Vec::new();
    let mut input_index = 1;

    let narration_end = if has_intro {
        stages.push(format!(
            "[0:a]adelay={INTRO_LEAD_IN_MS}|{INTRO_LEAD_IN_MS}[nar]"
        ));
        narration_dur + INTRO_LEAD_IN_MS as f64 / 1000.0
    } else {
        stages.push("[0:a]anull[nar]".to_string());
        narration_dur
    };
    mix_inputs.push("[nar]".to_string());
    weights.push(NARRATION_WEIGHT);

    if has_intro {
        stages.push(format!("[{input_index}:a]volume={BED_VOLUME}[intro]"));
        mix_inputs.push("[intro]".to_string());
        weights.push(BED_WEIGHT);
        input_index += 1;
    }

    if let Some(outro_dur) = outro_dur {
        let delay = outro_delay_ms(narration_end, outro_dur);
        stages.push(format!(
            "[{input_index}:a]volume={BED_VOLUME},adelay={delay}|{delay}[outro]"
        ));
        mix_inputs.push("[outro]".to_string());
        weights.push(BED_WEIGHT);
    }

    stages.push(format!(
        "{}amix=inputs={}:duration=longest:normalize=0:weights={},{LOUDNORM}[out]",
        mix_inputs.concat(),
        mix_inputs.len(),
        weights.join(" "),
    ));

    stages.join(";")
}

/// Epilogue bed: trimmed to narration length plus a short tail
fn build_epilogue_filter(epilogue_dur: f64) -> String {
    let bed_len = epilogue_dur + EPILOGUE_TAIL_SECS;
    format!(
        "[1:a]atrim=0:{bed_len:.3},volume={BED_VOLUME}[bed];\
         [0:a][bed]amix=inputs=2:duration=longest:normalize=0:weights={NARRATION_WEIGHT} {BED_WEIGHT},{LOUDNORM}[out]"
    )
}

/// Expected duration of the main mix, used when the final probe fails
fn expected_main_duration(narration_dur: f64, has_intro: bool, outro_dur: Option<f64>) -> f64 {
    let narration_end = if has_intro {
        narration_dur + INTRO_LEAD_IN_MS as f64 / 1000.0
    } else {
        narration_dur
    };
    match outro_dur {
        Some(outro) => {
            let delay = outro_delay_ms(narration_end, outro) as f64 / 1000.0;
            narration_end.max(delay + outro)
        }
        None => narration_end,
    }
}

/// Duration estimate from encoded size at the TTS output bitrate
fn estimate_duration_secs(byte_len: usize) -> f64 {
    (byte_len as f64 * 8.0) / FALLBACK_BITRATE_BPS
}
