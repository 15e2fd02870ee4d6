//! Running the render engine.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use inlay_common::config::{EncodingParams, ToolPaths};
use inlay_common::error::{InlayError, InlayResult};

use crate::graph::ProcessingGraph;

/// How often the cancel flag is checked while ffmpeg is quiet.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Warn when ffmpeg reports no advancement for this long.
const STALL_WARN_AFTER: Duration = Duration::from_secs(10);

/// Progress callback for rendering.
pub type ProgressCallback = Box<dyn Fn(RenderProgress) + Send + Sync>;

/// Render progress report.
#[derive(Debug, Clone)]
pub struct RenderProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames rendered so far.
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    pub stage: RenderStage,
}

/// Stages of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Acquiring,
    Preparing,
    Rendering,
    Finalizing,
    Complete,
}

impl RenderProgress {
    pub fn stage(stage: RenderStage, total_frames: u64) -> Self {
        let done = stage == RenderStage::Complete;
        Self {
            progress: if done { 1.0 } else { 0.0 },
            frames_rendered: if done { total_frames } else { 0 },
            total_frames,
            eta_secs: 0.0,
            stage,
        }
    }
}

/// Shared flag that asks a running render to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A fully specified render engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderInvocation {
    /// Input files; index 0 is the base track.
    pub inputs: Vec<PathBuf>,
    pub filter_complex: String,
    /// Graph label mapped as the output video stream.
    pub video_label: String,
    pub encoding: EncodingParams,
    pub output_path: PathBuf,
    pub expected_duration_secs: f64,
    pub total_frames: u64,
}

impl RenderInvocation {
    pub fn from_graph(
        graph: &ProcessingGraph,
        encoding: &EncodingParams,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inputs: graph.sources().to_vec(),
            filter_complex: graph.to_filter_complex(),
            video_label: graph.output_label().to_string(),
            encoding: encoding.clone(),
            output_path: output_path.into(),
            expected_duration_secs: graph.duration_secs(),
            total_frames: graph.frame_rate().frames_in(graph.duration_secs()),
        }
    }

    /// Full argument list, without the program name.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().into_owned());
        }

        args.push("-filter_complex".to_string());
        args.push(self.filter_complex.clone());
        args.push("-map".to_string());
        args.push(format!("[{}]", self.video_label));
        // Audio only ever comes from the base track.
        args.push("-map".to_string());
        args.push("0:a?".to_string());

        args.extend(encoding_args(&self.encoding));
        args.push(self.output_path.to_string_lossy().into_owned());
        args
    }

    /// Shell-style rendering for logs and `--dry-run` output.
    pub fn command_line(&self, program: &Path) -> String {
        std::iter::once(program.to_string_lossy().into_owned())
            .chain(self.args())
            .map(|arg| shell_quote(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn encoding_args(encoding: &EncodingParams) -> Vec<String> {
    let mut args = vec![
        "-c:v".to_string(),
        encoding.video_codec.clone(),
        "-preset".to_string(),
        encoding.preset.clone(),
        "-crf".to_string(),
        encoding.crf.to_string(),
    ];
    if let Some(kbps) = encoding.video_bitrate_kbps {
        args.push("-b:v".to_string());
        args.push(format!("{kbps}k"));
    }
    args.extend([
        "-pix_fmt".to_string(),
        encoding.pixel_format.clone(),
        "-c:a".to_string(),
        encoding.audio_codec.clone(),
        "-b:a".to_string(),
        format!("{}k", encoding.audio_bitrate_kbps),
    ]);
    if encoding.faststart {
        args.push("-movflags".to_string());
        args.push("+faststart".to_string());
    }
    args
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Runs ffmpeg invocations.
#[derive(Debug, Clone)]
pub struct RenderExecutor {
    ffmpeg_path: PathBuf,
}

impl RenderExecutor {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn from_config(tools: &ToolPaths) -> Self {
        Self::new(tools.ffmpeg.clone())
    }

    pub fn program(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// Check if the engine binary can be found.
    pub fn is_available(&self) -> bool {
        which::which(&self.ffmpeg_path).is_ok()
    }

    /// Run one invocation to completion.
    ///
    /// Blocks until ffmpeg exits. On any failure, including cancellation,
    /// whatever ffmpeg wrote at `invocation.output_path` is removed.
    pub fn execute(
        &self,
        invocation: &RenderInvocation,
        progress: Option<ProgressCallback>,
        cancel: &CancelFlag,
    ) -> InlayResult<PathBuf> {
        let result = self.run(invocation, progress.as_ref(), cancel);
        if result.is_err() && invocation.output_path.exists() {
            if let Err(err) = std::fs::remove_file(&invocation.output_path) {
                tracing::warn!(
                    error = %err,
                    path = %invocation.output_path.display(),
                    "Failed to remove partial output"
                );
            }
        }
        result.map(|()| invocation.output_path.clone())
    }

    fn run(
        &self,
        invocation: &RenderInvocation,
        progress: Option<&ProgressCallback>,
        cancel: &CancelFlag,
    ) -> InlayResult<()> {
        if cancel.is_cancelled() {
            return Err(InlayError::Cancelled);
        }

        let args = invocation.args();
        tracing::debug!(args = ?args, "Running ffmpeg");

        let start = Instant::now();
        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                InlayError::render(format!(
                    "Failed to start {}: {e}",
                    self.ffmpeg_path.display()
                ))
            })?;

        tracing::info!(
            pid = child.id(),
            inputs = invocation.inputs.len(),
            total_frames = invocation.total_frames,
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| InlayError::render("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| InlayError::render("Failed to capture ffmpeg stderr"))?;

        // ffmpeg blocks on a full stderr pipe unless it is drained.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let (tx, rx) = mpsc::channel::<String>();
        let stdout_task = std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut tracker =
            ProgressTracker::new(invocation.total_frames, invocation.expected_duration_secs);
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                tracing::info!(pid = child.id(), "Cancelling ffmpeg");
                if let Err(err) = child.kill() {
                    tracing::warn!(error = %err, "Failed to kill ffmpeg");
                }
                cancelled = true;
                break;
            }

            let line = match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let now = start.elapsed();
            let Some(report) = tracker.ingest(&line, now) else {
                continue;
            };
            if let Some(cb) = progress {
                cb(report);
            }
            if tracker.stalled_for(now) >= STALL_WARN_AFTER {
                tracing::warn!(
                    out_time_secs = tracker.out_time_secs,
                    elapsed_secs = now.as_secs_f64(),
                    "No ffmpeg progress advancement for {}s",
                    STALL_WARN_AFTER.as_secs()
                );
                tracker.restart_stall_clock(now);
            }
        }

        let status = child
            .wait()
            .map_err(|e| InlayError::render(format!("Failed to wait on ffmpeg: {e}")))?;
        drop(rx);
        let _ = stdout_task.join();
        let stderr_output = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if cancelled {
            return Err(InlayError::Cancelled);
        }

        if !status.success() {
            tracing::error!(
                exit_code = ?status.code(),
                elapsed_secs = start.elapsed().as_secs_f64(),
                "ffmpeg failed"
            );
            return Err(InlayError::render_engine(status.code(), stderr_output));
        }

        if let Some(cb) = progress {
            cb(RenderProgress::stage(
                RenderStage::Complete,
                invocation.total_frames,
            ));
        }

        tracing::info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            output = %invocation.output_path.display(),
            "ffmpeg finished"
        );
        Ok(())
    }
}

/// Folds ffmpeg `-progress` output into [`RenderProgress`] reports.
///
/// ffmpeg writes blocks of `key=value` lines, each closed by
/// `progress=continue` or `progress=end`. One report is produced per block.
#[derive(Debug)]
struct ProgressTracker {
    total_frames: u64,
    expected_duration_secs: f64,
    out_time_secs: f64,
    frame: Option<u64>,
    advanced_secs: f64,
    advanced_at: Duration,
}

impl ProgressTracker {
    fn new(total_frames: u64, expected_duration_secs: f64) -> Self {
        Self {
            total_frames,
            expected_duration_secs,
            out_time_secs: 0.0,
            frame: None,
            advanced_secs: 0.0,
            advanced_at: Duration::ZERO,
        }
    }

    /// Feed one stdout line seen `now` after the process started. Returns a
    /// report when the line closes a block.
    fn ingest(&mut self, line: &str, now: Duration) -> Option<RenderProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // Both keys carry microseconds; values may be "N/A".
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = (us / 1_000_000.0).max(0.0);
                }
            }
            "frame" => self.frame = value.parse().ok(),
            "progress" => return Some(self.close_block(value == "end", now)),
            _ => {}
        }
        None
    }

    fn close_block(&mut self, done: bool, now: Duration) -> RenderProgress {
        if self.out_time_secs > self.advanced_secs + 0.001 {
            self.advanced_secs = self.out_time_secs;
            self.advanced_at = now;
        }

        if done {
            return RenderProgress {
                progress: 1.0,
                frames_rendered: self.total_frames,
                total_frames: self.total_frames,
                eta_secs: 0.0,
                stage: RenderStage::Finalizing,
            };
        }

        let fraction = if self.expected_duration_secs > 0.0 {
            (self.out_time_secs / self.expected_duration_secs).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let estimated = (fraction * self.total_frames as f64).round() as u64;
        let elapsed = now.as_secs_f64();

        RenderProgress {
            progress: fraction,
            frames_rendered: self.frame.unwrap_or(estimated).min(self.total_frames),
            total_frames: self.total_frames,
            eta_secs: if fraction > 0.0 {
                (elapsed / fraction - elapsed).max(0.0)
            } else {
                0.0
            },
            stage: RenderStage::Rendering,
        }
    }

    /// How long output time has not moved forward, as of `now`.
    fn stalled_for(&self, now: Duration) -> Duration {
        now.saturating_sub(self.advanced_at)
    }

    fn restart_stall_clock(&mut self, now: Duration) {
        self.advanced_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation() -> RenderInvocation {
        RenderInvocation {
            inputs: vec![
                PathBuf::from("/job/a_roll.mp4"),
                PathBuf::from("/job/b 1.mp4"),
            ],
            filter_complex: "[0:v]null[vout]".to_string(),
            video_label: "vout".to_string(),
            encoding: EncodingParams::default(),
            output_path: PathBuf::from("/job/out.mp4"),
            expected_duration_secs: 60.0,
            total_frames: 1800,
        }
    }

    #[test]
    fn test_args_layout() {
        let args = invocation().args();
        assert_eq!(
            &args[..7],
            &["-y", "-hide_banner", "-loglevel", "error", "-nostats", "-progress", "pipe:1"]
        );
        assert_eq!(&args[7..11], &["-i", "/job/a_roll.mp4", "-i", "/job/b 1.mp4"]);

        let map_positions: Vec<usize> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-map")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(map_positions.len(), 2);
        assert_eq!(args[map_positions[0] + 1], "[vout]");
        assert_eq!(args[map_positions[1] + 1], "0:a?");
        assert_eq!(args.last().unwrap(), "/job/out.mp4");
    }

    #[test]
    fn test_encoding_args_defaults() {
        let args = encoding_args(&EncodingParams::default());
        let joined = args.join(" ");
        assert_eq!(
            joined,
            "-c:v libx264 -preset medium -crf 20 -pix_fmt yuv420p -c:a aac -b:a 192k -movflags +faststart"
        );
    }

    #[test]
    fn test_encoding_args_with_bitrate_and_no_faststart() {
        let params = EncodingParams {
            video_bitrate_kbps: Some(8000),
            faststart: false,
            ..EncodingParams::default()
        };
        let args = encoding_args(&params);
        assert!(args.windows(2).any(|w| w == ["-b:v", "8000k"]));
        assert!(!args.contains(&"-movflags".to_string()));
    }

    #[test]
    fn test_command_line_quotes_spaces() {
        let line = invocation().command_line(Path::new("ffmpeg"));
        assert!(line.starts_with("ffmpeg -y"));
        assert!(line.contains("'/job/b 1.mp4'"));
        assert!(line.contains("'[0:v]null[vout]'"));
    }

    #[test]
    fn test_tracker_reports_once_per_block() {
        let mut tracker = ProgressTracker::new(1800, 60.0);
        let at = Duration::from_secs(10);
        assert!(tracker.ingest("frame=870", at).is_none());
        assert!(tracker.ingest("out_time_us=30000000", at).is_none());
        assert!(tracker.ingest("speed=3.0x", at).is_none());

        let report = tracker.ingest("progress=continue", at).unwrap();
        assert!((report.progress - 0.5).abs() < 1e-9);
        assert_eq!(report.frames_rendered, 870);
        assert!((report.eta_secs - 10.0).abs() < 1e-9);
        assert_eq!(report.stage, RenderStage::Rendering);
    }

    #[test]
    fn test_tracker_estimates_frames_and_ignores_unavailable_time() {
        let mut tracker = ProgressTracker::new(1800, 60.0);
        tracker.ingest("out_time_ms=15000000", Duration::from_secs(1));
        tracker.ingest("out_time_us=N/A", Duration::from_secs(1));
        let report = tracker
            .ingest("progress=continue", Duration::from_secs(1))
            .unwrap();
        assert_eq!(report.frames_rendered, 450);
        assert!(tracker.ingest("not a progress line", Duration::ZERO).is_none());
    }

    #[test]
    fn test_tracker_end_block_is_finalizing() {
        let mut tracker = ProgressTracker::new(10, 0.0);
        let report = tracker.ingest("progress=end", Duration::from_secs(1)).unwrap();
        assert_eq!(report.progress, 1.0);
        assert_eq!(report.frames_rendered, 10);
        assert_eq!(report.stage, RenderStage::Finalizing);
    }

    #[test]
    fn test_tracker_stall_clock() {
        let mut tracker = ProgressTracker::new(1800, 60.0);
        tracker.ingest("out_time_us=1000000", Duration::from_secs(1));
        tracker.ingest("progress=continue", Duration::from_secs(1));
        tracker.ingest("progress=continue", Duration::from_secs(12));
        assert_eq!(tracker.stalled_for(Duration::from_secs(12)), Duration::from_secs(11));

        tracker.restart_stall_clock(Duration::from_secs(12));
        assert_eq!(tracker.stalled_for(Duration::from_secs(13)), Duration::from_secs(1));

        tracker.ingest("out_time_us=2000000", Duration::from_secs(14));
        tracker.ingest("progress=continue", Duration::from_secs(14));
        assert_eq!(tracker.stalled_for(Duration::from_secs(14)), Duration::ZERO);
    }

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        other.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_cancelled_before_start_spawns_nothing() {
        let flag = CancelFlag::new();
        flag.cancel();
        let executor = RenderExecutor::new("/nonexistent/ffmpeg");
        let err = executor.execute(&invocation(), None, &flag).unwrap_err();
        assert!(matches!(err, InlayError::Cancelled));
    }
}
