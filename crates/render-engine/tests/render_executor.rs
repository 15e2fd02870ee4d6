//! Executor and job tests against a stand-in render engine.
//!
//! Each test writes a small shell script that behaves like ffmpeg as far as
//! the executor can tell: it reads its arguments, prints `-progress` lines on
//! stdout, writes to the last argument and exits with a chosen status.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use inlay_common::config::{AppConfig, EncodingParams};
use inlay_common::error::InlayError;
use inlay_render_engine::{
    CancelFlag, JobState, MediaInfo, ProgressCallback, RenderExecutor, RenderInvocation,
    RenderRequest, RenderStage, Renderer, StaticProber,
};
use inlay_timeline_model::{BaseSource, ClipSource, FrameRate, Insertion, TimelinePlan};

const SUCCEEDS: &str = r#"#!/bin/sh
for last; do :; done
printf '%s\n' "$@" > "$(dirname "$last")/args.txt"
printf 'frame=900\nout_time_us=30000000\nprogress=continue\n'
printf 'frame=1800\nout_time_us=60000000\nprogress=end\n'
printf 'video' > "$last"
exit 0
"#;

const FAILS: &str = r#"#!/bin/sh
for last; do :; done
printf 'partial' > "$last"
echo "[Parsed_overlay_3 @ 0x0] Invalid filter graph" >&2
exit 1
"#;

const HANGS: &str = r#"#!/bin/sh
for last; do :; done
printf 'partial' > "$last"
printf 'out_time_us=1000000\nprogress=continue\n'
exec sleep 30
"#;

fn fake_engine(dir: &Path, script: &str) -> PathBuf {
    let path = dir.join("fake-ffmpeg.sh");
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn invocation(dir: &Path) -> RenderInvocation {
    RenderInvocation {
        inputs: vec![dir.join("a_roll.mp4")],
        filter_complex: "[0:v]null[vout]".to_string(),
        video_label: "vout".to_string(),
        encoding: EncodingParams::default(),
        output_path: dir.join("out.mp4"),
        expected_duration_secs: 60.0,
        total_frames: 1800,
    }
}

#[test]
fn successful_run_reports_progress_and_keeps_output() {
    let dir = tempfile::tempdir().unwrap();
    let executor = RenderExecutor::new(fake_engine(dir.path(), SUCCEEDS));

    let stages = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&stages);
    let progress: ProgressCallback = Box::new(move |p| seen.lock().unwrap().push((p.stage, p.progress)));

    let output = executor
        .execute(&invocation(dir.path()), Some(progress), &CancelFlag::new())
        .unwrap();

    assert_eq!(output, dir.path().join("out.mp4"));
    assert_eq!(std::fs::read(&output).unwrap(), b"video");

    let stages = stages.lock().unwrap();
    assert_eq!(stages[0], (RenderStage::Rendering, 0.5));
    assert_eq!(stages.last().unwrap().0, RenderStage::Complete);

    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(args[0], "-y");
    assert!(args.windows(2).any(|w| w == ["-map", "0:a?"]));
    assert!(args.windows(2).any(|w| w == ["-filter_complex", "[0:v]null[vout]"]));
}

#[test]
fn failed_run_returns_engine_diagnostic_and_removes_output() {
    let dir = tempfile::tempdir().unwrap();
    let executor = RenderExecutor::new(fake_engine(dir.path(), FAILS));
    let invocation = invocation(dir.path());

    let err = executor
        .execute(&invocation, None, &CancelFlag::new())
        .unwrap_err();

    match &err {
        InlayError::RenderEngine {
            exit_code,
            diagnostic,
        } => {
            assert_eq!(*exit_code, Some(1));
            assert_eq!(diagnostic, "[Parsed_overlay_3 @ 0x0] Invalid filter graph\n");
        }
        other => panic!("expected RenderEngine error, got {other:?}"),
    }
    assert!(!invocation.output_path.exists());
}

#[test]
fn missing_engine_is_render_error() {
    let dir = tempfile::tempdir().unwrap();
    let executor = RenderExecutor::new(dir.path().join("no-such-ffmpeg"));
    let err = executor
        .execute(&invocation(dir.path()), None, &CancelFlag::new())
        .unwrap_err();
    assert!(matches!(err, InlayError::Render { .. }));
}

#[test]
fn cancel_kills_engine_and_discards_output() {
    let dir = tempfile::tempdir().unwrap();
    let executor = RenderExecutor::new(fake_engine(dir.path(), HANGS));
    let invocation = invocation(dir.path());

    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        trigger.cancel();
    });

    let started = Instant::now();
    let err = executor.execute(&invocation, None, &cancel).unwrap_err();
    assert!(matches!(err, InlayError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!invocation.output_path.exists());
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

fn local_job(dir: &Path) -> TimelinePlan {
    let media = dir.join("media");
    std::fs::create_dir_all(&media).unwrap();
    for name in ["a_roll", "b1", "b2"] {
        std::fs::write(media.join(format!("{name}.mp4")), b"x").unwrap();
    }

    let mut plan = TimelinePlan::new(60.0);
    plan.a_roll = Some(BaseSource {
        url: media.join("a_roll.mp4").display().to_string(),
        metadata: String::new(),
        duration_secs: Some(60.0),
    });
    for id in ["b1", "b2"] {
        plan.b_rolls.push(ClipSource {
            id: id.to_string(),
            url: format!("file://{}", media.join(format!("{id}.mp4")).display()),
            metadata: String::new(),
            duration_secs: None,
            enhanced_description: None,
        });
    }
    plan.insertions = vec![
        Insertion::new(30.0, 2.0, "b2"),
        Insertion::new(10.0, 2.0, "b1"),
        Insertion::new(20.0, 2.0, "X"),
    ];
    plan
}

fn renderer(engine: PathBuf, work_dir: &Path) -> Renderer {
    let mut config = AppConfig::default();
    config.tools.ffmpeg = engine;
    config.work_dir = Some(work_dir.to_path_buf());
    Renderer::new(config).with_prober(Arc::new(StaticProber::new(MediaInfo {
        width: 1920,
        height: 1080,
        frame_rate: FrameRate::integer(30).unwrap(),
        duration_secs: 60.0,
    })))
}

#[tokio::test]
async fn render_job_finalizes_output_and_reports_dropped_insertion() {
    let dir = tempfile::tempdir().unwrap();
    let plan = local_job(dir.path());
    let work = tempfile::tempdir().unwrap();
    let renderer = renderer(fake_engine(dir.path(), SUCCEEDS), work.path());
    let target = dir.path().join("out").join("final.mp4");

    let outcome = renderer
        .render_timeline_plan(&plan, RenderRequest::new(&target), None, CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(outcome.output_path, target);
    assert_eq!(std::fs::read(&target).unwrap(), b"video");
    assert_eq!(outcome.report.overlays, 2);
    assert_eq!(outcome.report.dropped(), 1);

    let record = renderer.registry().get(&outcome.job_id).unwrap();
    assert_eq!(record.state, JobState::Completed { output: target });
    assert!(is_empty_dir(work.path()));
}

#[tokio::test]
async fn render_job_failure_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let plan = local_job(dir.path());
    let work = tempfile::tempdir().unwrap();
    let renderer = renderer(fake_engine(dir.path(), FAILS), work.path());
    let target = dir.path().join("final.mp4");

    let err = renderer
        .render_timeline_plan(&plan, RenderRequest::new(&target), None, CancelFlag::new())
        .await
        .unwrap_err();

    assert!(err.diagnostic().unwrap().contains("Invalid filter graph"));
    assert!(!target.exists());

    let jobs = renderer.registry().list();
    assert_eq!(jobs.len(), 1);
    assert!(matches!(jobs[0].state, JobState::Failed { .. }));
    assert!(is_empty_dir(work.path()));
}

#[tokio::test]
async fn render_job_fails_on_missing_clip_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut plan = local_job(dir.path());
    plan.b_rolls[0].url = dir.path().join("gone.mp4").display().to_string();
    let work = tempfile::tempdir().unwrap();
    let renderer = renderer(fake_engine(dir.path(), SUCCEEDS), work.path());
    let target = dir.path().join("final.mp4");

    let err = renderer
        .render_timeline_plan(&plan, RenderRequest::new(&target), None, CancelFlag::new())
        .await
        .unwrap_err();

    assert!(matches!(err, InlayError::Acquisition { ref reference, .. } if reference.ends_with("gone.mp4")));
    assert!(!target.exists());
    assert!(is_empty_dir(work.path()));
}

#[tokio::test]
async fn render_job_rejects_duplicate_clip_ids_before_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let mut plan = local_job(dir.path());
    let duplicate = plan.b_rolls[0].clone();
    plan.b_rolls.push(duplicate);
    let work = tempfile::tempdir().unwrap();
    let renderer = renderer(fake_engine(dir.path(), SUCCEEDS), work.path());

    let err = renderer
        .render_timeline_plan(
            &plan,
            RenderRequest::new(dir.path().join("final.mp4")),
            None,
            CancelFlag::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, InlayError::Plan { .. }));
}

#[tokio::test]
async fn cancelled_render_job_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let plan = local_job(dir.path());
    let work = tempfile::tempdir().unwrap();
    let renderer = renderer(fake_engine(dir.path(), HANGS), work.path());
    let target = dir.path().join("final.mp4");

    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let err = renderer
        .render_timeline_plan(&plan, RenderRequest::new(&target), None, cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, InlayError::Cancelled));
    assert!(!target.exists());
    assert!(is_empty_dir(work.path()));
    assert!(matches!(
        renderer.registry().list()[0].state,
        JobState::Failed { .. }
    ));
}

#[tokio::test]
async fn negative_transition_override_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let plan = local_job(dir.path());
    let work = tempfile::tempdir().unwrap();
    let renderer = renderer(fake_engine(dir.path(), SUCCEEDS), work.path());
    let target = dir.path().join("final.mp4");

    let err = renderer
        .render_timeline_plan(
            &plan,
            RenderRequest::new(&target).with_transition(-0.5),
            None,
            CancelFlag::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, InlayError::Config { .. }));
    assert!(!target.exists());
    assert!(is_empty_dir(work.path()));
}
