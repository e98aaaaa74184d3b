use std::path::PathBuf;
use std::time::Duration;

use photo_booth::config::{CaptureMode, Configuration, CueKind};
use photo_booth::processing::slots::LayoutKind;

#[test]
fn empty_document_uses_defaults() {
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    assert_eq!(cfg.session.target_shot_count, 4);
    assert_eq!(cfg.session.countdown_seconds, 3);
    assert_eq!(cfg.session.mode, CaptureMode::Auto);
    assert_eq!(cfg.shutter_retry_backoff, Duration::from_millis(500));
    assert_eq!(cfg.layout.kind, LayoutKind::Grid);
    assert_eq!(cfg.layout.output_name, "print.png");
    assert_eq!(cfg.boomerang.target_width, 720);
    assert_eq!(cfg.boomerang.frame_delay, Duration::from_millis(100));
    assert_eq!(cfg.stop_motion.fps, 3);
    assert_eq!(cfg.stop_motion.repeat, 3);
    assert_eq!(cfg.stop_motion.target_width, 1080);
    assert_eq!(cfg.decoder.max_decode_bytes, 256 * 1024 * 1024);
    assert!(cfg.validated().is_ok());
}

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
output-directory: "/srv/booth"
shutter-retry-backoff: 250ms
session:
  target-shot-count: 3
  countdown-seconds: 5
  mode: manual
frame-source:
  directory: "/media/camera"
cue: silent
layout:
  kind: Strip
  background: [10, 20, 30]
boomerang:
  frame-delay: 80ms
  target-width: 480
stop-motion:
  enabled: false
  fps: 4
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.output_directory, PathBuf::from("/srv/booth"));
    assert_eq!(cfg.shutter_retry_backoff, Duration::from_millis(250));
    assert_eq!(cfg.session.target_shot_count, 3);
    assert_eq!(cfg.session.countdown_seconds, 5);
    assert_eq!(cfg.session.mode, CaptureMode::Manual);
    assert_eq!(cfg.session.inter_shot_delay_seconds, 2);
    assert_eq!(cfg.frame_source.directory, PathBuf::from("/media/camera"));
    assert_eq!(cfg.cue, CueKind::Silent);
    assert_eq!(cfg.layout.kind, LayoutKind::Strip);
    assert_eq!(cfg.layout.background, [10, 20, 30]);
    assert_eq!(cfg.boomerang.frame_delay, Duration::from_millis(80));
    assert_eq!(cfg.boomerang.target_width, 480);
    assert!(!cfg.stop_motion.enabled);
    assert_eq!(cfg.stop_motion.fps, 4);
}

#[test]
fn unknown_layout_kind_is_rejected() {
    let yaml = r#"
layout:
  kind: collage
"#;
    let err = serde_yaml::from_str::<Configuration>(yaml).unwrap_err();
    assert!(err.to_string().contains("collage"), "{err}");
}

#[test]
fn zero_shot_count_fails_validation() {
    let yaml = r#"
session:
  target-shot-count: 0
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(format!("{err:#}").contains("target-shot-count"));
}

#[test]
fn zero_countdown_fails_validation() {
    let yaml = r#"
session:
  countdown-seconds: 0
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn zero_stop_motion_fps_fails_validation() {
    let yaml = r#"
stop-motion:
  fps: 0
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(err.to_string().contains("stop-motion.fps"));
}

#[test]
fn missing_overlay_fails_validation() {
    let yaml = r#"
layout:
  frame-overlay: "/definitely/not/here.png"
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("booth.yaml");
    std::fs::write(&path, "cue: bell\nsession:\n  target-shot-count: 2\n").unwrap();
    let cfg = Configuration::from_yaml_file(&path)
        .unwrap()
        .validated()
        .unwrap();
    assert_eq!(cfg.cue, CueKind::Bell);
    assert_eq!(cfg.session.target_shot_count, 2);
}
