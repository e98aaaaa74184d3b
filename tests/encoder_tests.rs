use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, Rgba, RgbaImage};
use photo_booth::encode::ffmpeg::is_available;
use photo_booth::encode::sink::{SinkConfig, VideoSink};
use photo_booth::encode::{BoomerangEncoder, StopMotionEncoder};
use photo_booth::error::{Error, Result};
use photo_booth::processing::resample::Resampler;
use tokio_util::sync::CancellationToken;

const REDS: [u8; 5] = [0, 60, 120, 180, 240];

fn write_frames(dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("frame-{i}.png"));
            RgbaImage::from_pixel(80, 60, Rgba([REDS[i], 100, 100, 255]))
                .save(&path)
                .unwrap();
            path
        })
        .collect()
}

fn corrupt(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"\xff\xd8 truncated").unwrap();
    path
}

fn gif_frames(path: &Path) -> Vec<image::Frame> {
    let decoder = GifDecoder::new(BufReader::new(File::open(path).unwrap())).unwrap();
    decoder.into_frames().collect_frames().unwrap()
}

/// Index into `REDS` whose value is closest to the frame's first pixel.
fn source_of(frame: &RgbaImage) -> usize {
    let red = frame.get_pixel(0, 0).0[0] as i16;
    (0..REDS.len())
        .min_by_key(|&i| (REDS[i] as i16 - red).abs())
        .unwrap()
}

fn boomerang() -> BoomerangEncoder {
    BoomerangEncoder::new(Resampler::default(), 64)
}

fn leftovers(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".part"))
        .collect()
}

#[test]
fn boomerang_plays_forward_then_back() {
    let dir = tempfile::tempdir().unwrap();
    let photos = write_frames(dir.path(), 5);
    let out = dir.path().join("boomerang.gif");

    let report = boomerang()
        .encode(&photos, Duration::from_millis(100), &out, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.path, out);
    assert_eq!(report.frames_written, 8);
    assert_eq!(report.frames_skipped, 0);

    let frames = gif_frames(&out);
    assert_eq!(frames.len(), 8);
    let order: Vec<usize> = frames.iter().map(|f| source_of(f.buffer())).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4, 3, 2, 1]);
    for frame in &frames {
        assert_eq!(frame.buffer().width(), 64);
        assert_eq!(Duration::from(frame.delay()), Duration::from_millis(100));
    }
    assert!(leftovers(dir.path()).is_empty());
}

#[test]
fn two_photo_boomerang_has_no_reverse_pass() {
    let dir = tempfile::tempdir().unwrap();
    let photos = write_frames(dir.path(), 2);
    let out = dir.path().join("pair.gif");

    boomerang()
        .encode(&photos, Duration::from_millis(100), &out, &CancellationToken::new())
        .unwrap();
    let order: Vec<usize> = gif_frames(&out)
        .iter()
        .map(|f| source_of(f.buffer()))
        .collect();
    assert_eq!(order, vec![0, 1]);
}

#[test]
fn corrupt_photo_is_skipped_in_both_directions() {
    let dir = tempfile::tempdir().unwrap();
    let mut photos = write_frames(dir.path(), 3);
    photos[1] = corrupt(dir.path(), "broken.jpg");
    let out = dir.path().join("boomerang.gif");

    let report = boomerang()
        .encode(&photos, Duration::from_millis(100), &out, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.frames_written, 2);
    assert_eq!(report.frames_skipped, 2);
    let order: Vec<usize> = gif_frames(&out)
        .iter()
        .map(|f| source_of(f.buffer()))
        .collect();
    assert_eq!(order, vec![0, 2]);
}

#[test]
fn boomerang_without_usable_frames_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let photos = vec![corrupt(dir.path(), "a.jpg"), corrupt(dir.path(), "b.jpg")];
    let out = dir.path().join("boomerang.gif");

    let err = boomerang()
        .encode(&photos, Duration::from_millis(100), &out, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::NoUsableFrames { attempted: 2 }));
    assert!(!out.exists());
    assert!(leftovers(dir.path()).is_empty());

    let err = boomerang()
        .encode(&[], Duration::from_millis(100), &out, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::EmptyInput));
    assert!(!out.exists());
}

#[test]
fn cancelled_boomerang_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let photos = write_frames(dir.path(), 4);
    let out = dir.path().join("boomerang.gif");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = boomerang()
        .encode(&photos, Duration::from_millis(100), &out, &cancel)
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(!out.exists());
    assert!(leftovers(dir.path()).is_empty());
}

#[derive(Default)]
struct RecordingSink {
    config: Option<SinkConfig>,
    sources: Vec<usize>,
    finished: bool,
    aborted: bool,
}

impl VideoSink for RecordingSink {
    fn begin(&mut self, cfg: SinkConfig) -> Result<()> {
        assert!(self.config.is_none(), "begin called twice");
        self.config = Some(cfg);
        Ok(())
    }

    fn push_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        let cfg = self.config.expect("frame before begin");
        assert_eq!(frame.dimensions(), (cfg.width, cfg.height));
        self.sources.push(source_of(frame));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

#[test]
fn stop_motion_repeats_the_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let photos = write_frames(dir.path(), 3);
    let encoder = StopMotionEncoder::new(Resampler::default())
        .with_target_width(65)
        .with_fps(3)
        .with_repeat(3);

    let mut sink = RecordingSink::default();
    let (written, skipped) = encoder
        .encode_into(&photos, &mut sink, &CancellationToken::new())
        .unwrap();

    assert_eq!((written, skipped), (9, 0));
    assert_eq!(sink.sources, vec![0, 1, 2, 0, 1, 2, 0, 1, 2]);
    let cfg = sink.config.unwrap();
    assert_eq!(cfg.fps, 3);
    // odd widths are trimmed for yuv420p
    assert_eq!(cfg.width, 64);
    assert_eq!(cfg.height % 2, 0);
    assert!(sink.finished);
    assert!(!sink.aborted);
}

#[test]
fn stop_motion_skips_corrupt_frames_every_pass() {
    let dir = tempfile::tempdir().unwrap();
    let mut photos = write_frames(dir.path(), 3);
    photos[0] = corrupt(dir.path(), "first.jpg");
    let encoder = StopMotionEncoder::new(Resampler::default()).with_target_width(32);

    let mut sink = RecordingSink::default();
    let (written, skipped) = encoder
        .encode_into(&photos, &mut sink, &CancellationToken::new())
        .unwrap();
    assert_eq!((written, skipped), (6, 3));
    assert_eq!(sink.sources, vec![1, 2, 1, 2, 1, 2]);
}

#[test]
fn stop_motion_without_usable_frames_aborts_the_sink() {
    let dir = tempfile::tempdir().unwrap();
    let photos = vec![corrupt(dir.path(), "only.jpg")];
    let mut sink = RecordingSink::default();
    let err = StopMotionEncoder::default()
        .encode_into(&photos, &mut sink, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::NoUsableFrames { attempted: 1 }));
    assert!(sink.config.is_none());
    assert!(sink.aborted);
}

#[test]
fn stop_motion_with_missing_ffmpeg_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let photos = write_frames(dir.path(), 2);
    let out = dir.path().join("clip.mp4");
    let err = StopMotionEncoder::default()
        .with_target_width(32)
        .with_ffmpeg("/no/such/ffmpeg")
        .encode(&photos, &out, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::Encoder(_)));
    assert!(!out.exists());
    assert!(leftovers(dir.path()).is_empty());
}

#[test]
fn stop_motion_through_ffmpeg() {
    if !is_available(Path::new("ffmpeg")) {
        eprintln!("ffmpeg not installed; skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let photos = write_frames(dir.path(), 3);
    let out = dir.path().join("clip.mp4");
    let report = StopMotionEncoder::default()
        .with_target_width(64)
        .encode(&photos, &out, &CancellationToken::new())
        .unwrap()
        .unwrap();
    assert_eq!(report.path, out);
    assert_eq!(report.frames_written, 9);
    assert!(std::fs::metadata(&out).unwrap().len() > 0);
    assert!(leftovers(dir.path()).is_empty());
}

#[test]
fn resampled_width_never_exceeds_the_target() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wide.jpg");
    image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(1600, 1200, Rgba([90, 90, 90, 255])))
        .into_rgb8()
        .save(&path)
        .unwrap();

    let img = Resampler::default().resample(&path, 400).unwrap();
    assert!(img.width() <= 400);
    let expected_h = img.width() as f64 * 1200.0 / 1600.0;
    assert!((img.height() as f64 - expected_h).abs() <= 1.0);
}

#[test]
fn stop_motion_crops_frames_of_a_different_shape() {
    let dir = tempfile::tempdir().unwrap();
    let landscape = dir.path().join("landscape.png");
    RgbaImage::from_pixel(80, 60, Rgba([REDS[0], 100, 100, 255]))
        .save(&landscape)
        .unwrap();
    let portrait = dir.path().join("portrait.png");
    RgbaImage::from_pixel(60, 80, Rgba([REDS[4], 100, 100, 255]))
        .save(&portrait)
        .unwrap();
    let encoder = StopMotionEncoder::new(Resampler::default())
        .with_target_width(32)
        .with_repeat(2);

    let mut sink = RecordingSink::default();
    let (written, skipped) = encoder
        .encode_into(&[landscape, portrait], &mut sink, &CancellationToken::new())
        .unwrap();

    assert_eq!((written, skipped), (4, 0));
    assert_eq!(sink.sources, vec![0, 4, 0, 4]);
    let cfg = sink.config.unwrap();
    assert_eq!((cfg.width, cfg.height), (32, 24));
    assert!(sink.finished);
}
