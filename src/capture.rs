//! Capture adapters: turn microphone input, picked images and freehand
//! drawing into [`LocalHandle`]s.
//!
//! Each adapter claims its device from a shared [`DeviceRegistry`] for the
//! whole capture session. A second session on a busy device is refused,
//! never interrupts the first.

use std::collections::HashSet;
use std::fmt;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::models::LocalHandle;

pub const AUDIO_MEDIA_TYPE: &str = "audio/mpeg";
pub const DRAWING_MEDIA_TYPE: &str = "image/svg+xml";

pub const CANVAS_WIDTH: u32 = 400;
pub const CANVAS_HEIGHT: u32 = 300;
const BRUSH_RADIUS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Microphone,
    Canvas,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Microphone => f.write_str("microphone"),
            Self::Canvas => f.write_str("drawing canvas"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Access to the {0} was denied")]
    DeviceAccessDenied(Device),
    #[error("The {0} is already in use by another capture")]
    DeviceBusy(Device),
    #[error("No recording in progress")]
    NotRecording,
    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),
    #[error("Failed to read media: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// An OS permission failure on a device source is a denied device
    fn from_source(device: Device, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::DeviceAccessDenied(device)
        } else {
            Self::Io(err)
        }
    }
}

/// Tracks which devices are granted and which are currently claimed
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

#[derive(Debug)]
struct RegistryState {
    denied: HashSet<Device>,
    claimed: HashSet<Device>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryState {
                denied: HashSet::new(),
                claimed: HashSet::new(),
            })),
        }
    }

    /// Revoke permission for a device, as a user declining a prompt would
    pub fn deny(&self, device: Device) {
        self.inner.lock().denied.insert(device);
    }

    pub fn allow(&self, device: Device) {
        self.inner.lock().denied.remove(&device);
    }

    pub fn is_claimed(&self, device: Device) -> bool {
        self.inner.lock().claimed.contains(&device)
    }

    pub fn claim(&self, device: Device) -> Result<DeviceClaim, CaptureError> {
        let mut state = self.inner.lock();
        if state.denied.contains(&device) {
            return Err(CaptureError::DeviceAccessDenied(device));
        }
        if !state.claimed.insert(device) {
            return Err(CaptureError::DeviceBusy(device));
        }
        debug!(%device, "capture: device claimed");
        Ok(DeviceClaim {
            registry: self.clone(),
            device,
        })
    }
}

/// Exclusive use of a device; released on drop
#[derive(Debug)]
pub struct DeviceClaim {
    registry: DeviceRegistry,
    device: Device,
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        self.registry.inner.lock().claimed.remove(&self.device);
        debug!(device = %self.device, "capture: device released");
    }
}

struct Recording {
    _claim: DeviceClaim,
    chunks: Vec<u8>,
}

/// Voice memo recorder: `start`, feed chunks as they arrive, `stop`
pub struct AudioRecorder {
    registry: DeviceRegistry,
    recording: Option<Recording>,
}

impl AudioRecorder {
    pub fn new(registry: DeviceRegistry) -> Self {
        Self {
            registry,
            recording: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.recording.is_some() {
            return Err(CaptureError::DeviceBusy(Device::Microphone));
        }
        let claim = self.registry.claim(Device::Microphone)?;
        self.recording = Some(Recording {
            _claim: claim,
            chunks: Vec::new(),
        });
        Ok(())
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<(), CaptureError> {
        let recording = self.recording.as_mut().ok_or(CaptureError::NotRecording)?;
        recording.chunks.extend_from_slice(chunk);
        Ok(())
    }

    /// End the session and hand over the clip; the microphone is released
    pub fn stop(&mut self) -> Result<LocalHandle, CaptureError> {
        let recording = self.recording.take().ok_or(CaptureError::NotRecording)?;
        debug!(bytes = recording.chunks.len(), "capture: recording stopped");
        Ok(LocalHandle::new(AUDIO_MEDIA_TYPE, recording.chunks))
    }

    /// Record a whole stream in fixed-size chunks
    pub fn record_from<R: std::io::Read>(&mut self, mut source: R) -> Result<LocalHandle, CaptureError> {
        self.start()?;
        let mut buf = [0u8; 8192];
        loop {
            let read = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    self.recording = None;
                    return Err(CaptureError::from_source(Device::Microphone, e));
                }
            };
            self.push_chunk(&buf[..read])?;
        }
        self.stop()
    }

    /// Record the contents of an audio file as if it came from the microphone
    pub fn record_file(&mut self, path: &Path) -> Result<LocalHandle, CaptureError> {
        let file = std::fs::File::open(path).map_err(|e| CaptureError::from_source(Device::Microphone, e))?;
        self.record_from(std::io::BufReader::new(file))
    }
}

/// Accepts image bytes, checking they really are an image
#[derive(Debug, Default, Clone, Copy)]
pub struct ImagePicker;

impl ImagePicker {
    pub fn pick_bytes(&self, data: Vec<u8>) -> Result<LocalHandle, CaptureError> {
        let kind = infer::get(&data).ok_or_else(|| CaptureError::UnsupportedMedia("unknown file type".to_string()))?;
        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(CaptureError::UnsupportedMedia(kind.mime_type().to_string()));
        }
        Ok(LocalHandle::new(kind.mime_type(), data))
    }

    pub fn pick_file(&self, path: &Path) -> Result<LocalHandle, CaptureError> {
        let data = std::fs::read(path)?;
        self.pick_bytes(data)
    }
}

/// Freehand drawing: dots are stamped while the pen is down
pub struct DrawingPad {
    _claim: DeviceClaim,
    pen_down: bool,
    dots: Vec<(u32, u32)>,
}

impl DrawingPad {
    pub fn open(registry: &DeviceRegistry) -> Result<Self, CaptureError> {
        Ok(Self {
            _claim: registry.claim(Device::Canvas)?,
            pen_down: false,
            dots: Vec::new(),
        })
    }

    pub fn pen_down(&mut self) {
        self.pen_down = true;
    }

    pub fn pen_up(&mut self) {
        self.pen_down = false;
    }

    /// Pointer moved; off-canvas positions are dropped
    pub fn move_to(&mut self, x: u32, y: u32) {
        if self.pen_down && x < CANVAS_WIDTH && y < CANVAS_HEIGHT {
            self.dots.push((x, y));
        }
    }

    pub fn dot_count(&self) -> usize {
        self.dots.len()
    }

    /// Close the pad and export what was drawn
    pub fn save(self) -> LocalHandle {
        let mut svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">",
            w = CANVAS_WIDTH,
            h = CANVAS_HEIGHT
        );
        for (x, y) in &self.dots {
            let _ = write!(svg, "<circle cx=\"{}\" cy=\"{}\" r=\"{}\" fill=\"white\"/>", x, y, BRUSH_RADIUS);
        }
        svg.push_str("</svg>");
        LocalHandle::new(DRAWING_MEDIA_TYPE, svg.into_bytes())
    }

    /// Replay strokes written as `x y` lines; a blank line lifts the pen
    pub fn replay(&mut self, strokes: &str) -> Result<(), CaptureError> {
        self.pen_down();
        for line in strokes.lines() {
            let line = line.trim();
            if line.is_empty() {
                self.pen_up();
                continue;
            }
            let mut parts = line.split_whitespace().map(str::parse::<u32>);
            match (parts.next(), parts.next()) {
                (Some(Ok(x)), Some(Ok(y))) => {
                    self.pen_down();
                    self.move_to(x, y);
                }
                _ => return Err(CaptureError::UnsupportedMedia(format!("bad stroke point '{}'", line))),
            }
        }
        self.pen_up();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 16] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    ];

    #[test]
    fn test_recording_collects_chunks() {
        let mut recorder = AudioRecorder::new(DeviceRegistry::new());
        recorder.start().unwrap();
        recorder.push_chunk(b"abc").unwrap();
        recorder.push_chunk(b"def").unwrap();
        let clip = recorder.stop().unwrap();

        assert_eq!(clip.data(), b"abcdef");
        assert_eq!(clip.media_type, AUDIO_MEDIA_TYPE);
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_second_recording_is_refused() {
        let registry = DeviceRegistry::new();
        let mut first = AudioRecorder::new(registry.clone());
        let mut second = AudioRecorder::new(registry.clone());

        first.start().unwrap();
        assert!(matches!(first.start(), Err(CaptureError::DeviceBusy(Device::Microphone))));
        assert!(matches!(second.start(), Err(CaptureError::DeviceBusy(Device::Microphone))));
        assert!(first.is_recording());

        first.stop().unwrap();
        assert!(!registry.is_claimed(Device::Microphone));
        second.start().unwrap();
    }

    #[test]
    fn test_denied_microphone() {
        let registry = DeviceRegistry::new();
        registry.deny(Device::Microphone);
        let mut recorder = AudioRecorder::new(registry.clone());
        assert!(matches!(
            recorder.start(),
            Err(CaptureError::DeviceAccessDenied(Device::Microphone))
        ));
        assert!(!registry.is_claimed(Device::Microphone));

        registry.allow(Device::Microphone);
        recorder.start().unwrap();
    }

    #[test]
    fn test_stop_without_start() {
        let mut recorder = AudioRecorder::new(DeviceRegistry::new());
        assert!(matches!(recorder.stop(), Err(CaptureError::NotRecording)));
        assert!(matches!(recorder.push_chunk(b"x"), Err(CaptureError::NotRecording)));
    }

    #[test]
    fn test_record_from_reader() {
        let mut recorder = AudioRecorder::new(DeviceRegistry::new());
        let data = vec![7u8; 20_000];
        let clip = recorder.record_from(data.as_slice()).unwrap();
        assert_eq!(clip.len(), 20_000);
        assert!(!recorder.is_recording());
    }

    struct Forbidden;

    impl std::io::Read for Forbidden {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
        }
    }

    #[test]
    fn test_unreadable_source_is_denied_microphone() {
        let registry = DeviceRegistry::new();
        let mut recorder = AudioRecorder::new(registry.clone());
        assert!(matches!(
            recorder.record_from(Forbidden),
            Err(CaptureError::DeviceAccessDenied(Device::Microphone))
        ));
        assert!(!recorder.is_recording());
        assert!(!registry.is_claimed(Device::Microphone));
    }

    #[test]
    fn test_record_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.mp3");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let mut recorder = AudioRecorder::new(DeviceRegistry::new());
        assert_eq!(recorder.record_file(&path).unwrap().data(), &[1u8, 2, 3]);
        assert!(matches!(
            recorder.record_file(&dir.path().join("missing.mp3")),
            Err(CaptureError::Io(_))
        ));
    }

    #[test]
    fn test_image_picker_sniffs_type() {
        let picker = ImagePicker;
        let mut png = PNG_HEADER.to_vec();
        png.extend_from_slice(&[0u8; 16]);
        let handle = picker.pick_bytes(png).unwrap();
        assert_eq!(handle.media_type, "image/png");

        assert!(matches!(
            picker.pick_bytes(b"just some text".to_vec()),
            Err(CaptureError::UnsupportedMedia(_))
        ));
    }

    #[test]
    fn test_drawing_only_while_pen_down() {
        let registry = DeviceRegistry::new();
        let mut pad = DrawingPad::open(&registry).unwrap();
        pad.move_to(1, 1);
        pad.pen_down();
        pad.move_to(10, 20);
        pad.move_to(500, 20);
        pad.pen_up();
        pad.move_to(30, 30);
        assert_eq!(pad.dot_count(), 1);

        let handle = pad.save();
        let svg = String::from_utf8(handle.data().to_vec()).unwrap();
        assert_eq!(handle.media_type, DRAWING_MEDIA_TYPE);
        assert!(svg.contains("<circle cx=\"10\" cy=\"20\" r=\"2\""));
        assert!(!registry.is_claimed(Device::Canvas));
    }

    #[test]
    fn test_one_drawing_pad_at_a_time() {
        let registry = DeviceRegistry::new();
        let pad = DrawingPad::open(&registry).unwrap();
        assert!(matches!(
            DrawingPad::open(&registry),
            Err(CaptureError::DeviceBusy(Device::Canvas))
        ));
        drop(pad);
        assert!(DrawingPad::open(&registry).is_ok());
    }

    #[test]
    fn test_replay_strokes() {
        let mut pad = DrawingPad::open(&DeviceRegistry::new()).unwrap();
        pad.replay("1 1\n2 2\n\n3 3\n").unwrap();
        assert_eq!(pad.dot_count(), 3);
        assert!(pad.replay("nope").is_err());
    }
}
