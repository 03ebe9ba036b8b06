//! HTTP camera source.
//!
//! Ingests frames from network cameras that serve either a multipart MJPEG
//! stream or a single JPEG snapshot per request.
//!
//! - Multipart responses are scanned for SOI/EOI markers and decoded in-memory.
//! - Snapshot endpoints are re-fetched on every grab.
//! - Frames arriving faster than `target_fps` are dropped.

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use std::io::Read;
use std::time::{Duration, Instant};

use super::{frame_interval, health_grace};
use crate::frame::{CaptureSource, VideoFrame};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct HttpCameraConfig {
    /// Stream URL, http(s)://.
    pub url: String,
    /// Frames faster than this rate are decimated.
    pub target_fps: u32,
    pub connect_timeout: Duration,
    /// Longest a single socket read may block the event loop.
    pub read_timeout: Duration,
}

impl Default for HttpCameraConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:81/stream".to_string(),
            target_fps: 10,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

pub struct HttpCameraSource {
    config: HttpCameraConfig,
    agent: ureq::Agent,
    stream: Option<HttpStream>,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    frame_count: u64,
    last_error: Option<String>,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    SingleJpeg,
}

impl HttpCameraSource {
    pub fn new(config: HttpCameraConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout_read(config.read_timeout)
            .build();
        Self {
            config,
            agent,
            stream: None,
            last_frame_at: None,
            connected_at: None,
            frame_count: 0,
            last_error: None,
        }
    }

    fn next_jpeg(&mut self) -> Result<Vec<u8>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("http camera not open; call open() first"))?;
        match stream {
            HttpStream::Mjpeg(stream) => stream.read_next_jpeg(),
            HttpStream::SingleJpeg => fetch_single_jpeg(&self.agent, &self.config.url),
        }
    }
}

impl CaptureSource for HttpCameraSource {
    fn describe(&self) -> String {
        self.config.url.clone()
    }

    fn open(&mut self) -> Result<()> {
        let response = self
            .agent
            .get(&self.config.url)
            .call()
            .with_context(|| format!("connect to camera {}", self.config.url))?;
        let content_type = response.header("Content-Type").unwrap_or("");
        if content_type.to_lowercase().contains("multipart") {
            self.stream = Some(HttpStream::Mjpeg(MjpegStream::new(response.into_reader())));
        } else {
            self.stream = Some(HttpStream::SingleJpeg);
        }
        self.connected_at = Some(Instant::now());
        self.last_error = None;
        log::info!("HttpCameraSource: opened {}", self.config.url);
        Ok(())
    }

    fn grab(&mut self) -> Result<Option<VideoFrame>> {
        if let Some(last) = self.last_frame_at {
            if last.elapsed() < frame_interval(self.config.target_fps) {
                return Ok(None);
            }
        }
        let jpeg = match self.next_jpeg() {
            Ok(jpeg) => jpeg,
            Err(err) => {
                self.last_error = Some(err.to_string());
                return Err(err);
            }
        };
        let frame = match decode_jpeg(&jpeg) {
            Ok(frame) => frame,
            Err(err) => {
                log::debug!("skipping undecodable frame: {:#}", err);
                return Ok(None);
            }
        };
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        self.last_error = None;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            log::info!("HttpCameraSource: released {}", self.config.url);
        }
        self.connected_at = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= health_grace(self.config.target_fps)
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_single_jpeg(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>> {
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

fn decode_jpeg(bytes: &[u8]) -> Result<VideoFrame> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    let (width, height) = image.dimensions();
    VideoFrame::from_rgb(image.into_rgb8().into_raw(), width, height)
}

/// `(start, end)` of the first complete JPEG. Nested SOI/EOI pairs (EXIF
/// thumbnails) are skipped so the outer image is never cut short.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let mut depth = 0usize;
    let mut i = start + 2;
    while i + 1 < buffer.len() {
        if buffer[i] == 0xFF {
            match buffer[i + 1] {
                0xD8 => {
                    depth += 1;
                    i += 2;
                    continue;
                }
                0xD9 if depth == 0 => return Some((start, i + 2)),
                0xD9 => {
                    depth -= 1;
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::net::TcpListener;
    use std::thread;

    fn tiny_jpeg() -> Vec<u8> {
        let image = image::RgbImage::from_pixel(4, 2, image::Rgb([10, 20, 30]));
        let mut out = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 80)
            .encode_image(&image)
            .unwrap();
        out
    }

    #[test]
    fn finds_jpeg_bounds_inside_multipart_noise() {
        let buffer = [0x00, 0x01, 0xFF, 0xD8, 0xAA, 0xFF, 0xD9, 0x33];
        assert_eq!(find_jpeg_bounds(&buffer), Some((2, 7)));
        assert_eq!(find_jpeg_bounds(&[0xFF, 0xD8, 0x00]), None);
    }

    #[test]
    fn embedded_thumbnail_does_not_truncate_frame() {
        let buffer = [
            0xFF, 0xD8, 0xFF, 0xE1, 0xFF, 0xD8, 0x01, 0xFF, 0xD9, 0x02, 0x03, 0xFF, 0xD9, 0x44,
        ];
        assert_eq!(find_jpeg_bounds(&buffer), Some((0, 13)));
    }

    #[test]
    fn stalled_stream_times_out_instead_of_blocking() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                      Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\r\n\
                      --frame\r\n",
                )
                .unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_secs(3));
        });

        let mut source = HttpCameraSource::new(HttpCameraConfig {
            url: format!("http://{}/stream", addr),
            target_fps: 0,
            connect_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(200),
        });
        source.open().unwrap();
        let started = Instant::now();
        assert!(source.grab().is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!source.is_healthy());
    }

    #[test]
    fn mjpeg_stream_yields_decodable_frames() {
        let jpeg = tiny_jpeg();
        let mut body = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        body.extend_from_slice(&jpeg);
        body.extend_from_slice(b"\r\n--frame\r\n");
        let mut stream = MjpegStream::new(Box::new(Cursor::new(body)));
        let frame = decode_jpeg(&stream.read_next_jpeg().unwrap()).unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));
        assert!(stream.read_next_jpeg().is_err());
    }

    #[test]
    fn grab_before_open_is_an_error() {
        let mut source = HttpCameraSource::new(HttpCameraConfig::default());
        assert!(source.grab().is_err());
        assert!(!source.is_healthy());
    }
}
