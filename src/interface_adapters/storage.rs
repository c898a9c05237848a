// File-backed recordings: the line sink the recorder writes to, directory listing, and
// loading a recording back into a timeline.

use crate::domain::ports::RecordingSink;
use crate::domain::{Keyframe, RecordingError, SchemaTag, Timeline};
use crate::interface_adapters::protocol::{Decoded, decode_keyframe, encode_keyframe};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, warn};

const RECORDING_EXTENSION: &str = "jsonl";
const LEGACY_EXTENSION: &str = "json";

/// Appends keyframes as `"type":"keyframe"` lines to a file.
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    lines: u64,
}

impl FileSink {
    /// Creates (or truncates) `path`, creating missing parent directories.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, RecordingError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = File::create(&path).await?;
        info!(path = %path.display(), "recording opened");
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            lines: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }
}

#[async_trait]
impl RecordingSink for FileSink {
    async fn append(&mut self, keyframe: &Keyframe) -> Result<(), RecordingError> {
        let writer = self.writer.as_mut().ok_or(RecordingError::Closed)?;
        let mut line = encode_keyframe(keyframe, SchemaTag::Record)
            .map_err(|e| RecordingError::Encode(e.to_string()))?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        self.lines += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), RecordingError> {
        match self.writer.as_mut() {
            Some(writer) => Ok(writer.flush().await?),
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<(), RecordingError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush().await?;
        writer.get_mut().sync_all().await?;
        info!(path = %self.path.display(), lines = self.lines, "recording closed");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

/// Directory holding `.jsonl` recordings (and legacy `.json` ones).
#[derive(Debug, Clone)]
pub struct RecordingDirectory {
    root: PathBuf,
}

impl RecordingDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fresh path for a new recording, named after the current time.
    pub fn new_recording_path(&self) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        self.root
            .join(format!("recording-{millis}.{RECORDING_EXTENSION}"))
    }

    /// Recordings sorted newest first by modification time. A missing directory is empty.
    pub async fn list_recordings(&self) -> Result<Vec<RecordingEntry>, RecordingError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if !is_recording(&path) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            entries.push(RecordingEntry {
                path,
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                size: metadata.len(),
            });
        }

        entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
        Ok(entries)
    }
}

fn is_recording(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(RECORDING_EXTENSION | LEGACY_EXTENSION)
    )
}

/// Reads every keyframe line in `path` into a timeline sorted by timestamp.
///
/// Lines that are not keyframes are skipped.
pub async fn load_timeline(path: impl AsRef<Path>) -> Result<Timeline, RecordingError> {
    let path = path.as_ref();
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();

    let mut frames = Vec::new();
    let mut skipped = 0u64;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match decode_keyframe(&line) {
            Decoded::Keyframe { keyframe, .. } => frames.push(keyframe),
            Decoded::NotKeyframe => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "skipped non-keyframe lines in recording");
    }
    info!(path = %path.display(), keyframes = frames.len(), "recording loaded");
    Ok(Timeline::from_unsorted(frames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntityObservation, Shape};
    use glam::Vec2;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "swarm-storage-{tag}-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    #[tokio::test]
    async fn when_written_then_loaded_keyframes_come_back_sorted() {
        let dir = scratch_dir("roundtrip");
        let path = dir.join("session.jsonl");

        let mut sink = FileSink::create(&path).await.expect("create");
        let late = Keyframe::new(
            1.0,
            vec![EntityObservation {
                shape: Some(Shape::Circle),
                size: Some(Vec2::new(8.0, 8.0)),
                color: Some([1.0, 0.0, 0.0, 1.0]),
                ..EntityObservation::new("A", 5.0, 6.0)
            }],
        );
        let early = Keyframe::new(0.5, vec![EntityObservation::new("A", 1.0, 2.0)]);
        sink.append(&late).await.expect("append");
        sink.append(&early).await.expect("append");
        sink.close().await.expect("close");
        sink.close().await.expect("second close is a no-op");
        assert!(matches!(
            sink.append(&early).await,
            Err(RecordingError::Closed)
        ));

        let timeline = load_timeline(&path).await.expect("load");
        let stamps: Vec<f64> = timeline.iter().map(Keyframe::timestamp).collect();
        assert_eq!(stamps, vec![0.5, 1.0]);
        assert_eq!(timeline.last().expect("last").entities(), late.entities());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn when_listing_then_only_recordings_newest_first() {
        let dir = scratch_dir("listing");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("old.json"), "").expect("write");
        std::thread::sleep(std::time::Duration::from_millis(50));
        std::fs::write(dir.join("new.jsonl"), "").expect("write");
        std::fs::write(dir.join("notes.txt"), "").expect("write");

        let listing = RecordingDirectory::new(&dir)
            .list_recordings()
            .await
            .expect("list");
        let names: Vec<String> = listing
            .iter()
            .filter_map(|e| e.path.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["new.jsonl", "old.json"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn when_directory_is_missing_then_listing_is_empty() {
        let listing = RecordingDirectory::new(scratch_dir("missing"))
            .list_recordings()
            .await
            .expect("list");
        assert!(listing.is_empty());
    }

    #[tokio::test]
    async fn when_file_has_noise_lines_then_they_are_skipped() {
        let dir = scratch_dir("noise");
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("noisy.jsonl");
        std::fs::write(
            &path,
            concat!(
                "{\"type\":\"keyframe\",\"t\":0,\"entities\":[{\"id\":\"A\",\"x\":1,\"y\":1}]}\n",
                "STATE:A,1,1\n",
                "\n",
                "{\"type\":\"keyframe\",\"t\":1,\"entities\":[{\"id\":\"A\",\"x\":2,\"y\":2}]\n",
                "{\"type\":\"kf\",\"t\":2,\"entities\":[{\"id\":\"A\",\"x\":3,\"y\":3}]}\n",
            ),
        )
        .expect("write");

        let timeline = load_timeline(&path).await.expect("load");
        assert_eq!(timeline.len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
