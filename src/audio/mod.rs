//! # Audio Library
//!
//! Storage for uploaded recordings. Each upload is written under the uploads
//! directory with a unique prefix and recorded as an [`AudioSource`] in the
//! database so jobs can reference it by id.
//!
//! ## Accepted Formats:
//! - **WAV**: stored and probed for duration / sample rate
//! - **MP3**, **FLAC**: stored as-is
//!
//! ## Key Rust Concepts:
//! - `tokio::fs` keeps file IO off the request threads
//! - Probing runs in `spawn_blocking` since the WAV decoder is synchronous

pub mod probe;

use crate::error::{AppError, AppResult};
use crate::jobs::store::Database;
use crate::models::AudioSource;
use chrono::Utc;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub use probe::{probe_wav, AudioMetadata};

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["wav", "mp3", "flac"];

/// Reject uploads that [`AudioLibrary::save`] would refuse, without writing
/// anything. Returns the sanitized filename and its extension.
pub fn check_upload(filename: &str, bytes: &[u8]) -> AppResult<(String, &'static str)> {
    let filename = sanitize_filename(filename);
    let extension = extension_of(&filename).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Unsupported audio format for '{}'; expected one of: {}",
            filename,
            SUPPORTED_EXTENSIONS.join(", ")
        ))
    })?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest(format!("Uploaded file '{}' is empty", filename)));
    }
    Ok((filename, extension))
}

pub struct AudioLibrary {
    db: Arc<Database>,
    uploads_dir: PathBuf,
}

impl AudioLibrary {
    pub fn new(db: Arc<Database>, uploads_dir: PathBuf) -> Self {
        Self { db, uploads_dir }
    }

    /// Store an uploaded file and record it.
    ///
    /// ## Errors:
    /// - `BadRequest` for an empty upload or an unsupported extension
    /// - `Internal` if the file cannot be written
    pub async fn save(&self, filename: &str, bytes: Vec<u8>) -> AppResult<AudioSource> {
        let (filename, extension) = check_upload(filename, &bytes)?;

        let id = Uuid::new_v4();
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        let path = self.uploads_dir.join(format!("{}_{}", id.simple(), filename));
        tokio::fs::write(&path, &bytes).await?;

        let size_bytes = bytes.len() as u64;
        let metadata = if extension == "wav" {
            tokio::task::spawn_blocking(move || probe_wav(&mut Cursor::new(bytes)))
                .await
                .map_err(|e| AppError::Internal(format!("Audio probe task failed: {}", e)))?
        } else {
            AudioMetadata::default()
        };

        let audio = AudioSource {
            id,
            filename,
            path: path.clone(),
            size_bytes,
            duration_secs: metadata.duration_secs,
            sample_rate: metadata.sample_rate,
            uploaded_at: Utc::now(),
        };

        match self.db.insert_audio(audio) {
            Ok(audio) => {
                info!(
                    audio_id = %audio.id,
                    filename = %audio.filename,
                    bytes = audio.size_bytes,
                    duration_secs = ?audio.duration_secs,
                    "audio uploaded"
                );
                Ok(audio)
            }
            Err(err) => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = ?path, error = %e, "failed to remove orphaned upload");
                }
                Err(err)
            }
        }
    }

    pub fn get(&self, id: Uuid) -> AppResult<AudioSource> {
        self.db.get_audio(id)
    }

    pub fn list(&self) -> AppResult<Vec<AudioSource>> {
        self.db.list_audio()
    }

    /// Remove the record and its file. Jobs that used the audio keep their
    /// results.
    pub async fn delete(&self, id: Uuid) -> AppResult<AudioSource> {
        let audio = self.db.delete_audio(id)?;
        match tokio::fs::remove_file(&audio.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(audio_id = %id, path = ?audio.path, "audio file was already gone");
            }
            Err(e) => return Err(e.into()),
        }
        info!(audio_id = %id, "audio deleted");
        Ok(audio)
    }
}

/// Lower-cased extension, if it is one of [`SUPPORTED_EXTENSIONS`].
pub fn extension_of(filename: &str) -> Option<&'static str> {
    let extension = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.iter().copied().find(|e| *e == extension)
}

/// Final path component with anything but letters, digits, `.`, `-` and `_`
/// replaced by `_`.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename)
        .trim();
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::probe::test_support::wav_bytes;
    use super::*;

    fn library() -> (AudioLibrary, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let library = AudioLibrary::new(Arc::new(Database::in_memory().unwrap()), dir.path().join("uploads"));
        (library, dir)
    }

    #[test]
    fn test_extension_check() {
        assert_eq!(extension_of("talk.WAV"), Some("wav"));
        assert_eq!(extension_of("talk.flac"), Some("flac"));
        assert_eq!(extension_of("talk.ogg"), None);
        assert_eq!(extension_of("talk"), None);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd.wav"), "passwd.wav");
        assert_eq!(sanitize_filename("C:\\rec\\会议 记录.mp3"), "会议_记录.mp3");
        assert_eq!(sanitize_filename(".hidden.wav"), "hidden.wav");
        assert_eq!(sanitize_filename("///"), "upload");
    }

    #[tokio::test]
    async fn test_save_wav_records_metadata() {
        let (library, _dir) = library();
        let audio = library
            .save("meeting.wav", wav_bytes(16_000, 1, 16_000))
            .await
            .unwrap();

        assert!(audio.path.exists());
        assert!(audio.path.starts_with(&library.uploads_dir));
        assert_eq!(audio.filename, "meeting.wav");
        assert_eq!(audio.sample_rate, Some(16_000));
        assert_eq!(audio.duration_secs, Some(1.0));
        assert_eq!(library.get(audio.id).unwrap(), audio);
    }

    #[tokio::test]
    async fn test_save_mp3_without_metadata() {
        let (library, _dir) = library();
        let audio = library.save("talk.mp3", b"ID3fake".to_vec()).await.unwrap();
        assert_eq!(audio.duration_secs, None);
        assert_eq!(audio.size_bytes, 7);
    }

    #[tokio::test]
    async fn test_save_rejects_bad_uploads() {
        let (library, _dir) = library();
        assert!(matches!(
            library.save("notes.txt", b"hello".to_vec()).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            library.save("empty.wav", Vec::new()).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(library.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let (library, _dir) = library();
        let audio = library.save("a.flac", b"fLaC".to_vec()).await.unwrap();

        library.delete(audio.id).await.unwrap();
        assert!(!audio.path.exists());
        assert!(matches!(library.get(audio.id), Err(AppError::NotFound(_))));
        assert!(matches!(library.delete(audio.id).await, Err(AppError::NotFound(_))));
    }
}
