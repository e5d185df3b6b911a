// # File processor
//
// Pre-upload work on the plaintext: path validation against the image
// whitelist, streaming content hashing, and metadata extraction. EXIF is
// best-effort; when it is missing or unreadable the metadata degrades to
// filesystem timestamps.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Extensions accepted for upload, lowercase.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "heic", "heif", "tiff", "tif", "raw", "dng",
    "arw", "cr2", "nef", "orf", "rw2",
];

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("not a regular file: {0}")]
    NotAFile(String),
    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether a path has a whitelisted image extension.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Validate that `path` is an existing, readable, whitelisted image file.
pub fn validate(path: &Path) -> Result<(), ProcessorError> {
    let display = path.display().to_string();

    let meta = std::fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProcessorError::NotFound(display.clone())
        } else {
            ProcessorError::Io(e)
        }
    })?;
    if !meta.is_file() {
        return Err(ProcessorError::NotAFile(display));
    }
    if !is_image_path(path) {
        return Err(ProcessorError::UnsupportedExtension(display));
    }

    // Readability check up front so the pipeline fails before any
    // server-side resources are allocated.
    File::open(path)?;
    Ok(())
}

/// Streaming SHA-256 over the file contents, as lowercase hex.
pub fn compute_hash(path: &Path) -> Result<String, ProcessorError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Metadata committed (encrypted) alongside each photo. This is the
/// canonical serialized shape; field order and names are part of the
/// catalog format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoMetadata {
    pub title: String,
    pub creation_time: i64,
    pub modification_time: i64,
    pub file_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Extract metadata for a photo. Times are microsecond Unix timestamps;
/// EXIF capture time wins over filesystem times when present. EXIF
/// failures only cost the optional fields.
pub fn extract_metadata(path: &Path) -> Result<PhotoMetadata, ProcessorError> {
    let stat = std::fs::metadata(path)?;
    let modification_time = system_time_micros(stat.modified().ok());
    let creation_time = system_time_micros(stat.created().ok().or_else(|| stat.modified().ok()));

    let title = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut metadata = PhotoMetadata {
        title,
        creation_time,
        modification_time,
        file_type: "image".to_string(),
        latitude: None,
        longitude: None,
        width: None,
        height: None,
    };

    match read_exif(path) {
        Some(exif) => apply_exif(&mut metadata, &exif),
        None => tracing::debug!(path = %path.display(), "no usable EXIF, using stat times"),
    }

    Ok(metadata)
}

fn system_time_micros(time: Option<SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

fn read_exif(path: &Path) -> Option<exif::Exif> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    exif::Reader::new().read_from_container(&mut reader).ok()
}

fn apply_exif(metadata: &mut PhotoMetadata, exif: &exif::Exif) {
    if let Some(timestamp) = exif_capture_time(exif) {
        metadata.creation_time = timestamp;
    }

    metadata.width = exif_dimension(exif, exif::Tag::PixelXDimension, exif::Tag::ImageWidth);
    metadata.height = exif_dimension(exif, exif::Tag::PixelYDimension, exif::Tag::ImageLength);

    if let (Some(lat), Some(long)) = (
        exif_coordinate(exif, exif::Tag::GPSLatitude, exif::Tag::GPSLatitudeRef, "S"),
        exif_coordinate(exif, exif::Tag::GPSLongitude, exif::Tag::GPSLongitudeRef, "W"),
    ) {
        metadata.latitude = Some(lat);
        metadata.longitude = Some(long);
    }
}

/// Capture time from DateTimeOriginal (fallback DateTime), interpreted as
/// UTC microseconds. EXIF has no zone info; UTC is the stable choice.
fn exif_capture_time(exif: &exif::Exif) -> Option<i64> {
    let field = exif
        .get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)
        .or_else(|| exif.get_field(exif::Tag::DateTime, exif::In::PRIMARY))?;

    let raw = match &field.value {
        exif::Value::Ascii(parts) => parts.first().map(|p| String::from_utf8_lossy(p).into_owned()),
        _ => None,
    }?;

    let parsed = chrono::NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S").ok()?;
    Some(parsed.and_utc().timestamp_micros())
}

fn exif_dimension(exif: &exif::Exif, primary: exif::Tag, fallback: exif::Tag) -> Option<u32> {
    let field = exif
        .get_field(primary, exif::In::PRIMARY)
        .or_else(|| exif.get_field(fallback, exif::In::PRIMARY))?;
    field.value.get_uint(0)
}

/// Degrees/minutes/seconds rationals to signed decimal degrees.
fn exif_coordinate(
    exif: &exif::Exif,
    value_tag: exif::Tag,
    ref_tag: exif::Tag,
    negative_ref: &str,
) -> Option<f64> {
    let field = exif.get_field(value_tag, exif::In::PRIMARY)?;
    let rationals = match &field.value {
        exif::Value::Rational(parts) if parts.len() >= 3 => parts,
        _ => return None,
    };

    let degrees = rationals[0].to_f64() + rationals[1].to_f64() / 60.0 + rationals[2].to_f64() / 3600.0;

    let reference = exif
        .get_field(ref_tag, exif::In::PRIMARY)
        .map(|f| f.display_value().to_string())
        .unwrap_or_default();

    if reference.trim().eq_ignore_ascii_case(negative_ref) {
        Some(-degrees)
    } else {
        Some(degrees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_image_path_whitelist() {
        assert!(is_image_path(Path::new("/a/photo.jpg")));
        assert!(is_image_path(Path::new("/a/PHOTO.JPG")));
        assert!(is_image_path(Path::new("/a/raw.DNG")));
        assert!(!is_image_path(Path::new("/a/movie.mp4")));
        assert!(!is_image_path(Path::new("/a/noext")));
    }

    #[test]
    fn test_validate_missing_file() {
        let result = validate(Path::new("/definitely/not/here.jpg"));
        assert!(matches!(result, Err(ProcessorError::NotFound(_))));
    }

    #[test]
    fn test_validate_rejects_directory_and_extension() {
        let dir = TempDir::new().expect("Failed to create temp dir");

        let as_dir = dir.path().join("album.jpg");
        std::fs::create_dir(&as_dir).unwrap();
        assert!(matches!(
            validate(&as_dir),
            Err(ProcessorError::NotAFile(_))
        ));

        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"hello").unwrap();
        assert!(matches!(
            validate(&text),
            Err(ProcessorError::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn test_compute_hash_known_value() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("img.jpg");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(
            compute_hash(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_metadata_without_exif_uses_stat_times() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("plain.jpg");
        std::fs::write(&path, b"not a real jpeg").unwrap();

        let metadata = extract_metadata(&path).unwrap();
        assert_eq!(metadata.title, "plain.jpg");
        assert_eq!(metadata.file_type, "image");
        assert!(metadata.modification_time > 0);
        assert!(metadata.latitude.is_none());
        assert!(metadata.width.is_none());
    }

    #[test]
    fn test_metadata_serializes_canonically() {
        let metadata = PhotoMetadata {
            title: "a.jpg".into(),
            creation_time: 1,
            modification_time: 2,
            file_type: "image".into(),
            latitude: None,
            longitude: None,
            width: None,
            height: None,
        };
        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(
            json,
            r#"{"title":"a.jpg","creation_time":1,"modification_time":2,"file_type":"image"}"#
        );
    }
}
