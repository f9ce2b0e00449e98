//! Layered, cheapest-first upload validation: name syntax, MIME allow-list,
//! size ceiling, then (when a buffer is available) magic-number sniffing
//! against a declared/detected compatibility table. Grounded on the
//! teacher's `UploadTracker::accept_chunk_stream` MIME-sniff step
//! (`infer::get`), generalised into a standalone, buffer-optional pass.

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("validation failed: {0:?}")]
    Rejected(Vec<String>),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FileCategory {
    Image,
    Audio,
    Document,
    Video,
    Other,
}

impl FileCategory {
    pub fn classify(mime: &str) -> Self {
        match mime.split('/').next().unwrap_or("") {
            "image" => Self::Image,
            "audio" => Self::Audio,
            "video" => Self::Video,
            _ if mime == "application/pdf"
                || mime == "application/msword"
                || mime.starts_with("application/vnd.openxmlformats") =>
            {
                Self::Document
            }
            _ => Self::Other,
        }
    }

    pub fn size_ceiling(
        self,
        image: u64,
        audio: u64,
        document: u64,
        video: u64,
        other: u64,
    ) -> u64 {
        match self {
            Self::Image => image,
            Self::Audio => audio,
            Self::Document => document,
            Self::Video => video,
            Self::Other => other,
        }
    }
}

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const FORBIDDEN_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

pub fn validate_filename(name: &str) -> Vec<String> {
    let mut reasons = Vec::new();
    if name.is_empty() || name.len() > 255 {
        reasons.push("file name length must be between 1 and 255 bytes".to_string());
    }
    if name.chars().any(|c| c.is_control()) {
        reasons.push("file name must not contain control characters".to_string());
    }
    if name.contains(FORBIDDEN_NAME_CHARS) {
        reasons.push("file name contains a reserved character".to_string());
    }
    let stem = name.split('.').next().unwrap_or(name).to_ascii_uppercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        reasons.push(format!("'{stem}' is a reserved device name"));
    }
    reasons
}

pub fn validate_mime_allowed(declared_mime: &str, allow_list: Option<&[impl AsRef<str>]>) -> Vec<String> {
    match allow_list {
        Some(list) if !list.iter().any(|m| m.as_ref() == declared_mime) => {
            vec![format!("MIME type '{declared_mime}' is not on the allow-list")]
        }
        _ => Vec::new(),
    }
}

pub fn validate_size(declared_mime: &str, byte_size: u64, ceilings: (u64, u64, u64, u64, u64)) -> Vec<String> {
    let category = FileCategory::classify(declared_mime);
    let ceiling = category.size_ceiling(ceilings.0, ceilings.1, ceilings.2, ceilings.3, ceilings.4);
    if byte_size > ceiling {
        vec![format!(
            "file size {byte_size} exceeds the {ceiling}-byte ceiling for category {category:?}"
        )]
    } else {
        Vec::new()
    }
}

/// Declared/detected MIME compatibility, keyed on the top-level media type
/// plus the container-specific aliases the spec calls out explicitly.
fn mime_compatible(declared: &str, detected: &str) -> bool {
    if declared == detected {
        return true;
    }
    matches!(
        (declared, detected),
        ("image/jpg", "image/jpeg")
            | ("image/jpeg", "image/jpg")
            | (
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/zip"
            )
            | (
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "application/zip"
            )
            | (
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                "application/zip"
            )
            | ("application/vnd.ms-excel", "application/msword")
            | ("application/vnd.ms-powerpoint", "application/msword")
            | ("video/quicktime", "video/mp4")
    )
}

/// Sniffs the first bytes of `buf` and checks compatibility with `declared_mime`.
/// Returns the rejection reason, if any.
pub fn validate_content_sniff(declared_mime: &str, buf: &[u8]) -> Option<String> {
    let detected = infer::get(buf)?;
    if mime_compatible(declared_mime, detected.mime_type()) {
        None
    } else {
        Some(format!(
            "declared MIME '{declared_mime}' is incompatible with detected content type '{}'",
            detected.mime_type()
        ))
    }
}

pub struct SizeCeilings {
    pub image: u64,
    pub audio: u64,
    pub document: u64,
    pub video: u64,
    pub other: u64,
}

/// Runs the full layered pass. `buf` is `None` on the chunk-init fast path,
/// where the content sniff is deferred to the assembled bytes.
pub fn validate_upload(
    original_name: &str,
    declared_mime: &str,
    byte_size: u64,
    allow_list: Option<&[std::borrow::Cow<'static, str>]>,
    ceilings: &SizeCeilings,
    buf: Option<&[u8]>,
) -> ValidationResult<()> {
    let mut reasons = validate_filename(original_name);
    reasons.extend(validate_mime_allowed(declared_mime, allow_list));
    reasons.extend(validate_size(
        declared_mime,
        byte_size,
        (
            ceilings.image,
            ceilings.audio,
            ceilings.document,
            ceilings.video,
            ceilings.other,
        ),
    ));
    if let Some(buf) = buf
        && let Some(reason) = validate_content_sniff(declared_mime, buf)
    {
        reasons.push(reason);
    }
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Rejected(reasons))
    }
}

pub const NEEDS_CONVERSION_MIMES: &[&str] = &[
    "video/quicktime",
    "video/x-msvideo",
    "video/x-ms-wmv",
    "video/3gpp",
    "video/3gpp2",
    "video/x-flv",
    "video/x-matroska",
    "video/x-m4v",
];

pub const WEB_COMPATIBLE_VIDEO_MIMES: &[&str] = &["video/mp4", "video/webm", "video/ogg"];

pub fn needs_conversion(mime: &str) -> bool {
    NEEDS_CONVERSION_MIMES.contains(&mime)
}

pub fn is_web_compatible_video(mime: &str) -> bool {
    WEB_COMPATIBLE_VIDEO_MIMES.contains(&mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reserved_device_name() {
        let reasons = validate_filename("CON.txt");
        assert!(reasons.iter().any(|r| r.contains("reserved device name")));
    }

    #[test]
    fn rejects_path_separators() {
        let reasons = validate_filename("a/b.txt");
        assert!(!reasons.is_empty());
    }

    #[test]
    fn jpg_jpeg_alias_is_compatible() {
        assert!(mime_compatible("image/jpg", "image/jpeg"));
    }

    #[test]
    fn cross_media_type_is_incompatible() {
        assert!(!mime_compatible("audio/mpeg", "video/mp4"));
    }

    #[test]
    fn quicktime_declared_over_mp4_container_is_compatible() {
        assert!(mime_compatible("video/quicktime", "video/mp4"));
    }

    #[test]
    fn size_ceiling_is_per_category() {
        let reasons = validate_size("image/png", 26 * 1024 * 1024, (25 * 1024 * 1024, 0, 0, 0, 0));
        assert!(!reasons.is_empty());
    }

    #[test]
    fn png_bytes_declared_as_jpeg_is_incompatible() {
        assert!(!mime_compatible("image/jpeg", "image/png"));
    }

    #[test]
    fn ooxml_docx_over_zip_container_is_compatible() {
        assert!(mime_compatible(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/zip"
        ));
    }

    #[test]
    fn legacy_excel_over_ole_container_is_compatible() {
        assert!(mime_compatible("application/vnd.ms-excel", "application/msword"));
    }
}
