//! Upload request validation.
//!
//! Title, description, tag, and file-type rules sit behind a trait so the
//! handler depends on the contract rather than the rule set.

use reel_core::{error::codes, AppError};
use std::path::Path;

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 2000;
pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_LEN: usize = 50;

const ALLOWED_EXTENSIONS: [&str; 5] = ["mp4", "mov", "avi", "mkv", "webm"];
const ALLOWED_CONTENT_TYPES: [&str; 6] = [
    "video/mp4",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
    "video/webm",
    "application/octet-stream",
];

/// A validated upload, with normalized fields.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    /// Trimmed title.
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub original_filename: String,
    /// Lowercased extension with leading dot.
    pub file_extension: String,
    pub content_type: String,
}

/// Raw upload fields as decoded from the multipart body.
#[derive(Debug, Clone, Default)]
pub struct UploadFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub file_size: usize,
    pub has_file: bool,
}

pub trait UploadValidator: Send + Sync {
    fn validate(&self, fields: &UploadFields) -> Result<ValidatedUpload, AppError>;
}

pub struct DefaultUploadValidator {
    max_file_size: usize,
}

impl DefaultUploadValidator {
    pub fn new(max_file_size: usize) -> Self {
        Self { max_file_size }
    }
}

impl UploadValidator for DefaultUploadValidator {
    fn validate(&self, fields: &UploadFields) -> Result<ValidatedUpload, AppError> {
        if !fields.has_file || fields.file_size == 0 {
            return Err(AppError::file_required());
        }

        if fields.file_size > self.max_file_size {
            return Err(AppError::PayloadTooLarge(format!(
                "{} bytes (max {})",
                fields.file_size, self.max_file_size
            )));
        }

        let title = fields
            .title
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if title.is_empty() {
            return Err(AppError::title_required());
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(AppError::title_too_long(MAX_TITLE_LEN));
        }

        let description = fields
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from);
        if let Some(d) = &description {
            if d.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(AppError::Validation {
                    code: "DESCRIPTION_TOO_LONG",
                    message: format!(
                        "Description must be at most {} characters",
                        MAX_DESCRIPTION_LEN
                    ),
                });
            }
        }

        let tags = parse_tags(fields.tags.as_deref())?;

        let filename = fields
            .filename
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or_else(AppError::file_required)?;

        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or_else(|| {
                AppError::UnsupportedFormat(format!("File has no extension: {}", filename))
            })?;

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(AppError::UnsupportedFormat(format!(
                ".{} (allowed: {:?})",
                extension, ALLOWED_EXTENSIONS
            )));
        }

        let content_type = fields
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream")
            .to_string();
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(AppError::UnsupportedFormat(format!(
                "{} (allowed: {:?})",
                content_type, ALLOWED_CONTENT_TYPES
            )));
        }

        Ok(ValidatedUpload {
            title,
            description,
            tags,
            original_filename: filename.to_string(),
            file_extension: format!(".{}", extension),
            content_type,
        })
    }
}

/// Tags arrive either as a JSON array string or comma-separated.
fn parse_tags(raw: Option<&str>) -> Result<Vec<String>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(Vec::new());
    };

    let tags: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str::<Vec<String>>(raw).map_err(|_| AppError::Validation {
            code: codes::INVALID_TAGS_FORMAT,
            message: "Tags must be a JSON array of strings or comma-separated".to_string(),
        })?
    } else {
        raw.split(',').map(str::to_string).collect()
    };

    let tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if tags.len() > MAX_TAGS {
        return Err(AppError::too_many_tags(MAX_TAGS));
    }

    for tag in &tags {
        if tag.chars().count() > MAX_TAG_LEN {
            return Err(AppError::invalid_tag(tag));
        }
    }

    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_fields() -> UploadFields {
        UploadFields {
            title: Some("My Video".to_string()),
            description: Some("A description".to_string()),
            tags: Some("rust,video".to_string()),
            filename: Some("clip.MP4".to_string()),
            content_type: Some("video/mp4".to_string()),
            file_size: 1024,
            has_file: true,
        }
    }

    fn validator() -> DefaultUploadValidator {
        DefaultUploadValidator::new(10 * 1024 * 1024)
    }

    #[test]
    fn accepts_valid_upload_and_normalizes() {
        let validated = validator().validate(&valid_fields()).unwrap();
        assert_eq!(validated.title, "My Video");
        assert_eq!(validated.file_extension, ".mp4");
        assert_eq!(validated.tags, vec!["rust", "video"]);
    }

    #[test]
    fn rejects_missing_file() {
        let mut fields = valid_fields();
        fields.has_file = false;
        let err = validator().validate(&fields).unwrap_err();
        assert_eq!(err.code(), codes::FILE_REQUIRED);
    }

    #[test]
    fn rejects_oversized_file() {
        let mut fields = valid_fields();
        fields.file_size = 11 * 1024 * 1024;
        let err = validator().validate(&fields).unwrap_err();
        assert_eq!(err.code(), codes::FILE_TOO_LARGE);
        assert_eq!(err.http_status(), 413);
    }

    #[test]
    fn rejects_blank_and_oversized_titles() {
        let mut fields = valid_fields();
        fields.title = Some("   ".to_string());
        assert_eq!(
            validator().validate(&fields).unwrap_err().code(),
            codes::TITLE_REQUIRED
        );

        fields.title = Some("x".repeat(256));
        assert_eq!(
            validator().validate(&fields).unwrap_err().code(),
            codes::TITLE_TOO_LONG
        );
    }

    #[test]
    fn rejects_unknown_extension_and_mime() {
        let mut fields = valid_fields();
        fields.filename = Some("notes.txt".to_string());
        let err = validator().validate(&fields).unwrap_err();
        assert_eq!(err.code(), codes::INVALID_FILE_FORMAT);
        assert_eq!(err.http_status(), 415);

        let mut fields = valid_fields();
        fields.content_type = Some("text/plain".to_string());
        assert_eq!(
            validator().validate(&fields).unwrap_err().code(),
            codes::INVALID_FILE_FORMAT
        );
    }

    #[test]
    fn tags_json_and_csv_forms() {
        assert_eq!(
            parse_tags(Some(r#"["a","b"]"#)).unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(parse_tags(Some("a, b ,")).unwrap(), vec!["a", "b"]);
        assert!(parse_tags(None).unwrap().is_empty());
        assert!(parse_tags(Some(r#"[1,2]"#)).is_err());
    }

    #[test]
    fn tag_count_and_length_limits() {
        let many = (0..11).map(|i| i.to_string()).collect::<Vec<_>>().join(",");
        assert_eq!(
            parse_tags(Some(&many)).unwrap_err().code(),
            codes::TOO_MANY_TAGS
        );

        let long = "x".repeat(51);
        assert_eq!(
            parse_tags(Some(&long)).unwrap_err().code(),
            codes::INVALID_TAG
        );
    }
}
