//! Input rules shared by the server and the API client.
//!
//! The client runs the same checks before sending a request so the user
//! gets the error without a round trip.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::constants::limits;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required fields")]
    MissingFields,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Name must be between 1 and {max} characters")]
    InvalidName { max: usize },

    #[error("No selected file")]
    EmptyFilename,

    #[error("File is empty")]
    EmptyFile,

    #[error("Only image files are allowed")]
    NotAnImage,

    #[error("File exceeds the {max_bytes} byte limit")]
    FileTooLarge { max_bytes: usize },

    #[error("Invalid limit: {value}. Limit must be between 1 and {max}")]
    InvalidLimit { value: u64, max: u64 },
}

#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::MissingFields);
    }
    if !is_valid_email(email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(email.to_lowercase())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < limits::MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: limits::MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > limits::MAX_NAME_LEN {
        return Err(ValidationError::InvalidName {
            max: limits::MAX_NAME_LEN,
        });
    }
    Ok(trimmed.to_string())
}

pub fn validate_history_limit(limit: Option<u64>) -> Result<u64, ValidationError> {
    let value = limit.unwrap_or(limits::DEFAULT_HISTORY_LIMIT);
    if !(1..=limits::MAX_HISTORY_LIMIT).contains(&value) {
        return Err(ValidationError::InvalidLimit {
            value,
            max: limits::MAX_HISTORY_LIMIT,
        });
    }
    Ok(value)
}

/// Image formats accepted for upload, detected from the leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Webp,
    Tiff,
}

impl ImageFormat {
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(Self::Png),
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [b'G', b'I', b'F', b'8', ..] => Some(Self::Gif),
            [b'B', b'M', ..] => Some(Self::Bmp),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => Some(Self::Tiff),
            _ => None,
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Webp => "webp",
            Self::Tiff => "tiff",
        }
    }
}

/// Checks an upload the way the upload form does: a filename, an image MIME
/// type (declared or guessed from the extension), a known image signature
/// and the size cap.
pub fn validate_image_upload(
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
    max_bytes: usize,
) -> Result<ImageFormat, ValidationError> {
    if filename.trim().is_empty() {
        return Err(ValidationError::EmptyFilename);
    }

    if bytes.is_empty() {
        return Err(ValidationError::EmptyFile);
    }

    if bytes.len() > max_bytes {
        return Err(ValidationError::FileTooLarge { max_bytes });
    }

    let is_image_mime = match content_type.filter(|ct| *ct != "application/octet-stream") {
        Some(ct) => ct.starts_with("image/"),
        None => mime_guess::from_path(filename)
            .first()
            .is_some_and(|m| m.type_() == mime_guess::mime::IMAGE),
    };

    if !is_image_mime {
        return Err(ValidationError::NotAnImage);
    }

    ImageFormat::sniff(bytes).ok_or(ValidationError::NotAnImage)
}
