//! Object key generation and validation

use chrono::{DateTime, Utc};

use crate::{Result, StorageError};

/// S3 key length limit in bytes
const MAX_KEY_BYTES: usize = 1024;
const MAX_FILENAME_CHARS: usize = 128;
const FALLBACK_FILENAME: &str = "file";

/// Build `{prefix}{YYYY}/{MM}/{DD}/{uuid}-{name}` for an upload.
pub fn generate_object_key(prefix: &str, original_filename: Option<&str>, now: DateTime<Utc>) -> String {
    let name = sanitize_filename(original_filename.unwrap_or_default());
    format!(
        "{}{}/{}-{}",
        prefix,
        now.format("%Y/%m/%d"),
        uuid::Uuid::new_v4(),
        name
    )
}

/// Keep ASCII alphanumerics, `.`, `-` and `_`; collapse anything else into `-`.
pub fn sanitize_filename(name: &str) -> String {
    // Browsers on Windows may send the full client path
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();

    let mut out = String::with_capacity(base.len());
    let mut last_dash = false;
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            last_dash = c == '-';
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }

    let trimmed: String = out
        .trim_matches(|c: char| c == '-' || c == '.')
        .chars()
        .take(MAX_FILENAME_CHARS)
        .collect();

    if trimmed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed
    }
}

/// Reject keys that are empty, too long, absolute, or have a `..` segment.
pub fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(StorageError::InvalidKey("key is required".to_string()));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(StorageError::InvalidKey(format!(
            "key exceeds {} bytes",
            MAX_KEY_BYTES
        )));
    }
    if key.split('/').any(|segment| segment == "..") || key.starts_with('/') {
        return Err(StorageError::InvalidKey(format!("key '{}' is not allowed", key)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("my holiday photo (1).jpg"), "my-holiday-photo-1-.jpg");
        assert_eq!(sanitize_filename("C:\\Users\\me\\notes.txt"), "notes.txt");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("日本語"), "file");
        assert_eq!(sanitize_filename(""), "file");
        assert_eq!(sanitize_filename("..."), "file");
    }

    #[test]
    fn test_sanitize_truncates_long_names() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_filename(&long).len(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn test_generate_object_key_layout() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 9, 0, 0).unwrap();
        let key = generate_object_key("uploads/", Some("cat picture.png"), now);

        assert!(key.starts_with("uploads/2024/03/07/"));
        assert!(key.ends_with("-cat-picture.png"));
        assert!(validate_key(&key).is_ok());
    }

    #[test]
    fn test_generated_keys_are_unique() {
        let now = Utc::now();
        let a = generate_object_key("", Some("same.txt"), now);
        let b = generate_object_key("", Some("same.txt"), now);
        assert_ne!(a, b);
        assert!(a.ends_with("-same.txt"));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("uploads/2024/01/01/x.txt").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("   ").is_err());
        assert!(validate_key("uploads/../secrets").is_err());
        assert!(validate_key("..").is_err());
        assert!(validate_key("uploads/..").is_err());
        assert!(validate_key("uploads/2024/01/01/notes..v2.txt").is_ok());
        assert!(validate_key("/absolute").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_BYTES + 1)).is_err());
    }
}
