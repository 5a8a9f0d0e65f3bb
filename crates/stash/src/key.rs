//! Storage key sanitization.

use crate::StorageError;

/// Normalize a storage key to a safe relative path.
///
/// Strips any leading `/`, collapses empty segments, and rejects `.`/`..`
/// components so a key can never escape the store root.
pub fn clean_key(key: &str) -> Result<String, StorageError> {
    let trimmed = key.trim_start_matches('/');

    if trimmed.is_empty() {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }

    let mut parts = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" => continue,
            "." | ".." => {
                return Err(StorageError::InvalidKey {
                    key: key.to_string(),
                })
            }
            s if s.contains('\\') => {
                return Err(StorageError::InvalidKey {
                    key: key.to_string(),
                })
            }
            s => parts.push(s),
        }
    }

    if parts.is_empty() {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }

    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_slash() {
        assert_eq!(clean_key("/assets/a.wav").unwrap(), "assets/a.wav");
    }

    #[test]
    fn collapses_empty_segments() {
        assert_eq!(clean_key("assets//2026/a.wav").unwrap(), "assets/2026/a.wav");
    }

    #[test]
    fn rejects_traversal() {
        assert!(clean_key("../etc/passwd").is_err());
        assert!(clean_key("assets/../../etc").is_err());
        assert!(clean_key("assets/./a.wav").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(clean_key("").is_err());
        assert!(clean_key("/").is_err());
        assert!(clean_key("///").is_err());
    }

    #[test]
    fn rejects_backslash_segments() {
        assert!(clean_key("assets\\a.wav").is_err());
    }
}
