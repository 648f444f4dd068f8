pub mod audio;
pub mod check;
pub mod encode;

use std::path::{Path, PathBuf};

use clipforge_common::error::ClipforgeError;

fn ensure_exists(path: &Path) -> Result<(), ClipforgeError> {
    if !path.exists() {
        return Err(ClipforgeError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<String, ClipforgeError> {
    ensure_exists(path)?;
    Ok(std::fs::read_to_string(path)?)
}

/// `<dir>/<stem>-<suffix>.<ext>` next to the input.
fn default_output(input: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}-{suffix}.{ext}"))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), ClipforgeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_sits_next_to_input() {
        let out = default_output(Path::new("/videos/talk.mov"), "trimmed", "mp4");
        assert_eq!(out, PathBuf::from("/videos/talk-trimmed.mp4"));
    }

    #[test]
    fn test_missing_input_is_file_not_found() {
        let err = read_text(Path::new("/nonexistent/cues.json")).unwrap_err();
        assert!(matches!(err, ClipforgeError::FileNotFound { .. }));
    }
}
