use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::IoError;

/// A video referenced by a file list.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoEntry {
    /// Directory holding the frames of the video as png files.
    pub frames_dir: PathBuf,
    /// Class label of the video.
    pub label: i64,
}

/// Read a file list describing a video dataset.
///
/// Each non empty line holds a frames directory optionally followed by an integer
/// label, which defaults to 0. Lines starting with `#` are skipped. Relative
/// directories are resolved against the directory of the file list.
///
/// # Arguments
///
/// * `file_path` - The path to the file list.
///
/// # Errors
///
/// Fails when the file cannot be read or holds no entry.
pub fn read_file_list(file_path: impl AsRef<Path>) -> Result<Vec<VideoEntry>, IoError> {
    let file_path = file_path.as_ref();
    if !file_path.exists() {
        return Err(IoError::FileDoesNotExist(file_path.to_path_buf()));
    }

    let contents = std::fs::read_to_string(file_path)?;
    let base_dir = file_path.parent().unwrap_or_else(|| Path::new(""));

    let entries = parse_file_list(&contents, base_dir);
    if entries.is_empty() {
        return Err(IoError::EmptyFileList(file_path.to_path_buf()));
    }
    Ok(entries)
}

/// Parse the contents of a file list, resolving relative paths against `base_dir`.
pub fn parse_file_list(contents: &str, base_dir: &Path) -> Vec<VideoEntry> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let (dir, label) = split_label(line);
            VideoEntry {
                frames_dir: base_dir.join(dir),
                label,
            }
        })
        .collect()
}

// a trailing token that is not an integer belongs to the path
fn split_label(line: &str) -> (&str, i64) {
    match line.rsplit_once(char::is_whitespace) {
        Some((dir, label)) => match label.parse::<i64>() {
            Ok(label) => (dir.trim_end(), label),
            Err(_) => (line, 0),
        },
        None => (line, 0),
    }
}

/// List the png frames of a video directory in lexicographic order.
///
/// Only the direct children of `frames_dir` are considered.
///
/// # Errors
///
/// Fails when the directory does not exist or holds no png file.
pub fn list_frames(frames_dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, IoError> {
    let frames_dir = frames_dir.as_ref();
    if !frames_dir.is_dir() {
        return Err(IoError::FileDoesNotExist(frames_dir.to_path_buf()));
    }

    let mut frames = Vec::new();
    for entry in WalkDir::new(frames_dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "png") {
            frames.push(path.to_path_buf());
        }
    }

    if frames.is_empty() {
        return Err(IoError::NoFrames(frames_dir.to_path_buf()));
    }

    frames.sort();
    Ok(frames)
}
