//! Expansion of command-line inputs into individual audio sources
//!
//! - `.m3u` playlists expand to their entries (comments and blank lines
//!   skipped, relative entries resolved against the playlist's directory)
//! - directories expand, when scanning recursively, to every file with a
//!   supported audio extension beneath them, in sorted order

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{SourceError, SourceResult, SUPPORTED_EXTENSIONS};

pub fn is_playlist(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("m3u") || ext.eq_ignore_ascii_case("m3u8"))
        .unwrap_or(false)
}

pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.iter().any(|s| ext.eq_ignore_ascii_case(s)))
        .unwrap_or(false)
}

/// Read the entries of an m3u playlist
pub fn read_playlist(path: &Path) -> SourceResult<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| SourceError::Playlist {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));

    let entries: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            if line.contains("://") || Path::new(line).is_absolute() {
                line.to_string()
            } else {
                base.join(line).display().to_string()
            }
        })
        .collect();

    log::info!("Playlist {:?}: {} entr(y/ies)", path, entries.len());
    Ok(entries)
}

/// Every supported audio file under `dir`, sorted by path
pub fn scan_directory(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported_audio(e.path()))
        .map(|e| e.path().to_owned())
        .collect();
    files.sort();
    log::info!("Scanned {:?}: found {} supported audio file(s)", dir, files.len());
    files
}

/// Expand playlists (and, when `recursive`, directories) into source identifiers
pub fn expand_sources(inputs: &[String], recursive: bool) -> SourceResult<Vec<String>> {
    let mut sources = Vec::new();
    for input in inputs {
        let path = Path::new(input);
        if recursive && path.is_dir() {
            sources.extend(scan_directory(path).iter().map(|p| p.display().to_string()));
        } else if is_playlist(path) {
            sources.extend(read_playlist(path)?);
        } else {
            sources.push(input.clone());
        }
    }
    Ok(sources)
}
