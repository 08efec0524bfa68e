//! Local input files: address-range lists and path helpers.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Errors raised while reading local inputs.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InputError {
    /// Raised when a local file cannot be opened or read.
    #[error("failed to read {path}: {message}")]
    FileRead {
        /// Path as given by the operator.
        path: String,
        /// Underlying I/O error.
        message: String,
    },
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// The input is returned unchanged when `HOME` is unset.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Extracts address ranges from file contents.
///
/// Each non-blank line contributes its first whitespace-separated token;
/// anything after it (comments, labels) is ignored.
#[must_use]
pub fn parse_address_ranges(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_owned)
        .collect()
}

/// Reads and parses an address-range file.
///
/// # Errors
///
/// Returns [`InputError::FileRead`] when the file cannot be read.
pub fn read_address_ranges(path: &str) -> Result<Vec<String>, InputError> {
    let expanded = expand_tilde(path);
    let contents = read_to_string_ambient(&expanded).map_err(|message| InputError::FileRead {
        path: path.to_owned(),
        message,
    })?;
    Ok(parse_address_ranges(&contents))
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);
    let file_name = path_buf
        .file_name()
        .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
    let dir_path = match path_buf.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_name).map_err(|err| err.to_string())
}
