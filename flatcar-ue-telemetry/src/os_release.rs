//! os-release parsing.
//!
//! See `os-release(5)`: `KEY=value` lines, values optionally quoted with
//! single or double quotes, `#` comments and blank lines ignored.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, TelemetryError};

/// Locations searched for os-release, in order.
pub const OS_RELEASE_PATHS: [&str; 2] = ["/etc/os-release", "/usr/lib/os-release"];

/// Operating system identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OsRelease {
    /// `ID`, e.g. `flatcar`
    pub id: String,
    /// `VERSION`, e.g. `3815.2.0`
    pub version: String,
    /// `FLATCAR_BOARD`, e.g. `amd64-usr` (empty on non-Flatcar hosts)
    pub board: String,
}

impl OsRelease {
    /// Build from parsed os-release fields.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        let id = fields.get("ID").cloned().ok_or(TelemetryError::MissingKey("ID"))?;
        let version = fields
            .get("VERSION")
            .or_else(|| fields.get("VERSION_ID"))
            .cloned()
            .unwrap_or_default();
        let board = fields.get("FLATCAR_BOARD").cloned().unwrap_or_default();

        Ok(Self { id, version, board })
    }
}

/// Parse the contents of an os-release file into key/value pairs.
pub fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), unquote(value.trim())))
        .collect()
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return value[1..value.len() - 1].replace("\\\"", "\"");
        }
    }
    value.to_string()
}

/// Read and parse a specific os-release file.
pub fn read_os_release_from<P: AsRef<Path>>(path: P) -> Result<OsRelease> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| TelemetryError::OsReleaseUnavailable(format!("{}: {}", path.display(), e)))?;

    OsRelease::from_fields(&parse_os_release(&content))
}

/// Read the host's os-release from the standard locations.
pub fn read_os_release() -> Result<OsRelease> {
    read_first_os_release(OS_RELEASE_PATHS.iter().map(PathBuf::from))
}

fn read_first_os_release<I>(paths: I) -> Result<OsRelease>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut errors = Vec::new();

    for path in paths {
        if !path.exists() {
            errors.push(format!("{}: not found", path.display()));
            continue;
        }
        return read_os_release_from(&path);
    }

    Err(TelemetryError::OsReleaseUnavailable(errors.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FLATCAR_OS_RELEASE: &str = r#"NAME="Flatcar Container Linux by Kinvolk"
ID=flatcar
ID_LIKE=coreos
VERSION=3815.2.0
VERSION_ID=3815.2.0
BUILD_ID=2024-04-16-1423
# comment line
PRETTY_NAME="Flatcar Container Linux by Kinvolk 3815.2.0 (Oklo)"

FLATCAR_BOARD="amd64-usr"
"#;

    #[test]
    fn test_parse_flatcar_os_release() {
        let fields = parse_os_release(FLATCAR_OS_RELEASE);
        assert_eq!(fields.get("ID").map(String::as_str), Some("flatcar"));
        assert_eq!(
            fields.get("PRETTY_NAME").map(String::as_str),
            Some("Flatcar Container Linux by Kinvolk 3815.2.0 (Oklo)")
        );

        let release = OsRelease::from_fields(&fields).unwrap();
        assert_eq!(release.id, "flatcar");
        assert_eq!(release.version, "3815.2.0");
        assert_eq!(release.board, "amd64-usr");
    }

    #[test]
    fn test_missing_board_and_version() {
        let fields = parse_os_release("ID='debian'\nVERSION_ID=\"12\"\n");
        let release = OsRelease::from_fields(&fields).unwrap();
        assert_eq!(release.id, "debian");
        assert_eq!(release.version, "12");
        assert_eq!(release.board, "");
    }

    #[test]
    fn test_missing_id_is_error() {
        let fields = parse_os_release("VERSION=1\n");
        assert!(matches!(
            OsRelease::from_fields(&fields),
            Err(TelemetryError::MissingKey("ID"))
        ));
    }

    #[test]
    fn test_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FLATCAR_OS_RELEASE.as_bytes()).unwrap();

        let release = read_os_release_from(file.path()).unwrap();
        assert_eq!(release.id, "flatcar");
    }

    #[test]
    fn test_fallback_to_second_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("etc-os-release");
        let present = dir.path().join("usr-lib-os-release");
        std::fs::write(&present, "ID=flatcar\nVERSION=1.2.3\n").unwrap();

        let release = read_first_os_release(vec![missing, present]).unwrap();
        assert_eq!(release.version, "1.2.3");
    }

    #[test]
    fn test_no_os_release_anywhere() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_first_os_release(vec![dir.path().join("nope")]);
        assert!(matches!(result, Err(TelemetryError::OsReleaseUnavailable(_))));
    }
}
