use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::IoError;

/// How a compiled workbook is written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveFormat {
    /// Sorted cell map as YAML.
    Yaml,
    /// Sorted cell map as JSON.
    Json,
    /// CBOR snapshot of the whole compiled workbook.
    Binary,
}

/// Extensions tried, in order, when loading from a bare stem.
const PROBE_ORDER: [(&str, SaveFormat); 5] = [
    ("yml", SaveFormat::Yaml),
    ("yaml", SaveFormat::Yaml),
    ("json", SaveFormat::Json),
    ("cbor", SaveFormat::Binary),
    ("bin", SaveFormat::Binary),
];

impl SaveFormat {
    /// Extension used when writing next to a stem.
    pub fn extension(self) -> &'static str {
        match self {
            SaveFormat::Yaml => "yml",
            SaveFormat::Json => "json",
            SaveFormat::Binary => "cbor",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        PROBE_ORDER
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|&(_, format)| format)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn is_text(self) -> bool {
        !matches!(self, SaveFormat::Binary)
    }
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SaveFormat::Yaml => "yaml",
            SaveFormat::Json => "json",
            SaveFormat::Binary => "binary",
        })
    }
}

impl FromStr for SaveFormat {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(SaveFormat::Binary),
            other => {
                SaveFormat::from_extension(other).ok_or_else(|| IoError::UnknownFormat(s.into()))
            }
        }
    }
}

/// `stem` + `.` + the format's extension, keeping any dots already in the
/// stem.
pub(crate) fn path_for(stem: &Path, format: SaveFormat) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(".");
    name.push(format.extension());
    PathBuf::from(name)
}

/// First existing `stem.<ext>` in probe order.
pub(crate) fn probe(stem: &Path) -> Option<(PathBuf, SaveFormat)> {
    PROBE_ORDER.iter().find_map(|&(ext, format)| {
        let mut name = stem.as_os_str().to_owned();
        name.push(".");
        name.push(ext);
        let path = PathBuf::from(name);
        path.is_file().then_some((path, format))
    })
}

/// Where each requested format goes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SavePlan {
    pub(crate) stem: PathBuf,
    pub(crate) text: Option<(SaveFormat, PathBuf)>,
    pub(crate) binary: Option<PathBuf>,
}

impl SavePlan {
    /// A known extension on `path` selects that format for `path` itself;
    /// `formats` add files next to the stem. At most one text and one binary
    /// format may be requested.
    pub(crate) fn new(path: &Path, formats: &[SaveFormat]) -> Result<Self, IoError> {
        let mut targets: Vec<(SaveFormat, PathBuf)> = Vec::new();
        let stem = match SaveFormat::from_path(path) {
            Some(format) => {
                targets.push((format, path.to_path_buf()));
                path.with_extension("")
            }
            None => path.to_path_buf(),
        };
        for &format in formats {
            if !targets.iter().any(|(f, _)| *f == format) {
                targets.push((format, path_for(&stem, format)));
            }
        }
        if targets.is_empty() {
            return Err(IoError::UnknownFormat(path.display().to_string()));
        }

        let (texts, binaries): (Vec<_>, Vec<_>) = targets.into_iter().partition(|(f, _)| f.is_text());
        if texts.len() > 1 || binaries.len() > 1 {
            return Err(IoError::UnknownFormat(
                "at most one text and one binary format per save".into(),
            ));
        }
        Ok(SavePlan {
            stem,
            text: texts.into_iter().next(),
            binary: binaries.into_iter().next().map(|(_, p)| p),
        })
    }
}
