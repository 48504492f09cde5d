//! Recording format versions
//!
//! The file-format version decides which calibration path a recording takes.
//! It is resolved once, at load time, into a [`RecordingFormat`] variant.

use crate::error::{MyoError, MyoResult};
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Semantic file-format version `major.minor.patch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileFormatVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl FileFormatVersion {
    /// First Beta 2 (Memsic) version
    pub const BETA2_MIN: FileFormatVersion = FileFormatVersion::new(1, 0, 0);
    /// From this version on the estimated displacement is sign-flipped
    pub const FLIPPED_DISPLACEMENT_MIN: FileFormatVersion = FileFormatVersion::new(1, 1, 0);

    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        FileFormatVersion { major, minor, patch }
    }
}

impl FromStr for FileFormatVersion {
    type Err = MyoError;

    fn from_str(s: &str) -> MyoResult<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(MyoError::FormatError {
                reason: format!("file format version '{}' is not major.minor.patch", s),
            });
        }
        let parse = |part: &str| {
            part.parse::<u16>().map_err(|_| MyoError::FormatError {
                reason: format!("file format version '{}' has a non-numeric component", s),
            })
        };
        Ok(FileFormatVersion::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

impl fmt::Display for FileFormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Calibration path of a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingFormat {
    /// GMR sensors, filter-based calibration
    Beta1 { version: FileFormatVersion },
    /// Memsic magnetometers, magnet position estimation
    Beta2 { version: FileFormatVersion },
    /// Optical recordings, already in displacement/force units
    Optical,
}

impl RecordingFormat {
    /// Resolve the calibration path; `None` means an optical recording
    pub fn from_version(version: Option<FileFormatVersion>) -> Self {
        match version {
            None => RecordingFormat::Optical,
            Some(v) if v < FileFormatVersion::BETA2_MIN => RecordingFormat::Beta1 { version: v },
            Some(v) => RecordingFormat::Beta2 { version: v },
        }
    }

    pub fn version(&self) -> Option<FileFormatVersion> {
        match self {
            RecordingFormat::Beta1 { version } | RecordingFormat::Beta2 { version } => Some(*version),
            RecordingFormat::Optical => None,
        }
    }

    pub fn is_magnetic(&self) -> bool {
        !matches!(self, RecordingFormat::Optical)
    }

    /// Whether the estimated displacement must be negated
    pub fn flips_displacement(&self) -> bool {
        match self {
            RecordingFormat::Beta2 { version } => *version >= FileFormatVersion::FLIPPED_DISPLACEMENT_MIN,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        let v: FileFormatVersion = "0.4.2".parse().unwrap();
        assert_eq!(v, FileFormatVersion::new(0, 4, 2));
        assert_eq!(v.to_string(), "0.4.2");
        assert!("1.0".parse::<FileFormatVersion>().is_err());
        assert!("1.x.0".parse::<FileFormatVersion>().is_err());
    }

    #[test]
    fn test_version_ordering() {
        let a: FileFormatVersion = "0.10.0".parse().unwrap();
        let b: FileFormatVersion = "1.0.0".parse().unwrap();
        assert!(a < b);
        assert!(FileFormatVersion::new(1, 0, 9) < FileFormatVersion::FLIPPED_DISPLACEMENT_MIN);
    }

    #[test]
    fn test_format_resolution() {
        let beta1 = RecordingFormat::from_version(Some(FileFormatVersion::new(0, 3, 1)));
        assert!(matches!(beta1, RecordingFormat::Beta1 { .. }));
        assert!(!beta1.flips_displacement());

        let beta2 = RecordingFormat::from_version(Some(FileFormatVersion::new(1, 0, 0)));
        assert!(matches!(beta2, RecordingFormat::Beta2 { .. }));
        assert!(!beta2.flips_displacement());

        let flipped = RecordingFormat::from_version(Some(FileFormatVersion::new(1, 1, 0)));
        assert!(flipped.flips_displacement());

        let optical = RecordingFormat::from_version(None);
        assert!(!optical.is_magnetic());
        assert_eq!(optical.version(), None);
    }
}
