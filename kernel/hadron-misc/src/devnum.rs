//! Device numbers and minor requests.

use core::fmt;

use crate::config::MISC_DYNAMIC_MINOR;

/// A `(major, minor)` character device number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DevNum {
    major: u32,
    minor: u32,
}

impl DevNum {
    /// Creates a new `DevNum`.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Returns the major number.
    pub const fn major(self) -> u32 {
        self.major
    }

    /// Returns the minor number.
    pub const fn minor(self) -> u32 {
        self.minor
    }
}

impl fmt::Display for DevNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// The minor a driver asks for when it registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MinorRequest {
    /// A statically chosen minor.
    Fixed(u32),
    /// Any free minor from the dynamic pool (highest first).
    Dynamic,
}

impl MinorRequest {
    /// Translates a raw minor, mapping [`MISC_DYNAMIC_MINOR`] to
    /// [`MinorRequest::Dynamic`].
    pub const fn from_raw(raw: u32) -> Self {
        if raw == MISC_DYNAMIC_MINOR {
            Self::Dynamic
        } else {
            Self::Fixed(raw)
        }
    }

    /// Returns the fixed minor, if any.
    pub const fn fixed(self) -> Option<u32> {
        match self {
            Self::Fixed(minor) => Some(minor),
            Self::Dynamic => None,
        }
    }
}

impl fmt::Display for MinorRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(minor) => write!(f, "{minor}"),
            Self::Dynamic => f.write_str("dynamic"),
        }
    }
}

#[cfg(all(test, not(loom), not(shuttle)))]
mod tests {
    use super::*;

    #[test]
    fn devnum_display() {
        assert_eq!(format!("{}", DevNum::new(10, 130)), "10:130");
    }

    #[test]
    fn raw_sentinel_maps_to_dynamic() {
        assert_eq!(MinorRequest::from_raw(255), MinorRequest::Dynamic);
        assert_eq!(MinorRequest::from_raw(130), MinorRequest::Fixed(130));
        assert_eq!(MinorRequest::from_raw(0).fixed(), Some(0));
        assert_eq!(MinorRequest::Dynamic.fixed(), None);
    }
}
