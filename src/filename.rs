//! The file-name tuple from spec §3 / §6: `(archive_name, object_name,
//! offset, size)`, with the `"libfoo.a:bar.o@12345"` string grammar.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName {
    pub archive_name: String,
    pub object_name: String,
    pub offset: u64,
    pub size: u64,
}

impl FileName {
    /// A standalone object: `offset == 0`, `size` is the file length.
    pub fn standalone(path: impl Into<String>, size: u64) -> FileName {
        FileName {
            archive_name: String::new(),
            object_name: path.into(),
            offset: 0,
            size,
        }
    }

    pub fn archive_member(
        archive_name: impl Into<String>,
        object_name: impl Into<String>,
        offset: u64,
        size: u64,
    ) -> FileName {
        FileName {
            archive_name: archive_name.into(),
            object_name: object_name.into(),
            offset,
            size,
        }
    }

    pub fn is_standalone(&self) -> bool {
        self.archive_name.is_empty()
    }

    /// The full key used by the cache to identify this file uniquely.
    pub fn full_path(&self) -> String {
        if self.is_standalone() {
            self.object_name.clone()
        } else {
            format!("{}:{}@{}", self.archive_name, self.object_name, self.offset)
        }
    }

    pub fn basename(&self) -> &str {
        self.object_name
            .rsplit('/')
            .next()
            .unwrap_or(&self.object_name)
    }

    /// Parses `"libfoo.a:bar.o@12345"`. A bare `"bar.o"` parses as a
    /// standalone name with `offset = 0, size = 0` (the caller fills size
    /// in once the file is stat'd).
    pub fn parse(s: &str) -> Result<FileName> {
        if s.is_empty() {
            return Err(Error::InvalidFileName {
                what: "empty file name".into(),
                location: "filename",
            });
        }

        match s.split_once(':') {
            None => Ok(FileName::standalone(s, 0)),
            Some((archive, rest)) => {
                if archive.is_empty() || rest.is_empty() {
                    return Err(Error::InvalidFileName {
                        what: format!("malformed archive member name: {s}"),
                        location: "filename",
                    });
                }
                match rest.split_once('@') {
                    None => Ok(FileName::archive_member(archive, rest, 0, 0)),
                    Some((member, offset_str)) => {
                        let offset: u64 = offset_str.parse().map_err(|_| Error::InvalidFileName {
                            what: format!("non-decimal offset in: {s}"),
                            location: "filename",
                        })?;
                        Ok(FileName::archive_member(archive, member, offset, 0))
                    }
                }
            }
        }
    }
}

impl std::fmt::Display for FileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_standalone() {
            write!(f, "{}", self.object_name)
        } else {
            write!(f, "{}:{}@{}", self.archive_name, self.object_name, self.offset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_archive_member_with_offset() {
        let fname = FileName::parse("libfoo.a:bar.o@12345").unwrap();
        assert_eq!(fname.archive_name, "libfoo.a");
        assert_eq!(fname.object_name, "bar.o");
        assert_eq!(fname.offset, 12345);
    }

    #[test]
    fn parses_standalone_name() {
        let fname = FileName::parse("a.o").unwrap();
        assert!(fname.is_standalone());
        assert_eq!(fname.object_name, "a.o");
        assert_eq!(fname.offset, 0);
    }

    #[test]
    fn rejects_empty_name() {
        assert!(FileName::parse("").is_err());
    }

    #[test]
    fn standalone_invariant_offset_zero() {
        let fname = FileName::standalone("a.o", 42);
        assert_eq!(fname.offset, 0);
        assert_eq!(fname.size, 42);
    }
}
