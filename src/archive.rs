//! C3: the AR archive reader (spec §4.3), built on `object`'s archive
//! parser, which already implements the `!<arch>\n` magic, the 60-byte
//! file-header chain, even-byte payload padding, and the GNU long-name
//! extension (`//` long-name table and `#1/N` inline names) spec §4.3/§6
//! call for.

use crate::error::{Error, Result};

/// One member's directory entry (spec §3 "Archive" -> "member directory"):
/// `(name, offset, size)` of the payload within the archive file.
#[derive(Debug, Clone)]
pub struct MemberEntry {
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

/// An opened archive: its raw bytes plus the member directory walked from
/// the magic-signature offset.
pub struct Archive {
    pub path: String,
    data: Vec<u8>,
    members: Vec<MemberEntry>,
}

impl Archive {
    pub fn looks_like_archive(data: &[u8]) -> bool {
        data.starts_with(b"!<arch>\n")
    }

    /// Parses the member directory (spec §4.3 "load_objects"). Members
    /// named `/` or `//` (the symbol index and long-name tables) are
    /// skipped for payload purposes, matching spec §4.3.
    pub fn parse(path: impl Into<String>, data: Vec<u8>) -> Result<Archive> {
        let path = path.into();
        if !Archive::looks_like_archive(&data) {
            return Err(Error::NotArchive {
                what: path.clone(),
                location: "archive",
            });
        }

        let ar = object::read::archive::ArchiveFile::parse(data.as_slice()).map_err(|e| {
            Error::MalformedArchive {
                what: format!("{path}: {e}"),
                location: "archive",
            }
        })?;

        let base = data.as_ptr() as usize;
        let mut members = Vec::new();
        for member in ar.members() {
            let member = member.map_err(|e| Error::MalformedArchive {
                what: format!("{path}: {e}"),
                location: "archive",
            })?;
            let name = String::from_utf8_lossy(member.name()).into_owned();
            let payload = member.data(data.as_slice()).map_err(|e| Error::MalformedArchive {
                what: format!("{path}: {e}"),
                location: "archive",
            })?;
            // `data()` borrows out of our own buffer, so its address minus
            // the buffer's base address recovers the byte offset (spec §3
            // "Archive" member directory: `(name, offset, size)`).
            let offset = (payload.as_ptr() as usize) - base;
            members.push(MemberEntry {
                name,
                offset: offset as u64,
                size: payload.len() as u64,
            });
        }

        Ok(Archive {
            path,
            data,
            members,
        })
    }

    pub fn members(&self) -> &[MemberEntry] {
        &self.members
    }

    /// Returns the raw bytes of a member's payload at `(offset, size)`,
    /// resolved through the image's own descriptor the way spec §3
    /// describes (seek/read is position-based, never archive-relative
    /// except as the caller's own base offset).
    pub fn member_data(&self, offset: u64, size: u64) -> Result<&[u8]> {
        let start = offset as usize;
        let end = start
            .checked_add(size as usize)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| Error::MalformedArchive {
                what: format!("{}: member range out of bounds", self.path),
                location: "archive",
            })?;
        Ok(&self.data[start..end])
    }
}

/// Builds an archive from a list of `(name, bytes)` pairs: AR magic, then
/// for each member a file-header followed by the payload, padded to even
/// alignment (spec §4.3 "Creating an archive").
pub fn write_archive(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"!<arch>\n");
    for (name, data) in members {
        let mut header = [b' '; 60];
        let name_field = format!("{}/", name);
        let name_bytes = name_field.as_bytes();
        let n = name_bytes.len().min(16);
        header[0..n].copy_from_slice(&name_bytes[..n]);
        // mtime, uid, gid, mode left as zero/defaults (ASCII '0'), sized fields below
        write_ascii_field(&mut header, 16, 12, "0");
        write_ascii_field(&mut header, 28, 6, "0");
        write_ascii_field(&mut header, 34, 6, "0");
        write_ascii_field(&mut header, 40, 8, "100644");
        write_ascii_field(&mut header, 48, 10, &data.len().to_string());
        header[58] = b'`';
        header[59] = b'\n';
        out.extend_from_slice(&header);
        out.extend_from_slice(data);
        if data.len() % 2 != 0 {
            out.push(b'\n');
        }
    }
    out
}

fn write_ascii_field(header: &mut [u8; 60], offset: usize, width: usize, value: &str) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(width);
    header[offset..offset + n].copy_from_slice(&bytes[..n]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_recovers_member_bytes() {
        let a = b"aaaa";
        let b = b"bbbbb";
        let archive_bytes = write_archive(&[("foo.o", a), ("bar.o", b)]);
        let archive = Archive::parse("libx.a", archive_bytes).unwrap();
        assert_eq!(archive.members().len(), 2);
        assert_eq!(archive.members()[0].name, "foo.o");
        let data0 = archive
            .member_data(archive.members()[0].offset, archive.members()[0].size)
            .unwrap();
        assert_eq!(data0, a);
        let data1 = archive
            .member_data(archive.members()[1].offset, archive.members()[1].size)
            .unwrap();
        assert_eq!(data1, b);
    }

    #[test]
    fn rejects_non_archive_bytes() {
        let err = Archive::parse("not-an-archive", b"hello world".to_vec()).unwrap_err();
        assert!(matches!(err, Error::NotArchive { .. }));
    }

    #[test]
    fn gnu_long_name_member_parses_true_name() {
        // Build an archive by hand with a `#1/N` long-name member so the
        // GNU extension path in `object`'s parser is exercised (spec §4.3 /
        // testable property 4).
        let long_name = "a_very_long_member_name_that_exceeds_sixteen_bytes.o";
        let payload = b"payload!";
        let mut out = Vec::new();
        out.extend_from_slice(b"!<arch>\n");
        let mut header = [b' '; 60];
        let tag = format!("#1/{}", long_name.len());
        header[0..tag.len()].copy_from_slice(tag.as_bytes());
        write_ascii_field(&mut header, 16, 12, "0");
        write_ascii_field(&mut header, 28, 6, "0");
        write_ascii_field(&mut header, 34, 6, "0");
        write_ascii_field(&mut header, 40, 8, "100644");
        let total_size = long_name.len() + payload.len();
        write_ascii_field(&mut header, 48, 10, &total_size.to_string());
        header[58] = b'`';
        header[59] = b'\n';
        out.extend_from_slice(&header);
        out.extend_from_slice(long_name.as_bytes());
        out.extend_from_slice(payload);

        let archive = Archive::parse("libx.a", out).unwrap();
        assert_eq!(archive.members().len(), 1);
        assert_eq!(archive.members()[0].name, long_name);
        let data = archive
            .member_data(archive.members()[0].offset, archive.members()[0].size)
            .unwrap();
        assert_eq!(data, payload);
    }
}
