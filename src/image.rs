//! The `image` handle from spec §3: a reference-counted, position-based
//! view over a file descriptor.
//!
//! `open`/`close` are modeled by `Clone`/`Drop` on the `Rc` -- the last
//! clone to drop closes the underlying descriptor. Seeks/reads/writes are
//! always against the *file's* position, not any archive-relative offset;
//! callers (the archive reader, the ELF reader on an archive member) are
//! responsible for seeking to their own base offset first.

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::rc::Rc;

struct Inner {
    file: RefCell<File>,
    name: String,
    writable: bool,
}

/// A reference-counted handle to an open file (spec §3 "Image").
#[derive(Clone)]
pub struct Image(Rc<Inner>);

impl Image {
    pub fn open_read(path: &str) -> Result<Image> {
        let file = File::open(path).map_err(|e| Error::io("image", path.to_string(), e))?;
        Ok(Image(Rc::new(Inner {
            file: RefCell::new(file),
            name: path.to_string(),
            writable: false,
        })))
    }

    pub fn create_write(path: &str) -> Result<Image> {
        let file = File::create(path).map_err(|e| Error::io("image", path.to_string(), e))?;
        Ok(Image(Rc::new(Inner {
            file: RefCell::new(file),
            name: path.to_string(),
            writable: true,
        })))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn writable(&self) -> bool {
        self.0.writable
    }

    /// Number of live handles sharing this descriptor.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn seek(&self, offset: u64) -> Result<()> {
        self.0
            .file
            .borrow_mut()
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::io("image", self.0.name.clone(), e))?;
        Ok(())
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.0
            .file
            .borrow_mut()
            .read(buf)
            .map_err(|e| Error::io("image", self.0.name.clone(), e))
    }

    pub fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        self.0
            .file
            .borrow_mut()
            .read_exact(buf)
            .map_err(|e| Error::io("image", self.0.name.clone(), e))
    }

    pub fn write(&self, buf: &[u8]) -> Result<()> {
        if !self.0.writable {
            return Err(Error::ModeViolation {
                what: format!("image '{}' is not open for writing", self.0.name),
                location: "image",
            });
        }
        self.0
            .file
            .borrow_mut()
            .write_all(buf)
            .map_err(|e| Error::io("image", self.0.name.clone(), e))
    }

    pub fn len(&self) -> Result<u64> {
        self.0
            .file
            .borrow()
            .metadata()
            .map(|m| m.len())
            .map_err(|e| Error::io("image", self.0.name.clone(), e))
    }
}
