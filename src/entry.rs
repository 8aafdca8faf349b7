//! A typed boundary between directory scanning and the streamer.
//!
//! Directory enumeration and file-type classification are explicitly out of
//! scope (see the Purpose & Scope section); this module only names the shape
//! the host application's scanner is expected to produce so `query`'s
//! `full_size_px` argument has an obvious origin. There is no traversal
//! logic here — that stays the host's responsibility.

use std::path::PathBuf;

/// One entry discovered by the host's directory scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Directory(PathBuf),
    NonImageFile(PathBuf),
    ImageFile { path: PathBuf, full_size_px: (u32, u32) },
}

impl Entry {
    pub fn path(&self) -> &PathBuf {
        match self {
            Entry::Directory(path) => path,
            Entry::NonImageFile(path) => path,
            Entry::ImageFile { path, .. } => path,
        }
    }

    pub fn as_image_file(&self) -> Option<(&PathBuf, (u32, u32))> {
        match self {
            Entry::ImageFile { path, full_size_px } => Some((path, *full_size_px)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_image_file_returns_none_for_non_image_variants() {
        let dir = Entry::Directory(PathBuf::from("/photos"));
        let file = Entry::NonImageFile(PathBuf::from("/photos/readme.txt"));
        assert!(dir.as_image_file().is_none());
        assert!(file.as_image_file().is_none());
    }

    #[test]
    fn as_image_file_returns_path_and_size() {
        let image = Entry::ImageFile {
            path: PathBuf::from("/photos/a.png"),
            full_size_px: (1920, 1080),
        };
        let (path, size) = image.as_image_file().unwrap();
        assert_eq!(path, &PathBuf::from("/photos/a.png"));
        assert_eq!(size, (1920, 1080));
    }
}
