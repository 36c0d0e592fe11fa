use std::path::{Path, PathBuf};

use super::{Platform, resolve_data_dir};

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        // Windows uses ACLs; no simple equivalent to Unix mode bits.
        std::fs::write(path, contents)
    }

    fn data_dir() -> PathBuf {
        resolve_data_dir(
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("voxa"),
        )
    }
}
