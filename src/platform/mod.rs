use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "VOXA_DATA_DIR";

/// Platform-specific operations behind a common interface so call sites stay
/// free of `#[cfg]` blocks.
pub trait Platform {
    /// Write `contents` to a file only the owner can read (0o600 on Unix).
    /// The mode is in place before any byte is written, including when the
    /// file already existed with looser permissions.
    fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()>;

    /// Root data directory for voxa.
    /// Unix: `~/.voxa`, Windows: `%APPDATA%\voxa`.
    fn data_dir() -> PathBuf;
}

/// `VOXA_DATA_DIR` wins over the platform default.
fn resolve_data_dir(default: PathBuf) -> PathBuf {
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => default,
    }
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;
