use directories::ProjectDirs;
use std::path::PathBuf;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "keysync";
pub const APP_NAME: &str = "keysync";

/// Default root for the file-backed local stores.
pub fn data_dir() -> Result<PathBuf, crate::StoreError> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME).ok_or_else(|| {
        crate::StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "cannot determine data directory",
        ))
    })?;
    Ok(dirs.data_dir().to_path_buf())
}
