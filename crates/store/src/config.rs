use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// On-disk location of the local key/value backend.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct StoreConfig {
    pub path: Utf8PathBuf,
}

impl StoreConfig {
    #[must_use]
    pub const fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }
}
