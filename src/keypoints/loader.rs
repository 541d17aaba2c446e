use std::path::Path;

#[cfg(feature = "tracking-hdf5")]
use super::hdf5_table;
use super::{csv_table, KeypointTable};
use crate::error::{Result, RoiError};

/// Dataset path of the hierarchical binary tracking export.
pub const HDF5_DATASET_KEY: &str = "/df_with_missing";

/// Tracking table formats, chosen by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackingFormat {
    Csv,
    Hdf5,
}

impl TrackingFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("h5") | Some("hdf5") => Ok(Self::Hdf5),
            _ => Err(RoiError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }
}

/// Loads a tracking table from a file path.
pub trait TableLoader: Sync {
    fn load(&self, path: &Path) -> Result<KeypointTable>;
}

/// Loader for the formats this build can read.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileTableLoader;

impl TableLoader for FileTableLoader {
    fn load(&self, path: &Path) -> Result<KeypointTable> {
        match TrackingFormat::from_path(path)? {
            TrackingFormat::Csv => csv_table::read_path(path),
            #[cfg(feature = "tracking-hdf5")]
            TrackingFormat::Hdf5 => hdf5_table::read_path(path),
            #[cfg(not(feature = "tracking-hdf5"))]
            TrackingFormat::Hdf5 => Err(RoiError::FormatUnavailable {
                format: "HDF5",
                path: format!("{}:{}", path.display(), HDF5_DATASET_KEY),
            }),
        }
    }
}

/// Load a tracking table with the built-in loader.
pub fn load_tracking_table(path: &Path) -> Result<KeypointTable> {
    let table = FileTableLoader.load(path)?;
    log::info!(
        "tracking table {} loaded ({} frames)",
        path.display(),
        table.frames().len()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension() {
        assert_eq!(TrackingFormat::from_path(Path::new("a/b.CSV")).unwrap(), TrackingFormat::Csv);
        assert_eq!(TrackingFormat::from_path(Path::new("b.h5")).unwrap(), TrackingFormat::Hdf5);
        assert!(matches!(
            TrackingFormat::from_path(Path::new("b.xlsx")),
            Err(RoiError::UnsupportedFormat { .. })
        ));
    }

    #[cfg(not(feature = "tracking-hdf5"))]
    #[test]
    fn hdf5_needs_the_reader_feature() {
        let err = FileTableLoader.load(Path::new("session.h5")).unwrap_err();
        assert!(matches!(err, RoiError::FormatUnavailable { .. }));
        assert!(err.to_string().contains(HDF5_DATASET_KEY));
    }
}
