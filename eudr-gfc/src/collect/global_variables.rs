/// Hansen Global Forest Change release the tile set is pinned to
pub const DATASET_VERSION_DEFAULT: &str = "GFC-2024-v1.12";

/// Canonical download location; `{layer}`, `{tile_id}` and `{hansen_tile}` are substituted
pub const DEFAULT_HANSEN_URL_TEMPLATE: &str = "https://storage.googleapis.com/earthenginepartners-hansen/GFC-2024-v1.12/Hansen_GFC-2024-v1.12_{layer}_{hansen_tile}.tif";

pub const LAYER_TREECOVER2000: &str = "treecover2000";
pub const LAYER_LOSSYEAR: &str = "lossyear";

/// Layers requested when the caller does not name any
pub const DEFAULT_LAYERS: [&str; 2] = [LAYER_TREECOVER2000, LAYER_LOSSYEAR];

pub const TILE_FILE_EXTENSION: &str = "tif";

pub const MANIFEST_FILE_NAME: &str = "tiles_manifest.json";
pub const MANIFEST_SCHEMA_VERSION: &str = "v1";

pub const TILE_CONTENT_TYPE: &str = "image/tiff";
pub const MANIFEST_CONTENT_TYPE: &str = "application/json";

/// Lower-case slug of a dataset version: "GFC-2024-v1.12" -> "gfc_2024_v1_12"
pub fn dataset_slug(dataset_version: &str) -> String {
    dataset_version
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Directory name under `external/hansen/` for a dataset version
pub fn hansen_base_dir_name(dataset_version: &str) -> String {
    format!("hansen_{}", dataset_slug(dataset_version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_slug() {
        assert_eq!(dataset_slug(DATASET_VERSION_DEFAULT), "gfc_2024_v1_12");
        assert_eq!(hansen_base_dir_name("GFC-2023-v1.11"), "hansen_gfc_2023_v1_11");
    }
}
