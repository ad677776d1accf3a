//! World and translation loading from disk, with the bundled assets as fallback.
use mathstarz_game::{TranslationCatalog, WorldData, WorldDataError, WorldLoader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid world data: {0}")]
    World(#[from] WorldDataError),
    #[error("invalid translations: {0}")]
    Translations(#[source] serde_json::Error),
}

/// Loads JSON assets from explicit paths; unset paths use the bundled copies.
#[derive(Debug, Clone, Default)]
pub struct FileWorldLoader {
    world_path: Option<PathBuf>,
    translations_path: Option<PathBuf>,
}

impl FileWorldLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_world(mut self, path: impl Into<PathBuf>) -> Self {
        self.world_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_translations(mut self, path: impl Into<PathBuf>) -> Self {
        self.translations_path = Some(path.into());
        self
    }
}

fn read(path: &Path) -> Result<String, AssetError> {
    std::fs::read_to_string(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl WorldLoader for FileWorldLoader {
    type Error = AssetError;

    fn load_world_data(&self) -> Result<WorldData, Self::Error> {
        match &self.world_path {
            Some(path) => {
                log::debug!("Loading world from {}", path.display());
                Ok(WorldData::from_json(&read(path)?)?)
            }
            None => Ok(WorldData::load_from_static()),
        }
    }

    fn load_translations(&self) -> Result<TranslationCatalog, Self::Error> {
        match &self.translations_path {
            Some(path) => {
                TranslationCatalog::from_json(&read(path)?).map_err(AssetError::Translations)
            }
            None => Ok(TranslationCatalog::load_from_static()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathstarz_game::NpcId;

    #[test]
    fn bundled_assets_are_used_by_default() {
        let loader = FileWorldLoader::new();
        let world = loader.load_world_data().unwrap();
        assert_eq!(world.npcs.len(), 3);
        assert!(world.npc(NpcId(3)).is_some());
        assert!(loader.load_translations().unwrap().languages().count() >= 2);
    }

    #[test]
    fn missing_file_reports_path() {
        let loader = FileWorldLoader::new().with_world("/nonexistent/world.json");
        let err = loader.load_world_data().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/world.json"));
    }
}
