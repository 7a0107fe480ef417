//! Settings and the persisted zone configuration file.
//!
//! Both are JSON. Loading is best-effort: a missing file gives defaults and
//! invalid zone records are skipped with a warning.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::inventory::GearEntry;
use crate::snapshot::{BloodType, CharacterProfile};
use crate::state::zone::{ZoneDefinition, ZoneError, ZoneShape};
use crate::world::Vec3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Arena behaviour settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaSettings {
    /// Appended to the normal character's name for the alternate
    pub alternate_name_suffix: String,
    pub alternate_blood_type: String,
    pub alternate_blood_quality: f32,
    pub switch_persona_on_entry: bool,
    pub create_alternate_on_entry: bool,
    /// Whether newly tracked players start a session on zone entry
    pub auto_enter: bool,
    /// Kit equipped on entry for players with auto-equip on
    pub entry_gear: Vec<GearEntry>,
    /// Revert every swap session on exit, not only the entry kit
    pub revert_all_on_exit: bool,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        Self {
            alternate_name_suffix: "PvP".to_string(),
            alternate_blood_type: BloodType::Rogue.as_str().to_string(),
            alternate_blood_quality: 100.0,
            switch_persona_on_entry: true,
            create_alternate_on_entry: true,
            auto_enter: true,
            entry_gear: Vec::new(),
            revert_all_on_exit: true,
        }
    }
}

impl ArenaSettings {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a file; defaults if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match read_optional(path)? {
            Some(text) => serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            }),
            None => {
                debug!(path = %path.display(), "no settings file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Blood type and quality for new alternates.
    pub fn alternate_blood(&self) -> CharacterProfile {
        CharacterProfile::with_blood(
            String::new(),
            BloodType::parse_or_default(&self.alternate_blood_type),
            self.alternate_blood_quality,
        )
    }
}

/// One zone as stored on disk.
///
/// `dimensions` holds full box sizes; the zone's half-extents are half of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub name: String,
    pub shape: String,
    pub center: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Vec3>,
}

impl ZoneRecord {
    pub fn to_definition(&self) -> Result<ZoneDefinition, ZoneError> {
        let invalid = |reason: &'static str| ZoneError::InvalidShape {
            zone_id: self.name.clone(),
            reason,
        };
        let shape = match self.shape.trim().to_ascii_lowercase().as_str() {
            "circle" => ZoneShape::Circle {
                center: self.center,
                radius: self.radius.ok_or_else(|| invalid("circle without radius"))?,
            },
            "box" => ZoneShape::Box {
                center: self.center,
                half_extents: self
                    .dimensions
                    .ok_or_else(|| invalid("box without dimensions"))?
                    .scale(0.5),
            },
            _ => return Err(invalid("unknown shape")),
        };
        ZoneDefinition::new(self.name.clone(), self.name.clone(), shape)
    }
}

impl From<&ZoneDefinition> for ZoneRecord {
    fn from(definition: &ZoneDefinition) -> Self {
        match definition.shape {
            ZoneShape::Circle { center, radius } => Self {
                name: definition.id.clone(),
                shape: "circle".to_string(),
                center,
                radius: Some(radius),
                dimensions: None,
            },
            ZoneShape::Box {
                center,
                half_extents,
            } => Self {
                name: definition.id.clone(),
                shape: "box".to_string(),
                center,
                radius: None,
                dimensions: Some(half_extents.scale(2.0)),
            },
        }
    }
}

/// Persisted zone configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfigFile {
    #[serde(default)]
    pub zones: Vec<ZoneRecord>,
    #[serde(rename = "createdAt", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Default for ZoneConfigFile {
    fn default() -> Self {
        Self {
            zones: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

impl ZoneConfigFile {
    pub fn from_definitions<'a, I>(definitions: I) -> Self
    where
        I: IntoIterator<Item = &'a ZoneDefinition>,
    {
        Self {
            zones: definitions.into_iter().map(ZoneRecord::from).collect(),
            created_at: Utc::now(),
        }
    }

    /// Load from a file; empty if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match read_optional(path)? {
            Some(text) => serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            }),
            None => {
                debug!(path = %path.display(), "no zone file, starting empty");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(io_err)
    }

    /// Valid definitions; invalid records are skipped.
    pub fn definitions(&self) -> Vec<ZoneDefinition> {
        self.zones
            .iter()
            .filter_map(|record| match record.to_definition() {
                Ok(definition) => Some(definition),
                Err(err) => {
                    warn!(zone = %record.name, error = %err, "skipping invalid zone record");
                    None
                }
            })
            .collect()
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("arena-session-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_settings_defaults() {
        let settings = ArenaSettings::from_json_str("{}").unwrap();
        assert_eq!(settings, ArenaSettings::default());
        assert_eq!(settings.alternate_name_suffix, "PvP");
        assert_eq!(settings.alternate_blood().blood_type, BloodType::Rogue);
        assert!(settings.auto_enter);

        let settings = ArenaSettings::from_json_str(r#"{"auto_enter": false}"#).unwrap();
        assert!(!settings.auto_enter);
        assert!(settings.create_alternate_on_entry);
    }

    #[test]
    fn test_settings_partial_and_corrupt_blood() {
        let settings = ArenaSettings::from_json_str(
            r#"{"alternate_blood_type": "dragon", "entry_gear": [{"item_name": "Sword", "count": 1}]}"#,
        )
        .unwrap();
        assert_eq!(settings.alternate_blood().blood_type, BloodType::None);
        assert_eq!(settings.entry_gear, vec![GearEntry::new("Sword", 1)]);
        assert!(settings.switch_persona_on_entry);
    }

    #[test]
    fn test_settings_invalid_json() {
        assert!(matches!(
            ArenaSettings::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_files_give_defaults() {
        let path = temp_path("does-not-exist.json");
        assert_eq!(ArenaSettings::load(&path).unwrap(), ArenaSettings::default());
        assert!(ZoneConfigFile::load(&path).unwrap().zones.is_empty());
    }

    #[test]
    fn test_zone_record_conversion() {
        let record = ZoneRecord {
            name: "pit".to_string(),
            shape: "Box".to_string(),
            center: Vec3::new(1.0, 2.0, 3.0),
            radius: None,
            dimensions: Some(Vec3::new(10.0, 4.0, 6.0)),
        };
        let definition = record.to_definition().unwrap();
        assert_eq!(
            definition.shape,
            ZoneShape::Box {
                center: Vec3::new(1.0, 2.0, 3.0),
                half_extents: Vec3::new(5.0, 2.0, 3.0),
            }
        );
        let mut back = ZoneRecord::from(&definition);
        back.shape = "Box".to_string();
        assert_eq!(back, record);
    }

    #[test]
    fn test_invalid_records_skipped() {
        let json = r#"{
            "zones": [
                {"name": "arena", "shape": "circle", "center": {"x": -1000, "y": 5, "z": -500}, "radius": 50},
                {"name": "broken", "shape": "circle", "center": {"x": 0, "y": 0, "z": 0}},
                {"name": "weird", "shape": "hexagon", "center": {"x": 0, "y": 0, "z": 0}, "radius": 5}
            ],
            "createdAt": "2024-05-01T12:00:00Z"
        }"#;
        let file: ZoneConfigFile = serde_json::from_str(json).unwrap();
        let definitions = file.definitions();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].id, "arena");
    }

    #[test]
    fn test_zone_file_round_trip() {
        let definitions = vec![
            ZoneDefinition::circle("arena", Vec3::new(-1000.0, 5.0, -500.0), 50.0).unwrap(),
            ZoneDefinition::cuboid("pit", Vec3::ZERO, Vec3::new(5.0, 5.0, 5.0)).unwrap(),
        ];
        let path = temp_path("zones.json");
        ZoneConfigFile::from_definitions(&definitions)
            .save(&path)
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("createdAt"));

        let loaded = ZoneConfigFile::load(&path).unwrap();
        assert_eq!(loaded.definitions(), definitions);
        let _ = fs::remove_file(&path);
    }
}
