use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};
use crate::level::{LevelDefinition, LevelRules, Side, StopResume, TimeWindow};

/// On-disk catalog shape: `{ "levels": [ ... ] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    pub levels: Vec<LevelDefinition>,
}

/// Read-only lookup of level id to definition.
#[derive(Debug, Clone, Default)]
pub struct LevelCatalog {
    levels: BTreeMap<String, LevelDefinition>,
}

impl LevelCatalog {
    pub fn from_levels(levels: impl IntoIterator<Item = LevelDefinition>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for level in levels {
            level.validate()?;
            if map.contains_key(&level.id) {
                return Err(TrainerError::invalid(&level.id, "duplicate level id"));
            }
            map.insert(level.id.clone(), level);
        }
        Ok(Self { levels: map })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Self::parse(text, Path::new("<inline>"))
    }

    fn parse(text: &str, origin: &Path) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(text).map_err(|source| TrainerError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        Self::from_levels(file.levels)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| TrainerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// The five stock levels.
    pub fn builtin() -> Self {
        let levels = builtin_levels()
            .into_iter()
            .map(|level| (level.id.clone(), level))
            .collect();
        Self { levels }
    }

    pub fn get(&self, id: &str) -> Result<&LevelDefinition> {
        self.levels
            .get(id)
            .ok_or_else(|| TrainerError::UnknownLevel(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &LevelDefinition> {
        self.levels.values()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

fn builtin_levels() -> Vec<LevelDefinition> {
    vec![
        LevelDefinition {
            id: "lvl-1".into(),
            label: "Level 1".into(),
            hint: "Brake Now".into(),
            clip: "level1".into(),
            rules: LevelRules::Brake {
                window: TimeWindow::new(4.5, 8.0),
            },
            speed_multiplier: 100.0,
            max_speed: 200.0,
            vibration_stamps: vec![4.5, 7.0],
            video_end: 10.0,
        },
        LevelDefinition {
            id: "lvl-2".into(),
            label: "Level 2".into(),
            hint: "Right indicator & Right turn".into(),
            clip: "level2".into(),
            rules: LevelRules::Turn {
                side: Side::Right,
                indicator_window: TimeWindow::new(3.0, 6.0),
                turn_window: TimeWindow::new(5.5, 9.0),
                turn_threshold: Some(8.3),
            },
            speed_multiplier: 100.0,
            max_speed: 200.0,
            vibration_stamps: vec![3.0, 5.5],
            video_end: 18.0,
        },
        LevelDefinition {
            id: "lvl-3".into(),
            label: "Level 3".into(),
            hint: "Left indicator & Left turn".into(),
            clip: "level3".into(),
            rules: LevelRules::Turn {
                side: Side::Left,
                indicator_window: TimeWindow::new(8.5, 11.0),
                turn_window: TimeWindow::new(10.5, 12.5),
                turn_threshold: Some(12.5),
            },
            speed_multiplier: 100.0,
            max_speed: 200.0,
            vibration_stamps: vec![8.5, 10.5],
            video_end: 22.0,
        },
        LevelDefinition {
            id: "lvl-4".into(),
            label: "Level 4".into(),
            hint: "Stop Now".into(),
            clip: "level4red".into(),
            rules: LevelRules::Stop {
                window: TimeWindow::new(1.0, 4.2),
                resume: StopResume::SwapClip {
                    clip: "level4green".into(),
                },
            },
            speed_multiplier: 100.0,
            max_speed: 200.0,
            vibration_stamps: vec![1.0],
            video_end: 25.0,
        },
        LevelDefinition {
            id: "lvl-5".into(),
            label: "Level 5".into(),
            hint: "Maintain Speed Limit".into(),
            clip: "level5".into(),
            rules: LevelRules::SpeedLimit {
                window: TimeWindow::new(8.0, 18.0),
                speed_limit: 75.0,
            },
            speed_multiplier: 50.0,
            max_speed: 100.0,
            vibration_stamps: vec![8.0],
            video_end: 18.0,
        },
    ]
}
