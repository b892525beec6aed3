//! Reference palette and family tables.
//!
//! The tables are loaded once, validated, and then only read: a
//! [`ReferenceTables`] is `Send + Sync` and can be shared by reference
//! across any number of concurrent pipeline runs.
//!
//! On disk the tables are JSON:
//!
//! ```json
//! {
//!   "palette": [{"name": "crimson", "rgb": [220, 20, 60]}],
//!   "families": {"crimson": "red"}
//! }
//! ```
//!
//! Palette order is significant: it breaks ties between equally close
//! entries.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::naming::{ColorNamer, FamilyMapper};
use crate::types::{PipelineError, Rgb};

/// The built-in tables: 552 named colors in 40 families.
const BUILTIN_JSON: &str = include_str!("../data/reference_tables.json");

/// A named reference color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteEntry {
    /// Unique display name.
    pub name: String,
    /// Reference color in sRGB.
    pub rgb: Rgb,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    rgb: [i64; 3],
}

#[derive(Debug, Deserialize)]
struct RawTables {
    palette: Vec<RawEntry>,
    families: BTreeMap<String, String>,
}

/// Validated palette plus family table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTables {
    namer: ColorNamer,
    families: FamilyMapper,
}

impl ReferenceTables {
    /// Build and validate tables from in-memory data.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::EmptyPalette`] if `palette` is empty.
    /// - [`PipelineError::InvalidTables`] if a name is duplicated, a
    ///   palette name has no family, or a family key names no palette
    ///   entry.
    pub fn from_entries(
        palette: Vec<PaletteEntry>,
        families: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, PipelineError> {
        if palette.is_empty() {
            return Err(PipelineError::EmptyPalette);
        }

        let mut names = HashSet::with_capacity(palette.len());
        for entry in &palette {
            if !names.insert(entry.name.as_str()) {
                return Err(PipelineError::InvalidTables(format!(
                    "duplicate palette name {:?}",
                    entry.name
                )));
            }
        }

        let families = FamilyMapper::new(families);
        if let Some(entry) = palette.iter().find(|e| !families.contains(&e.name)) {
            return Err(PipelineError::InvalidTables(format!(
                "palette entry {:?} has no family",
                entry.name
            )));
        }
        let mut orphans: Vec<&str> = families
            .iter()
            .map(|(name, _)| name)
            .filter(|name| !names.contains(name))
            .collect();
        orphans.sort_unstable();
        if let Some(orphan) = orphans.first() {
            return Err(PipelineError::InvalidTables(format!(
                "family entry {orphan:?} is not in the palette"
            )));
        }

        tracing::debug!(
            colors = palette.len(),
            families = families.len(),
            "loaded reference tables"
        );
        Ok(Self {
            namer: ColorNamer::new(palette),
            families,
        })
    }

    /// Parse and validate tables from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidTables`] for malformed JSON,
    /// [`PipelineError::InvalidColor`] for a channel outside `0..=255`,
    /// and any error of [`from_entries`](Self::from_entries).
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let raw: RawTables =
            serde_json::from_str(json).map_err(|e| PipelineError::InvalidTables(e.to_string()))?;
        let palette = raw
            .palette
            .into_iter()
            .map(|RawEntry { name, rgb: [r, g, b] }| {
                let rgb = Rgb::try_from_channels(r, g, b).map_err(|e| match e {
                    PipelineError::InvalidColor(m) => {
                        PipelineError::InvalidColor(format!("{name:?}: {m}"))
                    }
                    other => other,
                })?;
                Ok(PaletteEntry { name, rgb })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;
        Self::from_entries(palette, raw.families)
    }

    /// The built-in tables.
    ///
    /// # Errors
    ///
    /// Fails only if the bundled data is inconsistent.
    pub fn builtin() -> Result<Self, PipelineError> {
        Self::from_json(BUILTIN_JSON)
    }

    /// The nearest-name lookup.
    #[must_use]
    pub const fn namer(&self) -> &ColorNamer {
        &self.namer
    }

    /// The family lookup.
    #[must_use]
    pub const fn families(&self) -> &FamilyMapper {
        &self.families
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pair(name: &str, family: &str) -> (String, String) {
        (name.to_owned(), family.to_owned())
    }

    fn entry(name: &str, rgb: [u8; 3]) -> PaletteEntry {
        PaletteEntry {
            name: name.to_owned(),
            rgb: Rgb::from(rgb),
        }
    }

    #[test]
    fn builtin_tables_load() {
        let tables = ReferenceTables::builtin().unwrap();
        assert_eq!(tables.namer().entries().len(), 552);
        assert_eq!(tables.families().len(), 552);
        assert_eq!(tables.families().family_of("crimson").unwrap(), "red");
        assert_eq!(tables.families().family_of("red 1 (red*)").unwrap(), "red");
    }

    #[test]
    fn builtin_tables_have_forty_families() {
        let tables = ReferenceTables::builtin().unwrap();
        let families: HashSet<&str> = tables.families().iter().map(|(_, f)| f).collect();
        assert_eq!(families.len(), 40);
    }

    #[test]
    fn tables_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ReferenceTables>();
    }

    #[test]
    fn from_json_keeps_palette_order() {
        let json = r#"{
            "palette": [
                {"name": "b", "rgb": [0, 0, 255]},
                {"name": "a", "rgb": [255, 0, 0]}
            ],
            "families": {"a": "warm", "b": "cool"}
        }"#;
        let tables = ReferenceTables::from_json(json).unwrap();
        let names: Vec<&str> = tables.namer().entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn empty_palette_is_rejected() {
        let result = ReferenceTables::from_entries(Vec::new(), Vec::new());
        assert!(matches!(result, Err(PipelineError::EmptyPalette)));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = ReferenceTables::from_entries(
            vec![entry("red", [255, 0, 0]), entry("red", [250, 0, 0])],
            [pair("red", "red")],
        );
        assert!(matches!(result, Err(PipelineError::InvalidTables(_))));
    }

    #[test]
    fn missing_family_is_rejected() {
        let result = ReferenceTables::from_entries(
            vec![entry("red", [255, 0, 0]), entry("blue", [0, 0, 255])],
            [pair("red", "red")],
        );
        assert!(matches!(result, Err(PipelineError::InvalidTables(m)) if m.contains("blue")));
    }

    #[test]
    fn orphan_family_is_rejected() {
        let result = ReferenceTables::from_entries(
            vec![entry("red", [255, 0, 0])],
            [pair("red", "red"), pair("teal", "blue")],
        );
        assert!(matches!(result, Err(PipelineError::InvalidTables(m)) if m.contains("teal")));
    }

    #[test]
    fn out_of_range_channel_is_invalid_color() {
        let json = r#"{"palette": [{"name": "x", "rgb": [0, 256, 0]}], "families": {"x": "y"}}"#;
        assert!(matches!(
            ReferenceTables::from_json(json),
            Err(PipelineError::InvalidColor(_))
        ));
    }

    #[test]
    fn malformed_json_is_invalid_tables() {
        assert!(matches!(
            ReferenceTables::from_json("{\"palette\": 3}"),
            Err(PipelineError::InvalidTables(_))
        ));
    }
}
