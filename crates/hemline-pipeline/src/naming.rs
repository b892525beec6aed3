//! Nearest-name lookup and family mapping.
//!
//! [`ColorNamer`] finds the palette entry perceptually closest to a
//! query color under CIEDE2000. Palette Lab coordinates are computed
//! once at construction, so a lookup costs one conversion plus one
//! distance per entry.

use std::collections::HashMap;

use crate::color::{self, LabD65};
use crate::tables::PaletteEntry;
use crate::types::{PipelineError, Rgb};

/// The palette entry closest to a query color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatch<'a> {
    /// The winning entry.
    pub entry: &'a PaletteEntry,
    /// CIEDE2000 distance between the query and the entry.
    pub distance: f64,
}

/// Maps colors to the name of the nearest palette entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorNamer {
    entries: Vec<PaletteEntry>,
    labs: Vec<LabD65>,
}

impl ColorNamer {
    /// Build a namer over `entries`, in lookup priority order.
    #[must_use]
    pub fn new(entries: Vec<PaletteEntry>) -> Self {
        let labs = entries.iter().map(|e| color::rgb_to_lab(e.rgb)).collect();
        Self { entries, labs }
    }

    /// Palette entries in priority order.
    #[must_use]
    pub fn entries(&self) -> &[PaletteEntry] {
        &self.entries
    }

    /// The entry with the smallest CIEDE2000 distance to `query`.
    ///
    /// When several entries are equally close, the one listed first
    /// wins.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyPalette`] if the palette has no
    /// entries.
    pub fn nearest(&self, query: Rgb) -> Result<ColorMatch<'_>, PipelineError> {
        let query_lab = color::rgb_to_lab(query);
        let mut best: Option<ColorMatch<'_>> = None;
        for (entry, &lab) in self.entries.iter().zip(&self.labs) {
            let distance = color::ciede2000(query_lab, lab);
            if best.is_none_or(|b| distance < b.distance) {
                best = Some(ColorMatch { entry, distance });
            }
        }
        best.ok_or(PipelineError::EmptyPalette)
    }

    /// Name of the nearest entry to `query`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyPalette`] if the palette has no
    /// entries.
    pub fn name_of(&self, query: Rgb) -> Result<&str, PipelineError> {
        Ok(self.nearest(query)?.entry.name.as_str())
    }

    /// Name of the nearest entry to an integer channel triple.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidColor`] if a channel is outside
    /// `0..=255`, or [`PipelineError::EmptyPalette`] if the palette has
    /// no entries.
    pub fn name_of_channels(&self, r: i64, g: i64, b: i64) -> Result<&str, PipelineError> {
        self.name_of(Rgb::try_from_channels(r, g, b)?)
    }
}

/// Maps palette names to coarse family labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyMapper {
    families: HashMap<String, String>,
}

impl FamilyMapper {
    /// Build a mapper from `(name, family)` pairs.
    pub fn new(families: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            families: families.into_iter().collect(),
        }
    }

    /// Family label of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownColorName`] if `name` has no
    /// family entry.
    pub fn family_of(&self, name: &str) -> Result<&str, PipelineError> {
        self.families
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::UnknownColorName(name.to_owned()))
    }

    /// Whether `name` has a family entry.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.families.contains_key(name)
    }

    /// Number of mapped names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.families.len()
    }

    /// Returns `true` if no names are mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Mapped `(name, family)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.families.iter().map(|(n, f)| (n.as_str(), f.as_str()))
    }
}
