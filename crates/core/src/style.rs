//! Style catalog and canvas orientation.
//!
//! The catalog is static configuration loaded once at startup; entries are
//! never mutated afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Orientation
// ---------------------------------------------------------------------------

/// Target aspect ratio of the canvas and therefore of the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Square,
    Horizontal,
    Vertical,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Square,
        Orientation::Horizontal,
        Orientation::Vertical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Square => "square",
            Orientation::Horizontal => "horizontal",
            Orientation::Vertical => "vertical",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "square" => Ok(Orientation::Square),
            "horizontal" | "landscape" => Ok(Orientation::Horizontal),
            "vertical" | "portrait" => Ok(Orientation::Vertical),
            other => Err(CoreError::Validation(format!(
                "Invalid orientation '{other}'. Must be one of: square, horizontal, vertical"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Style catalog
// ---------------------------------------------------------------------------

/// Id of the pseudo-style that shows the user's photo untouched.
///
/// It never goes through the provider and survives crop changes.
pub const ORIGINAL_IMAGE_STYLE_ID: &str = "original-image";

/// An immutable catalog entry describing one art style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleOption {
    pub id: String,
    pub name: String,
    pub description: String,
    pub thumbnail: String,
    pub preview_asset: String,
    /// Price adjustment applied to the canvas, in cents.
    pub price_modifier_cents: i64,
}

impl StyleOption {
    pub fn new(id: &str, name: &str, description: &str, price_modifier_cents: i64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            thumbnail: format!("/art-style-thumbnails/{id}.jpg"),
            preview_asset: format!("/art-style-hero-images/{id}-hero.jpg"),
            price_modifier_cents,
        }
    }

    pub fn is_original_image(&self) -> bool {
        self.id == ORIGINAL_IMAGE_STYLE_ID
    }
}

/// The built-in style catalog.
pub fn default_catalog() -> Vec<StyleOption> {
    vec![
        StyleOption::new(
            ORIGINAL_IMAGE_STYLE_ID,
            "Original Image",
            "Your photo exactly as uploaded",
            0,
        ),
        StyleOption::new("oil", "Oil Painting", "Rich impasto brushwork", 0),
        StyleOption::new("watercolor", "Watercolor", "Soft washes and bleeding edges", 0),
        StyleOption::new("pop-art", "Pop Art", "Bold halftone colour blocks", 500),
        StyleOption::new("charcoal", "Charcoal Sketch", "Smudged monochrome strokes", 0),
        StyleOption::new("neon-splash", "Neon Splash", "Electric splatter on dark canvas", 500),
        StyleOption::new("art-deco", "Art Deco", "Geometric gilded glamour", 1000),
    ]
}

/// Look up a style by id.
pub fn find_style<'a>(catalog: &'a [StyleOption], id: &str) -> Result<&'a StyleOption, CoreError> {
    catalog
        .iter()
        .find(|s| s.id == id)
        .ok_or_else(|| CoreError::NotFound {
            entity: "style",
            id: id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn orientation_parses_aliases() {
        assert_eq!("Landscape".parse::<Orientation>().unwrap(), Orientation::Horizontal);
        assert_eq!("portrait".parse::<Orientation>().unwrap(), Orientation::Vertical);
        assert_eq!(" square ".parse::<Orientation>().unwrap(), Orientation::Square);
    }

    #[test]
    fn orientation_rejects_unknown() {
        assert_matches!("round".parse::<Orientation>(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn orientation_serializes_lowercase() {
        let json = serde_json::to_string(&Orientation::Horizontal).unwrap();
        assert_eq!(json, "\"horizontal\"");
    }

    #[test]
    fn catalog_ids_are_unique() {
        let catalog = default_catalog();
        let mut ids: Vec<_> = catalog.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), catalog.len());
    }

    #[test]
    fn find_style_reports_missing_id() {
        let catalog = default_catalog();
        assert!(find_style(&catalog, "oil").is_ok());
        assert_matches!(
            find_style(&catalog, "cubism"),
            Err(CoreError::NotFound { entity: "style", .. })
        );
    }
}
