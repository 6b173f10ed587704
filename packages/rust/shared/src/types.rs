//! Core domain types and wire constants for the BGG sync pipeline.

use serde::{Deserialize, Serialize};

/// Item type that marks a base game in the XML API. Expansions of
/// expansions are never followed, so expansion links are only collected
/// from items of this type.
pub const BASE_GAME_TYPE: &str = "boardgame";

/// Link type carrying expansion references.
pub const EXPANSION_LINK_TYPE: &str = "boardgameexpansion";

/// Link types flattened into delimited taxonomy columns.
pub const TAXONOMY_LINK_TYPES: [&str; 3] =
    ["boardgamecategory", "boardgamemechanic", "boardgamefamily"];

/// The en dash BGG uses in player-count ranges ("4–6"). Not the keyboard hyphen.
pub const EN_DASH: char = '\u{2013}';

/// Ranks-dump columns where a stored `"0"` means "no data" and is blanked
/// before writing, so downstream sorting/filtering sees NULL instead of 0.
pub const SENTINEL_ZERO_COLUMNS: [&str; 4] = ["average", "bayesaverage", "rank", "yearpublished"];

// ---------------------------------------------------------------------------
// TagFlag
// ---------------------------------------------------------------------------

/// A boolean output column derived from an exact `(link type, link value)`
/// match on an item's links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFlag {
    /// Output column name (e.g. `is_cooperative`).
    pub column: String,
    /// Link `type` attribute to match.
    pub link_type: String,
    /// Link `value` attribute to match. Exact, case-sensitive.
    pub link_value: String,
}

impl TagFlag {
    pub fn new(
        column: impl Into<String>,
        link_type: impl Into<String>,
        link_value: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            link_type: link_type.into(),
            link_value: link_value.into(),
        }
    }
}

/// The flags the original importer derives.
pub fn default_tag_flags() -> Vec<TagFlag> {
    vec![
        TagFlag::new("is_cooperative", "boardgamemechanic", "Cooperative Game"),
        TagFlag::new("is_teambased", "boardgamemechanic", "Team-Based Game"),
    ]
}

// ---------------------------------------------------------------------------
// ExpansionRef
// ---------------------------------------------------------------------------

/// One expansion link on a base game: the expansion's own id and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionRef {
    pub id: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Output column whitelist
// ---------------------------------------------------------------------------

/// Columns accepted by the hosted games table. Merged rows are filtered to
/// this set before writing; anything else is silently dropped.
pub fn default_output_columns() -> Vec<String> {
    [
        "id",
        "name",
        "rank",
        "average",
        "bayesaverage",
        "usersrated",
        "year_published",
        "min_players",
        "max_players",
        "best_players",
        "rec_players",
        "minplaytime",
        "maxplaytime",
        "playing_time",
        "min_age",
        "suggested_playerage",
        "complexity",
        "image_url",
        "thumbnail",
        "description",
        "is_cooperative",
        "is_teambased",
        "boardgamecategory",
        "boardgamemechanic",
        "boardgamefamily",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_flag_serialization() {
        let flag = TagFlag::new("is_cooperative", "boardgamemechanic", "Cooperative Game");
        let toml_str = toml::to_string(&flag).expect("serialize flag");
        let parsed: TagFlag = toml::from_str(&toml_str).expect("deserialize flag");
        assert_eq!(parsed, flag);
    }

    #[test]
    fn default_columns_include_renamed_year() {
        let cols = default_output_columns();
        assert!(cols.iter().any(|c| c == "year_published"));
        // The raw dump spelling is dropped by the whitelist.
        assert!(!cols.iter().any(|c| c == "yearpublished"));
    }
}
