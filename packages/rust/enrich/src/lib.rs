//! Parsing of XML API `/thing` responses into per-game derived fields.
//!
//! Each `<item>` sub-document is reduced by a pure function to a flat
//! column map plus its expansion references. Items arrive in arbitrary
//! order, so consumers must index by id, never by position. Zero-valued
//! numeric fields are normalized to empty strings: downstream the empty
//! value imports as NULL, which sorts and filters correctly where a
//! literal 0 would not.

pub mod xml;

use std::collections::BTreeMap;

use tracing::debug;

use meeplesync_shared::{
    BASE_GAME_TYPE, EN_DASH, EXPANSION_LINK_TYPE, ExpansionRef, OutputConfig, Result,
    TAXONOMY_LINK_TYPES, TagFlag,
};
use xml::{Element, parse_document};

// ---------------------------------------------------------------------------
// Options & output
// ---------------------------------------------------------------------------

/// Knobs for the field derivation, lifted from `[output]` config.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Characters of the description to keep.
    pub description_nchars: usize,
    /// Emit pipe-joined taxonomy columns.
    pub include_taxonomy: bool,
    /// Delimiter for taxonomy columns.
    pub taxonomy_delimiter: String,
    /// Boolean tag columns derived from links.
    pub flags: Vec<TagFlag>,
}

impl From<&OutputConfig> for ParseOptions {
    fn from(output: &OutputConfig) -> Self {
        Self {
            description_nchars: output.description_nchars,
            include_taxonomy: output.include_taxonomy,
            taxonomy_delimiter: output.taxonomy_delimiter.clone(),
            flags: output.flags.clone(),
        }
    }
}

/// Derived fields for one game, keyed by output column name.
#[derive(Debug, Clone)]
pub struct EnrichedItem {
    /// The game's identifier, as sent in the lookup request.
    pub id: String,
    /// Column → value, already normalized for the sink.
    pub fields: BTreeMap<String, String>,
    /// Expansion links, present only on base games.
    pub expansions: Vec<ExpansionRef>,
}

/// Parse a full `<items>` response body into one [`EnrichedItem`] per
/// sub-document, in document order.
pub fn parse_items(body: &str, opts: &ParseOptions) -> Result<Vec<EnrichedItem>> {
    let root = parse_document(body)?;
    let items: Vec<_> = root
        .findall("item")
        .map(|item| derive_item(item, opts))
        .collect();
    debug!(count = items.len(), "parsed lookup response");
    Ok(items)
}

// ---------------------------------------------------------------------------
// Per-item derivation
// ---------------------------------------------------------------------------

/// Reduce one `<item>` sub-document to its derived fields.
///
/// Missing or malformed fields substitute the empty value, never an error:
/// the upstream data is patchy by nature and a blank cell is the agreed
/// representation of "no data".
pub fn derive_item(item: &Element, opts: &ParseOptions) -> EnrichedItem {
    let id = item.attr("id").unwrap_or_default().to_string();
    let (best_players, rec_players) = player_count_summary(item);

    let mut fields = BTreeMap::new();
    fields.insert("id".into(), id.clone());
    fields.insert("minplaytime".into(), int_or_empty(child_value(item, "minplaytime")));
    fields.insert("maxplaytime".into(), int_or_empty(child_value(item, "maxplaytime")));
    fields.insert("playing_time".into(), int_or_empty(child_value(item, "playingtime")));
    fields.insert("min_players".into(), int_or_empty(child_value(item, "minplayers")));
    fields.insert("max_players".into(), int_or_empty(child_value(item, "maxplayers")));
    fields.insert("min_age".into(), int_or_empty(child_value(item, "minage")));
    fields.insert("best_players".into(), best_players);
    fields.insert("rec_players".into(), rec_players);
    fields.insert("image_url".into(), item.findtext("image").to_string());
    fields.insert("thumbnail".into(), item.findtext("thumbnail").to_string());
    fields.insert("complexity".into(), float_or_empty(average_weight(item)));
    fields.insert(
        "description".into(),
        item.findtext("description")
            .chars()
            .take(opts.description_nchars)
            .collect(),
    );
    fields.insert("suggested_playerage".into(), suggested_playerage(item));

    for flag in &opts.flags {
        let present = has_link(item, &flag.link_type, &flag.link_value);
        fields.insert(flag.column.clone(), present.to_string());
    }

    if opts.include_taxonomy {
        for link_type in TAXONOMY_LINK_TYPES {
            let joined = item
                .findall("link")
                .filter(|l| l.attr("type") == Some(link_type))
                .filter_map(|l| l.attr("value"))
                .collect::<Vec<_>>()
                .join(&opts.taxonomy_delimiter);
            fields.insert(link_type.into(), joined);
        }
    }

    EnrichedItem {
        id,
        fields,
        expansions: collect_expansions(item),
    }
}

/// `value` attribute of the named direct child, or `""`.
fn child_value<'a>(item: &'a Element, name: &str) -> &'a str {
    item.find(name).and_then(|el| el.attr("value")).unwrap_or("")
}

/// `statistics/ratings/averageweight@value`, or `""` when the stats block
/// was not requested.
fn average_weight(item: &Element) -> &str {
    item.find("statistics")
        .and_then(|s| s.find("ratings"))
        .map(|r| child_value(r, "averageweight"))
        .unwrap_or("")
}

/// Parse an integer field, mapping 0 and unparseable input to empty.
fn int_or_empty(raw: &str) -> String {
    match raw.trim().parse::<i64>() {
        Ok(0) | Err(_) => String::new(),
        Ok(n) => n.to_string(),
    }
}

/// Parse a float field, mapping 0.0 and unparseable input to empty.
fn float_or_empty(raw: &str) -> String {
    match raw.trim().parse::<f64>() {
        Ok(v) if v != 0.0 => format!("{v}"),
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Polls
// ---------------------------------------------------------------------------

/// Weighted average of the `suggested_playerage` poll.
///
/// Bucket labels are free text ("21 and up"); the age is recovered by
/// stripping every non-digit character. A missing poll, zero total votes,
/// or a label with no digits at all contributes nothing.
fn suggested_playerage(item: &Element) -> String {
    let Some(poll) = item
        .findall("poll")
        .find(|p| p.attr("name") == Some("suggested_playerage"))
    else {
        return String::new();
    };
    if poll.attr("totalvotes") == Some("0") {
        return String::new();
    }
    let Some(results) = poll.find("results") else {
        return String::new();
    };

    let mut age_sum: u64 = 0;
    let mut vote_sum: u64 = 0;
    for result in results.findall("result") {
        let digits: String = result
            .attr("value")
            .unwrap_or("")
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        let Ok(age) = digits.parse::<u64>() else {
            continue;
        };
        let votes = result
            .attr("numvotes")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        age_sum += age * votes;
        vote_sum += votes;
    }

    if vote_sum == 0 {
        return String::new();
    }
    let age = age_sum as f64 / vote_sum as f64;
    // Whole numbers keep a trailing .0, matching the exports this table
    // has always been imported from.
    if age.fract() == 0.0 {
        format!("{age:.1}")
    } else {
        format!("{age}")
    }
}

/// Best/recommended player counts from the `suggested_numplayers`
/// poll summary.
fn player_count_summary(item: &Element) -> (String, String) {
    let mut best = String::new();
    let mut rec = String::new();

    for summary in item.findall("poll-summary") {
        if summary.attr("name") != Some("suggested_numplayers") {
            continue;
        }
        for result in summary.findall("result") {
            let value = result.attr("value").unwrap_or("");
            match result.attr("name") {
                Some("bestwith") => best = normalize_player_range(value),
                // The API spells this with three m's.
                Some("recommmendedwith") => rec = normalize_player_range(value),
                _ => {}
            }
        }
    }

    (best, rec)
}

/// Filter a player-count phrase ("Best with 4–6, 8+ players") down to
/// digits, en dash, comma, and plus, then normalize the dash to a hyphen.
fn normalize_player_range(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == EN_DASH || *c == ',' || *c == '+')
        .map(|c| if c == EN_DASH { '-' } else { c })
        .collect()
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// Exact, case-sensitive match on a `(type, value)` link pair.
fn has_link(item: &Element, link_type: &str, link_value: &str) -> bool {
    item.findall("link")
        .any(|l| l.attr("type") == Some(link_type) && l.attr("value") == Some(link_value))
}

/// Expansion links of a base game. Expansions themselves contribute none,
/// so expansion-of-expansion chains are never followed.
fn collect_expansions(item: &Element) -> Vec<ExpansionRef> {
    if item.attr("type") != Some(BASE_GAME_TYPE) {
        return Vec::new();
    }
    item.findall("link")
        .filter(|l| l.attr("type") == Some(EXPANSION_LINK_TYPE))
        .map(|l| ExpansionRef {
            id: l.attr("id").unwrap_or_default().to_string(),
            name: l.attr("value").unwrap_or_default().to_string(),
        })
        .collect()
}
