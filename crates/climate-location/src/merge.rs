//! Combine favorites, history and live suggestions into one list with no
//! repeated coordinate pair.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::{ErrorKind, LookupError};
use crate::search::SearchSnapshot;
use crate::types::{CoordKey, FavoriteEntry, HistoryEntry, Place};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Favorites,
    Recent,
    Suggestions,
}

impl SectionKind {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Favorites => "Favorites",
            Self::Recent => "Recent searches",
            Self::Suggestions => "Suggestions",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub kind: SectionKind,
    pub place: Place,
    /// Set for history rows
    pub searched_at: Option<DateTime<Utc>>,
    /// Set for favorite rows
    pub favorite_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    pub rows: Vec<Row>,
}

/// State of the suggestions section, kept apart from its rows so "too short",
/// "searching", "no matches" and "unavailable" never look alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionState {
    NotEligible,
    Loading,
    NoMatches,
    Unavailable(ErrorKind),
    Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedList {
    /// Non-empty sections in display order
    pub sections: Vec<Section>,
    pub suggestions: SuggestionState,
}

impl MergedList {
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.sections.iter().flat_map(|s| s.rows.iter())
    }

    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Build the display list from current snapshots. Favorites first, then
/// history not already pinned, then suggestions not already shown.
pub fn merge(
    favorites: &[FavoriteEntry],
    history: &[HistoryEntry],
    search: &SearchSnapshot,
) -> MergedList {
    let mut seen: HashSet<CoordKey> = HashSet::new();
    let mut sections = Vec::with_capacity(3);

    let favorite_rows: Vec<Row> = favorites
        .iter()
        .filter(|f| seen.insert(f.key()))
        .map(|f| Row {
            kind: SectionKind::Favorites,
            place: f.place.clone(),
            searched_at: None,
            favorite_id: Some(f.id.clone()),
        })
        .collect();
    push_section(&mut sections, SectionKind::Favorites, favorite_rows);

    let recent_rows: Vec<Row> = history
        .iter()
        .filter(|h| seen.insert(h.key()))
        .map(|h| Row {
            kind: SectionKind::Recent,
            place: h.place.clone(),
            searched_at: Some(h.searched_at),
            favorite_id: None,
        })
        .collect();
    push_section(&mut sections, SectionKind::Recent, recent_rows);

    let (places, suggestions) = match search {
        SearchSnapshot::NotEligible => (&[][..], SuggestionState::NotEligible),
        SearchSnapshot::Loading(previous) => (previous.as_slice(), SuggestionState::Loading),
        SearchSnapshot::Results(places) if places.is_empty() => {
            (&[][..], SuggestionState::NoMatches)
        }
        SearchSnapshot::Results(places) => (places.as_slice(), SuggestionState::Ready),
        SearchSnapshot::Failed(LookupError::NotFound) => (&[][..], SuggestionState::NoMatches),
        SearchSnapshot::Failed(err) => (&[][..], SuggestionState::Unavailable(err.kind())),
    };

    let suggestion_rows: Vec<Row> = places
        .iter()
        .filter(|p| seen.insert(p.key()))
        .map(|p| Row {
            kind: SectionKind::Suggestions,
            place: p.clone(),
            searched_at: None,
            favorite_id: None,
        })
        .collect();
    push_section(&mut sections, SectionKind::Suggestions, suggestion_rows);

    MergedList {
        sections,
        suggestions,
    }
}

fn push_section(sections: &mut Vec<Section>, kind: SectionKind, rows: Vec<Row>) {
    if !rows.is_empty() {
        sections.push(Section { kind, rows });
    }
}
