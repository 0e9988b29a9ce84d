use crate::models::Task;
use std::collections::BTreeMap;
use std::fmt;

/// Label shown for the "no tag filter" choice.
pub const ALL_TAGS_LABEL: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TagSelection {
    #[default]
    All,
    Tag(String),
}

impl TagSelection {
    /// Parse a user choice; blank or "All" (any case) selects everything.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case(ALL_TAGS_LABEL) {
            TagSelection::All
        } else {
            TagSelection::Tag(raw.to_string())
        }
    }
}

impl fmt::Display for TagSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagSelection::All => f.write_str(ALL_TAGS_LABEL),
            TagSelection::Tag(tag) => f.write_str(tag),
        }
    }
}

/// Tags are equal when their lowercase forms are; the same folding groups
/// the tag universe.
pub fn tag_eq(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Search text AND tag selection over the task list.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub search_text: String,
    pub selected_tag: TagSelection,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.matches_search(task) && self.matches_tag(task)
    }

    fn matches_search(&self, task: &Task) -> bool {
        let needle = self.search_text.trim();
        if needle.is_empty() {
            return true;
        }
        let needle = needle.to_lowercase();
        task.title.to_lowercase().contains(&needle)
            || task.description.to_lowercase().contains(&needle)
    }

    fn matches_tag(&self, task: &Task) -> bool {
        match &self.selected_tag {
            TagSelection::All => true,
            TagSelection::Tag(tag) => task.has_tag(tag),
        }
    }

    /// Snap the selection onto the universe's spelling, or back to
    /// [`TagSelection::All`] when the tag no longer exists. Returns true
    /// when the selection changed.
    pub fn normalize_selection(&mut self, universe: &[String]) -> bool {
        let TagSelection::Tag(selected) = &self.selected_tag else {
            return false;
        };
        let next = universe
            .iter()
            .find(|t| tag_eq(t, selected))
            .map(|t| TagSelection::Tag(t.clone()))
            .unwrap_or(TagSelection::All);
        if next != self.selected_tag {
            self.selected_tag = next;
            return true;
        }
        false
    }
}

/// Every distinct non-blank tag across `tasks`, compared case-insensitively
/// (first spelling wins) and sorted.
pub fn tag_universe<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Vec<String> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for task in tasks {
        for tag in task.tags() {
            if tag.trim().is_empty() {
                continue;
            }
            seen.entry(tag.to_lowercase()).or_insert_with(|| tag.clone());
        }
    }
    seen.into_values().collect()
}
