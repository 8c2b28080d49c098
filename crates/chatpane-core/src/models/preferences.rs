use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::persona::DEFAULT_PERSONA_ID;

pub const THEME_KEY: &str = "theme";
pub const SECTIONS_KEY: &str = "sidebar-collapsed";
pub const SIDEBAR_COLLAPSED_KEY: &str = "sidebar-collapsed-state";
pub const SELECTED_PERSONA_KEY: &str = "selected-persona";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }
}

/// Which sidebar sections are folded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidebarSections {
    pub pinned: bool,
    pub recent: bool,
    pub folders: bool,
    pub templates: bool,
}

impl Default for SidebarSections {
    fn default() -> Self {
        Self {
            pinned: true,
            recent: false,
            folders: true,
            templates: true,
        }
    }
}

/// UI preferences kept across reloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    /// `None` means "follow the system colour scheme".
    pub theme: Option<Theme>,
    pub sections: SidebarSections,
    pub sidebar_collapsed: bool,
    pub selected_persona: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: None,
            sections: SidebarSections::default(),
            sidebar_collapsed: false,
            selected_persona: DEFAULT_PERSONA_ID.to_string(),
        }
    }
}

impl Preferences {
    /// Theme to apply, given whether the system prefers dark mode.
    pub fn effective_theme(&self, system_prefers_dark: bool) -> Theme {
        self.theme.unwrap_or(if system_prefers_dark {
            Theme::Dark
        } else {
            Theme::Light
        })
    }

    /// Rebuild preferences from string-serialized entries. Values that fail
    /// to parse keep their default.
    pub fn from_entries(entries: &BTreeMap<String, String>) -> Self {
        let mut prefs = Self::default();

        if let Some(value) = entries.get(THEME_KEY) {
            match Theme::parse(value) {
                Some(theme) => prefs.theme = Some(theme),
                None => warn!(key = THEME_KEY, value = %value, "Ignoring unknown theme preference"),
            }
        }

        if let Some(value) = entries.get(SECTIONS_KEY) {
            match serde_json::from_str(value) {
                Ok(sections) => prefs.sections = sections,
                Err(e) => warn!(key = SECTIONS_KEY, error = ?e, "Ignoring malformed preference"),
            }
        }

        if let Some(value) = entries.get(SIDEBAR_COLLAPSED_KEY) {
            match serde_json::from_str(value) {
                Ok(collapsed) => prefs.sidebar_collapsed = collapsed,
                Err(e) => {
                    warn!(key = SIDEBAR_COLLAPSED_KEY, error = ?e, "Ignoring malformed preference")
                }
            }
        }

        if let Some(value) = entries.get(SELECTED_PERSONA_KEY)
            && !value.is_empty()
        {
            prefs.selected_persona = value.clone();
        }

        prefs
    }

    /// Serialize every preference to its string value.
    pub fn to_entries(&self) -> BTreeMap<String, String> {
        let mut entries = BTreeMap::new();
        if let Some(theme) = self.theme {
            entries.insert(THEME_KEY.to_string(), theme.as_str().to_string());
        }
        entries.insert(
            SECTIONS_KEY.to_string(),
            serde_json::to_string(&self.sections).unwrap_or_else(|_| "{}".to_string()),
        );
        entries.insert(
            SIDEBAR_COLLAPSED_KEY.to_string(),
            self.sidebar_collapsed.to_string(),
        );
        entries.insert(
            SELECTED_PERSONA_KEY.to_string(),
            self.selected_persona.clone(),
        );
        entries
    }
}
