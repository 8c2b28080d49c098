//! Global keyboard shortcuts of the chat window.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    /// Cmd on macOS
    pub meta: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Modifiers {
    /// Ctrl or Cmd, whichever the platform uses for commands.
    pub fn command(self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// Key name as reported by the platform, e.g. `"n"`, `"/"`, `"Escape"`.
    pub key: String,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>, modifiers: Modifiers) -> Self {
        Self {
            key: key.into(),
            modifiers,
        }
    }

    pub fn plain(key: impl Into<String>) -> Self {
        Self::new(key, Modifiers::default())
    }
}

/// What currently holds keyboard focus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Focus {
    #[default]
    None,
    TextInput,
    TextArea,
    Other,
}

impl Focus {
    fn is_text_entry(self) -> bool {
        matches!(self, Focus::TextInput | Focus::TextArea)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    NewChat,
    FocusSearch,
    CloseSidebar,
}

/// Map a key press to a shortcut action, if any applies.
pub fn resolve_shortcut(event: &KeyEvent, focus: Focus, sidebar_open: bool) -> Option<ShortcutAction> {
    let modifiers = event.modifiers;

    if modifiers.command() && event.key.eq_ignore_ascii_case("n") {
        return Some(ShortcutAction::NewChat);
    }
    if !modifiers.command() && event.key == "/" && !focus.is_text_entry() {
        return Some(ShortcutAction::FocusSearch);
    }
    if event.key == "Escape" && sidebar_open {
        return Some(ShortcutAction::CloseSidebar);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctrl() -> Modifiers {
        Modifiers {
            ctrl: true,
            ..Default::default()
        }
    }

    fn meta() -> Modifiers {
        Modifiers {
            meta: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_new_chat_with_ctrl_or_cmd() {
        for modifiers in [ctrl(), meta()] {
            assert_eq!(
                resolve_shortcut(&KeyEvent::new("n", modifiers), Focus::TextArea, false),
                Some(ShortcutAction::NewChat)
            );
            assert_eq!(
                resolve_shortcut(&KeyEvent::new("N", modifiers), Focus::None, false),
                Some(ShortcutAction::NewChat)
            );
        }
        assert_eq!(resolve_shortcut(&KeyEvent::plain("n"), Focus::None, false), None);
    }

    #[test]
    fn test_slash_focuses_search_outside_text_fields() {
        let slash = KeyEvent::plain("/");
        assert_eq!(
            resolve_shortcut(&slash, Focus::None, false),
            Some(ShortcutAction::FocusSearch)
        );
        assert_eq!(
            resolve_shortcut(&slash, Focus::Other, true),
            Some(ShortcutAction::FocusSearch)
        );
        assert_eq!(resolve_shortcut(&slash, Focus::TextInput, false), None);
        assert_eq!(resolve_shortcut(&slash, Focus::TextArea, false), None);
        assert_eq!(
            resolve_shortcut(&KeyEvent::new("/", ctrl()), Focus::None, false),
            None
        );
    }

    #[test]
    fn test_escape_closes_open_sidebar() {
        let escape = KeyEvent::plain("Escape");
        assert_eq!(
            resolve_shortcut(&escape, Focus::TextArea, true),
            Some(ShortcutAction::CloseSidebar)
        );
        assert_eq!(resolve_shortcut(&escape, Focus::None, false), None);
    }
}
