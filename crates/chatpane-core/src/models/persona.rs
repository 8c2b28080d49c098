use serde::Serialize;

/// Id of the persona used when nothing else resolves.
pub const DEFAULT_PERSONA_ID: &str = "default";

/// Accent colour of a persona, used for badges and avatars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaColor {
    Blue,
    Green,
    Purple,
    Orange,
    Pink,
}

impl PersonaColor {
    /// CSS classes for a trait badge in this colour.
    pub fn badge_class(self) -> &'static str {
        match self {
            Self::Blue => {
                "bg-blue-50 text-blue-700 border-blue-200 dark:bg-blue-950 dark:text-blue-300 dark:border-blue-800"
            }
            Self::Green => {
                "bg-green-50 text-green-700 border-green-200 dark:bg-green-950 dark:text-green-300 dark:border-green-800"
            }
            Self::Purple => {
                "bg-purple-50 text-purple-700 border-purple-200 dark:bg-purple-950 dark:text-purple-300 dark:border-purple-800"
            }
            Self::Orange => {
                "bg-orange-50 text-orange-700 border-orange-200 dark:bg-orange-950 dark:text-orange-300 dark:border-orange-800"
            }
            Self::Pink => {
                "bg-pink-50 text-pink-700 border-pink-200 dark:bg-pink-950 dark:text-pink-300 dark:border-pink-800"
            }
        }
    }
}

/// An assistant personality profile. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Persona {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    pub traits: &'static [&'static str],
    pub color: PersonaColor,
}

const BUILTIN_PERSONAS: &[Persona] = &[
    Persona {
        id: DEFAULT_PERSONA_ID,
        name: "AI Assistant",
        icon: "🤖",
        description: "A balanced, general-purpose assistant for everyday questions.",
        traits: &["Helpful", "Balanced", "Clear"],
        color: PersonaColor::Blue,
    },
    Persona {
        id: "developer",
        name: "Code Mentor",
        icon: "💻",
        description: "Explains code, reviews designs and helps debug tricky problems.",
        traits: &["Precise", "Technical", "Pragmatic"],
        color: PersonaColor::Green,
    },
    Persona {
        id: "writer",
        name: "Creative Writer",
        icon: "✍️",
        description: "Drafts, edits and polishes prose with an eye for tone.",
        traits: &["Creative", "Expressive", "Thoughtful"],
        color: PersonaColor::Purple,
    },
    Persona {
        id: "teacher",
        name: "Patient Teacher",
        icon: "📚",
        description: "Breaks topics down step by step and checks understanding.",
        traits: &["Patient", "Encouraging", "Structured"],
        color: PersonaColor::Orange,
    },
    Persona {
        id: "friend",
        name: "Friendly Companion",
        icon: "😊",
        description: "Casual conversation partner who listens and cheers you on.",
        traits: &["Warm", "Casual", "Empathetic"],
        color: PersonaColor::Pink,
    },
];

/// Static lookup of personas by id.
#[derive(Debug, Clone, Copy)]
pub struct PersonaRegistry {
    personas: &'static [Persona],
}

impl PersonaRegistry {
    pub fn builtin() -> Self {
        Self {
            personas: BUILTIN_PERSONAS,
        }
    }

    pub fn all(&self) -> &'static [Persona] {
        self.personas
    }

    pub fn get(&self, id: &str) -> Option<&'static Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// Look up a persona, falling back to the default one for unknown ids.
    pub fn resolve(&self, id: &str) -> &'static Persona {
        self.get(id).unwrap_or_else(|| self.default_persona())
    }

    pub fn default_persona(&self) -> &'static Persona {
        &self.personas[0]
    }
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_persona_is_first() {
        let registry = PersonaRegistry::builtin();
        assert_eq!(registry.default_persona().id, DEFAULT_PERSONA_ID);
        assert_eq!(registry.all()[0].id, DEFAULT_PERSONA_ID);
    }

    #[test]
    fn test_resolve_known_persona() {
        let registry = PersonaRegistry::builtin();
        let persona = registry.resolve("developer");
        assert_eq!(persona.name, "Code Mentor");
        assert!(persona.traits.contains(&"Technical"));
    }

    #[test]
    fn test_resolve_unknown_falls_back_to_default() {
        let registry = PersonaRegistry::builtin();
        assert!(registry.get("pirate").is_none());
        assert_eq!(registry.resolve("pirate").id, DEFAULT_PERSONA_ID);
        assert_eq!(registry.resolve("").id, DEFAULT_PERSONA_ID);
    }

    #[test]
    fn test_persona_ids_are_unique() {
        let registry = PersonaRegistry::builtin();
        let mut ids: Vec<&str> = registry.all().iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), registry.all().len());
    }

    #[test]
    fn test_badge_class_matches_color() {
        assert!(PersonaColor::Green.badge_class().contains("text-green-700"));
        assert!(PersonaColor::Pink.badge_class().contains("dark:bg-pink-950"));
    }
}
