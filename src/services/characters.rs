use crate::core::error::{BookError, BookResult};
use crate::core::state::Character;
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_CHARACTERS: [(&str, &str, &str); 4] = [
    (
        "james",
        "James",
        "A black and white border collie stuffed animal, loyal and brave, floppy ears",
    ),
    (
        "cheetah",
        "Cheetah",
        "A cheetah stuffed animal with yellow fur and black spots, wears cool sunglasses, carries a skateboard, confident attitude",
    ),
    (
        "red",
        "Red",
        "A red panda stuffed animal with reddish-brown and white fur, wears a backwards baseball cap, rides a small scooter, friendly grin",
    ),
    (
        "bowie",
        "Bowie",
        "A small white poodle stuffed animal with heterochromia (two different colored eyes - one blue, one brown), fluffy curly fur, nervous but sweet",
    ),
];

const DEFAULT_SELECTION: [&str; 2] = ["james", "cheetah"];

/// Session-scoped catalog of characters plus the current selection.
#[derive(Debug, Clone)]
pub struct CharacterRegistry {
    characters: Vec<Character>,
    selected: Vec<String>,
}

impl Default for CharacterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CharacterRegistry {
    pub fn with_defaults() -> Self {
        let characters = DEFAULT_CHARACTERS
            .iter()
            .map(|(id, name, description)| Character {
                id: id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                is_default: true,
            })
            .collect();
        Self {
            characters,
            selected: DEFAULT_SELECTION.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn all(&self) -> &[Character] {
        &self.characters
    }

    pub fn get(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.iter().any(|s| s == id)
    }

    /// Selected characters, in catalog order.
    pub fn selected(&self) -> Vec<Character> {
        self.characters
            .iter()
            .filter(|c| self.is_selected(&c.id))
            .cloned()
            .collect()
    }

    pub fn set_selection(&mut self, ids: &[String]) -> BookResult<()> {
        if let Some(unknown) = ids.iter().find(|id| self.get(id).is_none()) {
            return Err(BookError::Workflow(format!("unknown character '{}'", unknown)));
        }
        self.selected = ids.to_vec();
        Ok(())
    }

    /// Appends a custom character and selects it. Blank fields are ignored.
    pub fn add_custom(&mut self, name: &str, description: &str) -> Option<&Character> {
        let name = name.trim();
        let description = description.trim();
        if name.is_empty() || description.is_empty() {
            return None;
        }

        let id = self.fresh_id();
        self.characters.push(Character {
            id: id.clone(),
            name: name.to_string(),
            description: description.to_string(),
            is_default: false,
        });
        self.selected.push(id);
        self.characters.last()
    }

    fn fresh_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        loop {
            let id = format!("custom-{}-{:04x}", millis, rand::random::<u16>());
            if self.get(&id).is_none() {
                return id;
            }
        }
    }
}

/// Emoji shown next to a character in the picker.
pub fn badge(character: &Character) -> &'static str {
    if !character.is_default {
        return "⭐";
    }
    match character.id.as_str() {
        "james" => "🐕",
        "cheetah" => "🐆",
        "red" => "🦝",
        "bowie" => "🐩",
        _ => "•",
    }
}
