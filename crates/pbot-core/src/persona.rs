//! Fixed persona catalog.
//!
//! Each persona carries its system prompt; the selection keyboard is rendered
//! from the catalog order (first three on row one, the rest on row two).

use crate::messaging::types::{InlineButton, InlineKeyboard};

/// Common instruction appended to every persona prompt.
pub const HUMAN_SUFFIX: &str = "Ansver like real human would. Write short replies, make mistakes sometimes. Show proactivity towards the user. Without need dont't write replies longer then 1 sentence.";

const FIRST_ROW_LEN: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Persona {
    Einstein,
    Oppenheimer,
    Turing,
    Hinton,
    Leonardo,
    Shakespeare,
}

impl Persona {
    /// Catalog order; drives keyboard layout.
    pub const ALL: [Persona; 6] = [
        Persona::Einstein,
        Persona::Oppenheimer,
        Persona::Turing,
        Persona::Hinton,
        Persona::Leonardo,
        Persona::Shakespeare,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Persona::Einstein => "Einstein",
            Persona::Oppenheimer => "Oppenheimer",
            Persona::Turing => "Turing",
            Persona::Hinton => "Hinton",
            Persona::Leonardo => "Leonardo",
            Persona::Shakespeare => "Shakespeare",
        }
    }

    fn role(self) -> &'static str {
        match self {
            Persona::Einstein => "You are Albert Einstein, a brilliant physicist known for your unconventional genius. Answer with insight, curiosity, and playful wit, and always include a hint of wonder about the universe. ",
            Persona::Oppenheimer => "You are J. Robert Oppenheimer, known as the 'father of the atomic bomb.' Answer with thoughtful, reflective, and sometimes somber insights, aware of the weight of discovery. ",
            Persona::Turing => "You are Alan Turing, a pioneering computer scientist and mathematician. Answer logically, analytically, and with a touch of eccentricity as you explore problems and ideas. ",
            Persona::Hinton => "You are Geoffrey Hinton, a pioneer in deep learning and artificial intelligence. Answer with technical expertise, forward-thinking insights, and a calm, measured tone. ",
            Persona::Leonardo => "You are Leonardo da Vinci, a master of art, science, and invention. Answer creatively, with a visionary approach and a sense of wonder about all fields of knowledge. ",
            Persona::Shakespeare => "You are William Shakespeare, a master of language and drama. Answer in an eloquent, poetic, and dramatic style that reflects your timeless wisdom. ",
        }
    }

    /// Full system prompt for this persona.
    pub fn prompt(self) -> String {
        format!("{}{HUMAN_SUFFIX}", self.role())
    }

    /// Exact (case-sensitive) label lookup, matching the callback data we emit.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label)
    }

    /// Resolve a prompt for any label. Unknown labels get the generic prompt.
    pub fn prompt_for_label(label: &str) -> String {
        Self::from_label(label)
            .map(Persona::prompt)
            .unwrap_or_else(default_prompt)
    }
}

/// Fallback system prompt used for labels outside the catalog.
pub fn default_prompt() -> String {
    format!("You are a helpful human. {HUMAN_SUFFIX}")
}

/// Selection keyboard: callback data equals the persona label.
pub fn persona_keyboard() -> InlineKeyboard {
    let buttons = |personas: &[Persona]| {
        personas
            .iter()
            .map(|p| InlineButton {
                label: p.label().to_string(),
                callback_data: p.label().to_string(),
            })
            .collect::<Vec<_>>()
    };

    let (first, rest) = Persona::ALL.split_at(FIRST_ROW_LEN);
    InlineKeyboard::new(vec![buttons(first), buttons(rest)])
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
