/// Inline keyboard (rows of buttons) used for persona selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// Empty rows are dropped; Telegram rejects them.
    pub fn non_empty_rows(&self) -> impl Iterator<Item = &Vec<InlineButton>> {
        self.rows.iter().filter(|r| !r.is_empty())
    }
}

/// Reference to a transport-side file (Telegram `file_id`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileRef(pub String);
