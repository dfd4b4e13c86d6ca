use crate::llm::Message;

/// What kind of line a transcript entry is rendered as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Assistant,
    ToolCall,
    ToolResult,
    Error,
}

/// A transcript line as displayed in the chat pane
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub kind: EntryKind,
    pub content: String,
}

const TOOL_RESULT_PREVIEW_CHARS: usize = 160;

impl TranscriptEntry {
    pub fn new(kind: EntryKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(EntryKind::Error, content)
    }

    /// Entries shown for one history message. The system prompt is hidden.
    pub fn from_message(message: &Message) -> Vec<Self> {
        match message {
            Message::System { .. } => Vec::new(),
            Message::User { content } => vec![Self::new(EntryKind::User, content.as_str())],
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut entries = Vec::new();
                if !content.trim().is_empty() {
                    entries.push(Self::new(EntryKind::Assistant, content.as_str()));
                }
                entries.extend(tool_calls.iter().map(|call| {
                    Self::new(
                        EntryKind::ToolCall,
                        format!("{}({})", call.name, call.arguments),
                    )
                }));
                entries
            }
            Message::ToolResult { name, content, .. } => {
                vec![Self::new(
                    EntryKind::ToolResult,
                    format!("{} -> {}", name, preview(content)),
                )]
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            EntryKind::User => "You",
            EntryKind::Assistant => "Querymancer",
            EntryKind::ToolCall => "Tool",
            EntryKind::ToolResult => "Result",
            EntryKind::Error => "Error",
        }
    }
}

fn preview(content: &str) -> String {
    let flat = content.replace('\n', " / ");
    if flat.chars().count() <= TOOL_RESULT_PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(TOOL_RESULT_PREVIEW_CHARS).collect();
    format!("{}...", cut)
}
