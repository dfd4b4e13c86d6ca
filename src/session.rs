use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::llm::{Message, Role};

const SYSTEM_PROMPT: &str = "You are Querymancer, a master database engineer with exceptional \
expertise in SQL query construction and optimization. You answer questions about the attached \
SQLite database and nothing else.

Use the available tools to explore the database before answering:
- list_tables to discover which tables exist
- describe_table to read a table's schema
- sample_rows to see example values
- count_rows to count the rows of a table
- run_query to execute a single read-only SELECT statement

Rules:
- Base every answer on data returned by the tools, never on assumptions.
- Only read data. Refuse any request to insert, update, delete, drop or otherwise modify the \
database, and never attempt such statements.
- Keep queries small: aggregate, filter and use LIMIT.
- If a tool returns an error, fix the call or explain the problem to the user.
- Answer in clear, concise natural language and include the relevant numbers.";

/// The ordered transcript of one session. Starts with the system message and only grows.
#[derive(Debug, Clone)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn create() -> Self {
        Self {
            messages: vec![Message::system(SYSTEM_PROMPT)],
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Messages a user should see: everything except the system prompt.
    pub fn visible(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role() != Role::System)
    }
}

/// One chat session, owning its history until it ends.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Local>,
    pub history: History,
}

impl Session {
    pub fn start() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Local::now(),
            history: History::create(),
        }
    }

    /// Close the session; its history is dropped with it.
    pub fn end(self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_has_single_system_message() {
        let history = History::create();
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].role(), Role::System);
        assert!(history.messages()[0].content().contains("SQLite database"));
        assert_eq!(history.visible().count(), 0);
    }

    #[test]
    fn test_append_keeps_order() {
        let mut history = History::create();
        history.append(Message::user("first"));
        history.append(Message::assistant("second"));
        let contents: Vec<&str> = history.visible().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert_eq!(history.messages()[0].role(), Role::System);
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut a = Session::start();
        let b = Session::start();
        a.history.append(Message::user("hello"));
        assert_ne!(a.id, b.id);
        assert_eq!(b.history.len(), 1);
        assert_eq!(a.end(), 2);
    }
}
