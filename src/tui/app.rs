use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    io,
    path::PathBuf,
    time::{Duration, Instant},
};
use tracing::{error, info};

use crate::agent::Agent;
use crate::config::Config;
use crate::db::DatabaseInfo;
use crate::session::Session;
use crate::tui::{
    message::{EntryKind, TranscriptEntry},
    ui::render_ui,
};

static LOADING_MESSAGES: [&str; 20] = [
    "Consulting the ancient tomes of SQL wisdom...",
    "Casting query spells on your database...",
    "Summoning data from the digital realms...",
    "Deciphering your request into database runes...",
    "Brewing a potion of perfect query syntax...",
    "Channeling the power of database magic...",
    "Translating your words into the language of tables...",
    "Waving my SQL wand to fetch your results...",
    "Performing database divination...",
    "Aligning the database stars for optimal results...",
    "Consulting with the database spirits...",
    "Transforming natural language into database incantations...",
    "Peering into the crystal ball of your database...",
    "Opening a portal to your data dimension...",
    "Enchanting your request with SQL magic...",
    "Invoking the ancient art of query optimization...",
    "Reading between the tables to find your answer...",
    "Conjuring insights from your database depths...",
    "Weaving a tapestry of joins and filters...",
    "Preparing a feast of data for your consideration...",
];

/// Input mode for the TUI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// TUI application state
pub struct QuerymancerApp {
    agent: Agent,
    session: Session,
    database_info: Result<DatabaseInfo, String>,
    app_home: PathBuf,

    // Failed turns, keyed by the history length at the time they happened
    errors: Vec<(usize, String)>,

    // Input state
    input: String,
    input_history: Vec<String>,
    input_history_index: usize,
    pending_question: Option<String>,

    // Loading state
    is_loading: bool,
    loading_message: &'static str,
    rng: StdRng,

    // Lines scrolled up from the bottom of the transcript
    scroll_back: u16,
}

impl QuerymancerApp {
    pub fn new(
        agent: Agent,
        database_info: Result<DatabaseInfo, String>,
        config: &Config,
    ) -> Self {
        Self {
            agent,
            session: Session::start(),
            database_info,
            app_home: config.app_home.clone(),
            errors: Vec::new(),
            input: String::new(),
            input_history: Vec::new(),
            input_history_index: 0,
            pending_question: None,
            is_loading: false,
            loading_message: LOADING_MESSAGES[0],
            rng: StdRng::seed_from_u64(config.seed),
            scroll_back: 0,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn loading_message(&self) -> &str {
        self.loading_message
    }

    pub fn model_name(&self) -> &str {
        self.agent.model().model_name()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.agent
            .model()
            .tools()
            .iter()
            .map(|t| t.name.as_str())
            .collect()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn database_info(&self) -> &Result<DatabaseInfo, String> {
        &self.database_info
    }

    pub fn app_home(&self) -> &PathBuf {
        &self.app_home
    }

    pub fn scroll_back(&self) -> u16 {
        self.scroll_back
    }

    /// The chat transcript: history, failed turns in place, then the question in flight.
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        let mut entries = Vec::new();
        let mut errors = self.errors.iter().peekable();

        for (index, message) in self.session.history.messages().iter().enumerate() {
            entries.extend(TranscriptEntry::from_message(message));
            while let Some((_, err)) = errors.next_if(|(at, _)| *at == index + 1) {
                entries.push(TranscriptEntry::error(err.as_str()));
            }
        }
        entries.extend(errors.map(|(_, err)| TranscriptEntry::error(err.as_str())));

        if let Some(question) = &self.pending_question {
            entries.push(TranscriptEntry::new(EntryKind::User, question.as_str()));
        }
        entries
    }

    pub fn handle_input(&mut self, c: char) {
        self.input.push(c);
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    pub fn scroll_up(&mut self) {
        self.scroll_back = self.scroll_back.saturating_add(5);
    }

    pub fn scroll_down(&mut self) {
        self.scroll_back = self.scroll_back.saturating_sub(5);
    }

    /// Go to the previous input in history
    pub fn previous_input(&mut self) {
        if self.input_history.is_empty() {
            return;
        }

        if self.input_history_index > 0 {
            self.input_history_index -= 1;
            self.input = self.input_history[self.input_history_index].clone();
        }
    }

    /// Go to the next input in history
    pub fn next_input(&mut self) {
        if self.input_history.is_empty() {
            return;
        }

        if self.input_history_index + 1 < self.input_history.len() {
            self.input_history_index += 1;
            self.input = self.input_history[self.input_history_index].clone();
        } else {
            self.input_history_index = self.input_history.len();
            self.input.clear();
        }
    }

    /// Queue the current input as a question
    pub fn submit_message(&mut self) {
        if self.input.trim().is_empty() || self.is_loading {
            return;
        }

        let question = self.input.trim().to_string();
        self.input_history.push(question.clone());
        self.input_history_index = self.input_history.len();
        self.pending_question = Some(question);

        self.input.clear();
        self.scroll_back = 0;
        self.is_loading = true;
        if let Some(message) = LOADING_MESSAGES.choose(&mut self.rng) {
            self.loading_message = *message;
        }
    }

    /// Answer the queued question; a failed turn becomes an error entry
    pub async fn process_response(&mut self) {
        let Some(question) = self.pending_question.take() else {
            self.is_loading = false;
            return;
        };

        let history = &mut self.session.history;
        if let Err(err) = self.agent.ask(&question, history).await {
            error!(error = %err, "Question failed");
            self.errors.push((history.len(), err.to_string()));
        }
        self.is_loading = false;
    }
}

/// TUI-specific state
struct TuiState {
    input_mode: InputMode,
    last_tick: Instant,
}

impl Default for TuiState {
    fn default() -> Self {
        Self {
            input_mode: InputMode::Editing,
            last_tick: Instant::now(),
        }
    }
}

/// Run the chat surface until the user quits
pub async fn run(
    config: &Config,
    agent: Agent,
    database_info: Result<DatabaseInfo, String>,
) -> Result<()> {
    let mut app = QuerymancerApp::new(agent, database_info, config);
    info!(
        session = %app.session.id,
        started_at = %app.session.started_at,
        "Session started"
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut state = TuiState::default();
    let tick_rate = Duration::from_millis(100);
    let result = run_app(&mut terminal, &mut app, &mut state, tick_rate).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    let messages = app.session.end();
    info!(messages, "Session ended");

    result
}

/// Draw one frame of the chat surface
fn draw<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &QuerymancerApp,
    mode: InputMode,
) -> io::Result<()> {
    terminal.draw(|f| render_ui(f, app, mode))?;
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut QuerymancerApp,
    state: &mut TuiState,
    tick_rate: Duration,
) -> Result<()> {
    loop {
        draw(terminal, app, state.input_mode)?;

        // A question submitted last iteration is on screen with its loading message
        if app.is_loading() {
            app.process_response().await;
            continue;
        }

        let timeout = tick_rate
            .checked_sub(state.last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        return Ok(());
                    }
                    match state.input_mode {
                        InputMode::Normal => match key.code {
                            KeyCode::Char('e') => state.input_mode = InputMode::Editing,
                            KeyCode::Char('q') => return Ok(()),
                            KeyCode::PageUp | KeyCode::Up => app.scroll_up(),
                            KeyCode::PageDown | KeyCode::Down => app.scroll_down(),
                            _ => {}
                        },
                        InputMode::Editing => match key.code {
                            KeyCode::Enter => app.submit_message(),
                            KeyCode::Esc => state.input_mode = InputMode::Normal,
                            KeyCode::Char(c) => app.handle_input(c),
                            KeyCode::Backspace => app.backspace(),
                            KeyCode::Up => app.previous_input(),
                            KeyCode::Down => app.next_input(),
                            KeyCode::PageUp => app.scroll_up(),
                            KeyCode::PageDown => app.scroll_down(),
                            _ => {}
                        },
                    }
                }
            }
        }

        if state.last_tick.elapsed() >= tick_rate {
            state.last_tick = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::shop_database;
    use crate::error::AgentError;
    use crate::llm::{BoundModel, LlmClient, Message, ModelResponse, ToolDefinition};
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use ratatui::backend::TestBackend;

    struct FailingClient;

    #[async_trait]
    impl LlmClient for FailingClient {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn chat(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
        ) -> Result<ModelResponse, AgentError> {
            Err(AgentError::ModelRequest("backend down".into()))
        }
    }

    fn app() -> (tempfile::TempDir, QuerymancerApp) {
        let (dir, db) = shop_database();
        let info = db.info().map_err(|e| e.to_string());
        let registry = ToolRegistry::new(db);
        let model = BoundModel::new(Box::new(FailingClient), registry.list_tools().to_vec());
        let config = Config::from_lookup(|key| match key {
            "APP_HOME" => Some(dir.path().display().to_string()),
            _ => None,
        })
        .unwrap();
        let app = QuerymancerApp::new(Agent::new(model, registry, 3), info, &config);
        (dir, app)
    }

    fn screen(app: &QuerymancerApp) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        draw(&mut terminal, app, InputMode::Editing).unwrap();
        let buffer = terminal.backend().buffer();
        let width = usize::from(buffer.area.width);
        buffer
            .content
            .chunks(width)
            .map(|row| row.iter().map(|cell| cell.symbol.as_str()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn type_text(app: &mut QuerymancerApp, text: &str) {
        for c in text.chars() {
            app.handle_input(c);
        }
    }

    #[test]
    fn test_submit_queues_question_and_shows_it() {
        let (_dir, mut app) = app();
        type_text(&mut app, "  how many users?  ");
        app.submit_message();

        assert!(app.is_loading());
        assert!(app.input().is_empty());
        assert!(LOADING_MESSAGES.contains(&app.loading_message()));
        let transcript = app.transcript();
        assert_eq!(
            transcript,
            vec![TranscriptEntry::new(EntryKind::User, "how many users?")]
        );
    }

    #[test]
    fn test_blank_input_is_ignored() {
        let (_dir, mut app) = app();
        type_text(&mut app, "   ");
        app.submit_message();
        assert!(!app.is_loading());
    }

    #[test]
    fn test_input_history_navigation() {
        let (_dir, mut app) = app();
        for q in ["first", "second"] {
            type_text(&mut app, q);
            app.submit_message();
            app.is_loading = false;
            app.pending_question = None;
        }

        app.previous_input();
        assert_eq!(app.input(), "second");
        app.previous_input();
        assert_eq!(app.input(), "first");
        app.next_input();
        assert_eq!(app.input(), "second");
        app.next_input();
        assert_eq!(app.input(), "");
    }

    #[tokio::test]
    async fn test_failed_turn_becomes_error_entry() {
        let (_dir, mut app) = app();
        type_text(&mut app, "tables?");
        app.submit_message();
        app.process_response().await;

        assert!(!app.is_loading());
        let transcript = app.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].kind, EntryKind::User);
        assert_eq!(transcript[1].kind, EntryKind::Error);
        assert!(transcript[1].content.contains("backend down"));
        assert_eq!(app.session().history.len(), 2);
    }

    #[tokio::test]
    async fn test_loading_message_is_drawn_while_question_is_in_flight() {
        let (_dir, mut app) = app();
        type_text(&mut app, "how many orders?");
        app.submit_message();

        let frame = screen(&app);
        assert!(frame.contains(app.loading_message()));
        assert!(frame.contains("You: how many orders?"));

        app.process_response().await;
        let frame = screen(&app);
        let loading = LOADING_MESSAGES.iter().any(|m| frame.contains(m));
        assert!(!loading);
        assert!(frame.contains("Error: "));
    }
}
