//! The task list application.
//!
//! Fetches `/todos` through a [`Query`] keyed on a retry counter, filters the
//! result by status and title, and toggles completion with a `PUT` mutation.

use std::io;
use std::sync::Arc;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ApiClient, Body};
use crate::application::Application;
use crate::command::{Action, Command};
use crate::subscription::Subscription;
use crate::subscription::http::{Mutation, MutationMethod, Query, QueryAction, QueryState, QueryUpdate, cycle_of};
use crate::subscription::terminal::TerminalEvents;
use crate::tasks::{StatusFilter, Task, filter_tasks};

pub const TASKS_PATH: &str = "/todos";

#[derive(Debug)]
pub enum Message {
    Terminal(Event),
    TerminalError(io::Error),
    Tasks(QueryUpdate<Vec<Task>>),
    Toggled { id: u64, action: QueryAction<Task> },
    SearchInput(char),
    SearchBackspace,
    NextFilter,
    SelectPrevious,
    SelectNext,
    ToggleSelected,
    Retry,
    Quit,
}

/// Startup parameters.
#[derive(Clone)]
pub struct Flags {
    pub client: Arc<ApiClient>,
    /// Subscribe to terminal input. Disabled when driving the app without a tty.
    pub keyboard: bool,
}

impl Flags {
    #[must_use]
    pub const fn new(client: Arc<ApiClient>) -> Self {
        Self { client, keyboard: true }
    }
}

pub struct TaskApp {
    client: Arc<ApiClient>,
    keyboard: bool,
    tasks: Vec<Task>,
    filtered: Vec<Task>,
    filter: StatusFilter,
    search: String,
    query: QueryState<Vec<Task>>,
    retries: u64,
    selected: usize,
    status: String,
    /// Cancelled on every refetch so pending toggles can't land on new data.
    mutations: CancellationToken,
}

impl TaskApp {
    fn tasks_query(&self) -> Query<Vec<Task>> {
        Query::new(Arc::clone(&self.client), TASKS_PATH).deps(&self.retries)
    }

    fn cycle(&self) -> u64 {
        cycle_of(&self.retries)
    }

    /// Search and filter controls only accept input once data is shown.
    #[must_use]
    pub const fn input_enabled(&self) -> bool {
        self.query.is_success()
    }

    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn filtered(&self) -> &[Task] {
        &self.filtered
    }

    #[must_use]
    pub const fn filter(&self) -> StatusFilter {
        self.filter
    }

    #[must_use]
    pub fn search(&self) -> &str {
        &self.search
    }

    #[must_use]
    pub const fn query_state(&self) -> &QueryState<Vec<Task>> {
        &self.query
    }

    #[must_use]
    pub const fn retries(&self) -> u64 {
        self.retries
    }

    #[must_use]
    pub const fn selected(&self) -> usize {
        self.selected
    }

    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    fn refilter(&mut self) {
        self.filtered = filter_tasks(&self.tasks, self.filter, &self.search);
        self.selected = self.selected.min(self.filtered.len().saturating_sub(1));
    }

    fn key_message(key: KeyEvent) -> Option<Message> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => Some(Message::Quit),
            KeyCode::Char('c') if ctrl => Some(Message::Quit),
            KeyCode::Char('r') if ctrl => Some(Message::Retry),
            KeyCode::F(5) => Some(Message::Retry),
            KeyCode::Char(c) if !ctrl => Some(Message::SearchInput(c)),
            KeyCode::Backspace => Some(Message::SearchBackspace),
            KeyCode::Tab => Some(Message::NextFilter),
            KeyCode::Up => Some(Message::SelectPrevious),
            KeyCode::Down => Some(Message::SelectNext),
            KeyCode::Enter => Some(Message::ToggleSelected),
            _ => None,
        }
    }

    fn on_tasks(&mut self, update: QueryUpdate<Vec<Task>>) {
        if update.cycle != self.cycle() {
            debug!(cycle = update.cycle, "dropping update from a replaced query cycle");
            return;
        }
        if let QueryAction::Success(tasks) = &update.action {
            self.tasks.clone_from(tasks);
            self.refilter();
        }
        self.query = std::mem::take(&mut self.query).reduce(update.action);
    }

    fn toggle_selected(&mut self) -> Command<Message> {
        let Some(task) = self.filtered.get(self.selected) else {
            return Command::none();
        };
        let id = task.id;
        let body = match Body::json(&task.toggled()) {
            Ok(body) => body,
            Err(err) => {
                warn!(id, error = %err, "failed to encode task");
                self.status = format!("Failed to update task: {err}");
                return Command::none();
            }
        };

        Mutation::<Task>::send(
            Arc::clone(&self.client),
            MutationMethod::Put,
            format!("{TASKS_PATH}/{id}"),
            body,
            self.mutations.clone(),
        )
        .map(move |action| Message::Toggled { id, action })
    }

    fn on_toggled(&mut self, id: u64, action: QueryAction<Task>) {
        match action {
            QueryAction::Start => self.status = format!("Updating task {id}..."),
            QueryAction::Success(updated) => {
                if let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) {
                    task.completed = updated.completed;
                }
                self.refilter();
                let state = if updated.completed { "completed" } else { "pending" };
                self.status = format!("Marked task {id} as {state}");
            }
            QueryAction::Error(err) => {
                warn!(id, error = %err, "task update failed");
                self.status = format!("Failed to update task {id}: {}", err.cause());
            }
        }
    }

    fn retry(&mut self) {
        self.retries += 1;
        self.mutations.cancel();
        self.mutations = CancellationToken::new();
        self.status.clear();
    }

    fn render_controls(&self, frame: &mut Frame<'_>, area: Rect) {
        let style = if self.input_enabled() {
            Style::default()
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let [search, filter] = Layout::horizontal([Constraint::Min(10), Constraint::Length(20)]).areas(area);

        let input = Paragraph::new(self.search.as_str())
            .style(style)
            .block(Block::default().borders(Borders::ALL).title("Search tasks..."));
        frame.render_widget(input, search);

        let select = Paragraph::new(self.filter.label())
            .style(style)
            .block(Block::default().borders(Borders::ALL).title("Status (Tab)"));
        frame.render_widget(select, filter);
    }

    fn render_body(&self, frame: &mut Frame<'_>, area: Rect) {
        match &self.query {
            QueryState::Loading { .. } => {
                let loading = Paragraph::new("Loading Data........")
                    .block(Block::default().borders(Borders::ALL).title("Tasks"));
                frame.render_widget(loading, area);
            }
            QueryState::Errored { err, .. } => {
                let [error, list] = Layout::vertical([Constraint::Length(6), Constraint::Min(0)]).areas(area);
                let lines = vec![
                    Line::from(format!("Cause: {}", err.cause())),
                    Line::from(format!("Description: {}", err.description().unwrap_or_default())),
                    Line::from(""),
                    Line::from("Press F5 or Ctrl-r to retry"),
                ];
                let panel = Paragraph::new(lines)
                    .style(Style::default().fg(Color::Red))
                    .wrap(Wrap { trim: true })
                    .block(Block::default().borders(Borders::ALL).title("API error"));
                frame.render_widget(panel, error);
                self.render_tasks(frame, list);
            }
            QueryState::Success { .. } => self.render_tasks(frame, area),
        }
    }

    fn render_tasks(&self, frame: &mut Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self
            .filtered
            .iter()
            .map(|task| {
                let (mark, style) = if task.completed {
                    ("✔ Completed", Style::default().fg(Color::Green))
                } else {
                    ("❌ Pending", Style::default())
                };
                ListItem::new(format!("{}  {mark}", task.title)).style(style)
            })
            .collect();

        let title = format!("Tasks ({}/{})", self.filtered.len(), self.tasks.len());
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_symbol("> ")
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

        let mut state = ListState::default();
        if !self.filtered.is_empty() {
            state.select(Some(self.selected));
        }
        frame.render_stateful_widget(list, area, &mut state);
    }
}

impl Application for TaskApp {
    type Message = Message;
    type Flags = Flags;

    fn new(flags: Flags) -> (Self, Command<Message>) {
        let app = Self {
            client: flags.client,
            keyboard: flags.keyboard,
            tasks: Vec::new(),
            filtered: Vec::new(),
            filter: StatusFilter::default(),
            search: String::new(),
            query: QueryState::default(),
            retries: 0,
            selected: 0,
            status: String::new(),
            mutations: CancellationToken::new(),
        };
        (app, Command::none())
    }

    fn update(&mut self, msg: Message) -> Command<Message> {
        match msg {
            Message::Terminal(Event::Key(key)) => match Self::key_message(key) {
                Some(msg) => self.update(msg),
                None => Command::none(),
            },
            Message::Terminal(_) => Command::none(),
            Message::TerminalError(err) => {
                warn!(error = %err, "terminal input failed");
                self.status = format!("Terminal error: {err}");
                Command::none()
            }
            Message::Tasks(update) => {
                self.on_tasks(update);
                Command::none()
            }
            Message::Toggled { id, action } => {
                self.on_toggled(id, action);
                Command::none()
            }
            Message::SearchInput(c) if self.input_enabled() => {
                self.search.push(c);
                self.refilter();
                Command::none()
            }
            Message::SearchBackspace if self.input_enabled() => {
                self.search.pop();
                self.refilter();
                Command::none()
            }
            Message::NextFilter if self.input_enabled() => {
                self.filter = self.filter.next();
                self.refilter();
                Command::none()
            }
            Message::SelectPrevious => {
                self.selected = self.selected.saturating_sub(1);
                Command::none()
            }
            Message::SelectNext => {
                if self.selected + 1 < self.filtered.len() {
                    self.selected += 1;
                }
                Command::none()
            }
            Message::ToggleSelected if self.input_enabled() => self.toggle_selected(),
            Message::Retry if !self.query.is_loading() => {
                self.retry();
                Command::none()
            }
            Message::Quit => Command::effect(Action::Quit),
            Message::SearchInput(_)
            | Message::SearchBackspace
            | Message::NextFilter
            | Message::ToggleSelected
            | Message::Retry => Command::none(),
        }
    }

    fn view(&self, frame: &mut Frame<'_>) {
        let [title, controls, body, status] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .areas(frame.area());

        let header = Paragraph::new("Task List (Esc: quit, Tab: filter, Enter: toggle, F5: retry)")
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(header, title);

        self.render_controls(frame, controls);
        self.render_body(frame, body);

        let footer = Paragraph::new(self.status.as_str())
            .block(Block::default().borders(Borders::ALL).title("Status"));
        frame.render_widget(footer, status);
    }

    fn subscriptions(&self) -> Vec<Subscription<Message>> {
        let mut subs = vec![Subscription::new(self.tasks_query()).map(Message::Tasks)];
        if self.keyboard {
            subs.push(Subscription::new(TerminalEvents::new()).map(|result| match result {
                Ok(event) => Message::Terminal(event),
                Err(e) => Message::TerminalError(e),
            }));
        }
        subs
    }
}
