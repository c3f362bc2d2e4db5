use anyhow::{Context, Result};
use ratatui::widgets::ListState;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::client::{BackendClient, ChatResponse, DigResponse};
use crate::config::Config;
use crate::conflict::ConflictSet;
use crate::error::{ClientError, VoiceError};
use crate::markup;
use crate::plan::{AccountPlan, MessageBody, Section};
use crate::session::{SessionContext, SessionId};
use crate::voice::VoiceInput;

pub const SEND_ERROR_TEXT: &str = "❌ Error: Could not reach server.";
pub const RESET_GREETING: &str = "🔄 Session reset. How can I help?";
pub const SECTION_UPDATED_TEXT: &str = "🔄 Section updated.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub sender: Sender,
    pub body: MessageBody,
    /// Characters shown so far while the reveal effect runs; `None` means all
    pub visible_chars: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Idle,
    AwaitingResponse,
}

/// The section editor modal
#[derive(Debug, Clone)]
pub struct EditorState {
    pub section: Section,
    pub content: String,
    /// Cursor as a character index into `content`
    pub cursor: usize,
    pub saving: bool,
}

impl EditorState {
    pub fn title(&self) -> String {
        format!("Edit: {}", self.section.as_str())
    }
}

/// Character-by-character reveal of one bot message
#[derive(Debug, Clone)]
pub struct Reveal {
    message_idx: usize,
    total: usize,
    started: Instant,
    delay: Duration,
    /// Banner to raise once the reply is fully shown
    then_conflicts: Option<ConflictSet>,
}

impl Reveal {
    pub fn visible_at(&self, now: Instant) -> usize {
        let elapsed = now.saturating_duration_since(self.started).as_millis();
        let delay = self.delay.as_millis().max(1);
        let typed = (elapsed / delay + 1).min(self.total as u128);
        typed as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Chat,
    Edit(Section),
    Dig,
    Reset,
    Voice,
}

#[derive(Debug)]
pub enum Outcome {
    Chat(Result<ChatResponse, ClientError>),
    Edit(Section, Result<ChatResponse, ClientError>),
    Dig(Result<DigResponse, ClientError>),
    Reset(Result<(), ClientError>),
    Voice(Result<String, VoiceError>),
}

pub struct PendingRequest {
    kind: RequestKind,
    generation: u64,
    handle: JoinHandle<Outcome>,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub session: SessionContext,
    pub client: BackendClient,
    pub voice: VoiceInput,
    pub typing_delay: Duration,
    pub export_path: PathBuf,

    // Transcript
    pub messages: Vec<ChatMessage>,
    pub scroll_back: u16,
    pub chat_height: u16, // Inner height of the transcript area, set during render
    pub latest_plan: Option<AccountPlan>,

    // Input box
    pub input: String,
    pub input_cursor: usize, // cursor position in input (chars)

    // Loader
    pub loading: bool,
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Conflict banner; visible while Some
    pub conflicts: Option<ConflictSet>,
    pub digging: bool,

    // Section picker and editor modal
    pub show_section_picker: bool,
    pub section_picker_state: ListState,
    pub editor: Option<EditorState>,

    pub listening: bool,
    pub status: Option<String>,

    reveal: Option<Reveal>,
    pending: Vec<PendingRequest>,
}

impl App {
    pub fn new(config: &Config) -> Self {
        Self {
            should_quit: false,
            session: SessionContext::new(SessionId::new(config.session_id.clone())),
            client: BackendClient::new(&config.base_url),
            voice: VoiceInput::detect(config.voice_command.as_deref(), &config.voice_lang),
            typing_delay: Duration::from_millis(config.typing_delay_ms),
            export_path: config.export_path.clone(),

            messages: Vec::new(),
            scroll_back: 0,
            chat_height: 0,
            latest_plan: None,

            input: String::new(),
            input_cursor: 0,

            loading: false,
            animation_frame: 0,

            conflicts: None,
            digging: false,

            show_section_picker: false,
            section_picker_state: ListState::default(),
            editor: None,

            listening: false,
            status: None,

            reveal: None,
            pending: Vec::new(),
        }
    }

    pub fn mode(&self) -> ChatMode {
        if self.loading {
            ChatMode::AwaitingResponse
        } else {
            ChatMode::Idle
        }
    }

    pub fn is_revealing(&self) -> bool {
        self.reveal.is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Append to the transcript and jump to the newest entry
    pub fn add_message(&mut self, sender: Sender, body: MessageBody) -> usize {
        if let MessageBody::Plan(plan) = &body {
            self.latest_plan = Some(plan.clone());
        }
        self.messages.push(ChatMessage {
            sender,
            body,
            visible_chars: None,
        });
        self.scroll_back = 0;
        self.messages.len() - 1
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll_back = self.scroll_back.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
    }

    pub fn page_lines(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    fn add_bot_text(&mut self, text: impl Into<String>) {
        self.add_message(Sender::Bot, MessageBody::Text(text.into()));
    }

    fn spawn<F>(&mut self, kind: RequestKind, request: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        self.pending.push(PendingRequest {
            kind,
            generation: self.session.generation(),
            handle: tokio::spawn(request),
        });
    }

    // Send flow

    pub fn send_message(&mut self) {
        let message = self.input.trim().to_string();
        if message.is_empty() || self.loading {
            return;
        }

        self.add_message(Sender::User, MessageBody::Text(message.clone()));
        self.input.clear();
        self.input_cursor = 0;
        self.loading = true;

        tracing::info!(chars = message.chars().count(), "sending chat message");
        let client = self.client.clone();
        let session = self.session.id.clone();
        self.spawn(RequestKind::Chat, async move {
            Outcome::Chat(client.chat(&session, &message).await)
        });
    }

    /// Clear the transcript locally and ask the backend to forget the session
    pub fn reset(&mut self) {
        self.messages.clear();
        self.latest_plan = None;
        self.conflicts = None;
        self.digging = false;
        self.reveal = None;
        self.loading = false;
        self.show_section_picker = false;
        if let Some(editor) = self.editor.as_mut() {
            editor.saving = false;
        }
        let generation = self.session.advance();
        tracing::info!(generation, "session reset");

        self.add_bot_text(RESET_GREETING);

        let client = self.client.clone();
        let session = self.session.id.clone();
        self.spawn(RequestKind::Reset, async move {
            Outcome::Reset(client.reset_with_fallback(&session).await)
        });
    }

    // Conflict banner

    fn show_conflicts(&mut self, conflicts: ConflictSet) {
        tracing::info!(topics = conflicts.len(), "conflicting data reported");
        for conflict in conflicts.iter() {
            let sources: Vec<&str> = conflict
                .values
                .iter()
                .flat_map(|v| v.sources.iter().map(String::as_str))
                .collect();
            tracing::debug!(topic = %conflict.topic, ?sources, "conflict");
        }
        self.conflicts = Some(conflicts);
    }

    pub fn banner_text(&self) -> Option<String> {
        self.conflicts.as_ref().map(ConflictSet::banner_text)
    }

    /// Ask the backend to reconcile the first conflicting topic
    pub fn dig_deeper(&mut self) {
        if self.digging {
            return;
        }
        let Some(topic) = self.conflicts.as_ref().and_then(|c| c.first_topic()).map(str::to_string) else {
            return;
        };

        self.digging = true;
        tracing::info!(%topic, "digging deeper");
        let client = self.client.clone();
        let session = self.session.id.clone();
        self.spawn(RequestKind::Dig, async move {
            Outcome::Dig(client.dig_deeper(&session, &topic).await)
        });
    }

    // Section picker and editor

    pub fn open_section_picker(&mut self) {
        if self.latest_plan.is_none() || self.editor.is_some() {
            return;
        }
        self.section_picker_state.select(Some(0));
        self.show_section_picker = true;
    }

    pub fn section_picker_nav_down(&mut self) {
        let len = Section::all().len();
        let i = self.section_picker_state.selected().unwrap_or(0);
        self.section_picker_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn section_picker_nav_up(&mut self) {
        let i = self.section_picker_state.selected().unwrap_or(0);
        self.section_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_section(&mut self) {
        if let Some(section) = self
            .section_picker_state
            .selected()
            .and_then(|i| Section::all().get(i).copied())
        {
            self.open_editor(section);
        }
    }

    /// Open the editor pre-filled with the section's current text
    pub fn open_editor(&mut self, section: Section) {
        let content = self
            .latest_plan
            .as_ref()
            .map(|plan| plan.section_text(section))
            .unwrap_or_default();

        self.show_section_picker = false;
        self.editor = Some(EditorState {
            section,
            cursor: content.chars().count(),
            content,
            saving: false,
        });
    }

    pub fn cancel_editor(&mut self) {
        if let Some(editor) = self.editor.take() {
            tracing::debug!(section = editor.section.as_str(), "edit cancelled");
        }
    }

    /// Close the editor once its save settles. An editor reopened after a
    /// cancel is left alone.
    fn close_saved_editor(&mut self, section: Section) {
        if self
            .editor
            .as_ref()
            .is_some_and(|editor| editor.saving && editor.section == section)
        {
            self.editor = None;
        }
    }

    pub fn save_editor(&mut self) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        if editor.saving {
            return;
        }
        editor.saving = true;

        let section = editor.section;
        let new_content = editor.content.clone();
        tracing::info!(section = section.as_str(), "saving section edit");

        let client = self.client.clone();
        let session = self.session.id.clone();
        self.spawn(RequestKind::Edit(section), async move {
            Outcome::Edit(section, client.edit_section(&session, section, &new_content).await)
        });
    }

    // Voice input

    pub fn start_voice(&mut self) {
        if !self.voice.is_supported() || self.listening {
            return;
        }
        self.listening = true;
        self.status = Some("Listening...".to_string());

        let voice = self.voice.clone();
        self.spawn(RequestKind::Voice, async move { Outcome::Voice(voice.listen().await) });
    }

    // Transcript export

    pub fn transcript_html(&self) -> String {
        let mut html = String::from(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Account Planner Transcript</title>\n</head>\n<body>\n<div id=\"chat-box\">\n",
        );
        for message in &self.messages {
            let class = match message.sender {
                Sender::User => "user-msg",
                Sender::Bot => "bot-msg",
            };
            html.push_str(&format!("<div class=\"{}\">\n", class));
            html.push_str(&markup::to_html(&markup::message_view(&message.body)));
            html.push_str("</div>\n");
        }
        html.push_str("</div>\n</body>\n</html>\n");
        html
    }

    pub fn export_transcript(&mut self) -> Result<PathBuf> {
        let path = self.export_path.clone();
        std::fs::write(&path, self.transcript_html())
            .with_context(|| format!("Failed to write transcript to {}", path.display()))?;
        tracing::info!(path = %path.display(), messages = self.messages.len(), "transcript exported");
        self.status = Some(format!("Saved transcript to {}", path.display()));
        Ok(path)
    }

    // Ticks and reveal

    /// Tick animation frame and reveal progress (called by Tick event)
    pub fn on_tick(&mut self, now: Instant) {
        if self.loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.advance_reveal(now);
    }

    fn start_reveal(&mut self, body: MessageBody, then_conflicts: Option<ConflictSet>) {
        self.finish_reveal();

        let total = markup::char_len(&markup::layout_rows(&markup::message_view(&body)));
        let message_idx = self.add_message(Sender::Bot, body);

        if self.typing_delay.is_zero() || total == 0 {
            if let Some(conflicts) = then_conflicts {
                self.show_conflicts(conflicts);
            }
            return;
        }

        self.messages[message_idx].visible_chars = Some(0);
        self.reveal = Some(Reveal {
            message_idx,
            total,
            started: Instant::now(),
            delay: self.typing_delay,
            then_conflicts,
        });
    }

    fn advance_reveal(&mut self, now: Instant) {
        let Some(reveal) = &self.reveal else {
            return;
        };
        let shown = reveal.visible_at(now);
        if shown >= reveal.total {
            self.finish_reveal();
        } else if let Some(message) = self.messages.get_mut(reveal.message_idx) {
            message.visible_chars = Some(shown);
        }
    }

    /// Show the revealing message in full and raise any deferred banner
    pub fn finish_reveal(&mut self) {
        let Some(reveal) = self.reveal.take() else {
            return;
        };
        if let Some(message) = self.messages.get_mut(reveal.message_idx) {
            message.visible_chars = None;
        }
        if let Some(conflicts) = reveal.then_conflicts {
            self.show_conflicts(conflicts);
        }
    }

    // Background requests

    /// Apply every request that has finished since the last call
    pub async fn poll_pending(&mut self) {
        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|request| request.handle.is_finished());
        self.pending = waiting;

        for request in done {
            self.complete(request).await;
        }
    }

    async fn complete(&mut self, request: PendingRequest) {
        match request.handle.await {
            Ok(outcome) => self.apply_outcome(request.generation, outcome),
            Err(e) => {
                tracing::error!(kind = ?request.kind, "request task failed: {}", e);
                if self.session.is_current(request.generation) {
                    self.apply_task_failure(request.kind);
                }
            }
        }
    }

    fn apply_task_failure(&mut self, kind: RequestKind) {
        match kind {
            RequestKind::Chat => {
                self.loading = false;
                self.add_bot_text(SEND_ERROR_TEXT);
            }
            RequestKind::Edit(section) => {
                self.close_saved_editor(section);
                self.add_bot_text(SEND_ERROR_TEXT);
            }
            RequestKind::Dig => {
                self.digging = false;
                self.conflicts = None;
                self.add_bot_text(SEND_ERROR_TEXT);
            }
            RequestKind::Voice => {
                self.listening = false;
                self.status = Some("Voice input failed".to_string());
            }
            RequestKind::Reset => {}
        }
    }

    pub fn apply_outcome(&mut self, generation: u64, outcome: Outcome) {
        if let Outcome::Reset(result) = outcome {
            match result {
                Ok(()) => tracing::debug!("backend session cleared"),
                Err(e) => tracing::warn!("backend reset failed: {}", e),
            }
            return;
        }

        if !self.session.is_current(generation) {
            tracing::debug!(generation, current = self.session.generation(), "discarding stale response");
            if matches!(outcome, Outcome::Voice(_)) {
                self.listening = false;
            }
            return;
        }

        match outcome {
            Outcome::Chat(result) => {
                self.loading = false;
                match result {
                    Ok(response) => {
                        let conflicts = response.conflicts().cloned();
                        self.start_reveal(response.body(), conflicts);
                    }
                    Err(e) => {
                        tracing::warn!("chat request failed: {}", e);
                        self.add_bot_text(SEND_ERROR_TEXT);
                    }
                }
            }
            Outcome::Edit(section, result) => {
                self.close_saved_editor(section);
                match result {
                    Ok(response) => {
                        if let Some(conflicts) = response.conflicts().cloned() {
                            self.show_conflicts(conflicts);
                        }
                        if response.has_plan() {
                            self.add_bot_text(SECTION_UPDATED_TEXT);
                            self.add_message(Sender::Bot, response.body());
                        } else {
                            self.add_bot_text(response.reply_or_raw());
                        }
                    }
                    Err(e) => {
                        tracing::warn!("edit-section request failed: {}", e);
                        self.add_bot_text(SEND_ERROR_TEXT);
                    }
                }
            }
            Outcome::Dig(result) => {
                self.digging = false;
                match result {
                    Ok(response) => self.add_bot_text(response.text()),
                    Err(e) => {
                        tracing::warn!("dig-deeper request failed: {}", e);
                        self.add_bot_text(SEND_ERROR_TEXT);
                    }
                }
                self.conflicts = None;
            }
            Outcome::Voice(result) => {
                self.listening = false;
                match result {
                    Ok(transcript) => {
                        self.status = None;
                        self.input_cursor = transcript.chars().count();
                        self.input = transcript;
                        self.send_message();
                    }
                    Err(VoiceError::Unsupported) => self.status = None,
                    Err(e) => {
                        tracing::warn!("voice input failed: {}", e);
                        self.status = Some(format!("Voice input failed: {}", e));
                    }
                }
            }
            Outcome::Reset(_) => {}
        }
    }

    /// Wait for every outstanding request, including ones they trigger
    #[cfg(test)]
    pub async fn settle(&mut self) {
        while !self.pending.is_empty() {
            for request in std::mem::take(&mut self.pending) {
                self.complete(request).await;
            }
        }
    }
}
