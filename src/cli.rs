use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;

use crate::capture::{AudioRecorder, CaptureError, DeviceRegistry, DrawingPad, ImagePicker};
use crate::models::{AttachmentKind, Attachments, Identity, LocalHandle, Note, NoteFields, NoteId, NotePatch};
use crate::session::{AuthError, Credentials, SessionGate};
use crate::sync::{SyncEngine, SyncError};
use crate::utils::{format_reminder, parse_reminder};

#[derive(Parser)]
#[command(name = "smartnotes")]
#[command(about = "Notes with images, voice memos, drawings and reminders")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an account
    Signup {
        email: String,
        #[arg(long, env = "SMARTNOTES_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in
    Login {
        email: String,
        #[arg(long, env = "SMARTNOTES_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Add a note
    Add {
        /// Note text
        body: Option<String>,
        #[arg(long)]
        title: Option<String>,
        /// Image file to attach
        #[arg(long)]
        image: Option<PathBuf>,
        /// Audio file to attach as a voice memo
        #[arg(long)]
        audio: Option<PathBuf>,
        /// Stroke file to draw: `x y` per line, blank line lifts the pen
        #[arg(long)]
        drawing: Option<PathBuf>,
        /// Reminder (YYYY-MM-DDTHH:MM)
        #[arg(long)]
        reminder: Option<String>,
    },
    /// List notes, newest first
    List {
        /// Only notes whose title or text contains this (case-insensitive)
        #[arg(long, short)]
        search: Option<String>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Change a note
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long)]
        audio: Option<PathBuf>,
        #[arg(long)]
        drawing: Option<PathBuf>,
        #[arg(long)]
        reminder: Option<String>,
        #[arg(long)]
        clear_reminder: bool,
        /// Remove attachments of these kinds
        #[arg(long, value_enum)]
        clear: Vec<Slot>,
    },
    /// Mark a note done, or not done again
    Done { id: i64 },
    /// Delete a note
    Rm { id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Slot {
    Image,
    Drawing,
    Audio,
}

impl From<Slot> for AttachmentKind {
    fn from(slot: Slot) -> Self {
        match slot {
            Slot::Image => AttachmentKind::Image,
            Slot::Drawing => AttachmentKind::Drawing,
            Slot::Audio => AttachmentKind::Audio,
        }
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
    #[error("Not signed in; run `smartnotes login <email>` first")]
    NotSignedIn,
    #[error("Failed to read {0}: {1}")]
    ReadError(PathBuf, std::io::Error),
    #[error("Failed to encode output: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Everything a command needs
pub struct App {
    pub engine: SyncEngine,
    pub session: Arc<dyn SessionGate>,
    pub devices: DeviceRegistry,
}

impl App {
    pub async fn run(&self, command: Commands) -> Result<(), CliError> {
        match command {
            Commands::Signup { email, password } => self.handle_signup(email, password).await,
            Commands::Login { email, password } => self.handle_login(email, password).await,
            Commands::Logout => {
                self.session.sign_out().await?;
                println!("Signed out");
                Ok(())
            }
            Commands::Whoami => {
                match self.session.active_identity().await? {
                    Some(identity) => println!("{} ({})", identity.email, identity.user_id),
                    None => println!("Not signed in"),
                }
                Ok(())
            }
            Commands::Add {
                body,
                title,
                image,
                audio,
                drawing,
                reminder,
            } => {
                let reminder_at = reminder.as_deref().map(parse_reminder_arg).transpose()?;
                let fields = NoteFields {
                    title,
                    body,
                    reminder_at,
                    attachments: self.capture_attachments(image, audio, drawing)?,
                };
                self.handle_add(fields).await
            }
            Commands::List { search, json } => self.handle_list(search, json).await,
            Commands::Edit {
                id,
                title,
                body,
                image,
                audio,
                drawing,
                reminder,
                clear_reminder,
                clear,
            } => {
                let mut patch = NotePatch {
                    title: title.map(Some),
                    body: body.map(Some),
                    ..NotePatch::default()
                };
                if clear_reminder {
                    patch.reminder_at = Some(None);
                } else if let Some(text) = reminder {
                    patch.reminder_at = Some(Some(parse_reminder_arg(&text)?));
                }
                for slot in clear {
                    patch = patch.attachment(slot.into(), None);
                }
                let captured = self.capture_attachments(image, audio, drawing)?;
                for (kind, handle) in captured.iter() {
                    patch = patch.attachment(kind, Some(handle.clone()));
                }
                self.handle_edit(NoteId(id), patch).await
            }
            Commands::Done { id } => {
                self.signed_in_and_loaded().await?;
                let note = self.engine.toggle_complete(NoteId(id)).await?;
                let state = if note.completed { "done" } else { "not done" };
                println!("Note {} marked {}", id, state);
                Ok(())
            }
            Commands::Rm { id } => {
                self.signed_in_and_loaded().await?;
                self.engine.delete(NoteId(id)).await?;
                println!("Note {} deleted", id);
                Ok(())
            }
        }
    }

    async fn handle_signup(&self, email: String, password: String) -> Result<(), CliError> {
        let identity = self.session.sign_up(&Credentials::new(email, password)).await?;
        println!("Account created for {}. Sign in with `smartnotes login`.", identity.email);
        Ok(())
    }

    async fn handle_login(&self, email: String, password: String) -> Result<(), CliError> {
        let identity = self.session.sign_in(&Credentials::new(email, password)).await?;
        println!("Signed in as {}", identity.email);
        Ok(())
    }

    async fn handle_add(&self, fields: NoteFields) -> Result<(), CliError> {
        self.signed_in_and_loaded().await?;
        let note = self.engine.create(fields).await?;
        match note.id {
            Some(id) => println!("Note created successfully (ID: {})", id),
            None => println!("Note created successfully"),
        }
        Ok(())
    }

    async fn handle_list(&self, search: Option<String>, json: bool) -> Result<(), CliError> {
        self.signed_in_and_loaded().await?;
        let view = self.engine.store().view(search);
        let notes = view.notes();

        if json {
            println!("{}", serde_json::to_string_pretty(&notes)?);
        } else if notes.is_empty() {
            println!("No notes found.");
        } else {
            for note in &notes {
                print_note(note);
            }
        }
        Ok(())
    }

    async fn handle_edit(&self, id: NoteId, patch: NotePatch) -> Result<(), CliError> {
        self.signed_in_and_loaded().await?;
        let note = self.engine.update(id, patch).await?;
        print_note(&note);
        Ok(())
    }

    async fn signed_in_and_loaded(&self) -> Result<Identity, CliError> {
        let identity = self
            .session
            .active_identity()
            .await?
            .ok_or(CliError::NotSignedIn)?;
        self.engine.load(&identity).await?;
        Ok(identity)
    }

    fn capture_attachments(
        &self,
        image: Option<PathBuf>,
        audio: Option<PathBuf>,
        drawing: Option<PathBuf>,
    ) -> Result<Attachments, CliError> {
        let mut attachments = Attachments::default();
        if let Some(path) = image {
            attachments.image = Some(ImagePicker.pick_file(&path)?.into());
        }
        if let Some(path) = audio {
            attachments.audio = Some(self.record_audio(&path)?.into());
        }
        if let Some(path) = drawing {
            attachments.drawing = Some(self.draw(&path)?.into());
        }
        Ok(attachments)
    }

    fn record_audio(&self, path: &Path) -> Result<LocalHandle, CliError> {
        let mut recorder = AudioRecorder::new(self.devices.clone());
        Ok(recorder.record_file(path)?)
    }

    fn draw(&self, path: &Path) -> Result<LocalHandle, CliError> {
        let strokes = std::fs::read_to_string(path).map_err(|e| CliError::ReadError(path.to_path_buf(), e))?;
        let mut pad = DrawingPad::open(&self.devices)?;
        pad.replay(&strokes)?;
        Ok(pad.save())
    }
}

fn parse_reminder_arg(text: &str) -> Result<chrono::NaiveDateTime, CliError> {
    parse_reminder(text)
        .map_err(|e| CliError::DateParseError(format!("Invalid reminder '{}': {}", text, e)))
}

fn print_note(note: &Note) {
    let id = note.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
    let mark = if note.completed { "[x]" } else { "[ ]" };
    match &note.title {
        Some(title) => println!("#{} {} {}", id, mark, title),
        None => println!("#{} {}", id, mark),
    }
    if let Some(body) = &note.body {
        for line in body.lines() {
            println!("    {}", line);
        }
    }
    if let Some(reminder) = &note.reminder_at {
        println!("    reminder: {}", format_reminder(reminder));
    }
    for (kind, handle) in note.attachments.iter() {
        println!("    {}: {}", kind, handle.uri());
    }
}
