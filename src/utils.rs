use chrono::NaiveDateTime;
use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    fn app_name(&self) -> &'static str {
        match self {
            Profile::Dev => "smartnotes-dev",
            Profile::Prod => "smartnotes",
        }
    }
}

/// Get the configuration directory path
/// If profile is Dev, uses "smartnotes-dev" instead of "smartnotes"
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "smartnotes", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path, where the database and media live
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "smartnotes", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse a reminder as entered in a `datetime-local` field: `YYYY-MM-DDTHH:MM`,
/// optionally with seconds, `T` or a space between date and time.
/// The value is kept as given, without timezone conversion.
pub fn parse_reminder(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let text = text.trim();
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d %H:%M:%S",
    ];
    let mut last_err = None;
    for format in FORMATS {
        match NaiveDateTime::parse_from_str(text, format) {
            Ok(parsed) => return Ok(parsed),
            Err(e) => last_err = Some(e),
        }
    }
    match last_err {
        Some(e) => Err(e),
        None => NaiveDateTime::parse_from_str(text, FORMATS[0]),
    }
}

/// Reminder in the same shape it was entered
pub fn format_reminder(reminder: &NaiveDateTime) -> String {
    reminder.format("%Y-%m-%d %H:%M").to_string()
}
