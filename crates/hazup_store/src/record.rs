use chrono::{DateTime, Local};

/// Timestamp layout used in upload log lines.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One upload event, rendered into the append-only upload log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub recorded_at: DateTime<Local>,
    pub username: String,
    pub user_id: String,
    pub file_name: String,
    pub category: String,
}

impl UploadRecord {
    pub fn new(username: &str, user_id: &str, file_name: &str, category: &str) -> Self {
        Self {
            recorded_at: Local::now(),
            username: username.to_string(),
            user_id: user_id.to_string(),
            file_name: file_name.to_string(),
            category: category.to_string(),
        }
    }

    /// Renders the newline-terminated log line for this record.
    pub fn to_log_line(&self) -> String {
        format!(
            "[{}] User: {} (ID: {}) uploaded '{}' as type '{}'\n",
            self.recorded_at.format(LOG_TIMESTAMP_FORMAT),
            self.username,
            self.user_id,
            self.file_name,
            self.category,
        )
    }
}
