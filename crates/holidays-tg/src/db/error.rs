use std::path::PathBuf;

/// Errors of the chats file storage. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub(crate) enum DbError {
    #[error("Failed to read the chats file")]
    Read { source: std::io::Error },

    #[error(
        "The chats file at {} is corrupt, expected a JSON array of chat IDs",
        path.display()
    )]
    CorruptStorage {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write the chats file")]
    Write { source: std::io::Error },
}
