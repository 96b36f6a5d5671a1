use std::path::PathBuf;

/// Errors returned by the fallible constructors of the bundled collaborator
/// implementations.
///
/// The orchestrator and sniffer themselves never return errors: rejected
/// configuration and absent streams are reported through boolean results and
/// state transitions, and I/O failures during playback are logged and treated
/// as end-of-data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An underlying I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The path given to [`DirSource::new`](crate::DirSource::new) does not
    /// name a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}
