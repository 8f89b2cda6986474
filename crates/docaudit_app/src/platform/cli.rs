use std::path::PathBuf;

use clap::{Parser, Subcommand};
use url::Url;

use super::logging::LogDestination;

#[derive(Debug, Parser)]
#[command(name = "docaudit", version, about = "Document audit client")]
pub struct Cli {
    /// Configuration file; defaults to ./docaudit.ron when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Overrides the backend base URL.
    #[arg(long, global = true)]
    pub api_base: Option<Url>,
    /// Overrides the directory holding the persisted session.
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "file", global = true)]
    pub log: LogDestination,
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the provider sign-in URL.
    Login,
    /// Complete sign-in with the URL the provider redirected to.
    Callback { url: Url },
    /// Sign out here and in every other session sharing the state directory.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Renew the session with the refresh token.
    Renew,
    /// List uploaded files.
    Files,
    /// Upload local files.
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Delete the file at a list position (see `files`).
    Delete { position: usize },
    /// Ask a question about the uploaded files.
    Ask {
        text: String,
        /// Use the alternate model provider.
        #[arg(long)]
        alternate: bool,
    },
    /// Audit a document against style-guide sections.
    Audit {
        #[arg(long)]
        document: String,
        /// Repeat for several sections; none means all of them.
        #[arg(long = "section")]
        sections: Vec<String>,
        #[arg(long)]
        alternate: bool,
        /// Save the transcript as chat_history.md in this directory.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Send feedback to the maintainers.
    Feedback {
        #[arg(long)]
        category: String,
        text: String,
        #[arg(long, default_value = "")]
        email: String,
    },
}
