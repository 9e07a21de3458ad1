use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Approval requests with real-time status updates
#[derive(Parser)]
#[command(name = "approvals", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind (defaults to APPROVALS_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Apply database migrations and exit
    Migrate,

    /// Submit and decide requests against a running server
    Request {
        /// Server base URL
        #[arg(long, env = "APPROVALS_SERVER", default_value = "http://localhost:3000")]
        server: String,
        #[command(subcommand)]
        command: RequestCommands,
    },

    /// Follow live updates in the terminal
    Watch {
        /// Server base URL
        #[arg(long, env = "APPROVALS_SERVER", default_value = "http://localhost:3000")]
        server: String,
        #[command(subcommand)]
        command: WatchCommands,
    },
}

#[derive(Subcommand)]
pub enum RequestCommands {
    /// Submit a new request
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        message: String,
    },
    /// List all requests, newest first
    List,
    /// Show one request
    Get { id: Uuid },
    /// Approve a request
    Approve { id: Uuid },
    /// Reject a request
    Reject { id: Uuid },
}

#[derive(Subcommand)]
pub enum WatchCommands {
    /// Approver dashboard: every request, updated as they arrive
    Dashboard,
    /// Requester status page for one request
    Status { id: Uuid },
}
