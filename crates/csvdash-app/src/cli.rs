use std::path::PathBuf;

use clap::{Parser, Subcommand};

use csvdash_api::files::DEFAULT_MAX_ROWS;
use csvdash_types::models::Role;
use csvdash_view::paging::{DEFAULT_CSV_ROWS_PER_PAGE, DEFAULT_FILE_PAGE_SIZE};

#[derive(Parser)]
#[command(name = "csvdash")]
#[command(about = "Share, browse and watch CSV files on a csvdash server", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and remember the session
    Login {
        #[arg(long, env = "CSVDASH_EMAIL")]
        email: String,
        #[arg(long, env = "CSVDASH_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored session
    Logout,

    /// Show the logged-in account
    Whoami,

    /// List CSV files
    Files {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_FILE_PAGE_SIZE)]
        page_size: usize,
    },

    /// Show the contents of a CSV file
    View {
        id: i64,
        #[arg(long, default_value_t = DEFAULT_MAX_ROWS)]
        max_rows: usize,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_CSV_ROWS_PER_PAGE)]
        rows_per_page: usize,
    },

    /// Upload a CSV file
    Upload { path: PathBuf },

    /// Download a CSV file
    Download {
        id: i64,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Delete a CSV file (admin)
    Delete { id: i64 },

    /// List accounts (admin)
    Users {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_FILE_PAGE_SIZE)]
        page_size: usize,
    },

    /// Create an account (admin)
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "user")]
        role: Role,
    },

    /// Change an account (admin)
    UpdateUser {
        id: i64,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        role: Option<Role>,
    },

    /// Delete an account (admin)
    DeleteUser { id: i64 },

    /// Follow the file list live until interrupted
    Watch {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_FILE_PAGE_SIZE)]
        page_size: usize,
    },
}
