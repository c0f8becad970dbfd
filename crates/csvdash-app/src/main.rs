mod app;
mod cli;
mod commands;
mod config;
mod screens;

use clap::Parser;

use csvdash_types::api::{SignupRequest, UserUpdate};

use crate::app::App;
use crate::cli::{Cli, Commands};
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "csvdash=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let app = App::start(config).await?;

    match cli.command {
        Commands::Login { email, password } => commands::login(&app, &email, &password).await,
        Commands::Logout => {
            commands::logout(&app);
            Ok(())
        }
        Commands::Whoami => commands::whoami(&app),
        Commands::Files { page, page_size } => commands::files(&app, page, page_size).await,
        Commands::View {
            id,
            max_rows,
            page,
            rows_per_page,
        } => commands::view(&app, id, max_rows, page, rows_per_page).await,
        Commands::Upload { path } => commands::upload(&app, &path).await,
        Commands::Download { id, dir } => commands::download(&app, id, &dir).await,
        Commands::Delete { id } => commands::delete(&app, id).await,
        Commands::Users { page, page_size } => commands::users(&app, page, page_size).await,
        Commands::Signup {
            username,
            email,
            password,
            role,
        } => {
            let req = SignupRequest {
                username,
                email,
                password,
                role,
            };
            commands::signup(&app, req).await
        }
        Commands::UpdateUser {
            id,
            username,
            email,
            password,
            role,
        } => {
            let update = UserUpdate {
                username,
                email,
                password,
                role,
            };
            commands::update_user(&app, id, update).await
        }
        Commands::DeleteUser { id } => commands::delete_user(&app, id).await,
        Commands::Watch { page, page_size } => commands::watch(&app, page, page_size).await,
    }
}
