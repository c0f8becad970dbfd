use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use csvdash_api::files::DEFAULT_LIST_LIMIT;
use csvdash_types::api::{SignupRequest, UserUpdate};
use csvdash_types::models::{CsvRow, CsvView, FileRecord, User};
use csvdash_view::{FileList, Pager, bounded_rows, format_file_size};

use crate::app::App;
use crate::screens::{CsvViewScreen, FileListScreen, ScreenEvent};

pub async fn login(app: &App, email: &str, password: &str) -> anyhow::Result<()> {
    let credential = app.session.login(email, password).await?;
    let user = credential.user();
    println!("Logged in as {} ({})", user.username, user.role.as_str());
    Ok(())
}

pub fn logout(app: &App) {
    app.session.logout();
    println!("Logged out");
}

pub fn whoami(app: &App) -> anyhow::Result<()> {
    let credential = app.require_login()?;
    print_users(std::slice::from_ref(credential.user()));
    Ok(())
}

pub async fn files(app: &App, page: usize, page_size: usize) -> anyhow::Result<()> {
    app.require_login()?;
    let mut list = FileList::new();
    list.replace(app.files.list(0, DEFAULT_LIST_LIMIT).await?);

    let mut pager = Pager::new(page_size);
    pager.set_page(page);
    let visible = pager.project(list.files());
    print_files(visible.items);
    println!("Page {} of {} ({} files)", pager.page(), visible.total_pages, list.len());
    Ok(())
}

pub async fn view(
    app: &App,
    id: i64,
    max_rows: usize,
    page: usize,
    rows_per_page: usize,
) -> anyhow::Result<()> {
    app.require_login()?;
    let mut screen = CsvViewScreen::new(app.files.clone());
    screen.set_max_rows(max_rows);
    screen.set_rows_per_page(rows_per_page);
    let view = screen.load(id).await?.clone();
    screen.set_page(page);

    let Some(visible) = screen.page() else {
        return Ok(());
    };
    println!("{}", view.filename);
    print_rows(&view, visible.items);
    println!(
        "Page {} of {} (showing {} of {} rows, limit {})",
        screen.pager().page(),
        visible.total_pages,
        bounded_rows(&view),
        view.total_rows,
        screen.max_rows()
    );
    Ok(())
}

pub async fn upload(app: &App, path: &Path) -> anyhow::Result<()> {
    app.require_login()?;
    let file = app.files.upload_path(path).await?;
    println!("Uploaded {} as #{} ({})", file.filename, file.id, format_file_size(file.file_size));
    Ok(())
}

pub async fn download(app: &App, id: i64, dir: &Path) -> anyhow::Result<()> {
    app.require_login()?;
    let filename = match app.files.list(0, DEFAULT_LIST_LIMIT).await {
        Ok(files) => files.into_iter().find(|f| f.id == id).map(|f| f.filename),
        Err(e) => {
            warn!("Could not look up file name for {}: {}", id, e);
            None
        }
    };
    let path = app
        .files
        .download_to(id, filename.as_deref().unwrap_or_default(), dir)
        .await?;
    println!("Saved {}", path.display());
    Ok(())
}

pub async fn delete(app: &App, id: i64) -> anyhow::Result<()> {
    app.require_admin()?;
    app.files.delete(id).await?;
    println!("Deleted file #{}", id);
    Ok(())
}

pub async fn users(app: &App, page: usize, page_size: usize) -> anyhow::Result<()> {
    app.require_admin()?;
    let users = app.users.list(0, DEFAULT_LIST_LIMIT).await?;

    let mut pager = Pager::new(page_size);
    pager.set_page(page);
    let visible = pager.project(&users);
    print_users(visible.items);
    println!("Page {} of {} ({} accounts)", pager.page(), visible.total_pages, users.len());
    Ok(())
}

pub async fn signup(app: &App, req: SignupRequest) -> anyhow::Result<()> {
    app.require_admin()?;
    let user = app.session.signup(&req).await?;
    println!("Created {} account {} (#{})", user.role.as_str(), user.username, user.id);
    Ok(())
}

pub async fn update_user(app: &App, id: i64, update: UserUpdate) -> anyhow::Result<()> {
    app.require_admin()?;
    let user = app.users.update(id, &update).await?;
    println!("Updated account {} (#{})", user.username, user.id);
    Ok(())
}

pub async fn delete_user(app: &App, id: i64) -> anyhow::Result<()> {
    let me = app.require_admin()?;
    if me.user().id == id {
        anyhow::bail!("You cannot delete your own account");
    }
    app.users.delete(id).await?;
    println!("Deleted account #{}", id);
    Ok(())
}

/// Mount the live file list and print changes until Ctrl-C.
pub async fn watch(app: &App, page: usize, page_size: usize) -> anyhow::Result<()> {
    let credential = app.require_login()?;
    let channel = app.live_channel();
    let (screen, mut events) =
        FileListScreen::mount(channel, app.files.clone(), credential.token(), page_size).await?;
    screen.set_page(page);
    let mut state = screen.channel().watch_state();

    print_screen(&screen);
    info!("Watching {} for changes", screen.channel().endpoint());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(ScreenEvent::Notice(notice)) => println!("* {}: {}", notice.title, notice.message),
                Some(ScreenEvent::Refreshed(count)) => {
                    println!("-- {} files --", count);
                    print_screen(&screen);
                }
                Some(ScreenEvent::LoadFailed(message)) => eprintln!("! {}", message),
                None => break,
            },
            changed = state.changed() => {
                changed.context("realtime channel dropped")?;
                let current = *state.borrow_and_update();
                info!("Realtime channel is {:?}", current);
            }
        }
        if app.session.credential().is_none() {
            eprintln!("Session ended. Run `csvdash login` to sign in again.");
            break;
        }
    }
    Ok(())
}

fn print_screen(screen: &FileListScreen) {
    let (files, total_pages) = screen.visible();
    print_files(&files);
    println!("Page {} of {}", screen.page(), total_pages);
}

fn print_files(files: &[FileRecord]) {
    if files.is_empty() {
        println!("No CSV files yet");
        return;
    }
    println!("{:>5}  {:<32} {:>12}  {:<16} {}", "ID", "FILENAME", "SIZE", "UPLOADER", "UPLOADED");
    for f in files {
        println!(
            "{:>5}  {:<32} {:>12}  {:<16} {}",
            f.id,
            f.filename,
            format_file_size(f.file_size),
            f.uploader_username,
            f.uploaded_at.format("%Y-%m-%d %H:%M")
        );
    }
}

fn print_users(users: &[User]) {
    println!("{:>5}  {:<20} {:<32} {:<6} {}", "ID", "USERNAME", "EMAIL", "ROLE", "CREATED");
    for u in users {
        println!(
            "{:>5}  {:<20} {:<32} {:<6} {}",
            u.id,
            u.username,
            u.email,
            u.role.as_str(),
            u.created_at.format("%Y-%m-%d")
        );
    }
}

fn print_rows(view: &CsvView, rows: &[CsvRow]) {
    println!("{}", view.headers.join("\t"));
    for row in rows {
        let cells: Vec<String> = view.headers.iter().map(|h| CsvView::cell(row, h)).collect();
        println!("{}", cells.join("\t"));
    }
}
