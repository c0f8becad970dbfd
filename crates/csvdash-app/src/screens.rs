use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use csvdash_api::ApiError;
use csvdash_api::files::{DEFAULT_LIST_LIMIT, FileService, clamp_max_rows};
use csvdash_gateway::{Channel, ChannelBinding};
use csvdash_types::events::EventMessage;
use csvdash_types::models::{CsvRow, CsvView, FileRecord};
use csvdash_view::paging::DEFAULT_CSV_MAX_ROWS;
use csvdash_view::{FileList, Notice, Page, Pager, project_csv};

/// Where the file-list screen gets a full listing from.
pub trait FileSource: Send + Sync + 'static {
    fn fetch_files(&self) -> impl Future<Output = Result<Vec<FileRecord>, ApiError>> + Send;
}

impl FileSource for FileService {
    async fn fetch_files(&self) -> Result<Vec<FileRecord>, ApiError> {
        self.list(0, DEFAULT_LIST_LIMIT).await
    }
}

/// Drops results that complete after the screen went away or after a newer
/// load started.
#[derive(Debug)]
pub struct LoadGuard {
    mounted: AtomicBool,
    latest: AtomicU64,
}

impl LoadGuard {
    pub fn new() -> Self {
        Self {
            mounted: AtomicBool::new(true),
            latest: AtomicU64::new(0),
        }
    }

    /// Start a load and get its ticket.
    pub fn begin(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.mounted.load(Ordering::SeqCst) && self.latest.load(Ordering::SeqCst) == ticket
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }
}

impl Default for LoadGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScreenEvent {
    Notice(Notice),
    /// The list changed; holds the new file count.
    Refreshed(usize),
    LoadFailed(String),
}

struct FileListState<S> {
    source: S,
    model: Mutex<FileList>,
    pager: Mutex<Pager>,
    guard: LoadGuard,
    events: mpsc::UnboundedSender<ScreenEvent>,
}

impl<S: FileSource> FileListState<S> {
    fn emit(&self, event: ScreenEvent) {
        let _ = self.events.send(event);
    }

    fn on_message(self: &Arc<Self>, message: &EventMessage) {
        let update = self
            .model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(message);
        let Some(update) = update else {
            return;
        };

        self.emit(ScreenEvent::Notice(update.notice));
        self.emit(ScreenEvent::Refreshed(self.len()));
        if update.reload {
            tokio::spawn(reload(Arc::downgrade(self)));
        }
    }

    fn len(&self) -> usize {
        self.model.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn load(&self) -> Result<(), ApiError> {
        let ticket = self.guard.begin();
        let files = self.source.fetch_files().await?;
        if !self.guard.is_current(ticket) {
            debug!("Discarding stale file list (load {})", ticket);
            return Ok(());
        }

        let count = files.len();
        self.model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(files);
        {
            let mut pager = self.pager.lock().unwrap_or_else(PoisonError::into_inner);
            let pages = count.div_ceil(pager.page_size());
            pager.clamp(pages);
        }

        self.emit(ScreenEvent::Refreshed(count));
        Ok(())
    }
}

/// Background refresh after a realtime change. Failures are reported to the
/// screen but never stop it.
async fn reload<S: FileSource>(state: Weak<FileListState<S>>) {
    let Some(state) = state.upgrade() else {
        return;
    };
    if let Err(e) = state.load().await {
        warn!("Background file list reload failed: {}", e);
        state.emit(ScreenEvent::LoadFailed(e.to_string()));
    }
}

/// The live file list: loaded once on mount, then kept current from the
/// realtime channel.
pub struct FileListScreen<S: FileSource = FileService> {
    state: Arc<FileListState<S>>,
    binding: ChannelBinding,
}

impl<S: FileSource> FileListScreen<S> {
    pub async fn mount(
        channel: Channel,
        source: S,
        token: &str,
        page_size: usize,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ScreenEvent>), ApiError> {
        let (events, rx) = mpsc::unbounded_channel();
        let state = Arc::new(FileListState {
            source,
            model: Mutex::new(FileList::new()),
            pager: Mutex::new(Pager::new(page_size)),
            guard: LoadGuard::new(),
            events,
        });

        let weak = Arc::downgrade(&state);
        let mut binding = ChannelBinding::new(channel, move |message| {
            if let Some(state) = weak.upgrade() {
                state.on_message(message);
            }
        });
        binding.sync(Some(token));

        state.load().await?;
        Ok((Self { state, binding }, rx))
    }

    pub fn channel(&self) -> &Channel {
        self.binding.channel()
    }

    /// The files on the current page, plus the page count.
    pub fn visible(&self) -> (Vec<FileRecord>, usize) {
        let model = self.state.model.lock().unwrap_or_else(PoisonError::into_inner);
        let pager = *self.state.pager.lock().unwrap_or_else(PoisonError::into_inner);
        let page = pager.project(model.files());
        (page.items.to_vec(), page.total_pages)
    }

    pub fn page(&self) -> usize {
        self.state.pager.lock().unwrap_or_else(PoisonError::into_inner).page()
    }

    pub fn set_page(&self, page: usize) {
        self.state
            .pager
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_page(page);
    }
}

impl<S: FileSource> Drop for FileListScreen<S> {
    fn drop(&mut self) {
        self.state.guard.unmount();
    }
}

/// One CSV file's contents, paged locally over the bounded rows.
pub struct CsvViewScreen {
    files: FileService,
    guard: LoadGuard,
    view: Option<CsvView>,
    max_rows: usize,
    pager: Pager,
}

impl CsvViewScreen {
    pub fn new(files: FileService) -> Self {
        Self {
            files,
            guard: LoadGuard::new(),
            view: None,
            max_rows: DEFAULT_CSV_MAX_ROWS,
            pager: Pager::csv_rows(),
        }
    }

    pub async fn load(&mut self, id: i64) -> Result<&CsvView, ApiError> {
        let ticket = self.guard.begin();
        let view = self.files.view(id, self.max_rows).await?;
        if self.guard.is_current(ticket) {
            self.view = Some(view);
        }
        self.view
            .as_ref()
            .ok_or_else(|| ApiError::Validation("No CSV loaded".into()))
    }

    /// Change the server-side row limit. Returns to the first page; the
    /// caller reloads to fetch the new rows.
    pub fn set_max_rows(&mut self, max_rows: usize) {
        self.max_rows = clamp_max_rows(max_rows);
        self.pager.set_page(1);
    }

    pub fn set_rows_per_page(&mut self, rows_per_page: usize) {
        self.pager.set_page_size(rows_per_page);
    }

    pub fn set_page(&mut self, page: usize) {
        self.pager.set_page(page);
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    pub fn page(&self) -> Option<Page<'_, CsvRow>> {
        self.view.as_ref().map(|view| project_csv(view, &self.pager))
    }
}
