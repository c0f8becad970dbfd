pub mod file_list;
pub mod format;
pub mod paging;

pub use file_list::{FileList, FileListUpdate, Notice};
pub use format::format_file_size;
pub use paging::{Page, Pager, bounded_rows, project, project_csv};
