use tracing::debug;

use csvdash_types::events::{EventMessage, FileListChange};
use csvdash_types::models::FileRecord;

/// A user-visible toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

/// What a screen should do after a realtime change was merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListUpdate {
    pub notice: Notice,
    /// Refetch the full list in the background to converge with the server.
    pub reload: bool,
}

/// The file list held by a screen, newest first.
#[derive(Debug, Clone, Default)]
pub struct FileList {
    files: Vec<FileRecord>,
}

impl FileList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Replace with a fresh listing from the server.
    pub fn replace(&mut self, files: Vec<FileRecord>) {
        self.files = files;
    }

    /// Returns true if a file was removed.
    pub fn remove(&mut self, id: i64) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.id != id);
        self.files.len() != before
    }

    /// Merge a realtime message. Anything that is not a usable file-list
    /// change leaves the list alone and returns None.
    pub fn apply(&mut self, message: &EventMessage) -> Option<FileListUpdate> {
        let change = message.file_list_change()?;
        let notice = match change {
            FileListChange::Uploaded(file) => {
                let notice = Notice {
                    title: "New CSV available".into(),
                    message: format!("{} was uploaded", file.filename),
                };
                if self.files.iter().all(|f| f.id != file.id) {
                    self.files.insert(0, file);
                }
                notice
            }
            FileListChange::Deleted(id) => {
                if !self.remove(id) {
                    debug!("Deleted file {} was not in the local list", id);
                }
                Notice {
                    title: "CSV removed".into(),
                    message: "A CSV file was removed".into(),
                }
            }
        };
        Some(FileListUpdate { notice, reload: true })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn record(id: i64, filename: &str) -> FileRecord {
        FileRecord {
            id,
            filename: filename.into(),
            file_size: 100,
            uploader_id: 1,
            uploader_username: "admin".into(),
            uploaded_at: NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        }
    }

    fn message(json: serde_json::Value) -> EventMessage {
        EventMessage::parse(&json.to_string()).unwrap()
    }

    fn uploaded(file: &FileRecord) -> EventMessage {
        message(serde_json::json!({
            "event": "csv_list_updated",
            "action": "uploaded",
            "file": file,
        }))
    }

    #[test]
    fn upload_goes_to_the_front_once() {
        let mut list = FileList::new();
        list.replace(vec![record(1, "old.csv")]);

        let new = record(2, "new.csv");
        let update = list.apply(&uploaded(&new)).unwrap();
        assert_eq!(update.notice.title, "New CSV available");
        assert_eq!(update.notice.message, "new.csv was uploaded");
        assert!(update.reload);

        list.apply(&uploaded(&new)).unwrap();
        let ids: Vec<i64> = list.files().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn delete_removes_by_id() {
        let mut list = FileList::new();
        list.replace(vec![record(1, "a.csv"), record(2, "b.csv")]);

        let update = list
            .apply(&message(serde_json::json!({
                "event": "csv_list_updated",
                "action": "deleted",
                "file_id": 1,
            })))
            .unwrap();
        assert_eq!(update.notice.title, "CSV removed");
        assert_eq!(list.len(), 1);
        assert_eq!(list.files()[0].id, 2);

        // Unknown id still notifies so the screen reloads
        assert!(list
            .apply(&message(serde_json::json!({
                "event": "csv_list_updated",
                "action": "deleted",
                "file_id": 42,
            })))
            .is_some());
    }

    #[test]
    fn unrelated_messages_are_ignored() {
        let mut list = FileList::new();
        list.replace(vec![record(1, "a.csv")]);

        assert!(list.apply(&message(serde_json::json!({"event": "user_joined"}))).is_none());
        assert!(list
            .apply(&message(serde_json::json!({"event": "csv_list_updated", "action": "renamed"})))
            .is_none());
        assert!(list
            .apply(&message(serde_json::json!({"event": "csv_list_updated", "action": "uploaded"})))
            .is_none());
        assert_eq!(list.len(), 1);
    }
}
