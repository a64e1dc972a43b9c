//! Note book
//!
//! Private notes of the signed-in viewer. Every call is scoped to the
//! viewer's `user_id` and failures are surfaced.

use std::sync::Arc;

use chrono::Utc;

use crate::data::{
    Filter, Mood, NewNote, Note, NotePatch, Persistence, Select, Table, from_row, from_rows, to_row,
};
use crate::error::AppError;

/// Input of note create/update
#[derive(Debug, Clone, Default)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub mood: Option<Mood>,
}

impl NoteDraft {
    fn validated(self) -> Result<Self, AppError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::Validation("Note title is required".to_string()));
        }
        Ok(Self {
            title,
            content: self.content.trim().to_string(),
            mood: self.mood,
        })
    }
}

/// Note book
pub struct NoteBook {
    store: Arc<dyn Persistence>,
    viewer: Option<String>,
}

impl NoteBook {
    pub fn new(store: Arc<dyn Persistence>, viewer: Option<String>) -> Self {
        Self { store, viewer }
    }

    fn viewer(&self) -> Result<&str, AppError> {
        self.viewer.as_deref().ok_or(AppError::Unauthenticated)
    }

    /// Viewer's notes, most recently updated first
    pub async fn list(&self) -> Result<Vec<Note>, AppError> {
        let viewer = self.viewer()?;
        let query = Select::from(Table::Notes)
            .filter(Filter::new().eq("user_id", viewer))
            .newest_first("updated_at");
        from_rows(self.store.select(&query).await?)
    }

    pub async fn create(&self, draft: NoteDraft) -> Result<Note, AppError> {
        let viewer = self.viewer()?;
        let draft = draft.validated()?;

        let new_note = NewNote {
            title: draft.title,
            content: draft.content,
            mood: draft.mood,
            user_id: viewer.to_string(),
        };
        let row = self.store.insert(Table::Notes, to_row(&new_note)?).await?;
        let note: Note = from_row(row)?;
        tracing::debug!(note_id = %note.id, "Note created");
        Ok(note)
    }

    pub async fn update(&self, note_id: &str, draft: NoteDraft) -> Result<(), AppError> {
        let viewer = self.viewer()?;
        let draft = draft.validated()?;

        let patch = NotePatch {
            title: draft.title,
            content: draft.content,
            mood: draft.mood,
            updated_at: Utc::now(),
        };
        let filter = Filter::new().eq("id", note_id).eq("user_id", viewer);
        self.store
            .update(Table::Notes, to_row(&patch)?, &filter)
            .await?;
        tracing::debug!(note_id, "Note updated");
        Ok(())
    }

    pub async fn delete(&self, note_id: &str) -> Result<(), AppError> {
        let viewer = self.viewer()?;
        let filter = Filter::new().eq("id", note_id).eq("user_id", viewer);
        self.store.delete(Table::Notes, &filter).await?;
        tracing::debug!(note_id, "Note deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryStore;

    #[tokio::test]
    async fn notes_are_scoped_to_viewer() {
        let store = Arc::new(MemoryStore::new());
        let mine = NoteBook::new(store.clone(), Some("v".to_string()));
        let theirs = NoteBook::new(store.clone(), Some("w".to_string()));

        let note = mine
            .create(NoteDraft {
                title: " Monday ".to_string(),
                content: "rain".to_string(),
                mood: None,
            })
            .await
            .unwrap();
        assert_eq!(note.title, "Monday");

        assert!(theirs.list().await.unwrap().is_empty());
        theirs.delete(&note.id).await.unwrap();
        assert_eq!(mine.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_bumps_updated_at_and_reorders() {
        let store = Arc::new(MemoryStore::new());
        let book = NoteBook::new(store, Some("v".to_string()));
        let first = book
            .create(NoteDraft {
                title: "first".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        book.create(NoteDraft {
            title: "second".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        book.update(
            &first.id,
            NoteDraft {
                title: "first, edited".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let titles: Vec<_> = book.list().await.unwrap().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["first, edited".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn title_is_required() {
        let store = Arc::new(MemoryStore::new());
        let book = NoteBook::new(store.clone(), Some("v".to_string()));
        assert!(matches!(
            book.create(NoteDraft::default()).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(store.total_calls(), 0);
    }
}
