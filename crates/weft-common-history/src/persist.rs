// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::HistoryStoreError;
use crate::model::{ConversationId, ConversationRecord};

/// Load/save of session id, chat history and memory per conversation.
#[async_trait]
pub trait ConversationStore: Send + Sync {
	async fn load(&self, id: &ConversationId)
		-> Result<Option<ConversationRecord>, HistoryStoreError>;
	async fn save(&self, record: &ConversationRecord) -> Result<(), HistoryStoreError>;
	async fn delete(&self, id: &ConversationId) -> Result<(), HistoryStoreError>;
}

pub struct LocalConversationStore {
	root: PathBuf,
}

impl LocalConversationStore {
	pub fn new(root: PathBuf) -> Self {
		Self { root }
	}

	pub fn from_xdg() -> Result<Self, HistoryStoreError> {
		let data_dir = dirs::data_dir().ok_or_else(|| {
			HistoryStoreError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				"could not determine XDG data directory",
			))
		})?;

		let root = data_dir.join("weft").join("conversations");
		std::fs::create_dir_all(&root)?;

		info!(
				root = %root.display(),
				"initialized local conversation store"
		);

		Ok(Self::new(root))
	}

	fn record_path(&self, id: &ConversationId) -> PathBuf {
		self.root.join(format!("{id}.json"))
	}
}

#[async_trait]
impl ConversationStore for LocalConversationStore {
	async fn load(
		&self,
		id: &ConversationId,
	) -> Result<Option<ConversationRecord>, HistoryStoreError> {
		let path = self.record_path(id);

		if !path.exists() {
			debug!(conversation_id = %id, path = %path.display(), "conversation file not found");
			return Ok(None);
		}

		let contents = tokio::fs::read_to_string(&path).await?;
		let record: ConversationRecord = serde_json::from_str(&contents)?;

		debug!(
				conversation_id = %id,
				messages = record.history.len(),
				"loaded conversation from disk"
		);

		Ok(Some(record))
	}

	async fn save(&self, record: &ConversationRecord) -> Result<(), HistoryStoreError> {
		tokio::fs::create_dir_all(&self.root).await?;

		let path = self.record_path(&record.id);
		let tmp_path = self.root.join(format!("{}.json.tmp", record.id));

		let json = serde_json::to_string_pretty(record)?;

		tokio::fs::write(&tmp_path, &json).await?;
		tokio::fs::rename(&tmp_path, &path).await?;

		debug!(
				conversation_id = %record.id,
				messages = record.history.len(),
				path = %path.display(),
				"saved conversation to disk"
		);

		Ok(())
	}

	async fn delete(&self, id: &ConversationId) -> Result<(), HistoryStoreError> {
		let path = self.record_path(id);

		if !path.exists() {
			return Err(HistoryStoreError::NotFound(id.to_string()));
		}

		tokio::fs::remove_file(&path).await?;

		info!(conversation_id = %id, "deleted conversation");

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;
	use weft_common_core::{HistoryMessage, TodoItem};

	fn create_test_store() -> (LocalConversationStore, TempDir) {
		let tmp = TempDir::new().unwrap();
		let store = LocalConversationStore::new(tmp.path().to_path_buf());
		(store, tmp)
	}

	#[tokio::test]
	async fn test_save_and_load_record() {
		let (store, _tmp) = create_test_store();
		let mut record = ConversationRecord::new(ConversationId::new());
		record.acp_session_id = Some("sess-1".to_string());
		record.history.upsert(HistoryMessage::user("hello"));
		record.plan.replace(vec![TodoItem::new("write tests")]);

		store.save(&record).await.unwrap();
		let loaded = store.load(&record.id).await.unwrap().expect("record saved");

		assert_eq!(loaded.acp_session_id.as_deref(), Some("sess-1"));
		assert_eq!(loaded.history.len(), 1);
		assert_eq!(loaded.plan.unfinished(), 1);
	}

	#[tokio::test]
	async fn test_load_missing_returns_none() {
		let (store, _tmp) = create_test_store();
		assert!(store.load(&ConversationId::new()).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_save_overwrites_atomically() {
		let (store, tmp) = create_test_store();
		let mut record = ConversationRecord::new(ConversationId::new());
		store.save(&record).await.unwrap();

		record.acp_session_id = Some("sess-2".to_string());
		store.save(&record).await.unwrap();

		let loaded = store.load(&record.id).await.unwrap().unwrap();
		assert_eq!(loaded.acp_session_id.as_deref(), Some("sess-2"));
		let leftovers = std::fs::read_dir(tmp.path())
			.unwrap()
			.filter(|e| {
				e.as_ref()
					.map(|e| e.path().to_string_lossy().ends_with(".tmp"))
					.unwrap_or(false)
			})
			.count();
		assert_eq!(leftovers, 0);
	}

	#[tokio::test]
	async fn test_delete_missing_is_not_found() {
		let (store, _tmp) = create_test_store();
		let result = store.delete(&ConversationId::new()).await;
		assert!(matches!(result, Err(HistoryStoreError::NotFound(_))));
	}
}
