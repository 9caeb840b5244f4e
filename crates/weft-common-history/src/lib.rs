// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

pub mod error;
pub mod model;
pub mod persist;
pub mod store;

pub use error::{ConversationIdError, HistoryStoreError};
pub use model::{ConversationId, ConversationRecord};
pub use persist::{ConversationStore, LocalConversationStore};
pub use store::{HistoryStore, Upsert};
