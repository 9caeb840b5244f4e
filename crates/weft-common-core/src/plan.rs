// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Todo plan shared between the agent protocol and the todo tool.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
	#[default]
	Pending,
	InProgress,
	Completed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoPriority {
	High,
	#[default]
	Medium,
	Low,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
	pub content: String,
	#[serde(default)]
	pub status: TodoStatus,
	#[serde(default)]
	pub priority: TodoPriority,
}

impl TodoItem {
	pub fn new(content: impl Into<String>) -> Self {
		Self {
			content: content.into(),
			status: TodoStatus::Pending,
			priority: TodoPriority::Medium,
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
	pub entries: Vec<TodoItem>,
}

impl Plan {
	pub fn unfinished(&self) -> usize {
		self
			.entries
			.iter()
			.filter(|e| e.status != TodoStatus::Completed)
			.count()
	}

	/// Replaces the whole plan; plans are never merged.
	pub fn replace(&mut self, entries: Vec<TodoItem>) {
		self.entries = entries;
	}
}

/// Plan handle shared by the caller, tools and the session manager.
#[derive(Clone, Debug, Default)]
pub struct SharedPlan(Arc<Mutex<Plan>>);

impl SharedPlan {
	pub fn new(plan: Plan) -> Self {
		Self(Arc::new(Mutex::new(plan)))
	}

	pub fn lock(&self) -> MutexGuard<'_, Plan> {
		// A poisoned plan is still a valid plan.
		self.0.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub fn snapshot(&self) -> Plan {
		self.lock().clone()
	}

	pub fn unfinished(&self) -> usize {
		self.lock().unfinished()
	}
}
