use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SchemaError;
use crate::period;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
}

impl PeriodType {
    pub const ALL: [PeriodType; 3] = [PeriodType::Daily, PeriodType::Weekly, PeriodType::Monthly];

    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::Daily => "daily",
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" | "d" => Ok(PeriodType::Daily),
            "weekly" | "week" | "w" => Ok(PeriodType::Weekly),
            "monthly" | "month" | "m" => Ok(PeriodType::Monthly),
            other => Err(SchemaError::UnknownPeriodType(other.to_string())),
        }
    }
}

/// A recurring habit definition. Templates are soft-deleted only, so that
/// snapshots referring to them keep resolving.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskTemplate {
    pub id: String,
    pub title: String,
    pub period: PeriodType,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub deleted_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl TaskTemplate {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        period: PeriodType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            period,
            created_at: now,
            deleted_at: None,
            active: true,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(now);
        }
        self.active = false;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OneOffTask {
    pub id: String,
    pub title: String,
    pub completed: bool,
}

/// The materialized record of one period instance. `due_task_ids` is frozen
/// once the snapshot has been persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PeriodSnapshot {
    pub period_key: String,
    pub period_type: PeriodType,
    pub due_task_ids: Vec<String>,
    #[serde(default)]
    pub completion_map: BTreeMap<String, bool>,
    #[serde(default)]
    pub one_off_tasks: Vec<OneOffTask>,
}

impl PeriodSnapshot {
    pub fn is_due(&self, template_id: &str) -> bool {
        self.due_task_ids.iter().any(|id| id == template_id)
    }

    pub fn is_completed(&self, template_id: &str) -> bool {
        self.completion_map.get(template_id).copied().unwrap_or(false)
    }

    pub fn one_off(&self, one_off_id: &str) -> Option<&OneOffTask> {
        self.one_off_tasks.iter().find(|task| task.id == one_off_id)
    }

    fn validate(&self, key: &str) -> Result<(), SchemaError> {
        if self.period_key != key {
            return Err(SchemaError::KeyMismatch {
                key: key.to_string(),
                period_key: self.period_key.clone(),
            });
        }
        if period::parse_period_key(&self.period_key, self.period_type).is_none() {
            return Err(SchemaError::InvalidPeriodKey {
                key: self.period_key.clone(),
                period_type: self.period_type,
            });
        }
        let mut seen = HashSet::new();
        for id in &self.due_task_ids {
            if !seen.insert(id.as_str()) {
                return Err(SchemaError::DuplicateDueTask {
                    key: key.to_string(),
                    id: id.clone(),
                });
            }
        }
        let mut seen = HashSet::new();
        for task in &self.one_off_tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(SchemaError::DuplicateOneOff {
                    key: key.to_string(),
                    id: task.id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Aggregate root: every template plus every snapshot ever persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AppState {
    pub templates: Vec<TaskTemplate>,
    #[serde(default)]
    pub snapshots: BTreeMap<String, PeriodSnapshot>,
    /// Bumped by every local mutation; orders full-state writes.
    #[serde(default)]
    pub revision: u64,
}

pub const DEFAULT_TEMPLATES: [(&str, &str); 2] =
    [("1", "Morning Exercise"), ("2", "Read 20 Pages")];

impl AppState {
    /// State written for an account that has no document yet.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            templates: DEFAULT_TEMPLATES
                .iter()
                .map(|(id, title)| TaskTemplate::new(*id, *title, PeriodType::Daily, now))
                .collect(),
            snapshots: BTreeMap::new(),
            revision: 0,
        }
    }

    pub fn template(&self, id: &str) -> Option<&TaskTemplate> {
        self.templates.iter().find(|template| template.id == id)
    }

    /// Decode and validate a remote document body.
    pub fn from_document(document: Value) -> Result<Self, SchemaError> {
        let state: AppState = serde_json::from_value(document)?;
        state.validate()?;
        Ok(state)
    }

    pub fn to_document(&self) -> Result<Value, SchemaError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut ids = HashSet::new();
        for template in &self.templates {
            if !ids.insert(template.id.as_str()) {
                return Err(SchemaError::DuplicateTemplate(template.id.clone()));
            }
            if template.deleted_at.is_some() && template.active {
                return Err(SchemaError::DeletedButActive(template.id.clone()));
            }
        }
        for (key, snapshot) in &self.snapshots {
            snapshot.validate(key)?;
        }
        Ok(())
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}
