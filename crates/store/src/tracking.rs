//! Activity tracking.
//!
//! The service reports every successful mutation to an [`ActivityTracker`].
//! Trackers must not fail the operation that produced the event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    PersonaCreated,
    PersonaUpdated,
    PersonaDeleted,
    TemplateCreated,
    TemplateUpdated,
    TemplateVersioned,
    TemplateDeleted,
    PromptGenerated,
    PromptDeleted,
    ProfileCreated,
    ProfileUpdated,
    ProfileDeleted,
}

impl Activity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::PersonaCreated => "persona_created",
            Activity::PersonaUpdated => "persona_updated",
            Activity::PersonaDeleted => "persona_deleted",
            Activity::TemplateCreated => "template_created",
            Activity::TemplateUpdated => "template_updated",
            Activity::TemplateVersioned => "template_versioned",
            Activity::TemplateDeleted => "template_deleted",
            Activity::PromptGenerated => "prompt_generated",
            Activity::PromptDeleted => "prompt_deleted",
            Activity::ProfileCreated => "profile_created",
            Activity::ProfileUpdated => "profile_updated",
            Activity::ProfileDeleted => "profile_deleted",
        }
    }
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEvent {
    pub activity: Activity,
    pub entity_id: Uuid,

    /// Template version, for template and prompt events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<Uuid>,

    pub at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(activity: Activity, entity_id: Uuid) -> Self {
        Self {
            activity,
            entity_id,
            version: None,
            profile_id: None,
            at: Utc::now(),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_profile(mut self, profile_id: Uuid) -> Self {
        self.profile_id = Some(profile_id);
        self
    }
}

/// Sink for activity events.
pub trait ActivityTracker: Send + Sync {
    fn record(&self, event: ActivityEvent);
}

/// Emits each event as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTracker;

impl ActivityTracker for TracingTracker {
    fn record(&self, event: ActivityEvent) {
        tracing::info!(
            target: "promptly::activity",
            activity = event.activity.as_str(),
            entity_id = %event.entity_id,
            version = event.version,
            profile_id = event.profile_id.map(|id| id.to_string()),
            "activity"
        );
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracker;

impl ActivityTracker for NoopTracker {
    fn record(&self, _event: ActivityEvent) {}
}
