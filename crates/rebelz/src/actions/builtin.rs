//! Baseline actions backed by the event directory.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::auth::Identity;
use crate::events::{Event, EventDirectory, EventError, NewEvent};

use super::{
    ActionError, ActionFailure, ActionHandler, ActionOutcome, ActionRegistry, ParamKind, Parameter,
};

fn str_arg(args: &Map<String, Value>, name: &str) -> Option<String> {
    args.get(name).and_then(Value::as_str).map(str::to_string)
}

fn event_json(event: &Event) -> Value {
    json!({
        "id": event.id,
        "title": event.title,
        "description": event.description,
        "eventType": event.event_type,
        "location": event.location,
        "startDateTime": event.start_time,
        "endDateTime": event.end_time,
        "maxParticipants": event.max_participants,
    })
}

impl From<EventError> for ActionFailure {
    fn from(err: EventError) -> Self {
        match err {
            EventError::NotFound | EventError::AlreadyRegistered => {
                ActionFailure::Domain(err.to_string())
            }
            EventError::Internal(e) => ActionFailure::Internal(e),
        }
    }
}

struct CreateEvent {
    directory: Arc<dyn EventDirectory>,
}

#[async_trait]
impl ActionHandler for CreateEvent {
    async fn run(
        &self,
        args: &Map<String, Value>,
        identity: Option<&Identity>,
    ) -> Result<ActionOutcome, ActionFailure> {
        let new_event = NewEvent {
            title: str_arg(args, "title").unwrap_or_default(),
            description: str_arg(args, "description").unwrap_or_default(),
            event_type: str_arg(args, "eventType").unwrap_or_else(|| "general".to_string()),
            location: str_arg(args, "location").unwrap_or_default(),
            start_time: str_arg(args, "startDateTime").unwrap_or_default(),
            end_time: str_arg(args, "endDateTime").unwrap_or_default(),
            max_participants: args.get("maxParticipants").and_then(Value::as_i64),
            created_by: identity.map(|i| i.user_id.clone()).unwrap_or_default(),
        };

        let event = self.directory.create_event(new_event).await?;
        let message = format!("Event '{}' created successfully", event.title);
        Ok(ActionOutcome::Events {
            events: vec![event_json(&event)],
            title: "Event created".to_string(),
            message,
        })
    }
}

struct SearchEvents {
    directory: Arc<dyn EventDirectory>,
}

#[async_trait]
impl ActionHandler for SearchEvents {
    async fn run(
        &self,
        args: &Map<String, Value>,
        _identity: Option<&Identity>,
    ) -> Result<ActionOutcome, ActionFailure> {
        let query = str_arg(args, "query");
        let event_type = str_arg(args, "eventType");
        let events = self
            .directory
            .search_events(query.as_deref(), event_type.as_deref())
            .await?;

        let message = format!("Found {} events matching your criteria", events.len());
        Ok(ActionOutcome::Events {
            events: events.iter().map(event_json).collect(),
            title: "Search results".to_string(),
            message,
        })
    }
}

struct RegisterForEvent {
    directory: Arc<dyn EventDirectory>,
}

#[async_trait]
impl ActionHandler for RegisterForEvent {
    async fn run(
        &self,
        args: &Map<String, Value>,
        identity: Option<&Identity>,
    ) -> Result<ActionOutcome, ActionFailure> {
        // requires_auth on the registration guarantees an identity here
        let user_id = identity
            .map(|i| i.user_id.clone())
            .ok_or_else(|| ActionFailure::Domain("authentication required".to_string()))?;
        let event_id = args
            .get("eventId")
            .and_then(Value::as_i64)
            .ok_or_else(|| ActionFailure::Domain("eventId must be an integer".to_string()))?;

        let event = self.directory.register_for_event(event_id, &user_id).await?;
        Ok(ActionOutcome::Message(format!(
            "Successfully registered for '{}'",
            event.title
        )))
    }
}

/// Register the baseline event actions.
pub fn register_builtin_actions(
    registry: &mut ActionRegistry,
    directory: Arc<dyn EventDirectory>,
) -> Result<(), ActionError> {
    registry.register(
        "createEvent",
        "Create a new event in the community calendar",
        vec![
            Parameter::required("title", ParamKind::String, "Event title"),
            Parameter::optional("description", ParamKind::String, "Event description"),
            Parameter::optional("eventType", ParamKind::String, "Category of the event"),
            Parameter::optional("location", ParamKind::String, "Where the event takes place"),
            Parameter::required("startDateTime", ParamKind::String, "Start time, RFC 3339"),
            Parameter::required("endDateTime", ParamKind::String, "End time, RFC 3339"),
            Parameter::optional("maxParticipants", ParamKind::Number, "Participant cap"),
        ],
        true,
        Arc::new(CreateEvent {
            directory: directory.clone(),
        }),
    )?;

    registry.register(
        "searchEvents",
        "Search published events by text and type",
        vec![
            Parameter::optional("query", ParamKind::String, "Text to match in title or description"),
            Parameter::optional("eventType", ParamKind::String, "Restrict to one event type"),
        ],
        false,
        Arc::new(SearchEvents {
            directory: directory.clone(),
        }),
    )?;

    registry.register(
        "registerForEvent",
        "Register the current user for an event",
        vec![Parameter::required("eventId", ParamKind::Number, "Event id")],
        true,
        Arc::new(RegisterForEvent { directory }),
    )?;

    Ok(())
}
