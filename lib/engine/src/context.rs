//! Execution context for condition evaluation and template rendering.
//!
//! A context is an immutable snapshot of the data surrounding a triggering
//! event, organized into a small closed set of namespaces. It is built once
//! per domain event and only ever read afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// The closed set of context namespaces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Fields describing the contact involved in the trigger.
    Contact,
    /// Fields describing the calendar event involved in the trigger.
    Event,
    /// Fields describing the inbound message that triggered the workflow.
    Message,
    /// Fields describing the task involved in the trigger.
    Task,
}

impl Namespace {
    /// Returns the lowercase name used in field paths.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Event => "event",
            Self::Message => "message",
            Self::Task => "task",
        }
    }

    /// Parses a namespace from the first segment of a field path.
    #[must_use]
    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "contact" => Some(Self::Contact),
            "event" => Some(Self::Event),
            "message" => Some(Self::Message),
            "task" => Some(Self::Task),
            _ => None,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable data snapshot evaluated by conditions and templates.
///
/// Field paths are dotted: the first segment names a namespace, the second a
/// field, and any further segments descend into nested JSON objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    namespaces: BTreeMap<Namespace, BTreeMap<String, JsonValue>>,
}

impl ExecutionContext {
    /// Returns a builder for assembling a context.
    #[must_use]
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Resolves a dotted field path to its value, if present.
    ///
    /// Returns `None` for unknown namespaces, missing fields, and paths that
    /// descend into non-object values.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&JsonValue> {
        let mut segments = path.split('.');
        let namespace = Namespace::parse(segments.next()?)?;
        let field = segments.next()?;
        let mut current = self.namespaces.get(&namespace)?.get(field)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Returns true if the context carries no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.namespaces.values().all(BTreeMap::is_empty)
    }
}

/// Builder for [`ExecutionContext`].
#[derive(Debug, Default)]
pub struct ContextBuilder {
    namespaces: BTreeMap<Namespace, BTreeMap<String, JsonValue>>,
}

impl ContextBuilder {
    /// Adds a single field under a namespace.
    #[must_use]
    pub fn field(
        mut self,
        namespace: Namespace,
        name: impl Into<String>,
        value: impl Into<JsonValue>,
    ) -> Self {
        self.namespaces
            .entry(namespace)
            .or_default()
            .insert(name.into(), value.into());
        self
    }

    /// Adds every field from an iterator under a namespace.
    #[must_use]
    pub fn fields(
        mut self,
        namespace: Namespace,
        fields: impl IntoIterator<Item = (String, JsonValue)>,
    ) -> Self {
        self.namespaces.entry(namespace).or_default().extend(fields);
        self
    }

    /// Finalizes the context.
    #[must_use]
    pub fn build(self) -> ExecutionContext {
        ExecutionContext {
            namespaces: self.namespaces,
        }
    }
}

/// Renders a context value as plain text.
///
/// Strings render without surrounding quotes; all other values use their
/// compact JSON form.
#[must_use]
pub fn value_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
