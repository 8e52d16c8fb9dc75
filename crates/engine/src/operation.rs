//! Operations and the request envelope builder

use crate::error::EngineResult;
use gqlrun_core::{Diagnostic, ErrorCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Default variable name the pagination walker binds the cursor to
pub const DEFAULT_CURSOR_VARIABLE: &str = "after";

/// Whether an operation reads or mutates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Query: variables are sent as-is
    Read,
    /// Mutation: variables are wrapped in `{input: ...}`
    Write,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// Wire body sent to the API endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<'a, V: Serialize> {
    /// Query or mutation text
    pub query: &'a str,
    /// Variables, possibly wrapped
    pub variables: EnvelopeVariables<'a, V>,
}

/// Variables as they appear inside an [`Envelope`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EnvelopeVariables<'a, V: Serialize> {
    /// Read operations
    Plain(&'a V),
    /// Write operations
    Wrapped {
        /// Mutation input
        input: &'a V,
    },
}

impl<'a, V: Serialize> Envelope<'a, V> {
    /// Wrap variables according to the operation kind
    pub fn new(kind: OperationKind, query: &'a str, variables: &'a V) -> Self {
        let variables = match kind {
            OperationKind::Read => EnvelopeVariables::Plain(variables),
            OperationKind::Write => EnvelopeVariables::Wrapped { input: variables },
        };
        Self { query, variables }
    }
}

/// Serialize an operation into its wire body
///
/// The wrapping rule depends only on `kind`, never on the shape of
/// `variables`. Non-serializable variables become a diagnostic.
pub fn build_envelope<V: Serialize>(
    kind: OperationKind,
    query: &str,
    variables: &V,
) -> EngineResult<Vec<u8>> {
    serde_json::to_vec(&Envelope::new(kind, query, variables)).map_err(|e| {
        Diagnostic::new(
            ErrorCode::Serialization,
            format!("failed to serialize {kind} variables: {e}"),
        )
        .with_source(e)
        .into()
    })
}

/// One logical unit of work submitted to the API
///
/// `V` is the variables type and `T` the destination type the response
/// `data` decodes into.
pub struct Operation<V, T> {
    query: String,
    variables: V,
    kind: OperationKind,
    resource: String,
    action: String,
    cursor_variable: String,
    _destination: PhantomData<fn() -> T>,
}

impl<V, T> Operation<V, T>
where
    V: Serialize,
    T: DeserializeOwned,
{
    /// Create a read operation
    pub fn query(query: impl Into<String>, variables: V) -> Self {
        Self::new(OperationKind::Read, query, variables)
    }

    /// Create a write operation
    pub fn mutation(mutation: impl Into<String>, variables: V) -> Self {
        Self::new(OperationKind::Write, mutation, variables)
    }

    /// Create an operation of the given kind
    pub fn new(kind: OperationKind, query: impl Into<String>, variables: V) -> Self {
        Self {
            query: query.into(),
            variables,
            kind,
            resource: "graphql".to_string(),
            action: kind.to_string(),
            cursor_variable: DEFAULT_CURSOR_VARIABLE.to_string(),
            _destination: PhantomData,
        }
    }

    /// Builder-style method to set the resource and operation labels
    #[must_use]
    pub fn with_labels(mut self, resource: impl Into<String>, action: impl Into<String>) -> Self {
        self.resource = resource.into();
        self.action = action.into();
        self
    }

    /// Builder-style method to set the variable the walker binds the cursor to
    #[must_use]
    pub fn with_cursor_variable(mut self, name: impl Into<String>) -> Self {
        self.cursor_variable = name.into();
        self
    }

    /// Query or mutation text
    pub fn text(&self) -> &str {
        &self.query
    }

    /// Variables
    pub fn variables(&self) -> &V {
        &self.variables
    }

    /// Read or write
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Resource label used in diagnostics
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Operation label used in diagnostics
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Cursor variable name
    pub fn cursor_variable(&self) -> &str {
        &self.cursor_variable
    }

    /// Serialize this operation into its wire body
    pub fn envelope(&self) -> EngineResult<Vec<u8>> {
        build_envelope(self.kind, &self.query, &self.variables)
    }

    /// Serialize this operation with `cursor` bound into its variables
    ///
    /// Variables must serialize to a JSON object (or null). An empty cursor
    /// leaves the variables untouched so the first page starts from the top.
    pub fn envelope_with_cursor(&self, cursor: &str) -> EngineResult<Vec<u8>> {
        if cursor.is_empty() {
            return self.envelope();
        }

        let mut variables = match serde_json::to_value(&self.variables)? {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(Diagnostic::new(
                    ErrorCode::Serialization,
                    format!(
                        "cannot bind cursor variable `{}`: variables serialize to {} instead of an object",
                        self.cursor_variable,
                        json_type(&other)
                    ),
                )
                .with_labels(&self.resource, &self.action)
                .into());
            }
        };
        variables.insert(
            self.cursor_variable.clone(),
            serde_json::Value::String(cursor.to_string()),
        );

        build_envelope(self.kind, &self.query, &variables)
    }
}

impl<V: fmt::Debug, T> fmt::Debug for Operation<V, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("kind", &self.kind)
            .field("resource", &self.resource)
            .field("action", &self.action)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
