use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::ToolDefinition;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> ToolSchema;
    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParameterKind {
    String,
    Integer,
    Number,
    Boolean,
    StringArray,
}

impl ParameterKind {
    fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::StringArray => "array",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::StringArray => {
                value.as_array().is_some_and(|items| items.iter().all(Value::is_string))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub description: String,
    pub kind: ParameterKind,
    pub required: bool,
    pub allowed: Vec<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl Parameter {
    pub fn new(name: &str, kind: ParameterKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required: false,
            allowed: Vec::new(),
            minimum: None,
            maximum: None,
        }
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, ParameterKind::String, description)
    }

    pub fn integer(name: &str, description: &str) -> Self {
        Self::new(name, ParameterKind::Integer, description)
    }

    pub fn string_array(name: &str, description: &str) -> Self {
        Self::new(name, ParameterKind::StringArray, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = values.iter().map(|value| value.to_string()).collect();
        self
    }

    pub fn range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    fn to_json_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".into(), json!(self.kind.json_type()));
        schema.insert("description".into(), json!(self.description));
        if self.kind == ParameterKind::StringArray {
            schema.insert("items".into(), json!({ "type": "string" }));
        }
        if !self.allowed.is_empty() {
            schema.insert("enum".into(), json!(self.allowed));
        }
        if let Some(minimum) = self.minimum {
            schema.insert("minimum".into(), json!(minimum));
        }
        if let Some(maximum) = self.maximum {
            schema.insert("maximum".into(), json!(maximum));
        }
        Value::Object(schema)
    }

    fn validate(&self, value: &Value) -> Result<(), ToolArgumentError> {
        if !self.kind.accepts(value) {
            return Err(ToolArgumentError::WrongType {
                name: self.name.clone(),
                expected: self.kind.json_type(),
            });
        }
        if !self.allowed.is_empty() {
            let text = value.as_str().unwrap_or_default();
            if !self.allowed.iter().any(|allowed| allowed == text) {
                return Err(ToolArgumentError::NotAllowed {
                    name: self.name.clone(),
                    value: text.to_string(),
                    allowed: self.allowed.join(", "),
                });
            }
        }
        if let Some(number) = value.as_f64() {
            let below = self.minimum.is_some_and(|minimum| number < minimum);
            let above = self.maximum.is_some_and(|maximum| number > maximum);
            if below || above {
                return Err(ToolArgumentError::OutOfRange {
                    name: self.name.clone(),
                    value: number,
                });
            }
        }
        Ok(())
    }
}

/// The parameter list of a tool, rendered to JSON Schema for the model and
/// checked against every call before the tool runs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolSchema {
    pub parameters: Vec<Parameter>,
}

impl ToolSchema {
    pub fn new(parameters: Vec<Parameter>) -> Self {
        Self { parameters }
    }

    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|parameter| (parameter.name.clone(), parameter.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|parameter| parameter.required)
            .map(|parameter| parameter.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn validate(&self, input: &Value) -> Result<(), ToolArgumentError> {
        let object = input.as_object().ok_or(ToolArgumentError::NotAnObject)?;
        for parameter in &self.parameters {
            match object.get(&parameter.name) {
                None | Some(Value::Null) if parameter.required => {
                    return Err(ToolArgumentError::MissingRequired(parameter.name.clone()));
                }
                None | Some(Value::Null) => {}
                Some(value) => parameter.validate(value)?,
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ToolArgumentError {
    #[error("arguments are not valid JSON: {0}")]
    InvalidJson(String),
    #[error("arguments must be a JSON object")]
    NotAnObject,
    #[error("missing required parameter `{0}`")]
    MissingRequired(String),
    #[error("parameter `{name}` must be of type {expected}")]
    WrongType { name: String, expected: &'static str },
    #[error("parameter `{name}` must be one of [{allowed}], got `{value}`")]
    NotAllowed { name: String, value: String, allowed: String },
    #[error("parameter `{name}` is out of range: {value}")]
    OutOfRange { name: String, value: f64 },
}

pub fn parse_arguments(raw: &str) -> Result<Value, ToolArgumentError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(raw).map_err(|error| ToolArgumentError::InvalidJson(error.to_string()))
}

/// Tool result reported back to the model when a call cannot be honoured.
pub fn error_payload(message: impl Into<String>) -> String {
    json!({ "status": "error", "message": message.into() }).to_string()
}

/// Ordered set of tools. Order is preserved so the definitions sent to the
/// model are stable from turn to turn.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.register_arc(Arc::new(tool));
    }

    /// Registering a name twice replaces the earlier tool in place.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|existing| existing.name() == tool.name()) {
            Some(index) => self.tools[index] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.schema().to_json_schema(),
            })
            .collect()
    }

    /// Runs a model-requested call. Never fails: unknown tools, invalid
    /// arguments and execution errors all come back as an error payload the
    /// model can read.
    pub async fn invoke(&self, name: &str, raw_arguments: &str) -> String {
        let Some(tool) = self.get(name) else {
            warn!(event_name = "agent.tool.unknown", tool = name, "model requested unknown tool");
            return error_payload(format!("unknown tool `{name}`"));
        };

        let input = match parse_arguments(raw_arguments)
            .and_then(|input| tool.schema().validate(&input).map(|()| input))
        {
            Ok(input) => input,
            Err(error) => {
                warn!(
                    event_name = "agent.tool.invalid_arguments",
                    tool = name,
                    error = %error,
                    "rejected tool arguments"
                );
                return error_payload(error.to_string());
            }
        };

        debug!(event_name = "agent.tool.execute", tool = name, "executing tool");
        match tool.execute(input).await {
            Ok(Value::String(text)) => text,
            Ok(value) => value.to_string(),
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    tool = name,
                    error = %error,
                    "tool execution failed"
                );
                error_payload(error.to_string())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
