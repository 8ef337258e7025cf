//! Capability System
//!
//! A [`CapabilityProvider`] is a named bundle of callable capabilities plus
//! readable resources and prompt templates. Providers own their state; the
//! registry only ever reaches them through this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};

/// Decoded capability arguments
pub type Arguments = Map<String, Value>;

/// Primitive parameter type, as exposed in the JSON schema
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Whether a JSON value has this type
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// Parameter definition for a capability
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// Primitive type
    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: false,
            enum_values: None,
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::String, description)
    }

    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Number, description)
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict the parameter to a fixed set of string values
    #[must_use]
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| Value::from(*v)).collect());
        self
    }

    fn json_schema(&self) -> Value {
        let mut schema = serde_json::json!({
            "type": self.param_type.as_str(),
            "description": self.description,
        });
        if let Some(values) = &self.enum_values {
            schema["enum"] = Value::Array(values.clone());
        }
        schema
    }
}

/// A single named operation a provider can execute
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Capability {
    /// Name, unique within its provider
    pub name: String,

    /// Human-readable description (shown to the model)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl Capability {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, parameter: ParameterSchema) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Check required presence, declared type and enum membership
    pub fn validate(&self, args: &Arguments) -> Result<()> {
        for param in &self.parameters {
            let value = match args.get(&param.name) {
                Some(Value::Null) | None => {
                    if param.required {
                        return Err(AgentError::invalid_argument(
                            &param.name,
                            "required parameter is missing",
                        ));
                    }
                    continue;
                }
                Some(value) => value,
            };

            if !param.param_type.accepts(value) {
                return Err(AgentError::invalid_argument(
                    &param.name,
                    format!("expected {}", param.param_type.as_str()),
                ));
            }

            if let Some(allowed) = &param.enum_values {
                if !allowed.contains(value) {
                    return Err(AgentError::invalid_argument(
                        &param.name,
                        format!("must be one of {}", Value::Array(allowed.clone())),
                    ));
                }
            }
        }
        Ok(())
    }

    /// JSON schema for the parameter object
    pub fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.json_schema()))
            .collect();
        let required: Vec<Value> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| Value::from(p.name.clone()))
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Model-facing tool schema, keyed by qualified name
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// `<providerId>_<capabilityName>`
    pub name: String,

    pub description: String,

    /// `{ type: object, properties, required }`
    pub parameters: Value,
}

/// A readable resource exposed by a provider
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(default = "default_mime")]
    pub mime_type: String,
}

fn default_mime() -> String {
    "application/json".into()
}

impl Resource {
    pub fn new(uri: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: description.into(),
            mime_type: default_mime(),
        }
    }
}

/// A prompt template a provider can render
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub description: String,
    /// Argument names the template expects
    pub arguments: Vec<String>,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, description: impl Into<String>, arguments: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments: arguments.iter().map(|a| (*a).to_string()).collect(),
        }
    }
}

/// Capability provider trait - implement to add new capabilities
///
/// Provider ids must not contain `_`; the registry uses it as the separator
/// of qualified names.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Stable identifier, the qualified-name prefix
    fn id(&self) -> &str;

    /// Display name
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Declared capabilities, fixed at construction
    fn capabilities(&self) -> &[Capability];

    /// Statically advertised resources
    fn resources(&self) -> Vec<Resource> {
        Vec::new()
    }

    /// Prompt templates
    fn prompts(&self) -> &[PromptTemplate] {
        &[]
    }

    /// Look up a declared capability by its unqualified name
    fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities().iter().find(|c| c.name == name)
    }

    /// Execute a capability. Implementations validate their own arguments.
    async fn execute(&self, name: &str, args: &Arguments) -> Result<Value>;

    /// Read a resource by URI; unknown URIs fail with `NotFound`
    async fn read_resource(&self, uri: &str) -> Result<Value> {
        Err(AgentError::NotFound(format!("resource {uri}")))
    }

    /// Render a prompt template; unknown names fail with `NotFound`
    async fn render_prompt(&self, name: &str, _args: &Arguments) -> Result<String> {
        Err(AgentError::NotFound(format!("prompt {name}")))
    }
}

/// Typed accessors over decoded arguments
pub mod args {
    use super::Arguments;
    use crate::error::{AgentError, Result};

    /// A required, non-empty string parameter
    pub fn required_str<'a>(args: &'a Arguments, name: &str) -> Result<&'a str> {
        match args.get(name).and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => Ok(s),
            Some(_) => Err(AgentError::invalid_argument(name, "must not be empty")),
            None => Err(AgentError::invalid_argument(name, "required string parameter is missing")),
        }
    }

    pub fn optional_str<'a>(args: &'a Arguments, name: &str) -> Option<&'a str> {
        args.get(name).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
    }

    pub fn optional_f64(args: &Arguments, name: &str) -> Option<f64> {
        args.get(name).and_then(serde_json::Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn search() -> Capability {
        Capability::new("searchTickets", "Search tickets")
            .param(ParameterSchema::string("query", "Free text").required())
            .param(ParameterSchema::string("status", "Filter").one_of(&["open", "closed"]))
    }

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_validate_missing_required() {
        let err = search().validate(&Arguments::new()).unwrap_err();
        assert!(matches!(err, AgentError::InvalidArgument { ref parameter, .. } if parameter == "query"));
    }

    #[test]
    fn test_validate_wrong_type_and_enum() {
        let err = search().validate(&args(json!({"query": 42}))).unwrap_err();
        assert!(matches!(err, AgentError::InvalidArgument { ref parameter, .. } if parameter == "query"));

        let err = search()
            .validate(&args(json!({"query": "vpn", "status": "stale"})))
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidArgument { ref parameter, .. } if parameter == "status"));

        assert!(search().validate(&args(json!({"query": "vpn", "status": "open"}))).is_ok());
    }

    #[test]
    fn test_parameters_schema_shape() {
        let schema = search().parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["query"]["type"], "string");
        assert_eq!(schema["properties"]["status"]["enum"], json!(["open", "closed"]));
        assert_eq!(schema["required"], json!(["query"]));
    }
}
