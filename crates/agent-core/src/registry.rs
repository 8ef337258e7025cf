//! Capability Registry
//!
//! Aggregates providers, exposes their capabilities under qualified names
//! (`<providerId>_<capabilityName>`) and dispatches execution.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::capability::{Arguments, Capability, CapabilityProvider, PromptTemplate, Resource, ToolSchema};
use crate::error::{AgentError, Result};

/// Separator between provider id and capability name
pub const SEPARATOR: char = '_';

/// A parsed qualified capability name.
///
/// The provider id is the first `_`-delimited segment; everything after it
/// is the capability name, so capability names may themselves contain `_`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    provider: String,
    capability: String,
}

impl QualifiedName {
    pub fn new(provider: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            capability: capability.into(),
        }
    }

    /// Split at the first separator; `None` if either side is empty
    pub fn parse(qualified: &str) -> Option<Self> {
        let (provider, capability) = qualified.split_once(SEPARATOR)?;
        if provider.is_empty() || capability.is_empty() {
            return None;
        }
        Some(Self::new(provider, capability))
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.provider, SEPARATOR, self.capability)
    }
}

/// Registry of capability providers.
///
/// Holds shared handles; the same provider may be registered with many
/// registries.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    providers: Vec<Arc<dyn CapabilityProvider>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Ids must be non-empty, `_`-free and unique.
    pub fn register(&mut self, provider: Arc<dyn CapabilityProvider>) -> Result<()> {
        let id = provider.id();
        if id.is_empty() || id.contains(SEPARATOR) {
            return Err(AgentError::Config(format!(
                "provider id '{id}' must be non-empty and must not contain '{SEPARATOR}'"
            )));
        }
        if self.provider(id).is_some() {
            return Err(AgentError::Config(format!("provider '{id}' is already registered")));
        }

        tracing::debug!(provider = id, capabilities = provider.capabilities().len(), "Registered provider");
        self.providers.push(provider);
        Ok(())
    }

    /// Builder-style registration
    pub fn with_provider(mut self, provider: Arc<dyn CapabilityProvider>) -> Result<Self> {
        self.register(provider)?;
        Ok(self)
    }

    /// Get a provider by id
    pub fn provider(&self, id: &str) -> Option<&Arc<dyn CapabilityProvider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    pub fn providers(&self) -> &[Arc<dyn CapabilityProvider>] {
        &self.providers
    }

    /// Resolve a qualified name to its provider and capability
    pub fn resolve(&self, qualified: &str) -> Result<(&Arc<dyn CapabilityProvider>, &Capability)> {
        let name = QualifiedName::parse(qualified)
            .ok_or_else(|| AgentError::UnknownProvider(qualified.to_string()))?;

        let provider = self
            .provider(name.provider())
            .ok_or_else(|| AgentError::UnknownProvider(name.provider().to_string()))?;

        let capability = provider.capability(name.capability()).ok_or_else(|| {
            AgentError::UnknownCapability {
                provider: name.provider().to_string(),
                capability: name.capability().to_string(),
            }
        })?;

        Ok((provider, capability))
    }

    /// Execute a capability by qualified name
    pub async fn execute(&self, qualified: &str, args: &Arguments) -> Result<Value> {
        let (provider, capability) = self.resolve(qualified)?;
        tracing::debug!(provider = provider.id(), capability = %capability.name, "Dispatching capability");
        provider.execute(&capability.name, args).await
    }

    /// Every capability in model-facing form, in registration order
    pub fn list_capabilities(&self) -> Vec<ToolSchema> {
        self.providers
            .iter()
            .flat_map(|provider| {
                provider.capabilities().iter().map(move |capability| ToolSchema {
                    name: QualifiedName::new(provider.id(), &capability.name).to_string(),
                    description: capability.description.clone(),
                    parameters: capability.parameters_schema(),
                })
            })
            .collect()
    }

    /// Qualified capability names
    pub fn capability_names(&self) -> Vec<String> {
        self.list_capabilities().into_iter().map(|s| s.name).collect()
    }

    /// Advertised resources with their provider id
    pub fn list_resources(&self) -> Vec<(String, Resource)> {
        self.providers
            .iter()
            .flat_map(|p| p.resources().into_iter().map(|r| (p.id().to_string(), r)))
            .collect()
    }

    /// Prompt templates with their provider id
    pub fn list_prompts(&self) -> Vec<(String, PromptTemplate)> {
        self.providers
            .iter()
            .flat_map(|p| p.prompts().iter().map(|t| (p.id().to_string(), t.clone())))
            .collect()
    }

    pub async fn read_resource(&self, provider_id: &str, uri: &str) -> Result<Value> {
        let provider = self
            .provider(provider_id)
            .ok_or_else(|| AgentError::UnknownProvider(provider_id.to_string()))?;
        provider.read_resource(uri).await
    }

    pub async fn render_prompt(&self, provider_id: &str, name: &str, args: &Arguments) -> Result<String> {
        let provider = self
            .provider(provider_id)
            .ok_or_else(|| AgentError::UnknownProvider(provider_id.to_string()))?;
        provider.render_prompt(name, args).await
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// System prompt section describing available capabilities, for
    /// backends without native tool calling
    pub fn generate_prompt_section(&self) -> String {
        let mut prompt = String::from("## Available Tools\n\n");

        for provider in &self.providers {
            for capability in provider.capabilities() {
                let qualified = QualifiedName::new(provider.id(), &capability.name);
                prompt.push_str(&format!("### {qualified}\n{}\n", capability.description));

                if !capability.parameters.is_empty() {
                    prompt.push_str("**Parameters:**\n");
                    for param in &capability.parameters {
                        let required = if param.required { " (required)" } else { "" };
                        prompt.push_str(&format!(
                            "- `{}` ({}){}: {}\n",
                            param.name,
                            param.param_type.as_str(),
                            required,
                            param.description
                        ));
                    }
                }
                prompt.push('\n');
            }
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ParameterSchema;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo {
        id: &'static str,
        capabilities: Vec<Capability>,
    }

    impl Echo {
        fn new(id: &'static str) -> Self {
            Self {
                id,
                capabilities: vec![
                    Capability::new("say", "Echo text")
                        .param(ParameterSchema::string("text", "Text").required()),
                    Capability::new("say_twice", "Echo text twice"),
                ],
            }
        }
    }

    #[async_trait]
    impl CapabilityProvider for Echo {
        fn id(&self) -> &str { self.id }
        fn name(&self) -> &str { "Echo" }
        fn description(&self) -> &str { "Echoes arguments" }
        fn capabilities(&self) -> &[Capability] { &self.capabilities }

        async fn execute(&self, name: &str, args: &Arguments) -> Result<Value> {
            let capability = self.capability(name).ok_or_else(|| AgentError::UnknownCapability {
                provider: self.id.into(),
                capability: name.into(),
            })?;
            capability.validate(args)?;
            Ok(json!({ "capability": name, "args": args }))
        }
    }

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::new().with_provider(Arc::new(Echo::new("echo"))).unwrap()
    }

    #[test]
    fn test_qualified_name_round_trip() {
        for (provider, capability) in [("docs", "update_page_body"), ("echo", "say"), ("a", "b_c_d")] {
            let qualified = QualifiedName::new(provider, capability).to_string();
            let parsed = QualifiedName::parse(&qualified).unwrap();
            assert_eq!(parsed.provider(), provider);
            assert_eq!(parsed.capability(), capability);
            assert_eq!(parsed.to_string(), qualified);
        }
        assert!(QualifiedName::parse("noseparator").is_none());
        assert!(QualifiedName::parse("_leading").is_none());
    }

    #[test]
    fn test_rejects_bad_provider_ids() {
        let mut registry = registry();
        assert!(registry.register(Arc::new(Echo::new("echo"))).is_err());
        assert!(registry.register(Arc::new(Echo::new("bad_id"))).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_capabilities() {
        let schemas = registry().list_capabilities();
        let names: Vec<_> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["echo_say", "echo_say_twice"]);
        assert_eq!(schemas[0].parameters["required"], json!(["text"]));
    }

    #[tokio::test]
    async fn test_execute_dispatch_and_errors() {
        let registry = registry();
        let args = json!({"text": "hi"}).as_object().cloned().unwrap();

        let out = registry.execute("echo_say_twice", &args).await.unwrap();
        assert_eq!(out["capability"], "say_twice");

        let err = registry.execute("nope_say", &args).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownProvider(ref p) if p == "nope"));

        let err = registry.execute("echo_shout", &args).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownCapability { ref capability, .. } if capability == "shout"));

        let err = registry.execute("echo_say", &Arguments::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidArgument { ref parameter, .. } if parameter == "text"));
    }

    #[tokio::test]
    async fn test_default_lookups_are_not_found() {
        let registry = registry();
        let err = registry.read_resource("echo", "echo://x").await.unwrap_err();
        assert!(matches!(err, AgentError::NotFound(_)));
        let err = registry.render_prompt("echo", "greet", &Arguments::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::NotFound(_)));
    }

    #[test]
    fn test_prompt_section_uses_qualified_names() {
        let section = registry().generate_prompt_section();
        assert!(section.contains("### echo_say\n"));
        assert!(section.contains("- `text` (string) (required): Text"));
    }
}
