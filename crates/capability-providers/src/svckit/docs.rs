//! Documentation Provider
//!
//! A small page store: search, read, create, and replace page bodies.

use async_trait::async_trait;
use serde_json::{json, Value};

use agent_core::{
    capability::args, AgentError, Arguments, Capability, CapabilityProvider, ParameterSchema, PromptTemplate,
    Resource, Result as CoreResult,
};

use crate::arena::Arena;
use crate::model::Page;

const INDEX_URI: &str = "docs://index";
const URI_PREFIX: &str = "docs://";
const EXCERPT_CHARS: usize = 120;

pub struct DocsProvider {
    capabilities: Vec<Capability>,
    prompts: Vec<PromptTemplate>,
    pages: Arena<Page>,
}

impl Default for DocsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DocsProvider {
    pub fn new() -> Self {
        Self::with_arena(Arena::new("PAGE"))
    }

    pub fn with_samples() -> Self {
        let seeds: [fn(String) -> Page; 3] = [
            |id| {
                Page::new(
                    id,
                    "VPN setup",
                    "Install the client from the portal, sign in with SSO, and pick the nearest gateway. \
                     Sessions are re-keyed every 60 minutes; clients older than 5.2 drop the tunnel on re-key.",
                )
            },
            |id| {
                Page::new(
                    id,
                    "Onboarding checklist",
                    "Laptop pickup, badge photo, payroll enrolment and a first-week buddy.",
                )
            },
            |id| {
                Page::new(
                    id,
                    "Incident response",
                    "Declare the incident in the on-call channel, assign a commander, and post updates every 30 minutes.",
                )
            },
        ];
        Self::with_arena(Arena::seeded("PAGE", seeds))
    }

    fn with_arena(pages: Arena<Page>) -> Self {
        Self {
            capabilities: vec![
                Capability::new("searchPages", "Search documentation pages by title or body text.")
                    .param(ParameterSchema::string("query", "Text to search for").required()),
                Capability::new("getPage", "Get a page, including its full body.")
                    .param(ParameterSchema::string("id", "Page id, e.g. PAGE-0001").required()),
                Capability::new("createPage", "Create a page.")
                    .param(ParameterSchema::string("title", "Page title").required())
                    .param(ParameterSchema::string("body", "Page body").required()),
                Capability::new("update_page_body", "Replace a page's body; bumps its version.")
                    .param(ParameterSchema::string("id", "Page id").required())
                    .param(ParameterSchema::string("body", "New body").required()),
            ],
            prompts: vec![PromptTemplate::new("summarize", "Ask for a summary of one page", &["page_id"])],
            pages,
        }
    }

    async fn get(&self, id: &str) -> CoreResult<Page> {
        self.pages
            .get(id)
            .await
            .ok_or_else(|| AgentError::NotFound(format!("page {id}")))
    }

    async fn index(&self) -> Vec<Value> {
        self.pages
            .filter(|_| true)
            .await
            .iter()
            .map(|p| json!({ "id": p.id, "title": p.title, "version": p.version }))
            .collect()
    }
}

#[async_trait]
impl CapabilityProvider for DocsProvider {
    fn id(&self) -> &str {
        "docs"
    }

    fn name(&self) -> &str {
        "Documentation"
    }

    fn description(&self) -> &str {
        "Internal documentation pages"
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn resources(&self) -> Vec<Resource> {
        vec![
            Resource::new(INDEX_URI, "Page index", "Id, title and version of every page"),
            Resource::new("docs://{id}", "Page", "A single page by id"),
        ]
    }

    fn prompts(&self) -> &[PromptTemplate] {
        &self.prompts
    }

    async fn execute(&self, name: &str, arguments: &Arguments) -> CoreResult<Value> {
        super::validated(self, name, arguments)?;
        match name {
            "searchPages" => {
                let query = args::required_str(arguments, "query")?;
                let hits: Vec<Value> = self
                    .pages
                    .filter(|p| p.matches(query))
                    .await
                    .iter()
                    .map(|p| json!({ "id": p.id, "title": p.title, "excerpt": p.excerpt(EXCERPT_CHARS) }))
                    .collect();
                Ok(json!({ "count": hits.len(), "pages": hits }))
            }
            "getPage" => Ok(serde_json::to_value(self.get(args::required_str(arguments, "id")?).await?)?),
            "createPage" => {
                let title = args::required_str(arguments, "title")?.to_string();
                let body = args::required_str(arguments, "body")?.to_string();
                let page = self.pages.insert_with(|id| Page::new(id, title, body)).await;
                tracing::info!(page = %page.id, "Page created");
                Ok(serde_json::to_value(page)?)
            }
            "update_page_body" => {
                let id = args::required_str(arguments, "id")?;
                let body = args::required_str(arguments, "body")?.to_string();
                let page = self
                    .pages
                    .update(id, |page| {
                        page.body = body;
                        page.version += 1;
                        page.updated_at = chrono::Utc::now();
                        Ok::<(), AgentError>(())
                    })
                    .await
                    .ok_or_else(|| AgentError::NotFound(format!("page {id}")))??;
                tracing::info!(page = %page.id, version = page.version, "Page body replaced");
                Ok(serde_json::to_value(page)?)
            }
            other => Err(super::unknown(self, other)),
        }
    }

    async fn read_resource(&self, uri: &str) -> CoreResult<Value> {
        if uri == INDEX_URI {
            return Ok(Value::Array(self.index().await));
        }
        match uri.strip_prefix(URI_PREFIX) {
            Some(id) if !id.is_empty() => Ok(serde_json::to_value(self.get(id).await?)?),
            _ => Err(AgentError::NotFound(format!("resource {uri}"))),
        }
    }

    async fn render_prompt(&self, name: &str, arguments: &Arguments) -> CoreResult<String> {
        if name != "summarize" {
            return Err(AgentError::NotFound(format!("prompt {name}")));
        }
        let page = self.get(args::required_str(arguments, "page_id")?).await?;
        Ok(format!(
            "Summarize the page \"{}\" (version {}) in three bullet points.\n\n{}",
            page.title, page.version, page.body
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arguments(value: Value) -> Arguments {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_search_returns_excerpts() {
        let provider = DocsProvider::with_samples();
        let result = provider.execute("searchPages", &arguments(json!({ "query": "re-key" }))).await.unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["pages"][0]["id"], "PAGE-0001");
        assert!(result["pages"][0]["excerpt"].as_str().unwrap().ends_with("..."));
    }

    #[tokio::test]
    async fn test_update_body_bumps_version() {
        let provider = DocsProvider::with_samples();
        let page = provider
            .execute(
                "update_page_body",
                &arguments(json!({ "id": "PAGE-0002", "body": "Bring your passport." })),
            )
            .await
            .unwrap();
        assert_eq!(page["version"], 2);

        let index = provider.read_resource("docs://index").await.unwrap();
        assert_eq!(index[1]["version"], 2);
        assert_eq!(provider.read_resource("docs://page-0002").await.unwrap()["body"], "Bring your passport.");
    }

    #[tokio::test]
    async fn test_unknown_page() {
        let provider = DocsProvider::new();
        let err = provider.execute("getPage", &arguments(json!({ "id": "PAGE-0001" }))).await.unwrap_err();
        assert!(matches!(err, AgentError::NotFound(_)));
        assert!(provider.render_prompt("summarize", &arguments(json!({ "page_id": "x" }))).await.is_err());
    }
}
