use std::{sync::Arc, time::Duration};

use {
    anyhow::{Context, Result, anyhow, bail},
    secrecy::Secret,
    serde_json::Value,
    tracing::debug,
};

use {
    agenda_config::AgendaConfig,
    agenda_google::{AccessTokenProvider, GoogleCalendarStore, StaticToken},
    agenda_tools::{CalendarTool, CalendarToolSettings, ToolRegistry},
};

/// Registry holding every tool, backed by the configured calendar service.
pub fn build_registry(
    config: &AgendaConfig,
    tokens: Arc<dyn AccessTokenProvider>,
) -> Result<ToolRegistry> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.calendar.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;
    let store = GoogleCalendarStore::with_base_url(tokens, &config.calendar.api_base_url)?
        .with_client(client);

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CalendarTool::new(
        Arc::new(store),
        CalendarToolSettings::from_config(config),
    )));
    Ok(registry)
}

/// Print the name, description and parameter schema of every tool.
pub fn list_tools(config: &AgendaConfig) -> Result<()> {
    // Schemas only; no request is sent, so no token is needed.
    let tokens = Arc::new(StaticToken::new(Secret::new(String::new())));
    let registry = build_registry(config, tokens)?;
    println!("{}", serde_json::to_string_pretty(&registry.list_schemas())?);
    Ok(())
}

/// Run one tool operation and print its JSON result.
pub async fn call(config: &AgendaConfig, tool: &str, operation: &str, params: &str) -> Result<()> {
    let token = config.calendar.access_token.clone().ok_or_else(|| {
        anyhow!(
            "no access token: pass --access-token, set AGENDA_ACCESS_TOKEN or calendar.access_token"
        )
    })?;
    let registry = build_registry(config, Arc::new(StaticToken::new(token)))?;
    let tool = registry.get(tool).ok_or_else(|| {
        anyhow!(
            "unknown tool '{tool}' (available: {})",
            registry.tool_names().join(", ")
        )
    })?;

    let params = call_params(operation, params)?;
    debug!(tool = tool.name(), operation, "calling tool");
    let result = tool.execute(params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Parse `raw` as a JSON object and set its `operation`.
fn call_params(operation: &str, raw: &str) -> Result<Value> {
    let mut params: Value = serde_json::from_str(raw).context("--params must be valid JSON")?;
    let Some(fields) = params.as_object_mut() else {
        bail!("--params must be a JSON object");
    };
    fields.insert("operation".into(), Value::String(operation.to_string()));
    Ok(params)
}
