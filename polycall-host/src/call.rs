//! Calling guest functions from the command line.

use anyhow::{Context, Result};
use polycall_plugin::LoaderHost;
use polycall_reflect::{Settlement, Value};

/// Parse a command line argument.
///
/// Valid JSON is converted with [`Value::from_json`]; anything else is
/// passed as a string.
pub fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw)
        .map(Value::from_json)
        .unwrap_or_else(|_| Value::string(raw))
}

/// Call `name` and wait for its result.
pub async fn call(host: &LoaderHost, name: &str, args: Vec<Value>) -> Result<Value> {
    let result = host
        .call(name, args)
        .with_context(|| format!("Failed to call {}", name))?;

    settle(result).await
}

/// Wait for futures to settle and turn exceptions into errors.
pub async fn settle(mut value: Value) -> Result<Value> {
    loop {
        match value {
            Value::Future(future) => match future.settled().await {
                Settlement::Resolved(resolved) => value = resolved,
                Settlement::Rejected(reason) => {
                    anyhow::bail!("Future rejected: {}", describe(&reason))
                }
            },
            Value::Exception(_) | Value::Throwable(_) => {
                anyhow::bail!("Guest raised {}", describe(&value))
            }
            other => return Ok(other),
        }
    }
}

/// Render a result as pretty JSON.
pub fn render(value: &Value) -> Result<String> {
    let json = value.to_json().context("Result has no JSON form")?;
    Ok(serde_json::to_string_pretty(&json)?)
}

fn describe(value: &Value) -> String {
    match value {
        Value::Exception(e) => format!("{}: {}", e.label, e.message),
        Value::Throwable(inner) => describe(inner),
        other => other
            .to_json()
            .map(|json| json.to_string())
            .unwrap_or_else(|_| format!("{:?}", other)),
    }
}
