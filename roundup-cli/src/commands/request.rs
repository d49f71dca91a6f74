//! Request command - feed one wallet request through the dispatcher

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use roundup_core::services::EntryPoint;

use super::{get_context_for, PromptApprover};

/// Attach `origin` to requests that carry one but left it out
fn with_origin(raw: &str, origin: &str) -> Result<String> {
    let mut value: Value = serde_json::from_str(raw).context("Request is not valid JSON")?;
    let needs_origin = matches!(
        value.get("method").and_then(Value::as_str),
        Some("connect" | "disconnect" | "signTransaction" | "signMessage")
    );
    if needs_origin {
        if let Some(object) = value.as_object_mut() {
            let params = object
                .entry("params")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Some(params) = params.as_object_mut() {
                params
                    .entry("origin")
                    .or_insert_with(|| Value::String(origin.to_string()));
            }
        }
    }
    Ok(value.to_string())
}

pub async fn run(json: Option<String>, origin: &str) -> Result<()> {
    let raw = match json {
        Some(raw) => raw,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read request from stdin")?;
            buf
        }
    };
    let raw = with_origin(&raw, origin)?;

    let ctx = get_context_for(EntryPoint::Dispatcher)?;
    let dispatcher = ctx.dispatcher(Arc::new(PromptApprover));
    let result = dispatcher.handle_raw(&raw).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_added_when_missing() {
        let raw = with_origin(r#"{"method":"connect"}"#, "https://app.example").unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["params"]["origin"], "https://app.example");
    }

    #[test]
    fn test_explicit_origin_kept() {
        let raw = with_origin(
            r#"{"method":"signMessage","params":{"origin":"https://a.example","message":"aGk="}}"#,
            "cli://local",
        )
        .unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["params"]["origin"], "https://a.example");
    }

    #[test]
    fn test_get_public_key_untouched() {
        let raw = with_origin(r#"{"method":"getPublicKey"}"#, "cli://local").unwrap();
        assert_eq!(raw, r#"{"method":"getPublicKey"}"#);
    }
}
