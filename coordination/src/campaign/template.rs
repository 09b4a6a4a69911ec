//! Step template rendering.
//!
//! Placeholders use `{{name}}` syntax. Supported variables:
//!
//! | Placeholder            | Value                                  |
//! |------------------------|----------------------------------------|
//! | `{{name}}`             | full lead name                         |
//! | `{{first_name}}`       | first token of the name                |
//! | `{{email}}`            | email or empty                         |
//! | `{{phone}}`            | phone or empty                         |
//! | `{{source}}`           | lead source                            |
//! | `{{metadata.<key>}}`   | metadata value (strings unquoted)      |
//!
//! Unknown placeholders are left verbatim so that a typo is visible in the
//! delivered message log instead of silently vanishing.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::types::Lead;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").expect("PLACEHOLDER_RE regex should compile")
});

/// Look up a single template variable for `lead`.
fn resolve(lead: &Lead, key: &str) -> Option<String> {
    match key {
        "name" => Some(lead.name.clone()),
        "first_name" | "firstName" => Some(lead.first_name().to_string()),
        "email" => Some(lead.email.clone().unwrap_or_default()),
        "phone" => Some(lead.phone.clone().unwrap_or_default()),
        "source" => Some(lead.source.clone()),
        _ => {
            let meta_key = key.strip_prefix("metadata.")?;
            lead.metadata.get(meta_key).map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            })
        }
    }
}

/// Render `template` with values from `lead`.
pub fn render(template: &str, lead: &Lead) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            resolve(lead, &caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Placeholders in `template` that `lead` cannot fill.
pub fn unresolved(template: &str, lead: &Lead) -> Vec<String> {
    PLACEHOLDER_RE
        .captures_iter(template)
        .filter(|caps| resolve(lead, &caps[1]).is_none())
        .map(|caps| caps[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead() -> Lead {
        let mut lead = Lead::new("l-1", "Ada Lovelace").with_email("ada@example.com");
        lead.source = "webinar".into();
        lead.metadata
            .insert("company".into(), serde_json::json!("Analytical Engines"));
        lead.metadata.insert("seats".into(), serde_json::json!(12));
        lead
    }

    #[test]
    fn test_render_basic_fields() {
        let out = render("Hi {{first_name}}, thanks for joining via {{ source }}.", &lead());
        assert_eq!(out, "Hi Ada, thanks for joining via webinar.");
    }

    #[test]
    fn test_render_metadata() {
        let out = render("{{metadata.company}} / {{metadata.seats}} seats", &lead());
        assert_eq!(out, "Analytical Engines / 12 seats");
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        let out = render("Hello {{nickname}}", &lead());
        assert_eq!(out, "Hello {{nickname}}");
        assert_eq!(unresolved("Hello {{nickname}} {{name}}", &lead()), vec!["nickname"]);
    }

    #[test]
    fn test_missing_phone_renders_empty() {
        assert_eq!(render("[{{phone}}]", &lead()), "[]");
    }
}
