//! Human-readable failure reports.
//!
//! A failed assertion is printed with the request that produced it: method
//! and URL always, params, headers and the highlighted response body when
//! verbose, then the offending field in red.

use colored::*;
use serde_json::Value;

use crate::assert::ResponseContext;
use crate::error::AssertError;

const RULE: &str = "===============================================================";
const THIN_RULE: &str = "---------------------------------------------------------------";

/// Render a failure banner for `error`.
pub fn render_failure(error: &AssertError, context: Option<&ResponseContext>, verbose: bool) -> String {
    let mut message = String::new();

    if let Some(ctx) = context {
        message.push_str(RULE);
        message.push('\n');
        message.push_str(&format!("{} {}\n", ctx.method, ctx.url.green().bold()));

        if verbose {
            message.push_str(&render_request(ctx));
            message.push_str(THIN_RULE);
            message.push('\n');
            message.push_str(&highlight_json(&ctx.body));
            message.push('\n');
            message.push_str(THIN_RULE);
            message.push('\n');
        }
    }

    let field = match error.key() {
        Some(_) => format!("Invalid {}", error.path()),
        None => "Invalid response".to_string(),
    };
    message.push_str(&format!("\n{}\n{}", field.red(), error.to_string().red()));
    message
}

fn render_request(ctx: &ResponseContext) -> String {
    let mut out = String::new();

    if !ctx.params.is_empty() {
        out.push('\n');
        for (key, value) in &ctx.params {
            out.push_str(&format!("{} = {}\n", key.bold(), value.cyan()));
        }
    }

    if !ctx.headers.is_empty() {
        out.push_str("\nHEADERS:\n");
        for (key, value) in &ctx.headers {
            out.push_str(&format!("{}: {}\n", key.bold(), value));
        }
    }

    out
}

/// Pretty-print a JSON document with keys in magenta, strings in green and
/// other scalars in blue. Anything that is not JSON comes back unchanged.
pub fn highlight_json(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => {
            let mut out = String::new();
            write_value(&mut out, &value, 0);
            out
        }
        Err(_) => text.to_string(),
    }
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            out.push_str("{\n");
            let last = map.len() - 1;
            for (i, (key, item)) in map.iter().enumerate() {
                indent(out, depth + 1);
                out.push_str(&format!("{}: ", quoted(key).magenta().bold()));
                write_value(out, item, depth + 1);
                if i != last {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(out, depth);
            out.push('}');
        }
        Value::Array(items) if !items.is_empty() => {
            out.push_str("[\n");
            let last = items.len() - 1;
            for (i, item) in items.iter().enumerate() {
                indent(out, depth + 1);
                write_value(out, item, depth + 1);
                if i != last {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(out, depth);
            out.push(']');
        }
        Value::Object(_) => out.push_str("{}"),
        Value::Array(_) => out.push_str("[]"),
        Value::String(s) => out.push_str(&quoted(s).green().to_string()),
        other => out.push_str(&other.to_string().blue().to_string()),
    }
}

fn quoted(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

fn indent(out: &mut String, depth: usize) {
    out.push_str(&"    ".repeat(depth));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain<F: FnOnce() -> String>(f: F) -> String {
        colored::control::set_override(false);
        f()
    }

    #[test]
    fn test_highlight_plain_layout() {
        let text = plain(|| highlight_json(r#"{"code":200,"result":{"tags":[],"name":"x"}}"#));
        assert_eq!(
            text,
            "{\n    \"code\": 200,\n    \"result\": {\n        \"tags\": [],\n        \"name\": \"x\"\n    }\n}"
        );
    }

    #[test]
    fn test_highlight_non_json_passthrough() {
        assert_eq!(highlight_json("<html>oops</html>"), "<html>oops</html>");
    }

    #[test]
    fn test_render_failure_sections() {
        let error = AssertError::ValueMismatch {
            path: "result.id".to_string(),
            key: "id".to_string(),
            expected: json!("CHECK_POSITIVE"),
            actual: json!(0),
        };
        let ctx = ResponseContext {
            method: "POST".to_string(),
            url: "https://api.example.test/api/2.0/reviews".to_string(),
            params: vec![("text".to_string(), "hello".to_string())],
            headers: vec![("Authorization".to_string(), "Bearer abc".to_string())],
            body: r#"{"result":{"id":0}}"#.to_string(),
        };

        let brief = plain(|| render_failure(&error, Some(&ctx), false));
        assert!(brief.starts_with(RULE));
        assert!(brief.contains("POST https://api.example.test/api/2.0/reviews"));
        assert!(brief.contains("Invalid result.id"));
        assert!(!brief.contains("HEADERS:"));

        let full = plain(|| render_failure(&error, Some(&ctx), true));
        assert!(full.contains("text = hello"));
        assert!(full.contains("HEADERS:\nAuthorization: Bearer abc"));
        assert!(full.contains("\"id\": 0"));
    }

    #[test]
    fn test_render_without_context() {
        let error = AssertError::InvalidExpectedShape { kind: "string" };
        let text = plain(|| render_failure(&error, None, true));
        assert!(text.contains("Invalid response"));
        assert!(!text.contains(RULE));
    }
}
