//! Template rendering
//!
//! Tera templates are embedded into the binary from `templates/`. A
//! directory on disk can override individual templates by name. The
//! environment carries the `static` and `get_version` functions and the
//! `days_ago` filter.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_embed::RustEmbed;
use serde::Serialize;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fs;
use std::path::Path;
use tera::{Context as TeraContext, Tera, Value};

use crate::models::Authentication;

mod error;

pub use error::RenderError;

/// Template used for every error response rendered as HTML
pub const ERROR_TEMPLATE: &str = "core/error.html";

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct EmbeddedTemplates;

/// Tera environment with the embedded templates loaded
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    /// Load the embedded templates, then apply overrides from `override_dir`.
    pub fn new(override_dir: Option<&Path>) -> Result<Self, RenderError> {
        let mut templates: HashMap<String, String> = HashMap::new();

        for name in EmbeddedTemplates::iter() {
            if let Some(file) = EmbeddedTemplates::get(&name) {
                let content = String::from_utf8(file.data.into_owned())
                    .map_err(|_| RenderError::Encoding(name.to_string()))?;
                templates.insert(name.to_string(), content);
            }
        }

        if let Some(dir) = override_dir {
            if dir.is_dir() {
                let mut overrides = Vec::new();
                collect_templates(dir, dir, &mut overrides)?;
                for (name, content) in overrides {
                    tracing::debug!("Template '{}' overridden from {:?}", name, dir);
                    templates.insert(name, content);
                }
            } else {
                tracing::warn!("Template override directory {:?} does not exist", dir);
            }
        }

        Self::from_templates(templates)
    }

    /// Build a renderer from in-memory templates
    pub fn from_templates<I, N, C>(templates: I) -> Result<Self, RenderError>
    where
        I: IntoIterator<Item = (N, C)>,
        N: AsRef<str>,
        C: AsRef<str>,
    {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| RenderError::Template(describe_tera_error("<load>", &e)))?;
        register_helpers(&mut tera);
        Ok(Self { tera })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    /// Render a template, chaining Tera's error sources into the message.
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String, RenderError> {
        self.tera
            .render(template, context)
            .map_err(|e| RenderError::Template(describe_tera_error(template, &e)))
    }

    /// Render the error page for `status_code`.
    ///
    /// Never fails: when `core/error.html` cannot be rendered a built-in page
    /// is returned instead.
    pub fn render_error_page(
        &self,
        status_code: u16,
        status_detail: &str,
        context: Option<&str>,
    ) -> String {
        let mut ctx = TeraContext::new();
        ctx.insert("status_code", &status_code);
        ctx.insert("status_detail", status_detail);
        if let Some(extra) = context {
            ctx.insert("context", extra);
        }

        match self.render(ERROR_TEMPLATE, &ctx) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Failed to render error template: {}", e);
                fallback_error_page(status_code, status_detail)
            }
        }
    }
}

fn describe_tera_error(template: &str, error: &tera::Error) -> String {
    let mut message = format!("Failed to render '{}': {}", template, error);
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(&format!("\n  Caused by: {}", cause));
        source = cause.source();
    }
    message
}

fn collect_templates(
    base: &Path,
    current: &Path,
    templates: &mut Vec<(String, String)>,
) -> Result<(), RenderError> {
    for entry in fs::read_dir(current)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_templates(base, &path, templates)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let Ok(relative) = path.strip_prefix(base) else {
                continue;
            };
            let name = relative.to_string_lossy().replace('\\', "/");
            templates.push((name, fs::read_to_string(&path)?));
        }
    }
    Ok(())
}

fn register_helpers(tera: &mut Tera) {
    tera.register_function("static", StaticUrl);
    tera.register_function("get_version", get_version);
    tera.register_filter("days_ago", days_ago);
}

/// `static(path="css/styles.css")` resolves to `/static/css/styles.css`.
///
/// The result is marked safe so autoescaping leaves the slashes alone.
struct StaticUrl;

impl tera::Function for StaticUrl {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("static() requires a `path` string argument"))?;
        Ok(Value::String(static_path(path)))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

pub fn static_path(path: &str) -> String {
    if path.starts_with('/') || path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("/static/{}", path)
    }
}

fn get_version(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let prefix = args.get("prefix").and_then(Value::as_str).unwrap_or("");
    Ok(Value::String(format!("{}{}", prefix, env!("CARGO_PKG_VERSION"))))
}

fn days_ago(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(days_ago_from(value, Utc::now())))
}

/// Human-readable age of a serialized datetime relative to `now`.
pub fn days_ago_from(value: &Value, now: DateTime<Utc>) -> String {
    let Some(moment) = value.as_str().and_then(parse_datetime) else {
        return "UNKNOWN days ago".to_string();
    };
    match (now - moment).num_seconds().div_euclid(86_400) {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        days => format!("{} days ago", days),
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn fallback_error_page(status_code: u16, status_detail: &str) -> String {
    let detail = tera::escape_html(status_detail);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{code} Error</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 50px auto; padding: 20px; }}
        h1 {{ color: #e74c3c; }}
    </style>
</head>
<body>
    <h1>{code}</h1>
    <p>{detail}</p>
    <p><a href="/">Back to home</a></p>
</body>
</html>"#,
        code = status_code,
        detail = detail,
    )
}

/// Variables shared by every page
#[derive(Debug, Clone, Serialize)]
pub struct PageContext {
    pub request_path: String,
    pub is_htmx: bool,
    pub current_user: Option<String>,
    pub is_admin: bool,
    pub year: i32,
}

impl PageContext {
    pub fn new(request_path: impl Into<String>, is_htmx: bool, auth: &Authentication) -> Self {
        use chrono::Datelike;
        Self {
            request_path: request_path.into(),
            is_htmx,
            current_user: auth.user().map(|u| u.display_name.clone()),
            is_admin: auth.is_admin(),
            year: Utc::now().year(),
        }
    }

    /// Tera context seeded with the page variables
    pub fn into_context(self) -> TeraContext {
        let mut ctx = TeraContext::new();
        ctx.insert("request_path", &self.request_path);
        ctx.insert("is_htmx", &self.is_htmx);
        ctx.insert("current_user", &self.current_user);
        ctx.insert("is_admin", &self.is_admin);
        ctx.insert("year", &self.year);
        ctx
    }
}

#[cfg(test)]
mod tests;
