//! Template renderer backed by MiniJinja

use crate::domain::errors::HttpError;
use crate::domain::repositories::Renderer;
use minijinja::Environment;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

const LAYOUT_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{{ page.title }}</title></head>
<body>
<h1>{{ page.title }}</h1>
{% if status is defined %}{% for kind in ["notice", "warning", "error"] %}{% for message in status[kind] | default([]) %}<p class="{{ kind }}">{{ message }}</p>{% endfor %}{% endfor %}{% endif %}
"#;

const LAYOUT_TAIL: &str = "\n</body>\n</html>\n";

const ERROR_INDEX: &str = r#"<p>Something went wrong ({{ error.code }}).</p>
<p class="message">{{ error.message }}</p>
{% if validation %}<ul>{% for field, messages in validation | items %}<li>{{ field }}: {{ messages | join(", ") }}</li>{% endfor %}</ul>{% endif %}"#;

const ERROR_NOT_FOUND: &str = r#"<p>The page you asked for is not here.</p>
<p class="message">{{ error.message }}</p>"#;

const ERROR_SECURITY: &str = r#"<p>You are not allowed to see this page.</p>
<p class="message">{{ error.message }}</p>
<p><a href="/identity">Identify yourself</a></p>"#;

const IDENTITY_IDENTIFY: &str = r#"<form method="post" action="/identity">
<input type="hidden" name="provider" value="key">
<label>Key <input type="password" name="key"></label>
<button type="submit">Sign in</button>
</form>"#;

fn builtin_body(template_id: &str) -> Option<&'static str> {
    match template_id {
        "error/index" => Some(ERROR_INDEX),
        "error/not_found" => Some(ERROR_NOT_FOUND),
        "error/security" => Some(ERROR_SECURITY),
        "identity/identify" => Some(IDENTITY_IDENTIFY),
        _ => None,
    }
}

/// Renders `{templates}/{template_id}.html`, falling back to built-in
/// pages for the error and identification templates.
pub struct TemplateRenderer {
    base_dir: Option<PathBuf>,
}

impl TemplateRenderer {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    /// A renderer that only knows the built-in templates.
    pub fn builtin() -> Self {
        Self { base_dir: None }
    }

    fn map_path(&self, template_id: &str) -> Option<PathBuf> {
        let mut path = self.base_dir.clone()?;
        for component in Path::new(template_id).components() {
            match component {
                Component::Normal(segment) => path.push(segment),
                _ => return None,
            }
        }
        path.set_extension("html");
        Some(path)
    }

    fn source(&self, template_id: &str) -> Result<String, HttpError> {
        if let Some(path) = self.map_path(template_id).filter(|path| path.is_file()) {
            tracing::debug!("Loading template {}", path.display());
            return std::fs::read_to_string(&path)
                .map_err(|e| HttpError::Internal(format!("Cannot read template {}: {}", template_id, e)));
        }

        builtin_body(template_id)
            .map(|body| format!("{}{}{}", LAYOUT_HEAD, body, LAYOUT_TAIL))
            .ok_or_else(|| HttpError::NotFound(format!("Template '{}' does not exist", template_id)))
    }
}

impl Renderer for TemplateRenderer {
    fn render(&self, template_id: &str, data: &Value) -> Result<String, HttpError> {
        let source = self.source(template_id)?;

        // The .html name turns on auto-escaping.
        let name = format!("{}.html", template_id);
        let mut env = Environment::new();
        env.add_template(&name, &source)
            .map_err(|e| HttpError::Internal(format!("Template {} is not valid: {}", template_id, e)))?;
        let template = env
            .get_template(&name)
            .map_err(|e| HttpError::Internal(e.to_string()))?;
        template
            .render(data)
            .map_err(|e| HttpError::Internal(format!("Cannot render {}: {}", template_id, e)))
    }
}
