//! Template compilation and execution.
//!
//! Templates are parsed once at the boundary where they enter the system
//! (startup, HTTP, file watcher). Anything that reaches the broker is known
//! to compile.

use std::path::Path;
use std::sync::Arc;

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use thiserror::Error;

/// A template failed to parse.
#[derive(Debug, Clone, Error)]
#[error("template `{name}` is invalid: {message}")]
pub struct TemplateError {
    pub name: String,
    pub message: String,
}

/// Executing a template failed.
#[derive(Debug, Clone, Error)]
#[error("failed to render template `{name}`: {message}")]
pub struct RenderError {
    pub name: String,
    pub message: String,
}

/// Environment shared by the config template and frontend snippets.
fn environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env
}

/// A template known to parse.
#[derive(Debug, Clone)]
pub struct ConfigTemplate {
    name: Arc<str>,
    source: Arc<str>,
}

impl ConfigTemplate {
    /// Parse template text, rejecting syntax errors.
    pub fn parse(name: impl Into<String>, source: impl Into<String>) -> Result<Self, TemplateError> {
        let name: String = name.into();
        let source: String = source.into();

        let env = environment();
        env.template_from_named_str(&name, &source)
            .map_err(|e| TemplateError {
                name: name.clone(),
                message: format!("{:#}", e),
            })?;

        Ok(Self {
            name: name.into(),
            source: source.into(),
        })
    }

    /// Read and parse a template file, named after its file name.
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let name = template_name(path);
        let source = std::fs::read_to_string(path).map_err(|e| TemplateError {
            name: name.clone(),
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::parse(name, source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Execute against a serializable context.
    pub fn render<S: Serialize>(&self, context: S) -> Result<String, RenderError> {
        let env = environment();
        let to_error = |e: minijinja::Error| RenderError {
            name: self.name.to_string(),
            message: format!("{:#}", e),
        };
        let template = env
            .template_from_named_str(&self.name, &self.source)
            .map_err(to_error)?;
        template.render(context).map_err(to_error)
    }
}

/// Template name derived from the last path component.
pub fn template_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "template".to_string())
}

#[derive(Serialize)]
struct SnippetContext<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
}

/// Drop the leading dot of field references such as `{{.Name}}` or
/// `{{- .Name }}` so labels written for dotted field access still parse.
fn strip_field_dots(snippet: &str) -> String {
    let mut out = String::with_capacity(snippet.len());
    let mut rest = snippet;
    while let Some(idx) = rest.find("{{") {
        let (head, tail) = rest.split_at(idx + 2);
        out.push_str(head);
        let body = tail.trim_start_matches(|c: char| c == '-' || c.is_whitespace());
        out.push_str(&tail[..tail.len() - body.len()]);
        rest = match body.strip_prefix('.') {
            Some(field) if field.starts_with(|c: char| c.is_ascii_alphabetic()) => field,
            _ => body,
        };
    }
    out.push_str(rest);
    out
}

/// Expand a per-backend frontend snippet.
///
/// The only variable in scope is `Name`, the backend name, reachable as
/// `{{ Name }}` or `{{.Name}}`. The result always ends with a newline.
pub fn expand_snippet(snippet: &str, backend_name: &str) -> Result<String, RenderError> {
    let template = ConfigTemplate::parse("snippet", strip_field_dots(snippet)).map_err(|e| RenderError {
        name: e.name,
        message: e.message,
    })?;
    let mut text = template.render(SnippetContext { name: backend_name })?;
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rejects_syntax_errors() {
        let err = ConfigTemplate::parse("bad.cfg", "{% for x in %}").unwrap_err();
        assert_eq!(err.name, "bad.cfg");
        assert!(ConfigTemplate::parse("ok.cfg", "global\n{{ global }}").is_ok());
    }

    #[test]
    fn test_render_keeps_trailing_newline() {
        let tpl = ConfigTemplate::parse("t", "{{ a }}\n").unwrap();
        assert_eq!(tpl.render(json!({"a": "x"})).unwrap(), "x\n");
    }

    #[test]
    fn test_render_missing_field_is_error() {
        let tpl = ConfigTemplate::parse("t", "{{ nope }}").unwrap();
        let err = tpl.render(json!({})).unwrap_err();
        assert_eq!(err.name, "t");
    }

    #[test]
    fn test_expand_snippet() {
        assert_eq!(
            expand_snippet("default_backend {{Name}}", "app").unwrap(),
            "default_backend app\n"
        );
        assert_eq!(
            expand_snippet("use_backend {{ Name }} if host_{{ Name }}\n", "api").unwrap(),
            "use_backend api if host_api\n"
        );
        assert!(expand_snippet("{{ Other }}", "api").is_err());
        assert!(expand_snippet("{% if %}", "api").is_err());
    }

    #[test]
    fn test_expand_snippet_dotted_fields() {
        assert_eq!(
            expand_snippet("default_backend {{.Name}}", "app").unwrap(),
            "default_backend app\n"
        );
        assert_eq!(
            expand_snippet("use_backend {{ .Name }} if {{- .Name -}}_host", "api").unwrap(),
            "use_backend api ifapi_host\n"
        );
        assert!(expand_snippet("{{ .Other }}", "api").is_err());
        assert_eq!(expand_snippet("acl x path_beg /a.b", "api").unwrap(), "acl x path_beg /a.b\n");
    }

    #[test]
    fn test_template_name() {
        assert_eq!(
            template_name(Path::new("./templates/haproxy.cfg.template")),
            "haproxy.cfg.template"
        );
    }
}
