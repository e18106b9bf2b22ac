//! Layered variable resolution and context-aware formatting (component C1).
//!
//! Priority, highest to lowest: CLI vars, profile vars, pipeline `SET`
//! vars, process environment, literal `${name|default}` default. Each
//! formatting context (`sql`, `text`, `ast`, `json`) renders a resolved
//! value differently; this mirrors `sqlflow/core/variables/formatters.py`
//! one-class-per-context split.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::errors::handler::{ErrorHandler, ErrorStrategy};

/// Where a resolved variable's value came from, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSource {
    Cli,
    Profile,
    Set,
    Env,
    Default,
}

/// A formatting context, determined by the caller (not the token itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    Sql,
    Text,
    Ast,
    Json,
}

impl Context {
    pub fn as_str(&self) -> &'static str {
        match self {
            Context::Sql => "sql",
            Context::Text => "text",
            Context::Ast => "ast",
            Context::Json => "json",
        }
    }
}

fn sql_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*\(.*\)$").unwrap())
}

/// Formats resolved values for one substitution context.
pub trait VariableFormatter: Send + Sync {
    fn format_value(&self, value: &Value) -> String;
    fn format_missing(&self, var_name: &str) -> String;
}

/// SQL context: `NULL` for missing, quoted strings with doubled `'`,
/// keyword/function passthrough, numeric-string passthrough.
pub struct SqlFormatter;

impl SqlFormatter {
    const KEYWORDS: [&'static str; 6] = [
        "NULL",
        "CURRENT_DATE",
        "CURRENT_TIME",
        "CURRENT_TIMESTAMP",
        "NOW()",
        "SYSDATE",
    ];

    fn is_already_quoted(s: &str) -> bool {
        (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
            || (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
    }

    fn is_sql_keyword_or_function(s: &str) -> bool {
        if sql_keyword_regex().is_match(s) {
            return true;
        }
        Self::KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(s))
    }

    fn is_numeric_string(s: &str) -> bool {
        s.parse::<f64>().is_ok()
    }

    fn format_string(s: &str) -> String {
        if Self::is_already_quoted(s) {
            return s.to_string();
        }
        if Self::is_sql_keyword_or_function(s) {
            return s.to_string();
        }
        if Self::is_numeric_string(s) {
            return s.to_string();
        }
        if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
            return s.to_uppercase();
        }
        if s.eq_ignore_ascii_case("null") {
            return "NULL".to_string();
        }
        let escaped = s.replace('\'', "''");
        format!("'{escaped}'")
    }
}

impl VariableFormatter for SqlFormatter {
    fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => Self::format_string(s),
            other => Self::format_string(&other.to_string()),
        }
    }

    fn format_missing(&self, _var_name: &str) -> String {
        "NULL".to_string()
    }
}

/// Plain-text context: no escaping, human-readable.
pub struct TextFormatter;

impl VariableFormatter for TextFormatter {
    fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        }
    }

    fn format_missing(&self, var_name: &str) -> String {
        format!("${{{var_name}}}")
    }
}

/// AST context: used to build the restricted boolean expression the
/// condition evaluator parses. Literals are Python-repr-equivalent.
pub struct AstFormatter;

impl AstFormatter {
    fn format_string(s: &str) -> String {
        if matches!(s, "None" | "True" | "False") {
            return s.to_string();
        }
        if s.parse::<f64>().is_ok() {
            return s.to_string();
        }
        let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
        format!("'{escaped}'")
    }
}

impl VariableFormatter for AstFormatter {
    fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "None".to_string(),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => Self::format_string(s),
            other => other.to_string(),
        }
    }

    fn format_missing(&self, _var_name: &str) -> String {
        "None".to_string()
    }
}

/// JSON context: standard JSON escaping via `serde_json`.
pub struct JsonFormatter;

impl VariableFormatter for JsonFormatter {
    fn format_value(&self, value: &Value) -> String {
        serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
    }

    fn format_missing(&self, _var_name: &str) -> String {
        "null".to_string()
    }
}

/// Explicit registry of formatters, built once at resolver construction —
/// no process-wide singleton.
pub struct FormatterRegistry {
    formatters: HashMap<Context, Box<dyn VariableFormatter>>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        let mut formatters: HashMap<Context, Box<dyn VariableFormatter>> = HashMap::new();
        formatters.insert(Context::Sql, Box::new(SqlFormatter));
        formatters.insert(Context::Text, Box::new(TextFormatter));
        formatters.insert(Context::Ast, Box::new(AstFormatter));
        formatters.insert(Context::Json, Box::new(JsonFormatter));
        Self { formatters }
    }

    pub fn get(&self, ctx: Context) -> &dyn VariableFormatter {
        self.formatters[&ctx].as_ref()
    }
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A single `${name}` or `${name|default}` occurrence found while rendering.
#[derive(Debug, Clone)]
pub struct ResolvedVar {
    pub name: String,
    pub source: Option<VarSource>,
    pub found: bool,
}

/// Layered variable resolver, highest priority first: CLI, profile, `SET`,
/// environment, literal default.
pub struct VariableResolver {
    cli_vars: HashMap<String, Value>,
    profile_vars: HashMap<String, Value>,
    set_vars: HashMap<String, Value>,
    env_vars: HashMap<String, String>,
    formatters: FormatterRegistry,
}

/// Matches `${name}` or `${name|default}`. Names may contain word characters.
fn var_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(\|([^}]*))?\}").unwrap())
}

impl VariableResolver {
    pub fn new(cli_vars: HashMap<String, Value>, profile_vars: HashMap<String, Value>) -> Self {
        let env_vars = std::env::vars().collect();
        Self {
            cli_vars,
            profile_vars,
            set_vars: HashMap::new(),
            env_vars,
            formatters: FormatterRegistry::new(),
        }
    }

    /// Override the environment snapshot — used by tests that must not
    /// depend on the ambient process environment.
    pub fn with_env(mut self, env_vars: HashMap<String, String>) -> Self {
        self.env_vars = env_vars;
        self
    }

    pub fn declare_set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set_vars.insert(name.into(), Value::String(value.into()));
    }

    /// Resolve `name` against the priority layers only (no default). Returns
    /// the value and which layer it came from.
    pub fn resolve(&self, name: &str) -> Option<(Value, VarSource)> {
        if let Some(v) = self.cli_vars.get(name) {
            return Some((v.clone(), VarSource::Cli));
        }
        if let Some(v) = self.profile_vars.get(name) {
            return Some((v.clone(), VarSource::Profile));
        }
        if let Some(v) = self.set_vars.get(name) {
            return Some((v.clone(), VarSource::Set));
        }
        if let Some(v) = self.env_vars.get(name) {
            return Some((Value::String(v.clone()), VarSource::Env));
        }
        None
    }

    /// Render every `${name}` / `${name|default}` token in `text` for the
    /// given context, using `handler` to decide fallback behavior for
    /// unresolved variables. Returns the rendered text and the list of
    /// tokens encountered (for validation / reporting).
    pub fn render(
        &self,
        text: &str,
        ctx: Context,
        handler: &mut ErrorHandler,
    ) -> (String, Vec<ResolvedVar>) {
        let formatter = self.formatters.get(ctx);
        let mut resolved = Vec::new();
        let re = var_token_regex();

        let rendered = re
            .replace_all(text, |caps: &regex::Captures| {
                let name = &caps[1];
                let default = caps.get(3).map(|m| m.as_str());

                if let Some((value, source)) = self.resolve(name) {
                    resolved.push(ResolvedVar {
                        name: name.to_string(),
                        source: Some(source),
                        found: true,
                    });
                    handler.record_success(name);
                    formatter.format_value(&value)
                } else if let Some(default) = default {
                    resolved.push(ResolvedVar {
                        name: name.to_string(),
                        source: Some(VarSource::Default),
                        found: true,
                    });
                    handler.record_success(name);
                    formatter.format_value(&Value::String(default.to_string()))
                } else {
                    resolved.push(ResolvedVar {
                        name: name.to_string(),
                        source: None,
                        found: false,
                    });
                    handler.handle_missing_variable(name, ctx.as_str(), text)
                }
            })
            .into_owned();

        (rendered, resolved)
    }

    /// Collect every `${name}` token in `text`, without rendering.
    pub fn variables_in(text: &str) -> Vec<(String, Option<String>)> {
        var_token_regex()
            .captures_iter(text)
            .map(|c| (c[1].to_string(), c.get(3).map(|m| m.as_str().to_string())))
            .collect()
    }

    pub fn formatters(&self) -> &FormatterRegistry {
        &self.formatters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn handler() -> ErrorHandler {
        ErrorHandler::new(ErrorStrategy::WarnContinue)
    }

    #[test]
    fn sql_quoting_rules() {
        let f = SqlFormatter;
        assert_eq!(f.format_value(&Value::String("us-east".into())), "'us-east'");
        assert_eq!(f.format_value(&Value::Null), "NULL");
        assert_eq!(f.format_value(&Value::Bool(true)), "TRUE");
        assert_eq!(f.format_value(&Value::String("NOW()".into())), "NOW()");
        assert_eq!(f.format_value(&Value::String("123".into())), "123");
    }

    #[test]
    fn cli_wins_over_profile_set_env() {
        let mut cli = Map::new();
        cli.insert("env".to_string(), Value::String("cli_env".into()));
        let mut profile = Map::new();
        profile.insert("env".to_string(), Value::String("profile_env".into()));
        let mut resolver = VariableResolver::new(cli, profile).with_env(Map::new());
        resolver.declare_set_var("env", "set_env");

        let (value, source) = resolver.resolve("env").unwrap();
        assert_eq!(value, Value::String("cli_env".into()));
        assert_eq!(source, VarSource::Cli);
    }

    #[test]
    fn missing_variable_uses_default_when_present() {
        let resolver = VariableResolver::new(Map::new(), Map::new()).with_env(Map::new());
        let mut h = handler();
        let (out, resolved) = resolver.render("${region|us-east}", Context::Sql, &mut h);
        assert_eq!(out, "'us-east'");
        assert_eq!(resolved[0].source, Some(VarSource::Default));
    }

    #[test]
    fn missing_variable_without_default_reports_missing() {
        let resolver = VariableResolver::new(Map::new(), Map::new()).with_env(Map::new());
        let mut h = handler();
        let (out, resolved) = resolver.render("${nope}", Context::Sql, &mut h);
        assert_eq!(out, "NULL");
        assert!(!resolved[0].found);
    }
}
