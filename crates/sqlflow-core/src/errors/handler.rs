//! Unified, configurable error-handling policy for variable substitution
//! (component C8). Grounded in
//! `sqlflow/core/variables/error_handling.py`.

use std::collections::HashSet;

use tracing::{debug, error, warn};

/// Strategy for handling variable substitution errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStrategy {
    /// Raise an aggregate error immediately on the first error.
    FailFast,
    /// Log a warning and continue with the context's fallback. Default.
    WarnContinue,
    /// Silently substitute the fallback.
    Ignore,
    /// Accumulate all errors; raise an aggregate on `finalize()` if any
    /// occurred.
    CollectReport,
}

impl Default for ErrorStrategy {
    fn default() -> Self {
        ErrorStrategy::WarnContinue
    }
}

/// One variable-substitution error or warning, with enough context for a
/// user-actionable message.
#[derive(Debug, Clone)]
pub struct VariableError {
    pub variable_name: String,
    pub error_type: String,
    pub error_message: String,
    pub context: String,
    pub original_text: String,
    pub suggested_fix: Option<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for VariableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Variable '{}' {} in {} context: {}",
            self.variable_name, self.error_type, self.context, self.error_message
        )
    }
}

/// Comprehensive error report accumulated across one run of variable
/// substitution. Used for CLI diagnostics and test assertions.
#[derive(Debug, Clone, Default)]
pub struct ErrorReport {
    pub errors: Vec<VariableError>,
    pub warnings: Vec<VariableError>,
    pub success_count: u64,
    pub total: u64,
    pub context: String,
}

impl ErrorReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.success_count as f64 / self.total as f64) * 100.0
    }

    pub fn add(&mut self, error: VariableError) {
        match error.severity {
            Severity::Error => self.errors.push(error),
            Severity::Warning => self.warnings.push(error),
            Severity::Info => {}
        }
    }

    pub fn get_missing_variables(&self) -> HashSet<String> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .filter(|e| e.error_type == "not found")
            .map(|e| e.variable_name.clone())
            .collect()
    }

    pub fn summary(&self) -> String {
        if !self.has_errors() && !self.has_warnings() {
            return format!("all {} variables processed successfully", self.total);
        }
        let mut parts = Vec::new();
        if self.has_errors() {
            parts.push(format!("{} error(s)", self.errors.len()));
        }
        if self.has_warnings() {
            parts.push(format!("{} warning(s)", self.warnings.len()));
        }
        let mut summary = format!("variable substitution completed with {}", parts.join(", "));
        if self.total > 0 {
            summary.push_str(&format!(" ({:.1}% success rate)", self.success_rate()));
        }
        summary
    }

    pub fn format_detailed_report(&self) -> String {
        let mut lines = vec![
            "=".repeat(60),
            "Variable Substitution Error Report".to_string(),
            "=".repeat(60),
            format!("Context: {}", self.context),
            format!("Total Variables: {}", self.total),
            format!("Successful: {}", self.success_count),
            format!("Errors: {}", self.errors.len()),
            format!("Warnings: {}", self.warnings.len()),
            format!("Success Rate: {:.1}%", self.success_rate()),
            String::new(),
        ];
        if self.has_errors() {
            lines.push("ERRORS:".to_string());
            lines.push("-".repeat(40));
            for (i, e) in self.errors.iter().enumerate() {
                lines.push(format!("{}. {e}", i + 1));
                if let Some(fix) = &e.suggested_fix {
                    lines.push(format!("   Suggestion: {fix}"));
                }
            }
            lines.push(String::new());
        }
        if self.has_warnings() {
            lines.push("WARNINGS:".to_string());
            lines.push("-".repeat(40));
            for (i, e) in self.warnings.iter().enumerate() {
                lines.push(format!("{}. {e}", i + 1));
                if let Some(fix) = &e.suggested_fix {
                    lines.push(format!("   Suggestion: {fix}"));
                }
            }
            lines.push(String::new());
        }
        lines.push("=".repeat(60));
        lines.join("\n")
    }
}

/// Raised when `ErrorStrategy::FailFast` hits its first error, or when
/// `ErrorStrategy::CollectReport` finds accumulated errors at `finalize()`.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct VariableSubstitutionError {
    pub message: String,
    pub report: ErrorReport,
}

fn suggestion_for(error_type: &str) -> Option<String> {
    Some(
        match error_type {
            "not found" => "check variable name spelling and ensure it's defined",
            "invalid format" => "verify variable syntax: ${variable_name} or ${variable_name|default}",
            "circular reference" => "remove circular references in variable definitions",
            "type error" => "ensure variable value is compatible with context requirements",
            _ => return None,
        }
        .to_string(),
    )
}

fn fallback_for(context: &str, var_name: &str) -> String {
    match context {
        "sql" => "NULL".to_string(),
        "ast" => "None".to_string(),
        "json" => "null".to_string(),
        _ => format!("${{{var_name}}}"),
    }
}

/// Unified error handler for variable substitution, selectable per run.
pub struct ErrorHandler {
    strategy: ErrorStrategy,
    report: ErrorReport,
}

impl ErrorHandler {
    pub fn new(strategy: ErrorStrategy) -> Self {
        Self {
            strategy,
            report: ErrorReport::default(),
        }
    }

    pub fn strategy(&self) -> ErrorStrategy {
        self.strategy
    }

    /// Handle a missing variable according to the configured strategy.
    /// Returns the fallback string to substitute (unless `FailFast` panics
    /// the run via a returned error the caller must propagate — here we
    /// still return a fallback and record the error; callers using
    /// `FailFast` should check `take_fail_fast_error()` after each call).
    pub fn handle_missing_variable(
        &mut self,
        var_name: &str,
        context: &str,
        original_text: &str,
    ) -> String {
        let error = VariableError {
            variable_name: var_name.to_string(),
            error_type: "not found".to_string(),
            error_message: format!("variable '{var_name}' is not defined"),
            context: context.to_string(),
            original_text: original_text.to_string(),
            suggested_fix: suggestion_for("not found"),
            severity: Severity::Error,
        };
        self.handle(error, fallback_for(context, var_name))
    }

    pub fn handle_invalid_format(
        &mut self,
        var_name: &str,
        context: &str,
        message: &str,
        original_text: &str,
    ) -> String {
        let error = VariableError {
            variable_name: var_name.to_string(),
            error_type: "invalid format".to_string(),
            error_message: message.to_string(),
            context: context.to_string(),
            original_text: original_text.to_string(),
            suggested_fix: suggestion_for("invalid format"),
            severity: Severity::Error,
        };
        self.handle(error, fallback_for(context, var_name))
    }

    pub fn handle_type_error(
        &mut self,
        var_name: &str,
        value_repr: &str,
        context: &str,
        message: &str,
    ) -> String {
        let error = VariableError {
            variable_name: var_name.to_string(),
            error_type: "type error".to_string(),
            error_message: format!("cannot format value {value_repr} for {context} context: {message}"),
            context: context.to_string(),
            original_text: String::new(),
            suggested_fix: suggestion_for("type error"),
            severity: Severity::Warning,
        };
        self.handle(error, value_repr.to_string())
    }

    pub fn record_success(&mut self, _var_name: &str) {
        self.report.success_count += 1;
    }

    pub fn set_total_variables(&mut self, count: u64) {
        self.report.total = count;
    }

    pub fn set_context(&mut self, context: impl Into<String>) {
        self.report.context = context.into();
    }

    pub fn report(&self) -> &ErrorReport {
        &self.report
    }

    pub fn into_report(self) -> ErrorReport {
        self.report
    }

    /// Finalize error handling: for `CollectReport`, raise an aggregate
    /// error if any occurred.
    pub fn finalize(&self) -> Result<(), VariableSubstitutionError> {
        if self.strategy == ErrorStrategy::CollectReport && self.report.has_errors() {
            error!("{}", self.report.format_detailed_report());
            return Err(VariableSubstitutionError {
                message: self.report.summary(),
                report: self.report.clone(),
            });
        }
        if self.report.has_errors() || self.report.has_warnings() {
            debug!("{}", self.report.summary());
        }
        Ok(())
    }

    fn handle(&mut self, error: VariableError, fallback: String) -> String {
        self.report.add(error.clone());
        match self.strategy {
            ErrorStrategy::FailFast => {
                error!("{error}");
            }
            ErrorStrategy::WarnContinue => {
                if error.severity == Severity::Error {
                    warn!("{error}");
                } else {
                    debug!("{error}");
                }
            }
            ErrorStrategy::Ignore => {
                debug!("{error}");
            }
            ErrorStrategy::CollectReport => {
                debug!("collected error: {error}");
            }
        }
        fallback
    }

    /// For `FailFast`, returns the first recorded error (if any) so the
    /// caller can abort the run immediately instead of continuing with
    /// fallbacks — mirrors the original's immediate-raise behavior in a
    /// way that fits Rust's `Result`-based control flow.
    pub fn fail_fast_error(&self) -> Option<VariableSubstitutionError> {
        if self.strategy == ErrorStrategy::FailFast && self.report.has_errors() {
            Some(VariableSubstitutionError {
                message: self.report.errors[0].to_string(),
                report: self.report.clone(),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warn_continue_substitutes_fallback() {
        let mut h = ErrorHandler::new(ErrorStrategy::WarnContinue);
        let out = h.handle_missing_variable("x", "sql", "${x}");
        assert_eq!(out, "NULL");
        assert!(h.report().has_errors());
    }

    #[test]
    fn fail_fast_records_and_exposes_error() {
        let mut h = ErrorHandler::new(ErrorStrategy::FailFast);
        h.handle_missing_variable("x", "text", "${x}");
        assert!(h.fail_fast_error().is_some());
    }

    #[test]
    fn collect_report_raises_on_finalize() {
        let mut h = ErrorHandler::new(ErrorStrategy::CollectReport);
        h.handle_missing_variable("x", "text", "${x}");
        assert!(h.finalize().is_err());
    }
}
