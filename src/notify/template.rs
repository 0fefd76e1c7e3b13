//! Notification message templates rendered with minijinja.
//!
//! Templates see the fields of a [`CheckResult`] as variables. Undefined
//! variables are an error, and templates are checked when loaded so a
//! misspelled field is reported before any check runs rather than when
//! the first alert fires.

use chrono::{DateTime, Utc};
use minijinja::{Environment, UndefinedBehavior, Value};
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

use crate::db::CheckResult;

pub const DEFAULT_MARKDOWN_TEMPLATE: &str = "
# Service {{ name }} {{ change_description }}

## Details
- **URL**: {{ url }}
- **Status**: {{ status }} ({{ description }})
- **Response Time**: {{ response_time }}
- **Last Check Time**: {{ last_check_time | when }}
- **Last Successful Check Time**: {{ last_success_time | when }}
- **Last Failure Time**: {{ last_failure_time | when }}
- **Payload**: {{ body }}
";

pub const DEFAULT_PLAIN_TEMPLATE: &str = "
Service {{ name }} {{ change_description }}

Details:
\t• URL: {{ url }}
\t• Status: {{ status }} ({{ description }})
\t• Response Time: {{ response_time }}
\t• Last Check Time: {{ last_check_time | when }}
\t• Last Successful Check Time: {{ last_success_time | when }}
\t• Last Failure Time: {{ last_failure_time | when }}
\t• Payload: {{ body }}
";

/// Variables available to a template, one per [`CheckResult`] field.
const FIELDS: &[&str] = &[
    "name",
    "url",
    "status",
    "description",
    "body",
    "response_time",
    "last_check_time",
    "last_success_time",
    "last_failure_time",
    "success_count",
    "failure_count",
    "last_notification_time",
    "change_description",
];

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f UTC";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("invalid template: {0}")]
    Invalid(#[from] minijinja::Error),
    #[error("unknown placeholder {0:?}")]
    UnknownPlaceholder(String),
    #[error("failed to read template {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A syntax-checked message template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    source: String,
}

impl MessageTemplate {
    /// Compile `source` and check that it only refers to known fields.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let tmpl = environment().template_from_str(source)?;
        let mut unknown: Vec<String> = tmpl
            .undeclared_variables(false)
            .into_iter()
            .filter(|var| !FIELDS.contains(&var.as_str()))
            .collect();
        unknown.sort();
        if let Some(var) = unknown.into_iter().next() {
            return Err(TemplateError::UnknownPlaceholder(var));
        }

        Ok(Self {
            source: source.to_string(),
        })
    }

    /// Read and parse a template file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&source)
    }

    pub fn render(&self, result: &CheckResult) -> Result<String, TemplateError> {
        environment()
            .render_str(&self.source, result)
            .map_err(|e| {
                tracing::warn!("Failed to render notification template: {}", e);
                TemplateError::Invalid(e)
            })
    }
}

fn environment() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_filter("when", when);
        env
    })
}

/// Format an optional timestamp field, "never" when unset.
fn when(value: Value) -> String {
    if value.is_none() || value.is_undefined() {
        return "never".to_string();
    }
    match value.as_str().map(DateTime::parse_from_rfc3339) {
        Some(Ok(time)) => time.with_timezone(&Utc).format(TIME_FORMAT).to_string(),
        _ => value.to_string(),
    }
}
