//! Structured logging for the Lambda binaries.
//!
//! Logs go through `tracing`; the filter sits behind a reload handle so a
//! resource can raise verbosity for the invocation that carries it.

use cfn_lifecycle_core::event::Properties;
use serde_json::Value;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::{normalize_level, LogFormat};

/// Resource property overriding the log level of this crate.
pub const LOG_LEVEL_PROPERTY: &str = "loglevel";
/// Resource property overriding the log level of the AWS SDK.
pub const SDK_LOG_LEVEL_PROPERTY: &str = "botolevel";

const DEFAULT_SDK_LEVEL: &str = "error";
const SDK_TARGETS: &[&str] = &["aws_config", "aws_smithy_runtime", "aws_sdk", "hyper", "rustls"];

#[derive(Clone)]
pub struct LogLevelHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    default_level: String,
}

impl LogLevelHandle {
    /// Applies the `loglevel`/`botolevel` properties, or restores the
    /// configured default when they are absent.
    pub fn apply_resource_override(&self, properties: &Properties) {
        let directives = filter_directives(properties, &self.default_level);
        if let Err(error) = self.handle.reload(EnvFilter::new(&directives)) {
            tracing::warn!(%error, %directives, "failed to apply log level override");
        }
    }
}

/// Installs the global subscriber. Called once per cold start; the caller
/// owns the returned handle.
pub fn init_logging(format: LogFormat, default_level: &str) -> LogLevelHandle {
    let directives = filter_directives(&Properties::new(), default_level);
    let (filter, handle) = reload::Layer::new(EnvFilter::new(directives));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };
    if let Err(error) = installed {
        eprintln!("tracing subscriber already installed: {error}");
    }

    LogLevelHandle {
        handle,
        default_level: default_level.to_string(),
    }
}

/// Builds the filter for an invocation: the crate level from `loglevel`
/// (falling back to `default_level`) and SDK targets from `botolevel`.
pub fn filter_directives(properties: &Properties, default_level: &str) -> String {
    let level = property_level(properties, LOG_LEVEL_PROPERTY)
        .or_else(|| normalize_level(default_level))
        .unwrap_or("warn");
    let sdk_level =
        property_level(properties, SDK_LOG_LEVEL_PROPERTY).unwrap_or(DEFAULT_SDK_LEVEL);

    let mut directives = vec![level.to_string()];
    directives.extend(
        SDK_TARGETS
            .iter()
            .map(|target| format!("{target}={sdk_level}")),
    );
    directives.join(",")
}

fn property_level(properties: &Properties, key: &str) -> Option<&'static str> {
    properties
        .get(key)
        .and_then(Value::as_str)
        .and_then(normalize_level)
}

/// Span carrying both request ids, mirroring CloudFormation's and Lambda's
/// view of the invocation.
#[must_use]
pub fn invocation_span(request_id: &str, lambda_request_id: &str) -> Span {
    tracing::info_span!(
        "lifecycle",
        request_id = request_id,
        lambda_request_id = lambda_request_id,
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn properties(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => Properties::new(),
        }
    }

    #[test]
    fn defaults_keep_sdk_quiet() {
        let directives = filter_directives(&Properties::new(), "warn");
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("aws_smithy_runtime=error"));
    }

    #[test]
    fn resource_properties_override_levels() {
        let directives = filter_directives(
            &properties(json!({"loglevel": "DEBUG", "botolevel": "warning"})),
            "warn",
        );
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("aws_config=warn"));
    }

    #[test]
    fn unknown_levels_fall_back() {
        let directives = filter_directives(&properties(json!({"loglevel": "chatty"})), "info");
        assert!(directives.starts_with("info,"));
    }

    #[test]
    fn each_init_returns_its_own_handle() {
        let first = init_logging(LogFormat::Pretty, "info");
        let second = init_logging(LogFormat::Json, "debug");
        assert_eq!(first.default_level, "info");
        assert_eq!(second.default_level, "debug");

        // The second subscriber was never installed; reloading it only warns.
        second.apply_resource_override(&properties(json!({"loglevel": "trace"})));
        first.apply_resource_override(&Properties::new());

        let span = invocation_span("req-1", "lambda-req-1");
        let _guard = span.enter();
        tracing::info!("message inside invocation span");
    }
}
