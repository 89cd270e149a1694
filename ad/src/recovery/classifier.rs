//! Error classifier - raw error to taxonomy category
//!
//! A pure function: the same raw error always classifies to the same
//! category. Rules are ordered; `unknown` is the fallback only when
//! nothing matched.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::domain::{ErrorCategory, RawError};

/// HTTP auth statuses as standalone tokens, so "14013" never matches
static AUTH_STATUS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(401|403)\b").expect("static regex"));

/// HTTP rate-limit status as a standalone token
static RATE_LIMIT_STATUS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b429\b").expect("static regex"));

/// Classify a raw error into the closed taxonomy
pub fn classify(error: &RawError) -> ErrorCategory {
    debug!(name = %error.name, exit_code = ?error.exit_code, "classify: called");
    let name = error.name.to_lowercase();
    let message = error.message.to_lowercase();
    let text = format!("{} {}", name, message);

    // Registry misses are decided by the executor, not by message scans
    if name == "tool_not_found" {
        return ErrorCategory::ToolNotFound;
    }

    if error.exit_code == Some(127) || text.contains("command not found") {
        return ErrorCategory::CommandNotFound;
    }

    if name.contains("eacces") || text.contains("permission denied") || text.contains("escapes workspace") {
        return ErrorCategory::PermissionDenied;
    }

    if name.contains("enoent") || text.contains("no such file") || text.contains("no such directory") {
        return ErrorCategory::FileNotFound;
    }

    if name.contains("etimedout") || text.contains("timed out") || text.contains("deadline exceeded") {
        return ErrorCategory::Timeout;
    }

    if RATE_LIMIT_STATUS.is_match(&text) || text.contains("rate limit") {
        return ErrorCategory::RateLimit;
    }

    if AUTH_STATUS.is_match(&text) || text.contains("unauthorized") || text.contains("forbidden") {
        return ErrorCategory::Auth;
    }

    if name.contains("econnrefused")
        || name.contains("econnreset")
        || name.contains("ehostunreach")
        || text.contains("network")
        || text.contains("dns")
        || text.contains("connection refused")
        || text.contains("connection reset")
    {
        return ErrorCategory::Network;
    }

    if name.contains("ebusy") || text.contains("resource busy") || text.contains("is locked") || text.contains("lock held")
    {
        return ErrorCategory::ResourceBusy;
    }

    if name.contains("enomem") || text.contains("out of memory") || text.contains("allocation failed") {
        return ErrorCategory::OutOfMemory;
    }

    if name == "invalid_args" || text.contains("validation failed") || text.contains("schema mismatch") || text.contains("invalid argument")
    {
        return ErrorCategory::InvalidArgs;
    }

    if text.contains("cannot find module")
        || text.contains("module not found")
        || text.contains("no module named")
        || text.contains("unresolved import")
        || text.contains("cannot resolve dependency")
    {
        return ErrorCategory::DependencyMissing;
    }

    if text.contains("syntax error") || text.contains("parse error") || text.contains("unexpected token") {
        return ErrorCategory::Syntax;
    }

    debug!("classify: no rule matched, falling back to unknown");
    ErrorCategory::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, message: &str) -> RawError {
        RawError::new(name, message)
    }

    #[test]
    fn test_exit_127_is_command_not_found() {
        let error = raw("command_failed", "sh: git: not found").with_exit_code(127);
        assert_eq!(classify(&error), ErrorCategory::CommandNotFound);
    }

    #[test]
    fn test_registry_miss_is_tool_not_found() {
        assert_eq!(
            classify(&raw("tool_not_found", "Tool not in registry: mystery")),
            ErrorCategory::ToolNotFound
        );
    }

    #[test]
    fn test_eacces_is_permission_denied() {
        assert_eq!(classify(&raw("EACCES", "permission denied")), ErrorCategory::PermissionDenied);
        assert_eq!(
            classify(&raw("sandbox", "Path escapes workspace: /etc")),
            ErrorCategory::PermissionDenied
        );
    }

    #[test]
    fn test_enoent_is_file_not_found() {
        assert_eq!(classify(&raw("ENOENT", "no such file: x.txt")), ErrorCategory::FileNotFound);
    }

    #[test]
    fn test_timeout() {
        assert_eq!(classify(&raw("ETIMEDOUT", "command timed out")), ErrorCategory::Timeout);
    }

    #[test]
    fn test_network() {
        assert_eq!(classify(&raw("ECONNREFUSED", "connection refused")), ErrorCategory::Network);
    }

    #[test]
    fn test_auth() {
        assert_eq!(classify(&raw("http_error", "HTTP 403 for url")), ErrorCategory::Auth);
        assert_eq!(classify(&raw("unauthorized", "HTTP 401 for url")), ErrorCategory::Auth);
    }

    #[test]
    fn test_resource_busy() {
        assert_eq!(classify(&raw("EBUSY", "resource busy")), ErrorCategory::ResourceBusy);
    }

    #[test]
    fn test_out_of_memory() {
        assert_eq!(classify(&raw("ENOMEM", "out of memory")), ErrorCategory::OutOfMemory);
    }

    #[test]
    fn test_rate_limit() {
        assert_eq!(classify(&raw("rate_limited", "HTTP 429 for url")), ErrorCategory::RateLimit);
    }

    #[test]
    fn test_invalid_args() {
        assert_eq!(classify(&raw("invalid_args", "command is required")), ErrorCategory::InvalidArgs);
    }

    #[test]
    fn test_dependency_missing() {
        assert_eq!(
            classify(&raw("command_failed", "Error: Cannot find module 'express'")),
            ErrorCategory::DependencyMissing
        );
    }

    #[test]
    fn test_syntax() {
        assert_eq!(
            classify(&raw("command_failed", "SyntaX Error: unexpected token")),
            ErrorCategory::Syntax
        );
    }

    #[test]
    fn test_unknown_fallback() {
        assert_eq!(classify(&raw("weird", "something inexplicable")), ErrorCategory::Unknown);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let error = raw("command_failed", "sh: git: not found").with_exit_code(127);
        assert_eq!(classify(&error), classify(&error));
    }
}
