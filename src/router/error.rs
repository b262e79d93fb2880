//! Errors raised while compiling route templates and route lines.

use std::fmt;

/// A route template or route line that could not be turned into a [`Route`](super::Route).
///
/// In strict mode these are returned to the caller of the table builder. In
/// lenient mode they are logged and the route is either matched literally
/// (bad template) or skipped (bad route line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteCompileError {
    /// The template was the empty string.
    EmptyTemplate,
    /// Templates must start with `/` (or be exactly `*`).
    MissingLeadingSlash { template: String },
    /// A `:` was not followed by a parameter name.
    EmptyParamName { template: String, position: usize },
    /// An opening `(` without a matching `)`, or a stray `)`.
    UnbalancedGroup { template: String, position: usize },
    /// The same parameter name appears twice in one template.
    DuplicateParam { template: String, name: String },
    /// A custom group did not compile as a regular expression.
    InvalidConstraint {
        template: String,
        constraint: String,
        reason: String,
    },
    /// A route line did not match `<method> <path> #<c|s>:<name>.<action>`.
    InvalidRouteLine { line: String },
}

impl fmt::Display for RouteCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteCompileError::EmptyTemplate => write!(f, "route template is empty"),
            RouteCompileError::MissingLeadingSlash { template } => {
                write!(f, "route template '{template}' must start with '/'")
            }
            RouteCompileError::EmptyParamName { template, position } => write!(
                f,
                "route template '{template}' has an unnamed ':' parameter at byte {position}"
            ),
            RouteCompileError::UnbalancedGroup { template, position } => write!(
                f,
                "route template '{template}' has an unbalanced group at byte {position}"
            ),
            RouteCompileError::DuplicateParam { template, name } => write!(
                f,
                "route template '{template}' declares parameter '{name}' more than once"
            ),
            RouteCompileError::InvalidConstraint {
                template,
                constraint,
                reason,
            } => write!(
                f,
                "route template '{template}' has an invalid group '({constraint})': {reason}"
            ),
            RouteCompileError::InvalidRouteLine { line } => write!(
                f,
                "invalid route line '{line}', expected '<method> <path> #<c|s>:<name>.<action>'"
            ),
        }
    }
}

impl std::error::Error for RouteCompileError {}
