//! Route template compilation.
//!
//! Templates are compiled once at startup into an anchored regular expression
//! plus the ordered list of parameter names the expression captures.
//!
//! ## Grammar
//!
//! | Template piece  | Meaning                                              |
//! |-----------------|------------------------------------------------------|
//! | `/users`        | literal text, regex metacharacters are escaped       |
//! | `:id`           | named parameter, one path segment (`[^/]+?`)         |
//! | `:id(\d+)`      | named parameter with a custom pattern                |
//! | `/:id?`         | optional named parameter, the leading `/` goes too   |
//! | `(\d+)`         | unnamed group, captured under `"0"`, `"1"`, ...      |
//! | `*`             | unnamed wildcard, captures the rest (`.*`)           |
//!
//! Every compiled pattern is anchored at both ends and tolerates one trailing
//! slash, so `/about` matches `/about` and `/about/`. Matching is
//! case-sensitive and runs against the path only (never the query string).
//! Captured values are percent-decoded; a value that does not decode is kept
//! as the raw text.

use regex::Regex;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::warn;

use super::core::ParamVec;
use super::error::RouteCompileError;

/// Pattern used for a parameter without a custom group.
const SEGMENT: &str = "[^/]+?";

/// How a malformed template is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileMode {
    /// Malformed templates are rejected with a [`RouteCompileError`].
    Strict,
    /// Malformed templates are logged and matched as literal text.
    #[default]
    Lenient,
}

impl CompileMode {
    /// `Strict` for `true`, `Lenient` otherwise; maps the `strict_routes` setting.
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            CompileMode::Strict
        } else {
            CompileMode::Lenient
        }
    }
}

/// A path template compiled to an anchored regex plus its parameter names.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    template: String,
    regex: Regex,
    /// (public parameter name, regex group name) in capture order.
    slots: Vec<(Arc<str>, String)>,
    literal_fallback: bool,
}

#[derive(Debug)]
enum Token {
    Literal(String),
    Param {
        name: Option<String>,
        constraint: Option<String>,
        optional: bool,
        slash: bool,
    },
    Wildcard,
}

/// Compile a route template.
///
/// ```rust
/// use corkrouter::router::{compile_pattern, CompileMode};
///
/// let pattern = compile_pattern("/user/:id(\\d+)", CompileMode::Strict).unwrap();
/// let params = pattern.captures("/user/42").unwrap();
/// assert_eq!(params[0].1, "42");
/// assert!(pattern.captures("/user/bob").is_none());
/// ```
pub fn compile_pattern(
    template: &str,
    mode: CompileMode,
) -> Result<CompiledPattern, RouteCompileError> {
    match compile_strict(template) {
        Ok(pattern) => Ok(pattern),
        Err(err) if mode == CompileMode::Lenient && !template.is_empty() => {
            warn!(
                template = %template,
                error = %err,
                "Malformed route template, matching it literally"
            );
            CompiledPattern::literal(template)
        }
        Err(err) => Err(err),
    }
}

fn compile_strict(template: &str) -> Result<CompiledPattern, RouteCompileError> {
    if template.is_empty() {
        return Err(RouteCompileError::EmptyTemplate);
    }
    if template != "*" && !template.starts_with('/') && !template.starts_with('*') {
        return Err(RouteCompileError::MissingLeadingSlash {
            template: template.to_string(),
        });
    }

    let tokens = tokenize(template)?;

    let mut source = String::with_capacity(template.len() * 2 + 8);
    source.push('^');
    let mut slots: Vec<(Arc<str>, String)> = Vec::new();
    let mut unnamed = 0usize;
    let mut next_unnamed = || {
        let name = unnamed.to_string();
        unnamed += 1;
        name
    };

    for token in tokens {
        match token {
            Token::Literal(text) => source.push_str(&regex::escape(&text)),
            Token::Param {
                name,
                constraint,
                optional,
                slash,
            } => {
                let group = format!("p{}", slots.len());
                let capture = format!(
                    "(?P<{group}>{})",
                    constraint.as_deref().unwrap_or(SEGMENT)
                );
                match (slash, optional) {
                    (true, true) => {
                        source.push_str("(?:/");
                        source.push_str(&capture);
                        source.push_str(")?");
                    }
                    (true, false) => {
                        source.push('/');
                        source.push_str(&capture);
                    }
                    (false, true) => {
                        source.push_str(&capture);
                        source.push('?');
                    }
                    (false, false) => source.push_str(&capture),
                }
                let name = name.unwrap_or_else(&mut next_unnamed);
                slots.push((Arc::from(name), group));
            }
            Token::Wildcard => {
                let group = format!("p{}", slots.len());
                source.push_str(&format!("(?P<{group}>.*)"));
                slots.push((Arc::from(next_unnamed()), group));
            }
        }
    }
    source.push_str("/?$");

    let regex = Regex::new(&source).map_err(|e| RouteCompileError::InvalidConstraint {
        template: template.to_string(),
        constraint: template.to_string(),
        reason: e.to_string(),
    })?;

    Ok(CompiledPattern {
        template: template.to_string(),
        regex,
        slots,
        literal_fallback: false,
    })
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Move pending literal text into the token list. When `detach_slash` is set
/// a trailing `/` is removed and reported so the following parameter can own it.
fn flush_literal(literal: &mut String, tokens: &mut Vec<Token>, detach_slash: bool) -> bool {
    let slash = detach_slash && literal.ends_with('/');
    if slash {
        literal.pop();
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(std::mem::take(literal)));
    }
    slash
}

fn tokenize(template: &str) -> Result<Vec<Token>, RouteCompileError> {
    let chars: Vec<(usize, char)> = template.char_indices().collect();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut names: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, c) = chars[i];
        match c {
            ':' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_name_char(chars[end].1) {
                    end += 1;
                }
                if end == start {
                    return Err(RouteCompileError::EmptyParamName {
                        template: template.to_string(),
                        position,
                    });
                }
                let name: String = chars[start..end].iter().map(|(_, c)| *c).collect();
                if names.contains(&name) {
                    return Err(RouteCompileError::DuplicateParam {
                        template: template.to_string(),
                        name,
                    });
                }
                names.push(name.clone());
                i = end;

                let constraint = if chars.get(i).map(|(_, c)| *c) == Some('(') {
                    let (group, next) = read_group(template, &chars, i)?;
                    i = next;
                    Some(group)
                } else {
                    None
                };
                let optional = chars.get(i).map(|(_, c)| *c) == Some('?');
                if optional {
                    i += 1;
                }
                let slash = flush_literal(&mut literal, &mut tokens, true);
                tokens.push(Token::Param {
                    name: Some(name),
                    constraint,
                    optional,
                    slash,
                });
            }
            '(' => {
                let (group, next) = read_group(template, &chars, i)?;
                i = next;
                let optional = chars.get(i).map(|(_, c)| *c) == Some('?');
                if optional {
                    i += 1;
                }
                let slash = flush_literal(&mut literal, &mut tokens, true);
                tokens.push(Token::Param {
                    name: None,
                    constraint: Some(group),
                    optional,
                    slash,
                });
            }
            ')' => {
                return Err(RouteCompileError::UnbalancedGroup {
                    template: template.to_string(),
                    position,
                });
            }
            '*' => {
                flush_literal(&mut literal, &mut tokens, false);
                tokens.push(Token::Wildcard);
                i += 1;
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }

    // A trailing slash is already covered by the `/?$` suffix.
    flush_literal(&mut literal, &mut tokens, true);
    Ok(tokens)
}

/// Read a parenthesised group starting at `open`, returning its inner text and
/// the index just past the closing `)`.
fn read_group(
    template: &str,
    chars: &[(usize, char)],
    open: usize,
) -> Result<(String, usize), RouteCompileError> {
    let mut depth = 0usize;
    let mut inner = String::new();
    let mut i = open;
    while i < chars.len() {
        let c = chars[i].1;
        match c {
            '\\' => {
                inner.push(c);
                if let Some((_, escaped)) = chars.get(i + 1) {
                    inner.push(*escaped);
                }
                i += 2;
                continue;
            }
            '(' => {
                depth += 1;
                if depth > 1 {
                    inner.push(c);
                }
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    Regex::new(&format!("^(?:{inner})$")).map_err(|e| {
                        RouteCompileError::InvalidConstraint {
                            template: template.to_string(),
                            constraint: inner.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    return Ok((inner, i + 1));
                }
                inner.push(c);
            }
            _ => inner.push(c),
        }
        i += 1;
    }
    Err(RouteCompileError::UnbalancedGroup {
        template: template.to_string(),
        position: chars[open].0,
    })
}

impl CompiledPattern {
    /// A pattern matching `template` as plain text, with no parameters.
    pub fn literal(template: &str) -> Result<Self, RouteCompileError> {
        let trimmed = template.strip_suffix('/').unwrap_or(template);
        let source = format!("^{}/?$", regex::escape(trimmed));
        let regex = Regex::new(&source).map_err(|e| RouteCompileError::InvalidConstraint {
            template: template.to_string(),
            constraint: template.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            template: template.to_string(),
            regex,
            slots: Vec::new(),
            literal_fallback: true,
        })
    }

    /// The template as registered.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The compiled regular expression source.
    pub fn as_regex_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Parameter names in the order they appear in the template.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(name, _)| name.as_ref())
    }

    /// `true` when the template was malformed and is matched literally.
    pub fn is_literal_fallback(&self) -> bool {
        self.literal_fallback
    }

    /// Whether `path` matches, without extracting parameters.
    #[inline]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match `path` and return the decoded parameters.
    ///
    /// Optional parameters that did not participate in the match are left out.
    pub fn captures(&self, path: &str) -> Option<ParamVec> {
        let caps = self.regex.captures(path)?;
        let mut params = ParamVec::new();
        for (name, group) in &self.slots {
            if let Some(value) = caps.name(group) {
                params.push((Arc::clone(name), decode_component(value.as_str())));
            }
        }
        Some(params)
    }
}

fn decode_component(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => raw.to_string(),
    }
}
