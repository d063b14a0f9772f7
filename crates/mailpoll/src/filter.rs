//! Structured filters compiled to Gmail search syntax
//!
//! Supported shapes:
//! - free-text terms
//! - field matches: `from:`, `to:`, `cc:`, `subject:`, `label:`, `has:`, `is:`
//! - conjunction (space separated), disjunction (`{a b}`), negation (`-a`)

/// Message field a filter can match on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    From,
    To,
    Cc,
    Subject,
    Label,
    Has,
    Is,
}

impl FilterField {
    /// Gmail operator name
    pub fn operator(&self) -> &'static str {
        match self {
            FilterField::From => "from",
            FilterField::To => "to",
            FilterField::Cc => "cc",
            FilterField::Subject => "subject",
            FilterField::Label => "label",
            FilterField::Has => "has",
            FilterField::Is => "is",
        }
    }
}

/// A filter expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    Term(String),
    Field { field: FilterField, value: String },
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    pub fn term(value: impl Into<String>) -> Self {
        FilterExpr::Term(value.into())
    }

    pub fn field(field: FilterField, value: impl Into<String>) -> Self {
        FilterExpr::Field {
            field,
            value: value.into(),
        }
    }

    pub fn negate(expr: FilterExpr) -> Self {
        FilterExpr::Not(Box::new(expr))
    }

    /// Compile to a Gmail search fragment. Empty groups compile to "".
    pub fn compile(&self) -> String {
        match self {
            FilterExpr::Term(value) => quote(value),
            FilterExpr::Field { field, value } => format!("{}:{}", field.operator(), quote(value)),
            FilterExpr::And(items) => items
                .iter()
                .map(FilterExpr::compile)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            FilterExpr::Or(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        FilterExpr::And(inner) if inner.len() > 1 => format!("({})", item.compile()),
                        _ => item.compile(),
                    })
                    .filter(|s| !s.is_empty())
                    .collect();
                match parts.len() {
                    0 => String::new(),
                    1 => parts.into_iter().next().unwrap_or_default(),
                    _ => format!("{{{}}}", parts.join(" ")),
                }
            }
            FilterExpr::Not(inner) => {
                let compiled = inner.compile();
                if compiled.is_empty() {
                    return compiled;
                }
                match inner.as_ref() {
                    FilterExpr::And(items) if items.len() > 1 => format!("-({})", compiled),
                    _ => format!("-{}", compiled),
                }
            }
        }
    }
}

/// Quote a value if it contains whitespace or special characters
fn quote(value: &str) -> String {
    let cleaned: String = value.chars().filter(|c| *c != '"').collect();
    let needs_quotes = cleaned
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '{' | '}'))
        || cleaned.starts_with('-');
    if needs_quotes {
        format!("\"{}\"", cleaned)
    } else {
        cleaned
    }
}
