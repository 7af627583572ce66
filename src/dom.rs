// src/dom.rs
// Compound attribute selectors and an in-memory document to run them against.
// Supports `tag`, `*`, `[attr]`, `[attr=v]`, `[attr^=v]`, `[attr$=v]` and `[attr*=v]`.

use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::boundaries::{ElementSnapshot, PageDocument};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected character '{found}' at {position}")]
    Unexpected { found: char, position: usize },
    #[error("unterminated attribute selector")]
    Unterminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeOp {
    Exists,
    Equals,
    Prefix,
    Suffix,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeFilter {
    name: String,
    op: AttributeOp,
    value: String,
}

impl AttributeFilter {
    fn matches(&self, element: &ElementSnapshot) -> bool {
        let Some(actual) = element.attribute(&self.name) else {
            return false;
        };
        match self.op {
            AttributeOp::Exists => true,
            AttributeOp::Equals => actual == self.value,
            // An empty operand never matches for the substring operators.
            AttributeOp::Prefix => !self.value.is_empty() && actual.starts_with(&self.value),
            AttributeOp::Suffix => !self.value.is_empty() && actual.ends_with(&self.value),
            AttributeOp::Contains => !self.value.is_empty() && actual.contains(&self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    tag: Option<String>,
    filters: Vec<AttributeFilter>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let chars: Vec<char> = input.trim().chars().collect();
        if chars.is_empty() {
            return Err(SelectorError::Empty);
        }
        let mut pos = 0;

        let tag = if chars[0] == '*' {
            pos = 1;
            None
        } else {
            let ident = read_ident(&chars, &mut pos);
            (!ident.is_empty()).then(|| ident.to_ascii_lowercase())
        };

        let mut filters = Vec::new();
        while pos < chars.len() {
            if chars[pos] != '[' {
                return Err(SelectorError::Unexpected {
                    found: chars[pos],
                    position: pos,
                });
            }
            pos += 1;
            filters.push(read_attribute_filter(&chars, &mut pos)?);
        }
        Ok(Self { tag, filters })
    }

    pub fn matches(&self, element: &ElementSnapshot) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        self.filters.iter().all(|filter| filter.matches(element))
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

fn read_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn skip_whitespace(chars: &[char], pos: &mut usize) {
    while *pos < chars.len() && chars[*pos].is_whitespace() {
        *pos += 1;
    }
}

fn expect_char(chars: &[char], pos: &mut usize, expected: char) -> Result<(), SelectorError> {
    match chars.get(*pos) {
        Some(ch) if *ch == expected => {
            *pos += 1;
            Ok(())
        }
        Some(ch) => Err(SelectorError::Unexpected {
            found: *ch,
            position: *pos,
        }),
        None => Err(SelectorError::Unterminated),
    }
}

fn read_attribute_filter(chars: &[char], pos: &mut usize) -> Result<AttributeFilter, SelectorError> {
    skip_whitespace(chars, pos);
    let name = read_ident(chars, pos).to_ascii_lowercase();
    if name.is_empty() {
        return match chars.get(*pos) {
            Some(ch) => Err(SelectorError::Unexpected {
                found: *ch,
                position: *pos,
            }),
            None => Err(SelectorError::Unterminated),
        };
    }
    skip_whitespace(chars, pos);

    let op = match chars.get(*pos) {
        Some(']') => {
            *pos += 1;
            return Ok(AttributeFilter {
                name,
                op: AttributeOp::Exists,
                value: String::new(),
            });
        }
        Some('=') => AttributeOp::Equals,
        Some('^') => AttributeOp::Prefix,
        Some('$') => AttributeOp::Suffix,
        Some('*') => AttributeOp::Contains,
        Some(ch) => {
            return Err(SelectorError::Unexpected {
                found: *ch,
                position: *pos,
            })
        }
        None => return Err(SelectorError::Unterminated),
    };
    *pos += 1;
    if op != AttributeOp::Equals {
        expect_char(chars, pos, '=')?;
    }
    skip_whitespace(chars, pos);

    let value = match chars.get(*pos) {
        Some(quote @ ('"' | '\'')) => {
            let quote = *quote;
            *pos += 1;
            let start = *pos;
            while *pos < chars.len() && chars[*pos] != quote {
                *pos += 1;
            }
            if *pos >= chars.len() {
                return Err(SelectorError::Unterminated);
            }
            let value: String = chars[start..*pos].iter().collect();
            *pos += 1;
            value
        }
        Some(_) => read_ident(chars, pos),
        None => return Err(SelectorError::Unterminated),
    };
    skip_whitespace(chars, pos);
    expect_char(chars, pos, ']')?;

    Ok(AttributeFilter { name, op, value })
}

/// Document holding a flat list of elements in document order.
#[derive(Default)]
pub struct StaticDocument {
    elements: Mutex<Vec<ElementSnapshot>>,
}

impl StaticDocument {
    pub fn new(elements: Vec<ElementSnapshot>) -> Self {
        Self {
            elements: Mutex::new(elements),
        }
    }

    fn elements(&self) -> MutexGuard<'_, Vec<ElementSnapshot>> {
        self.elements
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, element: ElementSnapshot) {
        self.elements().push(element);
    }
}

impl PageDocument for StaticDocument {
    fn query_selector(&self, selector: &str) -> Option<ElementSnapshot> {
        let selector = match Selector::parse(selector) {
            Ok(selector) => selector,
            Err(err) => {
                tracing::debug!("unusable selector {selector:?}: {err}");
                return None;
            }
        };
        self.elements()
            .iter()
            .find(|element| selector.matches(element))
            .cloned()
    }
}
