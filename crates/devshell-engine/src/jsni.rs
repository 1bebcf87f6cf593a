//! Symbolic member references
//!
//! Native-bridged method bodies name members of compiled types with
//! references of the form:
//!
//! ```text
//! @a.b.C::field
//! @a.b.C::method(ILjava/lang/String;)
//! @a.b.C::new(I)
//! @a.b.C::method(*)
//! ```
//!
//! The type name may use either the source (`a.b.Outer.Inner`) or the binary
//! (`a.b.Outer$Inner`) nesting separator. The type name `null` denotes the
//! no-op target.

use devshell_bytecode::descriptor::split_params;
use std::borrow::Cow;
use thiserror::Error;

/// Parameter list that matches any overload
pub const WILDCARD_PARAMS: &str = "*";

/// Type name of the no-op target
pub const NULL_TYPE_NAME: &str = "null";

/// Member name used for constructors
pub const CONSTRUCTOR_MEMBER: &str = "new";

/// A reference that does not follow the grammar
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed reference '{text}': {reason}")]
pub struct MalformedReference {
    /// The reference as written
    pub text: String,
    /// What was wrong with it
    pub reason: String,
}

impl MalformedReference {
    fn new(text: &str, reason: impl Into<String>) -> Self {
        Self {
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

/// A parsed member reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JsniRef {
    class_name: String,
    member_name: String,
    params: Option<String>,
}

impl JsniRef {
    /// Parse a reference
    ///
    /// # Arguments
    /// * `text` - The reference, including the leading `@`
    ///
    /// # Returns
    /// The type name and member, or a [`MalformedReference`] naming what is
    /// wrong. Nothing is ever defaulted.
    pub fn parse(text: &str) -> Result<Self, MalformedReference> {
        let body = text
            .strip_prefix('@')
            .ok_or_else(|| MalformedReference::new(text, "Expected \"@\" at start of reference"))?;

        let sep = body
            .find("::")
            .ok_or_else(|| MalformedReference::new(text, "Expected \":\" in reference"))?;
        let class_name = &body[..sep];
        let member = &body[sep + 2..];

        if class_name.is_empty() {
            return Err(MalformedReference::new(text, "Expected a type name before \"::\""));
        }
        if let Some(bad) = class_name.chars().find(|&c| !is_type_name_char(c)) {
            return Err(MalformedReference::new(
                text,
                format!("Unexpected character '{}' in type name", bad),
            ));
        }

        let (member_name, params) = match member.find('(') {
            None => (member, None),
            Some(open) => {
                let close = member[open..]
                    .find(')')
                    .map(|i| open + i)
                    .ok_or_else(|| MalformedReference::new(text, "Expected \")\" to close signature"))?;
                if close + 1 != member.len() {
                    return Err(MalformedReference::new(
                        text,
                        "Unexpected text after signature",
                    ));
                }
                (&member[..open], Some(&member[open + 1..close]))
            }
        };

        if member_name.is_empty() {
            return Err(MalformedReference::new(text, "Expected a member name after \"::\""));
        }
        if let Some(bad) = member_name.chars().find(|&c| !is_member_name_char(c)) {
            return Err(MalformedReference::new(
                text,
                format!("Unexpected character '{}' in member name", bad),
            ));
        }

        if let Some(params) = params {
            if params != WILDCARD_PARAMS {
                split_params(params).map_err(|e| {
                    MalformedReference::new(
                        text,
                        format!("Invalid type signature in \"{}\" at offset {}", params, e.offset),
                    )
                })?;
            }
        }

        Ok(Self {
            class_name: class_name.to_string(),
            member_name: member_name.to_string(),
            params: params.map(str::to_string),
        })
    }

    /// Type name as written
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Member name (`new` for constructors)
    pub fn member_name(&self) -> &str {
        &self.member_name
    }

    /// Parameter list without parentheses, for methods and constructors
    pub fn params(&self) -> Option<&str> {
        self.params.as_deref()
    }

    /// Whether the reference names a field
    pub fn is_field(&self) -> bool {
        self.params.is_none()
    }

    /// Whether the reference names a method or constructor
    pub fn is_method(&self) -> bool {
        self.params.is_some()
    }

    /// Whether the reference names a constructor
    pub fn is_constructor(&self) -> bool {
        self.is_method() && self.member_name == CONSTRUCTOR_MEMBER
    }

    /// Whether the parameter list is the `*` wildcard
    pub fn matches_any_overload(&self) -> bool {
        self.params.as_deref() == Some(WILDCARD_PARAMS)
    }

    /// Whether the reference targets the no-op `null` type
    pub fn is_null_target(&self) -> bool {
        self.class_name == NULL_TYPE_NAME
    }

    /// `name` for fields, `name(params)` for methods and constructors
    pub fn member_signature(&self) -> String {
        match &self.params {
            Some(params) => format!("{}({})", self.member_name, params),
            None => self.member_name.clone(),
        }
    }

    /// Individual parameter signatures (empty for fields and wildcards)
    pub fn param_types(&self) -> Vec<String> {
        match self.params.as_deref() {
            Some(params) if params != WILDCARD_PARAMS => split_params(params).unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Display for JsniRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}::{}", self.class_name, self.member_signature())
    }
}

/// Map the bare host-side `toString` onto the root type's `toString()`
pub fn canonical_reference<'a>(text: &'a str, universal_root: &str) -> Cow<'a, str> {
    if text == "toString" {
        Cow::Owned(format!("@{}::toString()", universal_root))
    } else {
        Cow::Borrowed(text)
    }
}

/// Extract every reference token from a native method body
///
/// A token starts at `@`, runs through the type name and `::`, and ends after
/// the member name or the closing `)` of its signature. Call arguments that
/// follow the signature are not part of the token. Text that merely contains
/// an `@` (string literals, annotations) without a following `::` is skipped.
pub fn scan_references(body: &str) -> Vec<String> {
    let bytes = body.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0;

    while let Some(offset) = body[pos..].find('@') {
        let start = pos + offset;
        let mut cursor = start + 1;
        while cursor < bytes.len() && is_type_name_char(bytes[cursor] as char) {
            cursor += 1;
        }
        if cursor == start + 1 || !body[cursor..].starts_with("::") {
            pos = start + 1;
            continue;
        }
        cursor += 2;
        while cursor < bytes.len() && is_member_name_char(bytes[cursor] as char) {
            cursor += 1;
        }
        if cursor < bytes.len() && bytes[cursor] == b'(' {
            match body[cursor..].find(')') {
                Some(close) => cursor += close + 1,
                None => cursor = bytes.len(),
            }
        }
        out.push(body[start..cursor].to_string());
        pos = cursor;
    }

    out
}

fn is_type_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$'
}

fn is_member_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}
