//! Immutable reference-counted strings.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// Immutable string shared by reference.
///
/// Property ids (atoms) and string values both use this type, so a value
/// flowing from a string constant into a property key never copies.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsString(Rc<str>);

impl JsString {
    /// Returns the contents as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if both strings share the same allocation.
    pub fn ptr_eq(&self, other: &JsString) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Concatenates two strings into a fresh one.
    pub fn concat(&self, other: &JsString) -> JsString {
        let mut s = String::with_capacity(self.0.len() + other.0.len());
        s.push_str(&self.0);
        s.push_str(&other.0);
        JsString::from(s)
    }

    /// Parses the string as an array index (a canonical `u32` below `u32::MAX`).
    pub fn as_index(&self) -> Option<u32> {
        let s = self.as_str();
        if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
            return None;
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse::<u32>().ok().filter(|&i| i != u32::MAX)
    }

    /// Compares two strings by UTF-16 code units, the order used by
    /// relational operators.
    pub fn cmp_code_units(&self, other: &JsString) -> std::cmp::Ordering {
        self.0.encode_utf16().cmp(other.0.encode_utf16())
    }
}

impl Deref for JsString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for JsString {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        JsString(Rc::from(s))
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        JsString(Rc::from(s))
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
