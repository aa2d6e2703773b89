//! Core value types and error records for the execution core.
//!
//! This crate provides the foundational types shared by every other
//! component: the tagged runtime value, interned-by-content strings,
//! generation-checked object handles, the numeric coercion and equality
//! rules, and the host-facing error record.
//!
//! # Overview
//!
//! - [`Value`] - Tagged runtime datum
//! - [`JsString`] - Cheaply clonable immutable string
//! - [`ObjectId`] - Handle of an object record owned by the heap
//! - [`JsError`] - Error record with stack trace, reported to hosts
//! - [`ErrorKind`] - Error taxonomy
//! - [`SourcePosition`] / [`StackFrame`] - Source location tracking
//!
//! # Examples
//!
//! ```
//! use core_types::{Value, JsError, ErrorKind};
//!
//! let num = Value::number(42.0);
//! assert!(matches!(num, Value::Smi(42)));
//! assert!(num.is_truthy());
//! assert_eq!(num.type_of(), "number");
//!
//! assert!(Value::from("10").loose_equals_primitive(&Value::Smi(10)));
//! assert!(!Value::from("10").strict_equals(&Value::Smi(10)));
//!
//! let error = JsError::new(ErrorKind::TypeError, "undefined is not a function");
//! assert_eq!(error.to_string(), "TypeError: undefined is not a function");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod handle;
pub mod number;
mod source;
mod string;
mod value;

pub use error::{ErrorKind, JsError};
pub use handle::ObjectId;
pub use source::{SourcePosition, StackFrame};
pub use string::JsString;
pub use value::Value;
