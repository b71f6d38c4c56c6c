//! Argument snapshots and their bounded, redacted rendering

use crate::sanitization::Sanitizer;
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::fmt;

/// Placeholder for a value whose string conversion failed
pub const UNSERIALIZABLE: &str = "<unserializable>";

/// Marker appended to truncated renderings
pub const ELLIPSIS: &str = "...";

/// Capability of table-like containers: they log as a row count, never their contents
pub trait Tabular {
    fn row_count(&self) -> usize;
}

impl<T> Tabular for [T] {
    fn row_count(&self) -> usize {
        self.len()
    }
}

impl<T> Tabular for Vec<T> {
    fn row_count(&self) -> usize {
        self.len()
    }
}

/// One captured argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Generic string conversion of the value
    Text(String),
    /// A tabular container with this many rows
    Rows(usize),
    /// String conversion failed
    Unrenderable,
}

impl Arg {
    /// Capture a value through its `Display` impl
    pub fn display<T: fmt::Display + ?Sized>(value: &T) -> Self {
        Self::capture(format_args!("{}", value))
    }

    /// Capture a value through its `Debug` impl
    pub fn debug<T: fmt::Debug + ?Sized>(value: &T) -> Self {
        Self::capture(format_args!("{:?}", value))
    }

    /// Capture a tabular container as a row count
    pub fn table<T: Tabular + ?Sized>(value: &T) -> Self {
        Self::Rows(value.row_count())
    }

    // `format!` would panic on an impl returning `fmt::Error`
    fn capture(args: fmt::Arguments<'_>) -> Self {
        let mut out = String::new();
        match fmt::write(&mut out, args) {
            Ok(()) => Self::Text(out),
            Err(_) => Self::Unrenderable,
        }
    }

    /// Unbounded, unredacted rendering
    pub fn raw(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Rows(rows) => Cow::Owned(format!("<DataFrame with {} rows>", rows)),
            Self::Unrenderable => Cow::Borrowed(UNSERIALIZABLE),
        }
    }

    /// Render with the sanitizer applied first, then truncation
    pub fn render(&self, sanitizer: &Sanitizer, max_length: Option<usize>) -> String {
        let sanitized = sanitizer.apply(&self.raw());
        truncate(sanitized, max_length)
    }
}

/// Cut `text` to `max_length` characters followed by [`ELLIPSIS`]
pub fn truncate(text: String, max_length: Option<usize>) -> String {
    match max_length {
        Some(max) if text.chars().count() > max => {
            let mut cut: String = text.chars().take(max).collect();
            cut.push_str(ELLIPSIS);
            cut
        }
        _ => text,
    }
}

/// Conversion of a single value into an [`Arg`]
pub trait ToArg {
    fn to_arg(&self) -> Arg;
}

impl<T: fmt::Display + ?Sized> ToArg for T {
    fn to_arg(&self) -> Arg {
        Arg::display(self)
    }
}

/// Route a value through the tabular path: `args![Table(&frame)]`
#[derive(Debug, Clone, Copy)]
pub struct Table<'a, T: ?Sized>(pub &'a T);

impl<T: Tabular + ?Sized> ToArg for Table<'_, T> {
    fn to_arg(&self) -> Arg {
        Arg::table(self.0)
    }
}

/// Route a value through its `Debug` impl: `args![Dbg(&vec)]`
#[derive(Debug, Clone, Copy)]
pub struct Dbg<'a, T: ?Sized>(pub &'a T);

impl<T: fmt::Debug + ?Sized> ToArg for Dbg<'_, T> {
    fn to_arg(&self) -> Arg {
        Arg::debug(self.0)
    }
}

/// Snapshot of the positional and keyword arguments of one call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    positional: Vec<Arg>,
    keyword: Vec<(String, Arg)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl ToArg) -> Self {
        self.push_arg(value.to_arg());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl ToArg) -> Self {
        self.push_kwarg(name, value.to_arg());
        self
    }

    pub fn push_arg(&mut self, arg: Arg) {
        self.positional.push(arg);
    }

    pub fn push_kwarg(&mut self, name: impl Into<String>, arg: Arg) {
        self.keyword.push((name.into(), arg));
    }

    pub fn positional(&self) -> &[Arg] {
        &self.positional
    }

    pub fn keyword(&self) -> &[(String, Arg)] {
        &self.keyword
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    /// Render every argument through the sanitizer and length bound
    pub fn render(&self, sanitizer: &Sanitizer, max_length: Option<usize>) -> RenderedArgs {
        RenderedArgs {
            positional: self
                .positional
                .iter()
                .map(|arg| arg.render(sanitizer, max_length))
                .collect(),
            keyword: self
                .keyword
                .iter()
                .map(|(name, arg)| (name.clone(), arg.render(sanitizer, max_length)))
                .collect(),
        }
    }
}

/// Arguments after sanitizing and truncation, ready for a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArgs {
    pub positional: Vec<String>,
    pub keyword: Vec<(String, String)>,
}

impl RenderedArgs {
    /// Compact form used in the metrics table: `[2, 3]` or `[2] {scale=4}`
    pub fn summary(&self) -> String {
        let mut out = format!("[{}]", self.positional.join(", "));
        if !self.keyword.is_empty() {
            let pairs: Vec<String> = self
                .keyword
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect();
            out.push_str(&format!(" {{{}}}", pairs.join(", ")));
        }
        out
    }

    /// `{"args": [...], "kwargs": {...}}`
    pub fn to_json(&self) -> Value {
        let kwargs: Map<String, Value> = self
            .keyword
            .iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect();

        json!({
            "args": self.positional,
            "kwargs": kwargs,
        })
    }
}

/// Argument bundles a wrapped function can be called with
pub trait Loggable {
    fn call_args(&self) -> CallArgs;
}

impl Loggable for CallArgs {
    fn call_args(&self) -> CallArgs {
        self.clone()
    }
}

impl Loggable for () {
    fn call_args(&self) -> CallArgs {
        CallArgs::new()
    }
}

macro_rules! impl_loggable_tuple {
    ($($name:ident),+) => {
        impl<$($name: ToArg),+> Loggable for ($($name,)+) {
            #[allow(non_snake_case)]
            fn call_args(&self) -> CallArgs {
                let ($($name,)+) = self;
                let mut call_args = CallArgs::new();
                $(call_args.push_arg($name.to_arg());)+
                call_args
            }
        }
    };
}

impl_loggable_tuple!(A);
impl_loggable_tuple!(A, B);
impl_loggable_tuple!(A, B, C);
impl_loggable_tuple!(A, B, C, D);
impl_loggable_tuple!(A, B, C, D, E);
impl_loggable_tuple!(A, B, C, D, E, F);

/// Build a [`CallArgs`] snapshot: `args![2, 3]`, `args![x; scale = 4]`
#[macro_export]
macro_rules! args {
    () => {
        $crate::CallArgs::new()
    };
    ($($pos:expr),* $(,)? $(; $($key:ident = $val:expr),* $(,)?)?) => {{
        #[allow(unused_mut)]
        let mut call_args = $crate::CallArgs::new();
        $(call_args.push_arg($crate::ToArg::to_arg(&$pos));)*
        $($(call_args.push_kwarg(stringify!($key), $crate::ToArg::to_arg(&$val));)*)?
        call_args
    }};
}
