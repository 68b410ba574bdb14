//! Structured diagnostics collected while walking images and archives.
//!
//! Walkers never abort a whole parse because one directory entry or thread is
//! damaged; they record what they skipped here and return a partial result. Every
//! diagnostic is also forwarded to the `log` facade so an installed logger sees it.

use std::fmt::Display;

use super::error::{A2FileError, FormatKind};

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum Severity {
	/// Informational note (e.g. an alternate layout was used)
	Info,
	/// Recoverable corruption; data may be incomplete
	Warning,
}

/// One recorded diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Diagnostic {
	/// Severity of the diagnostic
	pub severity: Severity,
	/// Format that produced it
	pub kind: FormatKind,
	/// Human readable message
	pub message: String,
}

impl Display for Diagnostic {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let level = match self.severity {
			Severity::Info => "info",
			Severity::Warning => "warning",
		};
		write!(f, "[{}] {}: {}", level, self.kind, self.message)
	}
}

/// Ordered collection of diagnostics returned alongside a parse result
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostics {
	entries: Vec<Diagnostic>,
}

impl Diagnostics {
	/// Creates an empty collection
	pub fn new() -> Self {
		Self::default()
	}

	/// Records an informational diagnostic
	pub fn info(&mut self, kind: FormatKind, message: impl Into<String>) {
		let message = message.into();
		log::debug!("{}: {}", kind, message);
		self.entries.push(Diagnostic {
			severity: Severity::Info,
			kind,
			message,
		});
	}

	/// Records a warning
	pub fn warn(&mut self, kind: FormatKind, message: impl Into<String>) {
		let message = message.into();
		log::warn!("{}: {}", kind, message);
		self.entries.push(Diagnostic {
			severity: Severity::Warning,
			kind,
			message,
		});
	}

	/// Records a recoverable error as a warning
	pub fn warn_error(&mut self, kind: FormatKind, error: &A2FileError) {
		self.warn(kind, error.to_string());
	}

	/// Returns all diagnostics in the order they were recorded
	pub fn entries(&self) -> &[Diagnostic] {
		&self.entries
	}

	/// Returns `true` if nothing was recorded
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Returns the number of warnings
	pub fn warning_count(&self) -> usize {
		self.entries.iter().filter(|d| d.severity == Severity::Warning).count()
	}

	/// Appends every diagnostic from `other`
	pub fn extend(&mut self, other: Diagnostics) {
		self.entries.extend(other.entries);
	}
}

impl<'a> IntoIterator for &'a Diagnostics {
	type Item = &'a Diagnostic;
	type IntoIter = std::slice::Iter<'a, Diagnostic>;

	fn into_iter(self) -> Self::IntoIter {
		self.entries.iter()
	}
}
