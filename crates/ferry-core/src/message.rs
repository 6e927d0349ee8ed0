//! Change messages with a trailing block of `Name: value` labels.
//!
//! A message is split into free text and, when the last paragraph consists
//! only of label lines, a label block:
//!
//! ```text
//! Fix the frobnicator
//!
//! Longer description.
//!
//! Bug: 1234
//! GitOrigin-RevId: 0f3c2a
//! ```

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelLine {
    pub name: String,
    pub separator: String,
    pub value: String,
}

impl LabelLine {
    pub fn new(name: impl Into<String>, separator: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            separator: separator.into(),
            value: value.into(),
        }
    }

    /// Parse `Name: value` or `Name=value`.
    pub fn parse(line: &str) -> Option<Self> {
        let end = line
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(line.len());
        if end == 0 {
            return None;
        }
        let (name, rest) = line.split_at(end);
        let separator = if rest.starts_with(": ") {
            ": "
        } else if rest.starts_with('=') {
            "="
        } else {
            return None;
        };
        Some(Self::new(name, separator, &rest[separator.len()..]))
    }
}

impl fmt::Display for LabelLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, self.separator, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeMessage {
    text: String,
    labels: Vec<LabelLine>,
}

impl ChangeMessage {
    pub fn parse(message: &str) -> Self {
        let trimmed = message.trim_end_matches('\n');
        if let Some(idx) = trimmed.rfind("\n\n") {
            let tail = &trimmed[idx + 2..];
            let parsed: Option<Vec<LabelLine>> = tail.lines().map(LabelLine::parse).collect();
            if let Some(labels) = parsed.filter(|l| !l.is_empty()) {
                return Self {
                    text: trimmed[..idx].to_string(),
                    labels,
                };
            }
        }
        Self {
            text: trimmed.to_string(),
            labels: Vec::new(),
        }
    }

    /// Treat every line that looks like a label as one, wherever it is.
    pub fn parse_all_as_labels(message: &str) -> Self {
        Self {
            text: String::new(),
            labels: message.lines().filter_map(LabelLine::parse).collect(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn first_line(&self) -> &str {
        crate::change::first_line(&self.text)
    }

    pub fn labels(&self) -> &[LabelLine] {
        &self.labels
    }

    pub fn label_values(&self, name: &str) -> Vec<String> {
        self.labels
            .iter()
            .filter(|l| l.name == name)
            .map(|l| l.value.clone())
            .collect()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into().trim_end_matches('\n').to_string();
        self
    }

    pub fn with_label(mut self, name: &str, separator: &str, value: &str) -> Self {
        self.labels.push(LabelLine::new(name, separator, value));
        self
    }

    /// Replace every label called `name` with a single one, or append it.
    pub fn with_new_or_replaced_label(self, name: &str, separator: &str, value: &str) -> Self {
        if self.labels.iter().any(|l| l.name == name) {
            self.with_replaced_label(name, separator, value)
        } else {
            self.with_label(name, separator, value)
        }
    }

    /// Replace existing labels called `name`. No-op when absent.
    pub fn with_replaced_label(mut self, name: &str, separator: &str, value: &str) -> Self {
        let mut seen = false;
        self.labels.retain_mut(|l| {
            if l.name != name {
                return true;
            }
            if seen {
                return false;
            }
            seen = true;
            *l = LabelLine::new(name, separator, value);
            true
        });
        self
    }

    pub fn with_removed_label_by_name(mut self, name: &str) -> Self {
        self.labels.retain(|l| l.name != name);
        self
    }

    pub fn with_removed_label_by_name_and_value(mut self, name: &str, value: &str) -> Self {
        self.labels.retain(|l| !(l.name == name && l.value == value));
        self
    }
}

impl fmt::Display for ChangeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)?;
        if !self.labels.is_empty() {
            if !self.text.is_empty() {
                f.write_str("\n\n")?;
            }
            for label in &self.labels {
                writeln!(f, "{label}")?;
            }
            Ok(())
        } else {
            f.write_str("\n")
        }
    }
}
