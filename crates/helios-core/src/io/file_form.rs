//! Filename templates for burst cubes and reconstructed images.
//!
//! A form such as `{date}_{time}_raw.batch.{batch:02}.{burst:03}` names one
//! file per burst. The `{burst}` field must appear exactly once and close the
//! template, so that everything before it identifies a batch: the batch glob,
//! the descriptor path stem and the file-name matcher are all derived from
//! that prefix.

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::error::{HeliosError, Result};

pub const DEFAULT_BURST_FORM: &str = "{date}_{time}_raw.batch.{batch:02}.{burst:03}";
pub const DEFAULT_SPECKLED_FORM: &str = "{date}_{time}_speckle.batch.{batch:02}.{burst:03}";

/// Separators trimmed from the prefix when forming the path stem.
const STEM_SEPARATORS: &[char] = &['.', '_', '-'];

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Date,
    Time,
    Batch { width: usize },
    Burst { width: usize },
}

/// Parsed filename template.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileForm {
    template: String,
    segments: Vec<Segment>,
}

/// Values substituted into a [`FileForm`].
#[derive(Clone, Copy, Debug)]
pub struct FormFields<'a> {
    pub date: &'a str,
    pub time: &'a str,
    pub batch: usize,
    pub burst: usize,
}

impl FileForm {
    /// [`DEFAULT_BURST_FORM`].
    pub fn default_burst() -> Self {
        Self::standard(DEFAULT_BURST_FORM, "_raw.batch.")
    }

    /// [`DEFAULT_SPECKLED_FORM`].
    pub fn default_speckled() -> Self {
        Self::standard(DEFAULT_SPECKLED_FORM, "_speckle.batch.")
    }

    fn standard(template: &str, infix: &str) -> Self {
        Self {
            template: template.to_string(),
            segments: vec![
                Segment::Date,
                Segment::Literal("_".into()),
                Segment::Time,
                Segment::Literal(infix.into()),
                Segment::Batch { width: 2 },
                Segment::Literal(".".into()),
                Segment::Burst { width: 3 },
            ],
        }
    }

    pub fn parse(template: &str) -> Result<Self> {
        let invalid = |reason: String| HeliosError::FileForm {
            form: template.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;
        while let Some(open) = rest.find(['{', '}']) {
            if rest[open..].starts_with('}') {
                let offset = template.len() - rest.len() + open;
                return Err(invalid(format!("unmatched '}}' at offset {offset}")));
            }
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| invalid("unterminated field".into()))?;
            let field = &after[..close];
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(parse_field(field).map_err(invalid)?);
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let bursts = segments
            .iter()
            .filter(|s| matches!(s, Segment::Burst { .. }))
            .count();
        if bursts != 1 {
            return Err(invalid(format!(
                "{{burst}} must appear exactly once, found {bursts}"
            )));
        }
        if !matches!(segments.last(), Some(Segment::Burst { .. })) {
            return Err(invalid("{burst} must be the last field".into()));
        }
        let batches = segments
            .iter()
            .filter(|s| matches!(s, Segment::Batch { .. }))
            .count();
        if batches > 1 {
            return Err(invalid("{batch} may appear at most once".into()));
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// File name of one burst.
    pub fn render(&self, fields: FormFields<'_>) -> String {
        let mut name = self.render_prefix(fields.date, fields.time, fields.batch, false);
        if let Some(Segment::Burst { width }) = self.segments.last() {
            name.push_str(&format!("{:0width$}", fields.burst, width = *width));
        }
        name
    }

    /// Glob matching every burst of one batch (`{burst}` replaced by `*`).
    /// Literal text is escaped, so the pattern matches only this form.
    pub fn batch_glob(&self, date: &str, time: &str, batch: usize) -> String {
        let mut pattern = self.render_prefix(date, time, batch, true);
        pattern.push('*');
        pattern
    }

    /// Name shared by every burst of one batch: the text before `{burst}`
    /// without its trailing separator.
    pub fn stem(&self, date: &str, time: &str, batch: usize) -> String {
        self.render_prefix(date, time, batch, false)
            .trim_end_matches(STEM_SEPARATORS)
            .to_string()
    }

    /// Build a matcher recovering `(batch, burst)` from file names of this form.
    pub fn matcher(&self) -> Result<FormMatcher> {
        let mut pattern = String::from("^");
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
                Segment::Date | Segment::Time => pattern.push_str(".+?"),
                Segment::Batch { .. } => pattern.push_str(r"(?P<batch>\d+)"),
                Segment::Burst { .. } => pattern.push_str(r"(?P<burst>\d+)"),
            }
        }
        pattern.push('$');
        Ok(FormMatcher {
            regex: Regex::new(&pattern)?,
        })
    }

    fn render_prefix(&self, date: &str, time: &str, batch: usize, escape: bool) -> String {
        let quote = |s: &str| {
            if escape {
                glob::Pattern::escape(s)
            } else {
                s.to_string()
            }
        };
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(&quote(text)),
                Segment::Date => out.push_str(&quote(date)),
                Segment::Time => out.push_str(&quote(time)),
                Segment::Batch { width } => {
                    out.push_str(&format!("{batch:0width$}", width = *width))
                }
                Segment::Burst { .. } => {}
            }
        }
        out
    }
}

fn parse_field(field: &str) -> std::result::Result<Segment, String> {
    let (name, spec) = match field.split_once(':') {
        Some((name, spec)) => (name, Some(spec)),
        None => (field, None),
    };
    let width = match spec {
        None => 0,
        Some(spec) => {
            let digits = spec.strip_suffix('d').unwrap_or(spec);
            let digits = digits.strip_prefix('0').unwrap_or(digits);
            digits
                .parse::<usize>()
                .map_err(|_| format!("unsupported format spec {spec:?} for {name}"))?
        }
    };
    match name {
        "date" | "time" if spec.is_some() => Err(format!("{name} takes no format spec")),
        "date" => Ok(Segment::Date),
        "time" => Ok(Segment::Time),
        "batch" => Ok(Segment::Batch { width }),
        "burst" => Ok(Segment::Burst { width }),
        other => Err(format!("unknown field {{{other}}}")),
    }
}

impl FromStr for FileForm {
    type Err = HeliosError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FileForm {
    type Error = HeliosError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FileForm> for String {
    fn from(form: FileForm) -> Self {
        form.template
    }
}

impl fmt::Display for FileForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Compiled matcher produced by [`FileForm::matcher`].
#[derive(Clone, Debug)]
pub struct FormMatcher {
    regex: Regex,
}

impl FormMatcher {
    /// `(batch, burst)` encoded in `name`, if it follows the form. Forms
    /// without a `{batch}` field report batch 0.
    pub fn indices(&self, name: &str) -> Option<(usize, usize)> {
        let caps = self.regex.captures(name)?;
        let batch = match caps.name("batch") {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        let burst = caps.name("burst")?.as_str().parse().ok()?;
        Some((batch, burst))
    }
}
