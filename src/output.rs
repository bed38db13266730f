// Output formatting for fetched records.
//
// Every command produces a `Payload`. It is rendered into one of the
// `OutputFormat`s and delivered to stdout or an export file.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crossterm::style::Stylize;
use serde_json::Value;

use crate::error::Result;
use crate::fetch::{MessageRecord, ProfileRecord, ProjectRecord};

/// Default column width for wrapped text.
pub const WRAP_WIDTH: usize = 80;
/// Column width for the free-text profile fields.
pub const LONG_TEXT_WRAP_WIDTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
    Csv,
    /// Styled human-readable output
    Rich,
    /// Plain human-readable output
    Pretty,
}

impl OutputFormat {
    /// Format implied by an export file's extension.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(OutputFormat::Json),
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            "csv" => Some(OutputFormat::Csv),
            "txt" => Some(OutputFormat::Pretty),
            _ => None,
        }
    }
}

/// Pick the output format.
///
/// An explicit `--format` wins, then `--json`, then the export extension.
/// Otherwise output is human-readable, styled only when printing to a
/// terminal.
pub fn choose_format(
    explicit: Option<OutputFormat>,
    json: bool,
    export: Option<&Path>,
    stdout_is_terminal: bool,
) -> OutputFormat {
    let format = explicit
        .or(json.then_some(OutputFormat::Json))
        .or_else(|| export.and_then(OutputFormat::from_extension))
        .unwrap_or(if stdout_is_terminal {
            OutputFormat::Rich
        } else {
            OutputFormat::Pretty
        });

    // Styling escapes have no business in a file.
    if export.is_some() && format == OutputFormat::Rich {
        OutputFormat::Pretty
    } else {
        format
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl OutputTarget {
    pub fn from_export(export: Option<PathBuf>) -> Self {
        export.map_or(OutputTarget::Stdout, OutputTarget::File)
    }
}

/// Structured result of a command.
#[derive(Debug, Clone)]
pub enum Payload {
    Profile(ProfileRecord),
    Projects {
        username: String,
        projects: Vec<ProjectRecord>,
    },
    Messages {
        username: String,
        messages: Vec<MessageRecord>,
    },
}

impl Payload {
    fn to_value(&self) -> Result<Value> {
        let value = match self {
            Payload::Profile(profile) => serde_json::to_value(profile)?,
            Payload::Projects { projects, .. } => serde_json::to_value(projects)?,
            Payload::Messages { messages, .. } => serde_json::to_value(messages)?,
        };
        Ok(value)
    }
}

/// Outcome of rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Text(String),
    /// The payload's shape does not fit the format.
    NotApplicable(String),
    /// The format needs a feature this build lacks.
    CapabilityMissing(String),
}

pub fn render(payload: &Payload, format: OutputFormat) -> Result<Rendered> {
    let rendered = match format {
        OutputFormat::Json => Rendered::Text(serde_json::to_string_pretty(&payload.to_value()?)?),
        OutputFormat::Yaml => to_yaml(&payload.to_value()?),
        OutputFormat::Csv => to_csv(&payload.to_value()?),
        OutputFormat::Pretty => Rendered::Text(Human { styled: false }.render(payload)),
        OutputFormat::Rich => Rendered::Text(Human { styled: true }.render(payload)),
    };
    Ok(rendered)
}

/// Write `rendered` to `target`. Status messages (export confirmations,
/// inapplicable formats) go to `out`.
pub fn deliver(rendered: Rendered, target: &OutputTarget, out: &mut dyn Write) -> Result<()> {
    match rendered {
        Rendered::Text(mut text) => {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            match target {
                OutputTarget::Stdout => out.write_all(text.as_bytes())?,
                OutputTarget::File(path) => {
                    fs::write(path, text)?;
                    writeln!(out, "Exported to {}", path.display())?;
                }
            }
        }
        Rendered::NotApplicable(message) | Rendered::CapabilityMissing(message) => {
            writeln!(out, "{}", message)?;
        }
    }
    Ok(())
}

#[cfg(feature = "yaml")]
fn to_yaml(value: &Value) -> Rendered {
    match serde_yaml::to_string(value) {
        Ok(text) => Rendered::Text(text),
        Err(e) => Rendered::NotApplicable(format!("YAML output failed: {}", e)),
    }
}

#[cfg(not(feature = "yaml"))]
fn to_yaml(_value: &Value) -> Rendered {
    Rendered::CapabilityMissing(
        "YAML output is not available in this build (enable the `yaml` feature)".into(),
    )
}

/// CSV for a list of mappings (header = sorted union of keys) or a single
/// mapping (`key,value` rows). Other shapes are not applicable.
pub fn to_csv(value: &Value) -> Rendered {
    match value {
        Value::Array(items) if items.iter().all(Value::is_object) => {
            let header: BTreeSet<&str> = items
                .iter()
                .filter_map(Value::as_object)
                .flat_map(|map| map.keys().map(String::as_str))
                .collect();
            if header.is_empty() {
                return Rendered::Text(String::new());
            }

            let mut output = String::new();
            let names: Vec<Cow<'_, str>> = header.iter().map(|k| escape_csv(k)).collect();
            output.push_str(&names.join(","));
            output.push('\n');
            for map in items.iter().filter_map(Value::as_object) {
                let row: Vec<Cow<'_, str>> = header
                    .iter()
                    .map(|key| map.get(*key).map_or(Cow::Borrowed(""), csv_cell))
                    .collect();
                output.push_str(&row.join(","));
                output.push('\n');
            }
            Rendered::Text(output)
        }
        Value::Object(map) => {
            let mut output = String::from("key,value\n");
            for (key, value) in map {
                let _ = writeln!(output, "{},{}", escape_csv(key), csv_cell(value));
            }
            Rendered::Text(output)
        }
        _ => Rendered::NotApplicable(
            "CSV output is not applicable to this result; use json or yaml".into(),
        ),
    }
}

fn csv_cell(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => escape_csv(s),
        other => Cow::Owned(escape_csv(&other.to_string()).into_owned()),
    }
}

fn escape_csv(field: &str) -> Cow<'_, str> {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Greedy word wrap. Existing line breaks are kept; words longer than
/// `width` are not split.
pub fn wrap(text: &str, width: usize) -> String {
    text.lines()
        .map(|line| {
            let mut wrapped = String::new();
            let mut column = 0;
            for word in line.split_whitespace() {
                let len = word.chars().count();
                if column > 0 && column + 1 + len > width {
                    wrapped.push('\n');
                    column = 0;
                } else if column > 0 {
                    wrapped.push(' ');
                    column += 1;
                }
                wrapped.push_str(word);
                column += len;
            }
            wrapped
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Human-readable renderer, plain or styled.
struct Human {
    styled: bool,
}

impl Human {
    fn render(&self, payload: &Payload) -> String {
        match payload {
            Payload::Profile(profile) => self.profile(profile),
            Payload::Projects { username, projects } => {
                let records: Vec<Value> = projects
                    .iter()
                    .filter_map(|p| serde_json::to_value(p).ok())
                    .collect();
                self.records(&format!("Projects by {}", username), "title", &records)
            }
            Payload::Messages { username, messages } => {
                let records: Vec<Value> =
                    messages.iter().cloned().map(Value::Object).collect();
                self.records(&format!("Messages for {}", username), "type", &records)
            }
        }
    }

    fn profile(&self, profile: &ProfileRecord) -> String {
        if self.styled {
            return self.rich_profile(profile);
        }

        let mut out = String::from("== Scratch user info ==\n");
        let mut field = |label: &str, value: Option<String>, width: usize| {
            let Some(value) = value else { return };
            let _ = writeln!(out, "{}:", label);
            if value.contains('\n') || value.chars().count() > width {
                let _ = writeln!(out, "{}", wrap(&value, width));
            } else {
                let _ = writeln!(out, "{}", value);
            }
            out.push('\n');
        };

        field("Username", profile.username.clone(), WRAP_WIDTH);
        field("ID", profile.id.map(|v| v.to_string()), WRAP_WIDTH);
        field("About", profile.about_me.clone(), LONG_TEXT_WRAP_WIDTH);
        field("Working on (wiwo)", profile.wiwo.clone(), LONG_TEXT_WRAP_WIDTH);
        field("Country", profile.country.clone(), WRAP_WIDTH);
        field("Icon URL", profile.icon_url.clone(), WRAP_WIDTH);
        field("Join date", profile.join_date.clone(), WRAP_WIDTH);
        field("Scratch Team", profile.scratchteam.map(|v| v.to_string()), WRAP_WIDTH);
        if let Some(auth) = &profile.authenticated {
            field("Message count", auth.message_count.map(|v| v.to_string()), WRAP_WIDTH);
        }
        out
    }

    fn rich_profile(&self, profile: &ProfileRecord) -> String {
        let show = |v: Option<String>| v.unwrap_or_else(|| "-".into());
        let mut out = String::new();
        out.push_str(&rule(Some("Scratch user info")));

        let id = show(profile.id.map(|v| v.to_string()));
        let name = show(profile.username.clone());
        out.push_str(&panel(
            "User",
            &format!("{}  (id: {})", name, id),
            Some(name.len()),
        ));
        if let Some(about) = profile.about_me.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(&panel("About", &wrap(about, LONG_TEXT_WRAP_WIDTH), None));
        }
        if let Some(wiwo) = profile.wiwo.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(&panel(
                "Working on (wiwo)",
                &wrap(wiwo, LONG_TEXT_WRAP_WIDTH),
                None,
            ));
        }

        let _ = writeln!(out, "{}: {}", "Country".green(), show(profile.country.clone()));
        let _ = writeln!(out, "{}: {}", "Join date".green(), show(profile.join_date.clone()));
        let _ = writeln!(
            out,
            "{}: {}",
            "Scratch Team".green(),
            show(profile.scratchteam.map(|v| v.to_string()))
        );
        let _ = writeln!(out, "{}: {}", "Icon URL".blue(), show(profile.icon_url.clone()));
        if let Some(auth) = &profile.authenticated {
            let _ = writeln!(
                out,
                "{}: {}",
                "Message count".magenta(),
                show(auth.message_count.map(|v| v.to_string()))
            );
        }
        out.push_str(&rule(None));
        out
    }

    /// Generic listing: one block per record, null fields skipped.
    fn records(&self, title: &str, headline_key: &str, records: &[Value]) -> String {
        let mut out = String::new();
        if self.styled {
            out.push_str(&rule(Some(title)));
        } else {
            let _ = writeln!(out, "== {} ({}) ==", title, records.len());
        }
        if records.is_empty() {
            out.push_str("Nothing to show.\n");
        }

        for (index, record) in records.iter().enumerate() {
            let Some(map) = record.as_object() else {
                continue;
            };
            let headline = map
                .get(headline_key)
                .and_then(scalar_text)
                .unwrap_or_else(|| format!("#{}", index + 1));
            if self.styled {
                let _ = writeln!(out, "{}", headline.as_str().cyan().bold());
            } else {
                let _ = writeln!(out, "[{}] {}", index + 1, headline);
            }
            for (key, value) in map {
                if key == headline_key {
                    continue;
                }
                let Some(text) = scalar_text(value) else {
                    continue;
                };
                let text = wrap(&text, WRAP_WIDTH).replace('\n', "\n    ");
                if self.styled {
                    let _ = writeln!(out, "  {}: {}", key.as_str().green(), text);
                } else {
                    let _ = writeln!(out, "  {}: {}", key, text);
                }
            }
            out.push('\n');
        }

        if self.styled {
            out.push_str(&rule(None));
        }
        out
    }
}

fn rule(title: Option<&str>) -> String {
    match title {
        Some(title) => {
            let side = WRAP_WIDTH.saturating_sub(title.chars().count() + 2) / 2;
            format!(
                "{} {} {}\n",
                "─".repeat(side),
                title.bold(),
                "─".repeat(side)
            )
        }
        None => format!("{}\n", "─".repeat(WRAP_WIDTH)),
    }
}

/// A box around `body` with `title` set into the top border. When
/// `highlight` is given, that many leading characters of the body are
/// printed bold cyan.
fn panel(title: &str, body: &str, highlight: Option<usize>) -> String {
    let title_len = title.chars().count();
    let width = body
        .lines()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .max(title_len + 1);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "╭─ {} {}╮",
        title.bold(),
        "─".repeat(width + 2 - title_len - 3)
    );
    for (i, line) in body.lines().enumerate() {
        let pad = " ".repeat(width - line.chars().count());
        match highlight {
            Some(n) if i == 0 && n <= line.len() && line.is_char_boundary(n) => {
                let (head, tail) = line.split_at(n);
                let _ = writeln!(out, "│ {}{}{} │", head.cyan().bold(), tail, pad);
            }
            _ => {
                let _ = writeln!(out, "│ {}{} │", line, pad);
            }
        }
    }
    let _ = writeln!(out, "╰{}╯", "─".repeat(width + 2));
    out
}
