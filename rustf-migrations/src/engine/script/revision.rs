//! Revision script files: header parsing, SQL sections and file naming

use crate::engine::{Direction, Script};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

static SECTION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^--\s*(upgrade|downgrade)(?:\s+([A-Za-z0-9_]+))?\s*$").expect("valid regex")
});

static FILE_TEMPLATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%\((\w+)\)s").expect("valid regex"));

static SLUG_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid regex"));

static REVISION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex"));

/// Description written when a revision is created without a message
pub const EMPTY_MESSAGE: &str = "empty message";

/// One `-- upgrade` / `-- downgrade` block of a revision script
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Section {
    pub direction: Direction,
    pub database: Option<String>,
    pub sql: String,
}

/// A parsed revision file
#[derive(Debug, Clone)]
pub(crate) struct RevisionScript {
    pub script: Script,
    pub sections: Vec<Section>,
}

impl RevisionScript {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let mut header = Vec::new();
        let mut sections = Vec::new();
        let mut current: Option<(Direction, Option<String>, Vec<&str>)> = None;
        let mut revision_seen = false;

        for line in content.lines() {
            let trimmed = line.trim();

            // no sections before the header names the revision
            let marker = revision_seen.then(|| SECTION_MARKER.captures(trimmed)).flatten();
            if let Some(captures) = marker {
                if let Some((direction, database, lines)) = current.take() {
                    sections.push(Section::new(direction, database, &lines));
                }
                let direction = if &captures[1] == "upgrade" {
                    Direction::Upgrade
                } else {
                    Direction::Downgrade
                };
                let database = captures.get(2).map(|m| m.as_str().to_string());
                current = Some((direction, database, Vec::new()));
                continue;
            }

            if let Some((_, _, lines)) = current.as_mut() {
                lines.push(line);
                continue;
            }

            if let Some(comment) = trimmed.strip_prefix("--") {
                header.push(comment.trim());
                revision_seen = Header::read(&header).revision.is_some();
            }
        }

        if let Some((direction, database, lines)) = current.take() {
            sections.push(Section::new(direction, database, &lines));
        }

        let Header {
            message,
            revision,
            down_revisions,
            branch_labels,
            depends_on,
            create_date,
        } = Header::read(&header);

        let revision = revision.ok_or_else(|| {
            Error::command(format!(
                "Could not determine revision id from file {}",
                path.display()
            ))
        })?;
        validate_revision_id(&revision)?;

        Ok(Self {
            script: Script {
                revision,
                down_revisions,
                branch_labels,
                depends_on,
                message,
                create_date,
                path: path.to_path_buf(),
            },
            sections,
        })
    }

    pub fn revision(&self) -> &str {
        &self.script.revision
    }

    /// SQL to run in `direction` against `database`
    ///
    /// Unnamed sections apply to every database; named ones only to the
    /// database they name.
    pub fn sql(&self, direction: Direction, database: Option<&str>) -> String {
        self.sections
            .iter()
            .filter(|s| s.direction == direction)
            .filter(|s| s.database.is_none() || s.database.as_deref() == database)
            .map(|s| s.sql.as_str())
            .filter(|sql| !sql.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Section {
    fn new(direction: Direction, database: Option<String>, lines: &[&str]) -> Self {
        Self {
            direction,
            database,
            sql: strip_comments(lines.iter().copied()),
        }
    }
}

/// Drop blank and comment-only lines
pub(crate) fn strip_comments<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    lines
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.starts_with("--") && !trimmed.is_empty()
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Fields of the comment header
#[derive(Debug, Default)]
struct Header {
    message: Option<String>,
    revision: Option<String>,
    down_revisions: Vec<String>,
    branch_labels: Vec<String>,
    depends_on: Vec<String>,
    create_date: Option<String>,
}

impl Header {
    /// Read header comments, `--` already stripped
    ///
    /// A first line followed by a bare `--` is the message whatever it
    /// says. Without that separator the first line that is not a known
    /// field is taken as the message.
    fn read(comments: &[&str]) -> Self {
        let mut header = Self::default();
        let fields = match comments {
            [message, "", rest @ ..] if !message.is_empty() => {
                header.message = Some(message.to_string());
                rest
            }
            _ => comments,
        };

        for comment in fields.iter().filter(|c| !c.is_empty()) {
            match comment.split_once(':') {
                Some(("Revision ID", value)) => header.revision = Some(value.trim().to_string()),
                Some(("Revises", value)) => header.down_revisions = split_list(value),
                Some(("Create Date", value)) => {
                    let value = value.trim();
                    if !value.is_empty() {
                        header.create_date = Some(value.to_string());
                    }
                }
                Some(("Branch Labels", value)) => header.branch_labels = split_list(value),
                Some(("Depends On", value)) => header.depends_on = split_list(value),
                _ if header.message.is_none() => header.message = Some(comment.to_string()),
                _ => {}
            }
        }

        header
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn validate_revision_id(revision: &str) -> Result<()> {
    if REVISION_ID.is_match(revision) {
        Ok(())
    } else {
        Err(Error::command(format!(
            "Invalid revision id '{}': only letters, digits and underscores are allowed",
            revision
        )))
    }
}

/// Generate a new 12 character revision id
pub(crate) fn generate_revision_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    hex[hex.len() - 12..].to_string()
}

/// Build the slug of a message, truncated at a word boundary
pub(crate) fn slugify(message: Option<&str>, truncate_length: usize) -> String {
    let words: Vec<&str> = SLUG_WORD
        .find_iter(message.unwrap_or(""))
        .map(|m| m.as_str())
        .collect();
    let slug = words.join("_").to_lowercase();

    if slug.chars().count() <= truncate_length {
        return slug;
    }

    let truncated: String = slug.chars().take(truncate_length).collect();
    match truncated.rsplit_once('_') {
        Some((head, _)) => format!("{}_", head),
        None => truncated,
    }
}

/// Expand a `file_template` such as `%(rev)s_%(slug)s` into a file name
pub(crate) fn format_file_name(
    template: &str,
    revision: &str,
    message: Option<&str>,
    truncate_length: usize,
    now: DateTime<Utc>,
) -> Result<String> {
    let mut unknown = None;
    let expanded = FILE_TEMPLATE_TOKEN.replace_all(template, |caps: &regex::Captures| {
        match &caps[1] {
            "rev" => revision.to_string(),
            "slug" => slugify(message, truncate_length),
            "epoch" => now.timestamp().to_string(),
            "year" => now.format("%Y").to_string(),
            "month" => now.format("%m").to_string(),
            "day" => now.format("%d").to_string(),
            "hour" => now.format("%H").to_string(),
            "minute" => now.format("%M").to_string(),
            "second" => now.format("%S").to_string(),
            other => {
                unknown.get_or_insert_with(|| other.to_string());
                String::new()
            }
        }
    });

    if let Some(token) = unknown {
        return Err(Error::command(format!(
            "Unknown token '%({})s' in file_template '{}'",
            token, template
        )));
    }

    let name = expanded.replace("%%", "%");
    let name = name.trim_end_matches('_');
    if name.is_empty() {
        return Err(Error::command(format!(
            "file_template '{}' produced an empty file name",
            template
        )));
    }

    Ok(format!("{}.sql", name))
}
