//! Report rendering - aligned status table with a categorized summary
//!
//! Rendering is a pure function of the collected records. Colors go through a
//! [`Palette`], so the same code produces terminal output and plain text.

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use serde::Serialize;

use crate::status::RepositoryStatus;

const RULE_WIDTH: usize = 80;
const GAP: &str = "  ";
const NO_UPSTREAM_CELL: &str = "—";

/// Text styles used by the report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Green,
    Yellow,
    Red,
    Cyan,
    Gray,
    Bold,
}

/// Applies a [`Style`] to a piece of text
pub trait Palette {
    fn paint(&self, text: &str, style: Style) -> String;
}

/// Leaves text untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainPalette;

impl Palette for PlainPalette {
    fn paint(&self, text: &str, _style: Style) -> String {
        text.to_string()
    }
}

/// Terminal colors via crossterm
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsiPalette;

impl Palette for AnsiPalette {
    fn paint(&self, text: &str, style: Style) -> String {
        match style {
            Style::Green => text.green().to_string(),
            Style::Yellow => text.yellow().to_string(),
            Style::Red => text.red().to_string(),
            Style::Cyan => text.cyan().to_string(),
            Style::Gray => text.dark_grey().to_string(),
            Style::Bold => text.bold().to_string(),
        }
    }
}

/// Summary bucket of a repository; every repository falls in exactly one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Synced,
    Ahead,
    Behind,
    Diverged,
    NoRemote,
}

impl Category {
    /// Summary order
    pub const ALL: [Category; 5] = [
        Category::Synced,
        Category::Ahead,
        Category::Behind,
        Category::Diverged,
        Category::NoRemote,
    ];

    /// First matching rule wins
    pub fn of(status: &RepositoryStatus) -> Self {
        if status.error.is_some() || status.remote_branch.is_none() {
            Category::NoRemote
        } else if status.ahead > 0 && status.behind > 0 {
            Category::Diverged
        } else if status.ahead > 0 {
            Category::Ahead
        } else if status.behind > 0 {
            Category::Behind
        } else {
            Category::Synced
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Category::Synced => "✓",
            Category::Ahead => "↑",
            Category::Behind => "↓",
            Category::Diverged => "↕",
            Category::NoRemote => "⚠",
        }
    }

    pub fn style(self) -> Style {
        match self {
            Category::Synced => Style::Green,
            Category::Ahead => Style::Cyan,
            Category::Behind => Style::Yellow,
            Category::Diverged => Style::Red,
            Category::NoRemote => Style::Gray,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Synced => "synced",
            Category::Ahead => "ahead",
            Category::Behind => "behind",
            Category::Diverged => "diverged",
            Category::NoRemote => "no remote",
        }
    }

    fn legend(self) -> &'static str {
        match self {
            Category::Synced => "Synced",
            Category::Ahead => "Ahead",
            Category::Behind => "Behind",
            Category::Diverged => "Diverged",
            Category::NoRemote => "No remote tracking",
        }
    }
}

/// Per-category repository counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub synced: usize,
    pub ahead: usize,
    pub behind: usize,
    pub diverged: usize,
    pub no_remote: usize,
}

impl Summary {
    pub fn from_statuses(statuses: &[RepositoryStatus]) -> Self {
        let mut summary = Summary::default();
        for status in statuses {
            *summary.slot(Category::of(status)) += 1;
        }
        summary
    }

    fn slot(&mut self, category: Category) -> &mut usize {
        match category {
            Category::Synced => &mut self.synced,
            Category::Ahead => &mut self.ahead,
            Category::Behind => &mut self.behind,
            Category::Diverged => &mut self.diverged,
            Category::NoRemote => &mut self.no_remote,
        }
    }

    pub fn count(&self, category: Category) -> usize {
        match category {
            Category::Synced => self.synced,
            Category::Ahead => self.ahead,
            Category::Behind => self.behind,
            Category::Diverged => self.diverged,
            Category::NoRemote => self.no_remote,
        }
    }

    pub fn total(&self) -> usize {
        Category::ALL.iter().map(|category| self.count(*category)).sum()
    }

    /// `Summary: 2 synced, 1 behind`, listing only non-empty categories
    pub fn line(&self) -> String {
        let parts: Vec<String> = Category::ALL
            .iter()
            .filter(|category| self.count(**category) > 0)
            .map(|category| format!("{} {}", self.count(*category), category.label()))
            .collect();
        format!("Summary: {}", parts.join(", "))
    }
}

/// Where the report was gathered from
#[derive(Debug, Clone, Serialize)]
pub struct ReportContext {
    /// "Local" or "Remote: host"
    pub location: String,
    pub directory: String,
}

/// Render the status table
pub fn render_table(statuses: &[RepositoryStatus], context: &ReportContext, palette: &dyn Palette) -> String {
    if statuses.is_empty() {
        return "No repositories found.".to_string();
    }

    let rows: Vec<Row> = statuses.iter().map(Row::new).collect();
    let widths = Widths::measure(statuses, &rows);
    let double_rule = "=".repeat(RULE_WIDTH);
    let single_rule = "-".repeat(RULE_WIDTH);

    let mut lines = vec![
        double_rule.clone(),
        palette.paint("Git Repository Status", Style::Bold),
        format!(
            "{} | Directory: {} | Found: {} repos",
            context.location,
            context.directory,
            statuses.len()
        ),
        double_rule.clone(),
        String::new(),
        [
            pad(HEADERS[0], widths.name),
            pad(HEADERS[1], widths.branch),
            pad(HEADERS[2], widths.symbol),
            pad(HEADERS[3], widths.ahead),
            pad(HEADERS[4], widths.behind),
            HEADERS[5].to_string(),
        ]
        .join(GAP),
        single_rule.clone(),
    ];

    for (row, status) in rows.iter().zip(statuses) {
        lines.push(row.render(status, &widths, palette));
    }

    lines.push(single_rule);
    lines.push(String::new());
    lines.push("Legend:".to_string());
    lines.push(legend(palette));
    lines.push(String::new());
    lines.push(Summary::from_statuses(statuses).line());
    lines.push(double_rule);

    lines.join("\n")
}

/// Render the report as JSON
pub fn render_json(statuses: &[RepositoryStatus], context: &ReportContext) -> Result<String> {
    #[derive(Serialize)]
    struct Entry<'a> {
        #[serde(flatten)]
        status: &'a RepositoryStatus,
        category: Category,
    }

    #[derive(Serialize)]
    struct Report<'a> {
        #[serde(flatten)]
        context: &'a ReportContext,
        summary: Summary,
        repositories: Vec<Entry<'a>>,
    }

    let report = Report {
        context,
        summary: Summary::from_statuses(statuses),
        repositories: statuses
            .iter()
            .map(|status| Entry {
                status,
                category: Category::of(status),
            })
            .collect(),
    };

    serde_json::to_string_pretty(&report).context("Failed to serialize report")
}

const HEADERS: [&str; 6] = ["Repository", "Branch", "Status", "Ahead", "Behind", "Changes"];

/// Unstyled cell contents of one repository
struct Row {
    category: Category,
    ahead: String,
    behind: String,
    changes: String,
}

impl Row {
    fn new(status: &RepositoryStatus) -> Self {
        let (ahead, behind) = if status.has_upstream() {
            (status.ahead.to_string(), status.behind.to_string())
        } else {
            (NO_UPSTREAM_CELL.to_string(), NO_UPSTREAM_CELL.to_string())
        };

        Self {
            category: Category::of(status),
            ahead,
            behind,
            changes: status.changes.to_string(),
        }
    }

    fn render(&self, status: &RepositoryStatus, widths: &Widths, palette: &dyn Palette) -> String {
        let mut markers = Vec::new();
        if status.synced {
            markers.push(palette.paint("[auto-synced]", Style::Cyan));
        }
        if status.sync_error.is_some() {
            markers.push(palette.paint("[sync failed]", Style::Red));
        }
        if let Some(error) = &status.error {
            markers.push(palette.paint(&format!("({})", error), Style::Gray));
        }

        // The last column is only padded when something follows it
        let changes = if markers.is_empty() {
            self.changes.clone()
        } else {
            pad(&self.changes, widths.changes)
        };
        let changes = if status.changes > 0 {
            palette.paint(&changes, Style::Yellow)
        } else {
            changes
        };

        let mut cells = vec![
            pad(&status.name, widths.name),
            pad(&status.branch, widths.branch),
            palette.paint(&pad(self.category.symbol(), widths.symbol), self.category.style()),
            pad(&self.ahead, widths.ahead),
            pad(&self.behind, widths.behind),
            changes,
        ];
        cells.extend(markers);
        cells.join(GAP)
    }
}

/// Column widths: the wider of content and header label
struct Widths {
    name: usize,
    branch: usize,
    symbol: usize,
    ahead: usize,
    behind: usize,
    changes: usize,
}

impl Widths {
    fn measure(statuses: &[RepositoryStatus], rows: &[Row]) -> Self {
        Self {
            name: column_width(HEADERS[0], statuses.iter().map(|status| status.name.as_str())),
            branch: column_width(HEADERS[1], statuses.iter().map(|status| status.branch.as_str())),
            symbol: column_width(HEADERS[2], rows.iter().map(|row| row.category.symbol())),
            ahead: column_width(HEADERS[3], rows.iter().map(|row| row.ahead.as_str())),
            behind: column_width(HEADERS[4], rows.iter().map(|row| row.behind.as_str())),
            changes: column_width(HEADERS[5], rows.iter().map(|row| row.changes.as_str())),
        }
    }
}

fn column_width<'a>(header: &str, cells: impl Iterator<Item = &'a str>) -> usize {
    cells
        .map(display_width)
        .chain(std::iter::once(display_width(header)))
        .max()
        .unwrap_or(0)
}

fn display_width(text: &str) -> usize {
    text.chars().count()
}

/// Left-align `text` in `width` characters
fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(display_width(text));
    format!("{}{}", text, " ".repeat(fill))
}

fn legend(palette: &dyn Palette) -> String {
    let entries: Vec<String> = Category::ALL
        .iter()
        .map(|category| {
            format!(
                "{} {}",
                palette.paint(category.symbol(), category.style()),
                category.legend()
            )
        })
        .collect();
    format!("  {}", entries.join("    "))
}
