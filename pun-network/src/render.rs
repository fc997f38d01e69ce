//! Console rendering of delivery reports.
//!
//! Layout, top to bottom: banner header, executive summary, narrative,
//! metric analysis, observations, recommendations, footer. Sections are
//! separated by dim dividers. Free text is word-wrapped to the configured
//! width; metrics are drawn as colored progress bars.

use chrono::{DateTime, SecondsFormat, Utc};
use colored::{Color, Colorize};
use std::sync::Arc;

use punster_agent::DeliveryReport;

use crate::clock::{Clock, SystemClock};
use crate::config::RendererConfig;

const TITLE: &str = "PUN DELIVERY REPORT";
const HEAVY_RULE: char = '━';
const LIGHT_RULE: char = '-';
const FILLED: char = '█';
const METRIC_TITLE_WIDTH: usize = 18;
/// Continuation indent for numbered list entries
const LIST_INDENT: usize = 3;

/// Renders delivery reports as colored console text.
#[derive(Clone)]
pub struct ReportRenderer {
    width: usize,
    bar_length: usize,
    clock: Arc<dyn Clock>,
}

impl ReportRenderer {
    /// Create a renderer with the given layout and time source.
    pub fn new(config: &RendererConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            width: config.width,
            bar_length: config.bar_length,
            clock,
        }
    }

    /// Line width in columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Render stamped with the current time.
    pub fn render(&self, report: &DeliveryReport) -> String {
        self.render_at(report, self.clock.now())
    }

    /// Render stamped with `generated_at`.
    pub fn render_at(&self, report: &DeliveryReport, generated_at: DateTime<Utc>) -> String {
        let mut lines: Vec<String> = Vec::new();

        self.push_header(&mut lines);

        lines.push(subheader("EXECUTIVE SUMMARY"));
        lines.push(String::new());
        lines.extend(wrap_text(&report.executive_summary, self.width, 0, 0));
        self.push_divider(&mut lines);

        lines.push(subheader("DELIVERY NARRATIVE"));
        lines.push(String::new());
        lines.extend(wrap_text(&report.delivery_narrative, self.width, 0, 0));
        self.push_divider(&mut lines);

        let metrics = &report.metrics;
        lines.push(subheader("METRIC ANALYSIS"));
        lines.push(String::new());
        lines.push(format!(
            "{} {}",
            "Overall Effectiveness".bold().magenta(),
            self.progress_bar(metrics.delivery_effectiveness)
        ));
        lines.push(String::new());
        lines.push(self.metric_line("Comprehension Rate", metrics.comprehension_rate));
        lines.push(self.metric_line("Reaction Intensity", metrics.reaction_intensity));
        lines.push(self.metric_line("Reaction Duration", metrics.reaction_duration.as_secs_f64()));
        lines.push(self.metric_line("Repeat Probability", metrics.repeat_probability));
        self.push_divider(&mut lines);

        lines.push(subheader("OBSERVATIONS"));
        lines.extend(self.numbered_list(&report.observations));
        self.push_divider(&mut lines);

        lines.push(subheader("RECOMMENDATIONS"));
        lines.extend(self.numbered_list(&report.recommendations));

        self.push_footer(&mut lines, generated_at);

        lines.join("\n")
    }

    fn push_header(&self, lines: &mut Vec<String>) {
        let rule = HEAVY_RULE.to_string().repeat(self.width);
        let padding = self.width.saturating_sub(TITLE.len()) / 2;
        let title = format!("{}{}", " ".repeat(padding), TITLE);

        lines.push(String::new());
        lines.push(rule.bold().cyan().to_string());
        lines.push(title.bold().cyan().to_string());
        lines.push(rule.bold().cyan().to_string());
        lines.push(String::new());
    }

    fn push_divider(&self, lines: &mut Vec<String>) {
        lines.push(String::new());
        lines.push(LIGHT_RULE.to_string().repeat(self.width).bright_black().to_string());
        lines.push(String::new());
    }

    fn push_footer(&self, lines: &mut Vec<String>, generated_at: DateTime<Utc>) {
        let rule = HEAVY_RULE.to_string().repeat(self.width);
        let stamp = format!(
            "Report generated at: {}",
            generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        );

        lines.push(String::new());
        lines.push(rule.bold().cyan().to_string());
        lines.push(stamp.bright_black().to_string());
        lines.push(rule.bold().cyan().to_string());
    }

    fn numbered_list(&self, items: &[String]) -> Vec<String> {
        let mut lines = Vec::new();

        for (index, item) in items.iter().enumerate() {
            let marker = format!("{}.", index + 1);
            let wrapped = wrap_text(item, self.width, marker.len() + 1, LIST_INDENT);
            let mut wrapped = wrapped.into_iter();

            let first = wrapped.next().unwrap_or_default();
            lines.push(format!("{} {}", marker.magenta(), first));
            lines.extend(wrapped.map(|line| format!("{}{}", " ".repeat(LIST_INDENT), line)));
        }

        lines
    }

    fn metric_line(&self, title: &str, value: f64) -> String {
        let value = finite_or_zero(value);
        let color = threshold_color(clamp_percentage(value));
        let title = format!("{:<width$}", title, width = METRIC_TITLE_WIDTH);

        format!(
            "{}:{}{} {}",
            title.underline(),
            " ".repeat(5),
            format!("{:>4.1}", value).color(color),
            self.progress_bar(value)
        )
    }

    fn progress_bar(&self, value: f64) -> String {
        let percentage = clamp_percentage(finite_or_zero(value));
        let filled = ((self.bar_length as f64 * percentage) / 100.0).round() as usize;
        let filled = filled.min(self.bar_length);
        let bar = format!(
            "[{}{}]",
            FILLED.to_string().repeat(filled),
            " ".repeat(self.bar_length - filled)
        );

        format!("{} {:.1}", bar.color(threshold_color(percentage)), percentage)
    }
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self::new(&RendererConfig::default(), Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for ReportRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportRenderer")
            .field("width", &self.width)
            .field("bar_length", &self.bar_length)
            .finish_non_exhaustive()
    }
}

fn subheader(title: &str) -> String {
    title.bold().blue().to_string()
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn clamp_percentage(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Red below 40, yellow below 70, green otherwise.
pub fn threshold_color(percentage: f64) -> Color {
    if percentage < 40.0 {
        Color::Red
    } else if percentage < 70.0 {
        Color::Yellow
    } else {
        Color::Green
    }
}

/// Word-wrap `text` into lines that fit `width` once indented.
///
/// Whitespace runs collapse to single spaces. The first line has
/// `width - first_indent` columns available, later lines
/// `width - rest_indent`. A word longer than the available space is kept
/// whole on its own line. Returned lines carry no indentation.
pub fn wrap_text(text: &str, width: usize, first_indent: usize, rest_indent: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let indent = if lines.is_empty() { first_indent } else { rest_indent };
        let available = width.saturating_sub(indent).max(1);
        let word_len = word.chars().count();

        if current.is_empty() {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= available {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}
