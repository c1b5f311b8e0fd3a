//! Output formatting for listings, sync reports, cart results and keyword rules
//! (table, JSON, markdown, CSV).

use crate::catalog::{CategoryAssignment, KeywordMapping, SyncReport};
use crate::config::OutputFormat;
use crate::letao::{BatchCartOutcome, CartOutcome};
use crate::surugaya::ListingSnapshot;
use rust_decimal::Decimal;
use serde::Serialize;

/// Formats results for output.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a single listing.
    pub fn format_snapshot(&self, snapshot: &ListingSnapshot) -> String {
        match self.format {
            OutputFormat::Json => Self::json(snapshot),
            OutputFormat::Table => self.table_single(snapshot),
            OutputFormat::Markdown => self.markdown_single(snapshot),
            OutputFormat::Csv => self.csv_snapshots(std::slice::from_ref(snapshot)),
        }
    }

    /// Formats multiple listings.
    pub fn format_snapshots(&self, snapshots: &[ListingSnapshot]) -> String {
        if snapshots.is_empty() {
            return match self.format {
                OutputFormat::Json => "[]".to_string(),
                OutputFormat::Csv => Self::csv_header().to_string(),
                _ => "No listings found.".to_string(),
            };
        }

        match self.format {
            OutputFormat::Json => Self::json(snapshots),
            OutputFormat::Table => self.table_snapshots(snapshots),
            OutputFormat::Markdown => self.markdown_snapshots(snapshots),
            OutputFormat::Csv => self.csv_snapshots(snapshots),
        }
    }

    /// Formats a synchronization report.
    pub fn format_report(&self, report: &SyncReport) -> String {
        match self.format {
            OutputFormat::Json => Self::json(report),
            OutputFormat::Csv => self.csv_snapshots(&report.snapshots),
            OutputFormat::Table => {
                let mut out = vec![
                    format!(
                        "Synced {}/{} listings ({} failed) in {}s",
                        report.succeeded(),
                        report.total,
                        report.failed(),
                        (report.finished_at - report.started_at).num_seconds()
                    ),
                    format!(
                        "Series: {} classified, {} unmatched, {} failed",
                        report.classification.classified,
                        report.classification.unmatched,
                        report.classification.failed
                    ),
                ];
                if !report.snapshots.is_empty() {
                    out.push(String::new());
                    out.push(self.table_snapshots(&report.snapshots));
                }
                if !report.failures.is_empty() {
                    out.push(String::new());
                    out.push("Failures:".to_string());
                    for failure in &report.failures {
                        out.push(format!("  {}  {}", failure.url, failure.error));
                    }
                }
                out.join("\n")
            }
            OutputFormat::Markdown => {
                let mut out = vec![
                    "## Sync report".to_string(),
                    String::new(),
                    format!("- **Tracked:** {}", report.total),
                    format!("- **Succeeded:** {}", report.succeeded()),
                    format!("- **Failed:** {}", report.failed()),
                    format!(
                        "- **Series:** {} classified / {} unmatched / {} failed",
                        report.classification.classified,
                        report.classification.unmatched,
                        report.classification.failed
                    ),
                ];
                if !report.snapshots.is_empty() {
                    out.push(String::new());
                    out.push(self.markdown_snapshots(&report.snapshots));
                }
                if !report.failures.is_empty() {
                    out.push(String::new());
                    out.push("### Failures".to_string());
                    out.push(String::new());
                    for failure in &report.failures {
                        out.push(format!("- `{}`: {}", failure.url, failure.error));
                    }
                }
                out.join("\n")
            }
        }
    }

    /// Formats a single cart-add result.
    pub fn format_cart_outcome(&self, outcome: &CartOutcome) -> String {
        match self.format {
            OutputFormat::Json => Self::json(outcome),
            OutputFormat::Csv => format!(
                "success,status_code,message\n{},{},{}",
                outcome.success,
                outcome.status_code,
                Self::csv_escape(&outcome.message)
            ),
            OutputFormat::Markdown => format!(
                "- **Success:** {}\n- **Status:** {}\n- **Message:** {}",
                outcome.success, outcome.status_code, outcome.message
            ),
            OutputFormat::Table => format!(
                "{} [{}] {}",
                if outcome.success { "OK  " } else { "FAIL" },
                outcome.status_code,
                outcome.message
            ),
        }
    }

    /// Formats a batch cart-add result.
    pub fn format_batch(&self, batch: &BatchCartOutcome) -> String {
        match self.format {
            OutputFormat::Json => Self::json(batch),
            OutputFormat::Csv => {
                let mut lines = vec!["title,url,success,status_code,message".to_string()];
                for r in &batch.results {
                    lines.push(format!(
                        "{},{},{},{},{}",
                        Self::csv_escape(&r.title),
                        r.url,
                        r.success,
                        r.status_code,
                        Self::csv_escape(&r.message)
                    ));
                }
                lines.join("\n")
            }
            OutputFormat::Markdown => {
                let mut lines = vec![
                    "| OK | Status | Title | Message |".to_string(),
                    "|----|--------|-------|---------|".to_string(),
                ];
                for r in &batch.results {
                    lines.push(format!(
                        "| {} | {} | [{}]({}) | {} |",
                        if r.success { "✓" } else { "✗" },
                        r.status_code,
                        truncate(&r.title, 40),
                        r.url,
                        r.message
                    ));
                }
                lines.push(String::new());
                lines.push(format!("*{}/{} added*", batch.succeeded, batch.total));
                lines.join("\n")
            }
            OutputFormat::Table => {
                let mut lines = vec![
                    format!("{:<4}  {:>6}  {:<40}  {}", "OK", "Status", "Title", "Message"),
                    format!("{:-<4}  {:-<6}  {:-<40}  {:-<20}", "", "", "", ""),
                ];
                for r in &batch.results {
                    lines.push(format!(
                        "{:<4}  {:>6}  {:<40}  {}",
                        if r.success { "yes" } else { "no" },
                        r.status_code,
                        truncate(&r.title, 40),
                        r.message
                    ));
                }
                lines.push(String::new());
                lines.push(format!(
                    "Total: {}  Added: {}  Failed: {}",
                    batch.total, batch.succeeded, batch.failed
                ));
                lines.join("\n")
            }
        }
    }

    /// Formats keyword rules.
    pub fn format_mappings(&self, mappings: &[KeywordMapping]) -> String {
        if mappings.is_empty() && self.format != OutputFormat::Json {
            return "No keyword rules defined.".to_string();
        }

        match self.format {
            OutputFormat::Json => Self::json(mappings),
            OutputFormat::Csv => {
                let mut lines = vec!["id,japanese_key,chinese_name".to_string()];
                for m in mappings {
                    lines.push(format!(
                        "{},{},{}",
                        m.id,
                        Self::csv_escape(&m.japanese_key),
                        Self::csv_escape(&m.chinese_name)
                    ));
                }
                lines.join("\n")
            }
            OutputFormat::Markdown => {
                let mut lines =
                    vec!["| ID | Keyword | Series |".to_string(), "|----|---------|--------|".to_string()];
                for m in mappings {
                    lines.push(format!("| {} | {} | {} |", m.id, m.japanese_key, m.chinese_name));
                }
                lines.join("\n")
            }
            OutputFormat::Table => {
                let mut lines = vec![
                    format!("{:>5}  {:<30}  {}", "ID", "Keyword", "Series"),
                    format!("{:-<5}  {:-<30}  {:-<20}", "", "", ""),
                ];
                for m in mappings {
                    lines.push(format!("{:>5}  {:<30}  {}", m.id, m.japanese_key, m.chinese_name));
                }
                lines.join("\n")
            }
        }
    }

    /// Formats a category assignment.
    pub fn format_category(&self, assignment: &CategoryAssignment) -> String {
        let series = assignment.series_name.as_deref().unwrap_or("");
        match self.format {
            OutputFormat::Json => Self::json(assignment),
            OutputFormat::Csv => format!(
                "url,purpose_category,series_name\n{},{},{}",
                assignment.url,
                assignment.purpose_category,
                Self::csv_escape(series)
            ),
            OutputFormat::Markdown => format!(
                "- **URL:** {}\n- **Purpose:** {}\n- **Series:** {}",
                assignment.url, assignment.purpose_category, series
            ),
            OutputFormat::Table => format!(
                "URL:     {}\nPurpose: {}\nSeries:  {}",
                assignment.url,
                assignment.purpose_category,
                if series.is_empty() { "-" } else { series }
            ),
        }
    }

    // JSON formatting

    fn json<T: Serialize + ?Sized>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
    }

    // Table formatting

    fn table_single(&self, snapshot: &ListingSnapshot) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Title:   {}", snapshot.title));
        lines.push(format!("URL:     {}", snapshot.url));

        let price_str = match snapshot.sale_price {
            Some(sale) => match snapshot.discount_percent() {
                Some(pct) => format!(
                    "{} (was {}, -{}%)",
                    yen(sale),
                    yen(snapshot.current_price),
                    pct
                ),
                None => format!("{} (was {})", yen(sale), yen(snapshot.current_price)),
            },
            None => yen(snapshot.current_price),
        };
        lines.push(format!("Price:   {}", price_str));
        lines.push(format!("Status:  {}", snapshot.status));

        if !snapshot.image_url.is_empty() {
            lines.push(format!("Image:   {}", snapshot.image_url));
        }

        lines.push(format!("Updated: {}", snapshot.last_updated.format("%Y-%m-%d %H:%M")));

        lines.join("\n")
    }

    fn table_snapshots(&self, snapshots: &[ListingSnapshot]) -> String {
        let price_width = 10;
        let sale_width = 10;
        let status_width = 16;
        let title_width = 40;

        let mut lines = Vec::new();

        // Header
        lines.push(format!(
            "{:>price_width$}  {:>sale_width$}  {:<status_width$}  {}",
            "Price", "Sale", "Status", "Title"
        ));
        lines.push(format!(
            "{:-<price_width$}  {:-<sale_width$}  {:-<status_width$}  {:-<title_width$}",
            "", "", "", ""
        ));

        // Rows
        for snapshot in snapshots {
            let sale_str = snapshot.sale_price.map(yen).unwrap_or_else(|| "-".to_string());

            lines.push(format!(
                "{:>price_width$}  {:>sale_width$}  {:<status_width$}  {}",
                yen(snapshot.current_price),
                sale_str,
                truncate(&snapshot.status, status_width),
                truncate(&snapshot.title, title_width)
            ));
        }

        lines.push(String::new());
        lines.push(format!("Total: {} listings", snapshots.len()));

        lines.join("\n")
    }

    // Markdown formatting

    fn markdown_single(&self, snapshot: &ListingSnapshot) -> String {
        let mut lines = Vec::new();

        lines.push(format!("## {}", snapshot.title));
        lines.push(String::new());
        lines.push(format!("- **URL:** [View on Suruga-ya]({})", snapshot.url));

        match snapshot.sale_price {
            Some(sale) => lines.push(format!(
                "- **Price:** {} ~~{}~~",
                yen(sale),
                yen(snapshot.current_price)
            )),
            None => lines.push(format!("- **Price:** {}", yen(snapshot.current_price))),
        }

        lines.push(format!("- **Status:** {}", snapshot.status));

        if !snapshot.image_url.is_empty() {
            lines.push(format!("- **Image:** ![]({})", snapshot.image_url));
        }

        lines.join("\n")
    }

    fn markdown_snapshots(&self, snapshots: &[ListingSnapshot]) -> String {
        let mut lines = Vec::new();

        lines.push("| Price | Sale | Status | Title |".to_string());
        lines.push("|-------|------|--------|-------|".to_string());

        for snapshot in snapshots {
            let sale_str = snapshot.sale_price.map(yen).unwrap_or_default();

            lines.push(format!(
                "| {} | {} | {} | [{}]({}) |",
                yen(snapshot.current_price),
                sale_str,
                snapshot.status,
                truncate(&snapshot.title, 40),
                snapshot.url
            ));
        }

        lines.push(String::new());
        lines.push(format!("*{} listings*", snapshots.len()));

        lines.join("\n")
    }

    // CSV formatting

    fn csv_header() -> &'static str {
        "url,title,current_price,sale_price,status,image_url,last_updated"
    }

    fn csv_snapshots(&self, snapshots: &[ListingSnapshot]) -> String {
        let mut lines = Vec::new();
        lines.push(Self::csv_header().to_string());

        for snapshot in snapshots {
            let sale = snapshot.sale_price.map(|s| s.to_string()).unwrap_or_default();

            lines.push(format!(
                "{},{},{},{},{},{},{}",
                snapshot.url,
                Self::csv_escape(&snapshot.title),
                snapshot.current_price,
                sale,
                Self::csv_escape(&snapshot.status),
                snapshot.image_url,
                snapshot.last_updated.to_rfc3339()
            ));
        }

        lines.join("\n")
    }

    fn csv_escape(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }
}

fn yen(amount: Decimal) -> String {
    format!("¥{}", amount.normalize())
}

/// Shortens to `max` characters, never splitting a character.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
