//! Output formatting for the CLI
//!
//! Tables for host and package listings, detail views for single records,
//! and colored status lines.

use chrono::{DateTime, Utc};
use tabled::{settings::Style, Table, Tabled};

use rk_core::{Host, Package, Page};

/// Format a page of hosts as a table
///
/// Returns "No hosts registered" when the page is empty.
pub fn format_hosts(page: &Page<Host>) -> String {
    if page.items.is_empty() {
        return "No hosts registered".to_string();
    }

    #[derive(Tabled)]
    struct HostRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "LABEL")]
        label: String,
        #[tabled(rename = "ENDPOINT")]
        endpoint: String,
        #[tabled(rename = "UPDATED")]
        updated: String,
    }

    let rows: Vec<HostRow> = page
        .items
        .iter()
        .map(|h| HostRow {
            id: h.id.0,
            name: truncate(&h.name, 24),
            label: dash_if_empty(&h.label),
            endpoint: h.endpoint().to_string(),
            updated: format_time(&h.updated_at),
        })
        .collect();

    format!(
        "{}\n{}",
        Table::new(rows).with(Style::rounded()),
        format_total(page.items.len(), page.total)
    )
}

/// Format a page of packages as a table
pub fn format_packages(page: &Page<Package>) -> String {
    if page.items.is_empty() {
        return "No packages uploaded".to_string();
    }

    #[derive(Tabled)]
    struct PackageRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "LABEL")]
        label: String,
        #[tabled(rename = "VERSION")]
        version: String,
        #[tabled(rename = "FILE")]
        file: String,
        #[tabled(rename = "UPLOADED")]
        uploaded: String,
    }

    let rows: Vec<PackageRow> = page
        .items
        .iter()
        .map(|p| PackageRow {
            id: p.id.0,
            label: p.label.clone(),
            version: p.version.clone(),
            file: truncate(&p.original_filename, 32),
            uploaded: format_time(&p.uploaded_at),
        })
        .collect();

    format!(
        "{}\n{}",
        Table::new(rows).with(Style::rounded()),
        format_total(page.items.len(), page.total)
    )
}

/// Multi-line detail view of one host
pub fn format_host(host: &Host) -> String {
    let mut output = String::new();
    output.push_str(&format!("ID:          {}\n", host.id));
    output.push_str(&format!("Name:        {}\n", host.name));
    output.push_str(&format!("Label:       {}\n", dash_if_empty(&host.label)));
    output.push_str(&format!("Address:     {}\n", host.address));
    output.push_str(&format!("Port:        {}\n", host.port));
    output.push_str(&format!("User:        {}\n", host.username));
    output.push_str(&format!(
        "Interpreter: {}\n",
        host.interpreter.as_deref().unwrap_or("-")
    ));
    output.push_str(&format!("Remark:      {}\n", dash_if_empty(&host.remark)));
    output.push_str(&format!("Created:     {}\n", format_time(&host.created_at)));
    output.push_str(&format!("Updated:     {}", format_time(&host.updated_at)));
    output
}

/// Multi-line detail view of one package
pub fn format_package(package: &Package) -> String {
    let mut output = String::new();
    output.push_str(&format!("ID:           {}\n", package.id));
    output.push_str(&format!("Label:        {}\n", package.label));
    output.push_str(&format!("Version:      {}\n", package.version));
    output.push_str(&format!("File:         {}\n", package.original_filename));
    output.push_str(&format!("Storage name: {}\n", package.storage_name));
    output.push_str(&format!("Uploaded:     {}", format_time(&package.uploaded_at)));
    output
}

fn format_total(shown: usize, total: u64) -> String {
    format!("Showing {} of {}", shown, total)
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn dash_if_empty(s: &str) -> String {
    if s.is_empty() {
        "-".to_string()
    } else {
        s.to_string()
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow
///
/// Outputs to stderr.
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rk_core::{HostId, PackageId, StorageName};

    fn host() -> Host {
        Host {
            id: HostId(3),
            name: "db-1".into(),
            label: String::new(),
            address: "10.0.0.5".into(),
            port: 22,
            username: "admin".into(),
            interpreter: None,
            remark: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_pages() {
        let hosts: Page<Host> = Page {
            total: 0,
            items: vec![],
        };
        assert_eq!(format_hosts(&hosts), "No hosts registered");

        let packages: Page<Package> = Page {
            total: 0,
            items: vec![],
        };
        assert_eq!(format_packages(&packages), "No packages uploaded");
    }

    #[test]
    fn test_host_table_shows_endpoint_and_total() {
        let page = Page {
            total: 7,
            items: vec![host()],
        };
        let table = format_hosts(&page);
        assert!(table.contains("admin@10.0.0.5:22"));
        assert!(table.contains("Showing 1 of 7"));
    }

    #[test]
    fn test_package_detail() {
        let package = Package {
            id: PackageId(1),
            label: "agent".into(),
            version: "1.2.0".into(),
            storage_name: StorageName::parse("abc.gz").unwrap(),
            original_filename: "agent.tar.gz".into(),
            uploaded_at: Utc::now(),
        };
        let detail = format_package(&package);
        assert!(detail.contains("Version:      1.2.0"));
        assert!(detail.contains("Storage name: abc.gz"));
    }

    #[test]
    fn test_host_detail_dashes_missing_fields() {
        let detail = format_host(&host());
        assert!(detail.contains("Interpreter: -"));
        assert!(detail.contains("Label:       -"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-host-name", 10), "a-very-...");
    }
}
