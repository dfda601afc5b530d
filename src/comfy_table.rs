use crate::analysis::ScanReport;
use crate::rules::Side;
use chrono::{DateTime, Utc};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

fn format_timestamp(ts_ms: i64) -> String {
    match DateTime::from_timestamp_millis(ts_ms) {
        Some(dt) => dt.format("%d-%m-%Y %H:%M").to_string(),
        None => "Unknown Time".to_string(),
    }
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|t| Cell::new(t).add_attribute(Attribute::Bold))
        .collect()
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn side_color(side: Side) -> Color {
    match side {
        Side::Buy => Color::Green,
        Side::Sell => Color::Red,
    }
}

/// One row per scanner.
pub fn summary_table(reports: &[ScanReport]) -> Table {
    let mut table = new_table();
    table.set_header(header(&[
        "Scanner", "Pairs", "Data", "Failed", "Added", "Removed", "Alerts", "Watching", "Time",
    ]));

    for report in reports {
        let alerts = report.outcome.alerts.len();
        let alert_cell = if alerts > 0 {
            Cell::new(alerts).fg(Color::Yellow).add_attribute(Attribute::Bold)
        } else {
            Cell::new(alerts).fg(Color::DarkGrey)
        };
        let failed_cell = if report.failed > 0 {
            Cell::new(report.failed).fg(Color::Red)
        } else {
            Cell::new(report.failed).fg(Color::DarkGrey)
        };

        table.add_row(vec![
            Cell::new(&report.title).fg(Color::Cyan),
            Cell::new(report.scanned).set_alignment(CellAlignment::Right),
            Cell::new(report.with_data).set_alignment(CellAlignment::Right),
            failed_cell.set_alignment(CellAlignment::Right),
            Cell::new(report.outcome.added.len()).set_alignment(CellAlignment::Right),
            Cell::new(report.outcome.removed.len()).set_alignment(CellAlignment::Right),
            alert_cell.set_alignment(CellAlignment::Right),
            Cell::new(format!("{} / {}", report.watching_buy, report.watching_sell)),
            Cell::new(format!("{:.1}s", report.elapsed.as_secs_f64())).fg(Color::DarkGrey),
        ]);
    }
    table
}

/// Every alert of the cycle, `None` when there were none.
pub fn alerts_table(reports: &[ScanReport]) -> Option<Table> {
    let alerts: Vec<_> = reports.iter().flat_map(|r| &r.outcome.alerts).collect();
    if alerts.is_empty() {
        return None;
    }

    let mut table = new_table();
    table.set_header(header(&["Scanner", "Side", "Pair", "Bar", "Close", "Entry", "SL", "Lev"]));

    for alert in alerts {
        let (entry, stop, leverage) = match &alert.plan {
            Some(plan) => (
                format!("{:.6}", plan.entry),
                format!("{:.6}", plan.stop),
                format!("{}x", plan.leverage),
            ),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        table.add_row(vec![
            Cell::new(&alert.scanner).fg(Color::DarkGrey),
            Cell::new(alert.side.label())
                .fg(side_color(alert.side))
                .add_attribute(Attribute::Bold),
            Cell::new(&alert.pair).fg(Color::Cyan),
            Cell::new(format_timestamp(alert.bar_time)),
            Cell::new(format!("{:.6}", alert.close)).set_alignment(CellAlignment::Right),
            Cell::new(entry).set_alignment(CellAlignment::Right),
            Cell::new(stop).set_alignment(CellAlignment::Right),
            Cell::new(leverage).set_alignment(CellAlignment::Right),
        ]);
    }
    Some(table)
}

pub fn print_reports(reports: &[ScanReport]) {
    let title = format!("(Cycle finished at {} UTC)", format_timestamp(Utc::now().timestamp_millis()));
    println!("\n{}\n{}", title, summary_table(reports));
    if let Some(table) = alerts_table(reports) {
        println!("{}", table);
    }
}
