//! Plain-text table rendering for the dashboard and `status`.

use colored::Colorize;

use super::logic::StatusRow;

const HEADERS: [&str; 5] = ["Port", "Status", "Active Time", "Total Usage", "Limits (Time/Data)"];

/// Render `rows` as a bordered table. Colour is applied after padding so
/// escape codes do not disturb column widths.
pub fn render_table(rows: &[StatusRow], color: bool) -> String {
    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|r| {
            [
                r.port.to_string(),
                status_label(r.blocked).to_string(),
                r.active_time.clone(),
                r.usage.clone(),
                r.limits.clone(),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = HEADERS.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let border = {
        let parts: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        format!("+{}+", parts.join("+"))
    };

    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');
    let header: Vec<String> = HEADERS
        .iter()
        .zip(&widths)
        .map(|(h, &w)| {
            let padded = format!("{h:^w$}");
            if color {
                padded.bold().to_string()
            } else {
                padded
            }
        })
        .collect();
    out.push_str(&format!("| {} |\n", header.join(" | ")));
    out.push_str(&border);
    out.push('\n');

    for (row, source) in cells.iter().zip(rows) {
        let rendered: Vec<String> = row
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, &w))| {
                // Usage is right-aligned, everything else centred.
                let padded = if i == 3 {
                    format!("{cell:>w$}")
                } else {
                    format!("{cell:^w$}")
                };
                if !color {
                    return padded;
                }
                match i {
                    0 => padded.cyan().bold().to_string(),
                    1 if source.blocked => padded.red().bold().to_string(),
                    1 => padded.green().bold().to_string(),
                    2 => padded.magenta().to_string(),
                    4 => padded.yellow().to_string(),
                    _ => padded,
                }
            })
            .collect();
        out.push_str(&format!("| {} |\n", rendered.join(" | ")));
    }

    if !rows.is_empty() {
        out.push_str(&border);
        out.push('\n');
    }
    out
}

fn status_label(blocked: bool) -> &'static str {
    if blocked {
        "BLOCKED"
    } else {
        "ACTIVE"
    }
}
