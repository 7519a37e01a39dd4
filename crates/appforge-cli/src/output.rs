use serde::Serialize;

/// Cells longer than this are cut so diagnostics don't wreck the table.
const MAX_CELL: usize = 60;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn clip(cell: &str) -> String {
    let first_line = cell.lines().next().unwrap_or("");
    if first_line.chars().count() <= MAX_CELL && first_line.len() == cell.len() {
        return cell.to_string();
    }
    let cut: String = first_line.chars().take(MAX_CELL - 3).collect();
    format!("{cut}...")
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|c| clip(c)).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let render = |cells: Vec<String>| {
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:w$}"))
            .collect();
        println!("{}", line.join("  ").trim_end());
    };

    render(headers.iter().map(|h| h.to_string()).collect());
    render(widths.iter().map(|&w| "-".repeat(w)).collect());
    for row in rows {
        render(row);
    }
}
