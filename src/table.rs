/// Escapes underscores for LaTeX output.
pub fn escape_latex_underscores(text: &str) -> String {
    text.replace('_', "\\_")
}

/// Pads `&`-separated cells column-wise so all rows line up. Rows without
/// the separator (e.g. `\midrule`) pass through unchanged.
pub fn align_columns(rows: &[String]) -> Vec<String> {
    let split: Vec<Vec<&str>> = rows.iter().map(|row| row.split(" & ").collect()).collect();
    let columns = split.iter().map(Vec::len).max().unwrap_or(0);

    let mut widths = vec![0_usize; columns];
    for cells in &split {
        if cells.len() == 1 {
            continue;
        }
        for (i, cell) in cells.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    split
        .into_iter()
        .map(|cells| {
            if cells.len() == 1 {
                return cells[0].to_string();
            }
            cells
                .iter()
                .enumerate()
                .map(|(i, cell)| format!("{cell:<width$}", width = widths[i]))
                .collect::<Vec<_>>()
                .join(" & ")
        })
        .collect()
}

/// Assembles a `;`-delimited CSV table: header plus one line per row.
pub fn csv_table(header: &str, rows: &[String]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(header.to_string());
    lines.extend(rows.iter().cloned());
    lines.join("\n")
}

/// Assembles a booktabs `tabular` block: columns space-aligned, one `l`
/// column for the name and a `c` column per remaining cell.
pub fn latex_table(header: &str, rows: &[String]) -> String {
    let mut all = Vec::with_capacity(rows.len() + 1);
    all.push(header.to_string());
    all.extend(rows.iter().cloned());
    let aligned = align_columns(&all);

    let column_count = aligned[0].matches(" & ").count();
    let mut lines = vec![
        format!("\\begin{{tabular}}{{l{}}}", "c".repeat(column_count)),
        "\\toprule".to_string(),
        aligned[0].clone(),
        "\\midrule".to_string(),
    ];
    lines.extend(aligned[1..].iter().cloned());
    lines.push("\\bottomrule".to_string());
    lines.push("\\end{tabular}".to_string());
    lines.join("\n")
}
