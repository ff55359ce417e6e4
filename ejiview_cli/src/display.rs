use comfy_table::{presets::NOTHING, *};
use ejiview::compare::DeltaColor;
use ejiview::significance::TestOutcome;
use ejiview::view::{AssociationReport, ScaleEntry, View, DIFFERENCE_ROW};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

fn bold(text: &str) -> Cell {
    Cell::new(text).add_attribute(Attribute::Bold)
}

/// Terminal color of a `#rrggbb` string.
fn hex_color(hex: &str) -> Option<Color> {
    let hex = hex.trim_start_matches('#');
    let channel = |i: usize| hex.get(i..i + 2).and_then(|c| u8::from_str_radix(c, 16).ok());
    Some(Color::Rgb {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}

fn named_color(name: &str) -> Color {
    match name {
        "white" => Color::White,
        _ => Color::Black,
    }
}

fn delta_color(color: DeltaColor) -> Color {
    match color {
        DeltaColor::Worse => Color::Red,
        DeltaColor::Better => Color::Green,
    }
}

pub fn display_view(view: &View) -> anyhow::Result<()> {
    let mut table = new_table();
    let mut header = vec![bold("")];
    for h in &view.table.headers {
        let mut cell = bold(h.label).fg(named_color(h.text_color));
        if let Some(bg) = hex_color(h.background) {
            cell = cell.bg(bg);
        }
        header.push(cell);
    }
    table.set_header(header);

    for row in &view.table.rows {
        let mut cells = vec![bold(&row.label)];
        for value in &row.cells {
            let mut cell = Cell::new(&value.text).set_alignment(CellAlignment::Center);
            if let Some(bg) = value.bucket.and_then(|b| hex_color(b.color())) {
                cell = cell.bg(bg).fg(Color::Black);
            }
            if value.very_high {
                cell = cell.add_attribute(Attribute::Bold);
            }
            cells.push(cell);
        }
        table.add_row(cells);
    }

    if let Some(deltas) = &view.deltas {
        let mut cells = vec![bold(DIFFERENCE_ROW)];
        for entry in &deltas.entries {
            let mut cell = Cell::new(entry.cell_text()).set_alignment(CellAlignment::Center);
            if let Some(color) = entry.color() {
                cell = cell.fg(delta_color(color));
            }
            cells.push(cell);
        }
        table.add_row(cells);
    }

    let column = table
        .column_mut(0)
        .ok_or_else(|| anyhow::anyhow!("Empty table"))?;
    column.set_cell_alignment(CellAlignment::Right);

    println!("\n{}", view.title);
    println!("{}", table);
    if view.table.rows.iter().any(|r| r.cells.iter().any(|c| c.very_high)) {
        println!("Bold cells are of very high concern.");
    }
    Ok(())
}

pub fn display_association(report: &AssociationReport) -> anyhow::Result<()> {
    let mut table = new_table();
    table.add_row(vec![bold("Year"), Cell::new(&report.year)]);
    table.add_row(vec![bold("Table"), Cell::new(report.table)]);
    table.add_row(vec![bold("Vulnerability"), Cell::new(report.vulnerability.label())]);
    table.add_row(vec![bold("Outcome"), Cell::new(report.outcome.label())]);
    table.add_row(vec![bold("Rows"), Cell::new(report.rows)]);
    match &report.result {
        TestOutcome::Tested(result) => {
            table.add_row(vec![
                bold("High burden"),
                Cell::new(format!(
                    "n = {}, mean = {:.3}",
                    result.high_burden.count, result.high_burden.mean
                )),
            ]);
            table.add_row(vec![
                bold("Other"),
                Cell::new(format!(
                    "n = {}, mean = {:.3}",
                    result.other.count, result.other.mean
                )),
            ]);
            table.add_row(vec![bold("t statistic"), Cell::new(format!("{:.4}", result.statistic))]);
            table.add_row(vec![
                bold("Degrees of freedom"),
                Cell::new(format!("{:.2}", result.degrees_of_freedom)),
            ]);
            table.add_row(vec![bold("p-value"), Cell::new(format!("{:.4}", result.p_value))]);
            table.add_row(vec![
                bold("Result"),
                bold(result.significance().label()),
            ]);
        }
        TestOutcome::InsufficientData { high_burden, other } => {
            table.add_row(vec![
                bold("Result"),
                Cell::new(format!(
                    "Insufficient data ({high_burden} high burden, {other} other)"
                )),
            ]);
        }
    }
    let column = table
        .column_mut(0)
        .ok_or_else(|| anyhow::anyhow!("Empty table"))?;
    column.set_cell_alignment(CellAlignment::Right);
    println!("\n{}", table);
    Ok(())
}

pub fn display_scale(entries: &[ScaleEntry]) -> anyhow::Result<()> {
    let mut table = new_table();
    table.set_header(vec![
        bold("Category"),
        bold("Range"),
        bold("Color"),
        bold("Description"),
    ]);
    for entry in entries {
        let mut swatch = Cell::new(entry.color_name);
        if let Some(bg) = hex_color(entry.color) {
            swatch = swatch.bg(bg).fg(Color::Black);
        }
        table.add_row(vec![
            Cell::new(entry.label),
            Cell::new(entry.range),
            swatch,
            Cell::new(entry.description),
        ]);
    }
    println!("\n{}", table);
    println!("Lower values mean lower cumulative burden and are generally better.");
    Ok(())
}

pub fn display_names(title: &str, names: &[String]) -> anyhow::Result<()> {
    let mut table = new_table();
    table.set_header(vec![bold(title)]);
    for name in names {
        table.add_row(vec![name]);
    }
    println!("\n{}", table);
    Ok(())
}
