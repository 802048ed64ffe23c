use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use adam_cli::pipeline::BuildOutcome;
use adam_spec::ValidationReport;
use adam_validate::{DatasetReport, Severity};

pub fn print_build_summary(outcome: &BuildOutcome) {
    let spec = &outcome.loaded.specification;
    println!("Dataset: {}", spec.domain);
    println!("Specification: {}", outcome.loaded.path.display());
    println!("Sources: {}", outcome.source_dir.display());
    match &outcome.output {
        Some(path) => println!("Output: {}", path.display()),
        None => println!("Output: (dry run)"),
    }

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Column"),
        header_cell("Type"),
        header_cell("Rule"),
        header_cell("Values"),
        header_cell("Missing"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 3, CellAlignment::Right);
    align_column(&mut table, 4, CellAlignment::Right);

    let rows = outcome.dataset.height();
    for name in outcome.dataset.get_column_names() {
        let name = name.as_str();
        let missing = outcome
            .dataset
            .column(name)
            .map(|column| column.null_count())
            .unwrap_or(rows);
        let (data_type, rule) = match spec.column(name) {
            Some(column) => (
                column.data_type.to_string(),
                column.derivation.kind().to_string(),
            ),
            None => ("-".to_string(), "key".to_string()),
        };
        table.add_row(vec![
            Cell::new(name).fg(Color::Blue).add_attribute(Attribute::Bold),
            Cell::new(data_type),
            Cell::new(rule),
            Cell::new(rows - missing),
            count_cell(missing, Color::Yellow),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        dim_cell("-"),
        dim_cell("-"),
        Cell::new(format!("{rows} rows")).add_attribute(Attribute::Bold),
        dim_cell("-"),
    ]);
    println!("{table}");
    println!("Built in {} ms", outcome.duration.as_millis());

    if let Some(report) = &outcome.report {
        print_dataset_report(report);
    }
}

pub fn print_dataset_report(report: &DatasetReport) {
    println!(
        "{}: {} rows, {} errors, {} warnings",
        report.domain,
        report.rows,
        report.error_count(),
        report.warning_count()
    );
    if report.is_clean() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Severity"),
        header_cell("Column"),
        header_cell("Check"),
        header_cell("Count"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Center);
    align_column(&mut table, 3, CellAlignment::Right);
    for issue in report.sorted_issues() {
        table.add_row(vec![
            severity_cell(issue.severity()),
            Cell::new(issue.column()),
            Cell::new(issue.code()),
            match issue.count() {
                Some(count) => Cell::new(count).fg(severity_color(issue.severity())),
                None => dim_cell("-"),
            },
            Cell::new(issue.message()),
        ]);
    }
    println!("{table}");
}

pub fn print_schema_report(report: &ValidationReport) {
    if report.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Severity"),
        header_cell("Rule"),
        header_cell("Field"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Center);
    for issue in report.issues() {
        let severity = match issue.severity {
            adam_spec::Severity::Error => Severity::Error,
            adam_spec::Severity::Warning => Severity::Warning,
        };
        table.add_row(vec![
            severity_cell(severity),
            Cell::new(&issue.rule),
            Cell::new(&issue.field),
            Cell::new(&issue.message),
        ]);
    }
    eprintln!("{table}");
    eprintln!(
        "{} error(s), {} warning(s)",
        report.error_count(),
        report.warning_count()
    );
}

pub fn print_functions<'a>(names: impl IntoIterator<Item = &'a str>) {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Function")]);
    apply_table_style(&mut table);
    let mut names: Vec<&str> = names.into_iter().collect();
    names.sort_unstable();
    for name in names {
        table.add_row(vec![Cell::new(name)]);
    }
    println!("{table}");
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(140);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn severity_cell(severity: Severity) -> Cell {
    match severity {
        Severity::Error => Cell::new("ERROR").fg(Color::Red),
        Severity::Warning => Cell::new("WARN").fg(Color::Yellow),
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Error => Color::Red,
        Severity::Warning => Color::Yellow,
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
