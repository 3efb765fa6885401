use crate::archive::assemble_archive;
use crate::batch::{run_template_batch, BatchOutcome};
use crate::config::{JobMapping, RunSettings};
use crate::error::{SheetfillError, SheetfillResult};
use crate::excel::{self, parse_input_file, read_workbook_file};
use crate::grid::{GridModel, GridRow};
use crate::mapping::{
    suggest_mappings, JsonFileStore, KeyValueStore, MappingMemory, MappingStore,
};
use crate::types::SheetFormat;
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Longest cell text shown in the text grid before it is cut.
const GRID_TEXT_WIDTH: usize = 24;

/// File name used as the template part of the mapping memory key.
fn template_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn truncate(text: &str, width: usize) -> String {
    let one_line = text.replace(['\n', '\r'], " ");
    if one_line.chars().count() <= width {
        one_line
    } else {
        let cut: String = one_line.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn macro_warning() {
    println!(
        "{}",
        "⚠️  Macro-enabled template: macros and other active content are not guaranteed to survive."
            .yellow()
    );
}

/// Execute the inspect command
pub fn inspect(input: &Path, json: bool) -> SheetfillResult<()> {
    let data = parse_input_file(input)?;

    if json {
        let out = serde_json::to_string_pretty(&data)
            .map_err(|e| SheetfillError::Config(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }

    println!("{}", "📖 Sheetfill - Input Data".bold().green());
    println!("   File: {}\n", input.display());
    println!("   {} columns:", data.headers.len());
    for (i, header) in data.headers.iter().enumerate() {
        println!("   {:>3}. {}", i + 1, header.bright_blue());
    }
    println!("\n   {} data rows", data.rows.len().to_string().bold());
    Ok(())
}

/// Execute the grid command
pub fn grid(template: &Path, sheet: Option<&str>, json: bool) -> SheetfillResult<()> {
    let (bytes, format) = read_workbook_file(template)?;
    let model = excel::extract_grid_from_bytes(&bytes, format, sheet)?;

    if json {
        let out = serde_json::to_string_pretty(&model)
            .map_err(|e| SheetfillError::Config(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }

    let sheets = excel::sheet_names(&bytes, format)?;
    println!("{}", "📊 Sheetfill - Template Grid".bold().green());
    println!("   File:   {}", template.display());
    println!("   Sheets: {}", sheets.join(", "));
    println!(
        "   Sheet:  {} ({}, {:?} bounds)\n",
        model.sheet_name.bright_blue(),
        model.bounds(),
        model.dimension_source
    );
    if format.is_macro_enabled() {
        macro_warning();
    }
    print_grid(&model);
    Ok(())
}

fn print_grid(model: &GridModel) {
    let mut printed = 0;
    for row in &model.rows {
        if let Some(line) = grid_row_line(row) {
            println!("   {:>4} │ {}", row.number.to_string().dimmed(), line);
            printed += 1;
        }
    }
    if printed == 0 {
        println!("   {}", "(no values)".dimmed());
    }

    if !model.merges.is_empty() {
        let regions: Vec<String> = model
            .merges
            .regions()
            .iter()
            .map(|r| r.to_string())
            .collect();
        println!("\n   Merged: {}", regions.join(", "));
    }
    if !model.placeholders.is_empty() {
        println!(
            "   {} unreadable cells shown empty: {}",
            "⚠️".yellow(),
            model.placeholders.join(", ")
        );
    }
}

fn grid_row_line(row: &GridRow) -> Option<String> {
    let parts: Vec<String> = row
        .cells
        .iter()
        .filter_map(|cell| {
            let value = cell.value.as_deref()?;
            let span = if cell.is_merge_start {
                format!(" [{}×{}]", cell.rowspan, cell.colspan)
            } else {
                String::new()
            };
            Some(format!(
                "{} {:?}{}",
                cell.address.bold(),
                truncate(value, GRID_TEXT_WIDTH),
                span
            ))
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("  "))
}

#[derive(Serialize)]
struct SuggestionDoc {
    mappings: Vec<JobMapping>,
}

/// Execute the suggest command
pub fn suggest(input: &Path, template: &Path, sheet: Option<&str>) -> SheetfillResult<()> {
    let data = parse_input_file(input)?;
    let model = excel::extract_grid_file(template, sheet)?;
    let suggestions = suggest_mappings(&data.headers, &model);

    let doc = SuggestionDoc {
        mappings: suggestions.iter().map(JobMapping::from).collect(),
    };
    let yaml = serde_yaml::to_string(&doc).map_err(|e| SheetfillError::Config(e.to_string()))?;
    print!("{}", yaml);

    let unmatched: Vec<&str> = data
        .headers
        .iter()
        .filter(|h| !suggestions.iter().any(|s| &s.source_column == *h))
        .map(String::as_str)
        .collect();
    if !unmatched.is_empty() {
        eprintln!("# no label found for: {}", unmatched.join(", "));
    }
    Ok(())
}

/// How the mappings for a run were put together.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct MappingPlan {
    pub mappings: MappingStore,
    pub recalled: usize,
    pub suggested: usize,
}

/// Explicit mappings win. Without any, remembered mappings are recalled.
/// With `suggest`, headers still unmapped get a suggested cell.
pub(crate) fn plan_mappings<S: KeyValueStore>(
    explicit: &MappingStore,
    headers: &[String],
    model: &GridModel,
    memory: Option<&MappingMemory<S>>,
    template_name: &str,
    suggest: bool,
) -> MappingPlan {
    let mut plan = MappingPlan {
        mappings: explicit.clone(),
        ..Default::default()
    };

    if plan.mappings.is_empty() {
        if let Some(recalled) = memory.and_then(|m| m.recall(headers, template_name)) {
            plan.recalled = recalled.len();
            plan.mappings = recalled;
        }
    }

    if suggest {
        for m in suggest_mappings(headers, model) {
            if plan.mappings.get(&m.source_column).is_none() {
                plan.mappings.add(m.source_column, m.target_cell);
                plan.suggested += 1;
            }
        }
    }
    plan
}

fn open_template(settings: &RunSettings) -> SheetfillResult<(std::sync::Arc<[u8]>, SheetFormat)> {
    let (bytes, format) = read_workbook_file(&settings.template)?;
    if !format.supports_batch() {
        return Err(SheetfillError::Config(format!(
            "Templates must be .xlsx or .xlsm files; {} is a .{} file.",
            settings.template.display(),
            format.extension()
        )));
    }
    if format.is_macro_enabled() {
        macro_warning();
        if !settings.accept_macro_loss {
            return Err(SheetfillError::Config(
                "Refusing to fill a macro-enabled template; pass --accept-macro-loss to continue."
                    .to_string(),
            ));
        }
    }
    Ok((bytes, format))
}

fn print_outcome_warnings(outcome: &BatchOutcome) {
    for err in &outcome.cell_failures {
        println!("   {} {}", "⚠️".yellow(), err.to_string().yellow());
    }
    for err in &outcome.row_failures {
        println!("   {} {}", "❌".red(), err.to_string().red());
    }
}

/// Execute the run command
pub fn run(settings: RunSettings) -> SheetfillResult<()> {
    println!("{}", "🔥 Sheetfill - Batch Fill".bold().green());
    println!("   Input:    {}", settings.input.display());
    println!("   Template: {}", settings.template.display());
    println!("   Output:   {}\n", settings.output.display());

    let (template, format) = open_template(&settings)?;

    if settings.verbose {
        println!("{}", "📖 Reading input data...".cyan());
    }
    let data = parse_input_file(&settings.input)?;
    if data.rows.is_empty() {
        return Err(SheetfillError::Config(format!(
            "{} has no data rows below its header row.",
            settings.input.display()
        )));
    }

    if settings.verbose {
        println!("{}", "📊 Reading template grid...".cyan());
    }
    let model = excel::extract_grid_from_bytes(&template, format, settings.sheet.as_deref())?;

    let name = template_name(&settings.template);
    let mut memory = settings
        .store
        .as_ref()
        .map(|path| MappingMemory::new(JsonFileStore::new(path)));
    let plan = plan_mappings(
        &settings.mappings,
        &data.headers,
        &model,
        memory.as_ref(),
        &name,
        settings.suggest,
    );
    if plan.recalled > 0 {
        println!("   Recalled {} mappings from the last run", plan.recalled);
    }
    if plan.suggested > 0 {
        println!("   Suggested {} mappings from template labels", plan.suggested);
    }
    if plan.mappings.is_empty() {
        return Err(SheetfillError::Config(
            "No mappings: give --map SOURCE=CELL, a job file with mappings, or --suggest."
                .to_string(),
        ));
    }

    for m in &plan.mappings {
        println!("   {} → {}", m.source_column.bright_blue(), m.target_cell.bold());
    }
    for issue in plan.mappings.validate(&data.headers, Some(&model)) {
        println!("   {} {}", "⚠️".yellow(), issue.to_string().yellow());
    }
    println!();

    let outcome = run_template_batch(
        &template,
        format,
        settings.sheet.as_deref(),
        &data.rows,
        plan.mappings.as_slice(),
        |percent| {
            print!("\r   ⏳ {:>3}%", percent);
            let _ = std::io::stdout().flush();
        },
    )?;
    println!();
    print_outcome_warnings(&outcome);

    if outcome.artifacts.is_empty() {
        return Err(SheetfillError::Archive(
            "every row failed; nothing to archive".to_string(),
        ));
    }

    let archive = assemble_archive(&outcome.artifacts, &data.rows)?;
    if let Some(parent) = settings.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&settings.output, &archive.bytes)?;
    debug!(path = %settings.output.display(), bytes = archive.bytes.len(), "archive written");

    if let Some(memory) = memory.as_mut() {
        memory.remember(&data.headers, &name, &plan.mappings);
    }

    for dup in &archive.duplicate_names {
        println!(
            "   {} several rows are named {}; only the last one is in the archive",
            "⚠️".yellow(),
            dup.bold()
        );
    }

    if outcome.skipped_rows() > 0 {
        println!(
            "{}",
            format!(
                "⚠️  Finished with {} of {} rows skipped",
                outcome.skipped_rows(),
                outcome.total_rows
            )
            .bold()
            .yellow()
        );
    } else {
        println!("{}", "✅ Batch Complete!".bold().green());
    }
    println!(
        "   {} files in {}\n",
        archive.entries.len(),
        settings.output.display()
    );
    Ok(())
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
