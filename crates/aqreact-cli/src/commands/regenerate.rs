use crate::cli::RegenerateArgs;
use crate::error::Result;
use aqreact::core::grid::{GridShape, StructuredGrid};
use aqreact::engine::replay::RecordingSink;
use aqreact::workflows::regenerate::Regenerator;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::info;

pub fn run(args: RegenerateArgs) -> Result<()> {
    let shape = GridShape::new(args.nlay, args.nrow, args.ncol);
    let grid = StructuredGrid::new(shape);

    info!(
        workdir = %args.workdir.display(),
        nlay = shape.nlay,
        nrow = shape.nrow,
        ncol = shape.ncol,
        "Opening working directory."
    );
    let mut regenerator = Regenerator::open(&args.workdir, args.template.clone())?;
    regenerator.validate_external_files(shape)?;

    if args.check_only {
        println!("All external files present for {} cells.", shape.ncell());
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static spinner template"),
    );
    spinner.set_message("Regenerating reaction-engine inputs...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let mut engine = RecordingSink::new();
    let report = regenerator.regenerate(&grid, &mut engine)?;
    spinner.finish_and_clear();

    println!("Regenerated inputs for {} cells.", report.total_cells);
    println!(
        "  replay: {} applied, {} deferred, {} skipped, {} failed",
        report.replay.applied, report.replay.deferred, report.replay.skipped, report.replay.failed
    );
    println!("  command log written to '{}'", report.log_path.display());
    Ok(())
}
