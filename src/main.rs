use anyhow::Result;
use clap::Parser;
use huella::{cli::Cli, collector, disasm::OpcodeClassDisassembler, report::ReportGenerator};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = cli.into_config()?;
    let (tables, visit_count) = collector::profile_trace(&config)?;
    tracing::debug!(
        visits = visit_count,
        tables = tables.table_count(),
        entries = tables.entry_count(),
        "profiling pass finished"
    );

    let dis = OpcodeClassDisassembler;
    ReportGenerator::new(&config, &tables, visit_count, &dis).write_reports()
}
