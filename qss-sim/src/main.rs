use clap::Parser;

fn main() -> anyhow::Result<()> {
    let options = qss_sim::options::QssSimOptions::try_parse()?;

    let _logger = flexi_logger::Logger::try_with_env()?.start()?;

    let (outputs, stats) = qss_sim::simulate(&options)?;

    log::info!(
        "Simulation finished at t = {:.3} after {} steps ({} requantizations, {} crossings).",
        stats.end_time,
        stats.num_steps,
        stats.num_qss_events,
        stats.num_zc_events
    );

    if let Some(output_file) = options.output_file {
        let file = std::fs::File::create(output_file)?;
        arrow::csv::writer::WriterBuilder::new()
            .with_header(true)
            .build(file)
            .write(&outputs)?;
    } else {
        println!(
            "Outputs:\n{}",
            arrow::util::pretty::pretty_format_batches(&[outputs])?
        );
    }

    Ok(())
}
