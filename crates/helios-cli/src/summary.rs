use console::Style;
use helios_core::burst::BurstSummary;
use helios_core::kisip::DespeckleReport;
use helios_core::pipeline::config::RunConfig;
use helios_core::pipeline::CalibrationOutput;
use helios_core::transcribe::TranscribeSummary;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    warn: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            warn: Style::new().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_run_header(config: &RunConfig) {
    let s = Styles::new();
    let instrument = &config.instrument;

    println!();
    println!("  {}", s.title.apply_to("Helios Run"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(10)));
    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Instrument"),
        s.value.apply_to(&instrument.name)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Family"),
        s.value.apply_to(instrument.family)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Observed"),
        s.value
            .apply_to(format!("{} {}", instrument.obs_date, instrument.obs_time))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Burst size"),
        s.value.apply_to(instrument.burst_number)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Work"),
        s.path.apply_to(config.paths.work_base.display())
    );
    println!();
}

pub fn print_calibration(output: &CalibrationOutput) {
    let s = Styles::new();

    println!("  {}", s.header.apply_to("Calibration"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Geometry"),
        s.value.apply_to(output.geometry)
    );
    let zeros = output.reference.gain_zero_count;
    if zeros > 0 {
        println!(
            "    {:<14}{}",
            s.label.apply_to("Gain"),
            s.warn.apply_to(format!("{zeros} pixel(s) with zero denominator"))
        );
    }
    let failures = output.cache_write_failures();
    if failures > 0 {
        println!(
            "    {:<14}{}",
            s.label.apply_to("Caches"),
            s.warn.apply_to(format!("{failures} file(s) could not be written"))
        );
    }
    match &output.noise {
        Some(noise) => println!(
            "    {:<14}{}",
            s.label.apply_to("Noise"),
            s.path.apply_to(noise.path.display())
        ),
        None => println!(
            "    {:<14}{}",
            s.label.apply_to("Noise"),
            s.warn.apply_to("not available")
        ),
    }
    print_bursts(&s, &output.bursts);
    println!();
}

fn print_bursts(s: &Styles, bursts: &BurstSummary) {
    println!(
        "    {:<14}{}",
        s.label.apply_to("Bursts"),
        s.value.apply_to(format!(
            "{} in batch(es) {:?}",
            bursts.bursts_written, bursts.batches
        ))
    );
    if bursts.frames_dropped > 0 {
        println!(
            "    {:<14}{}",
            s.label.apply_to("Dropped"),
            s.warn.apply_to(format!("{} trailing frame(s)", bursts.frames_dropped))
        );
    }
}

pub fn print_despeckle(report: &DespeckleReport) {
    let s = Styles::new();

    println!("  {}", s.header.apply_to("Reconstruction"));
    for outcome in &report.outcomes {
        let state = if outcome.succeeded() {
            s.value.apply_to(outcome.state.to_string())
        } else {
            s.warn.apply_to(format!(
                "{} (exit {})",
                outcome.state,
                outcome
                    .exit_code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string())
            ))
        };
        println!(
            "    {:<14}{} ({} bursts)",
            s.label.apply_to(format!("Batch {:02}", outcome.batch())),
            state,
            outcome.indices.burst_count()
        );
    }
    println!();
}

pub fn print_transcription(summary: &TranscribeSummary) {
    let s = Styles::new();

    println!("  {}", s.header.apply_to("Transcription"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Written"),
        s.value.apply_to(summary.written)
    );
    if summary.failed > 0 {
        println!(
            "    {:<14}{}",
            s.label.apply_to("Failed"),
            s.warn.apply_to(summary.failed)
        );
    }
    if summary.missing_sidecars > 0 {
        println!(
            "    {:<14}{}",
            s.label.apply_to("No metadata"),
            s.warn.apply_to(summary.missing_sidecars)
        );
    }
    println!();
}
