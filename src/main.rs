mod cli;

use clap::Parser;
use cli::Args;

use defrag_engine::testing::FakeVolume;
use defrag_engine::{EngineConfig, Engine, LoggingReporter};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = Args::parse();
    args.validate()?;

    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    println!("defrag-engine v0.1.0");
    println!("{}", "=".repeat(60));
    println!();
    println!("Configuration:");
    println!("  Path:               {}", args.path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<bundled demo volume>".into()));
    println!("  Mode:               {}", args.mode);
    println!("  Speed:              {}%", args.speed);
    println!("  Free space:         {}%", args.free_space);
    println!("  Debug level:        {}", args.debug_level);
    println!("  Quit on finish:     {}", args.quit_on_finish);
    println!("  Ignore MFT excludes:{}", args.ignore_mft_excludes);
    println!("  Enable MFT move:    {}", args.enable_mft_move);
    println!();

    let config = EngineConfig::build(
        args.path.clone(),
        args.mode,
        args.speed,
        args.free_space,
        args.debug_level,
        args.log_file.clone(),
        &args.exclude,
        &args.space_hog,
        args.quit_on_finish,
        args.ignore_mft_excludes,
        args.enable_mft_move,
        args.disable_default_hogs,
        args.json_report.clone(),
    )
    .map_err(|e| e.to_string())?;

    // No real OS volume enumerator is in scope for this build; run against
    // the bundled in-memory volume so the CLI is demonstrable end to end.
    let volume = demo_volume();

    let mut engine = Engine::new(volume, config);
    let report = engine.run(&LoggingReporter).map_err(|e| e.to_string())?;

    println!("Run complete.");
    println!("  Items analyzed:        {}", report.items_analyzed);
    println!("  Items moved:           {}", report.items_moved);
    println!("  Moves issued:          {}", report.moves_issued);
    println!("  Items marked unmovable:{}", report.items_marked_unmovable);
    println!("  Disk-full events:      {}", report.disk_full_events);
    println!("  Cancelled:             {}", report.cancelled);
    println!("  Elapsed:               {} ms", report.elapsed_ms);

    if let Some(path) = &args.json_report {
        report.write_to(path).map_err(|e| e.to_string())?;
        println!("  JSON report written to {}", path.display());
    }

    if args.quit_on_finish {
        std::process::exit(0);
    }
    Ok(())
}

fn demo_volume() -> FakeVolume {
    use defrag_engine::Fragment;
    use defrag_engine::{Lcn, Vcn};

    let mut volume = FakeVolume::new(20_000, 4096);
    volume.add_fragmented_file(
        "C:\\Users\\demo\\report.docx",
        vec![Fragment { lcn: Lcn::new(100), next_vcn: Vcn::new(20) }, Fragment { lcn: Lcn::new(5_000), next_vcn: Vcn::new(40) }],
        false,
    );
    volume.add_file("C:\\Windows\\System32\\ntoskrnl.exe", Lcn::new(10_000), 200, false);
    volume.add_file("C:\\Users\\demo\\Videos\\movie.mkv", Lcn::new(15_000), 500, false);
    volume
}
