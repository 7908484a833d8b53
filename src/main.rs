use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use badminton_analyzer_rust::{AnalysisPipeline, AnalysisReport, Config, RallySegmentation, WindowSource};

fn cli() -> Command {
    let video_arg = Arg::new("video")
        .value_name("VIDEO")
        .help("Match video (mp4, avi, mov, mkv)")
        .required(true);
    let windows_arg = Arg::new("windows")
        .short('w')
        .long("windows")
        .value_name("FILE")
        .help("Rally windows JSON file ({\"rallies\": [{\"start\": .., \"end\": ..}]})");

    Command::new("Badminton Rally Analyzer (Rust)")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Rally segmentation and per-rally analysis of badminton matches with Gemini")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("segment")
                .about("Detect rally windows in a match video")
                .arg(video_arg.clone())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Where to write the windows JSON (stdout when omitted)"),
                ),
        )
        .subcommand(
            Command::new("split")
                .about("Cut a match video into one clip per rally window")
                .arg(video_arg.clone())
                .arg(windows_arg.clone().required(true)),
        )
        .subcommand(
            Command::new("analyze")
                .about("Segment, split and analyze a whole match")
                .arg(video_arg)
                .arg(windows_arg),
        )
        .subcommand(
            Command::new("analyze-clips")
                .about("Analyze rally clips already present in a directory")
                .arg(
                    Arg::new("dir")
                        .value_name("DIR")
                        .help("Directory of rally clips")
                        .default_value("video_segments"),
                ),
        )
}

fn init_logging(verbose: bool, log_level: &str) {
    let default_filter = if verbose {
        "badminton_analyzer_rust=debug,info".to_string()
    } else {
        format!("badminton_analyzer_rust={},warn", log_level)
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn path_arg(matches: &ArgMatches, name: &str) -> Result<PathBuf> {
    matches
        .get_one::<String>(name)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("missing argument <{}>", name))
}

async fn load_windows(matches: &ArgMatches) -> Result<Option<RallySegmentation>> {
    match matches.get_one::<String>("windows") {
        Some(file) => {
            let segmentation = RallySegmentation::from_file(Path::new(file))
                .await
                .with_context(|| format!("Invalid windows file {}", file))?;
            Ok(Some(segmentation))
        }
        None => Ok(None),
    }
}

fn print_report(report: &AnalysisReport) {
    let summary = &report.summary;
    if let Some(video) = &report.source_info {
        info!(
            "📹 {}: {}x{}, {:.1}fps, {}",
            video.filename, video.width, video.height, video.fps, video.format
        );
    }
    info!("🎉 Analysis complete: {} rallies", summary.rally_count);
    info!(
        "🏸 {} {} - {} {}",
        summary.player1.as_deref().unwrap_or("Player1"),
        summary.score.player1,
        summary.score.player2,
        summary.player2.as_deref().unwrap_or("Player2"),
    );
    info!("✅ Analyzed: {}", summary.stats.analyzed);
    info!("❌ Failed: {}", summary.stats.failed);
    for entry in summary.failed() {
        warn!("   - rally {}: {:?}", entry.index, entry.outcome);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let matches = cli().get_matches();

    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    init_logging(matches.get_flag("verbose"), &config.output.log_level);

    info!("🚀 Badminton Rally Analyzer (Rust) starting...");
    info!("{}", config.summary());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupted, cancelling...");
            ctrl_c.cancel();
        }
    });

    let pipeline = AnalysisPipeline::from_config(config).await?;
    let start_time = std::time::Instant::now();

    match matches.subcommand() {
        Some(("segment", args)) => {
            let video = path_arg(args, "video")?;
            let segmentation = pipeline.segment(&video, &cancel).await?;
            let json_data = serde_json::to_string_pretty(&segmentation)?;

            match args.get_one::<String>("output") {
                Some(file) => {
                    tokio::fs::write(file, json_data).await?;
                    info!("💾 {} rally windows saved to: {}", segmentation.rallies.len(), file);
                }
                None => println!("{}", json_data),
            }
        }
        Some(("split", args)) => {
            let video = path_arg(args, "video")?;
            let windows = load_windows(args)
                .await?
                .ok_or_else(|| anyhow!("--windows is required"))?;

            let results = pipeline.split(&video, &windows.rallies).await?;
            let mut failed = 0;
            for result in &results {
                match result {
                    Ok(clip) => info!("Saved segment {}: {}", clip.index, clip.path.display()),
                    Err(e) => {
                        failed += 1;
                        error!("{}", e);
                    }
                }
            }
            info!("✂️ {} clips written, {} failed", results.len() - failed, failed);
        }
        Some(("analyze", args)) => {
            let video = path_arg(args, "video")?;
            let windows = match load_windows(args).await? {
                Some(segmentation) => WindowSource::Fixed(segmentation.rallies),
                None => WindowSource::Detect,
            };

            let report = pipeline.run(&video, windows, &cancel).await?;
            print_report(&report);
        }
        Some(("analyze-clips", args)) => {
            let dir = path_arg(args, "dir")?;
            let report = pipeline.analyze_clips(&dir, &cancel).await?;
            print_report(&report);
        }
        _ => return Err(anyhow!("unknown command")),
    }

    info!("⏱️ Finished in {:.2}s", start_time.elapsed().as_secs_f64());

    if cancel.is_cancelled() {
        return Err(anyhow!("run was cancelled"));
    }
    Ok(())
}
