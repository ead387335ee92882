mod course;
mod error;
mod narration;
mod parser;
mod settings;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use course::{build_course, BuildReport, Course};
use narration::AudioManifest;
use settings::{CourseSettings, Settings};

#[derive(Parser)]
#[command(name = "coursepack", about = "Rebuild course structure from extracted PDF text and paginate it")]
struct Cli {
    /// Course configuration file
    #[arg(short, long, global = true, default_value = "courses.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean, structure and paginate every configured course into Course JSON
    Build {
        /// Only build this course (default: all)
        #[arg(long)]
        course: Option<String>,
        /// Output directory (default: output_dir from the config)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Re-paginate an existing course file (legacy chapters or pages)
    Paginate {
        input: PathBuf,
        /// Where to write the result (default: overwrite the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Export speakable text per page and the per-voice audio manifest
    Narrate {
        /// Directory holding built course JSON (default: output_dir from the config)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Page statistics for course files
    Stats {
        /// Course JSON files (default: every built course)
        files: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build { course, out } => {
            let settings = load_settings(&cli.config)?;
            let selected = select_courses(&settings, course.as_deref())?;
            let out_dir = out.unwrap_or_else(|| settings.output_dir.clone());
            let reports = build_courses(&settings, &selected, &out_dir)?;
            for report in &reports {
                report.print();
            }
            println!("Wrote {} courses to {}", reports.len(), out_dir.display());
            Ok(())
        }
        Commands::Paginate { input, output } => {
            let settings = load_settings(&cli.config)?;
            let course = read_course(&input)?;
            let before = course.pages.len();
            let paged = course.repaginate(&settings.pagination);
            let target = output.unwrap_or(input);
            write_json(&target, &paged.to_json_pretty()?)?;
            println!(
                "{}: {} entries -> {} pages ({} chapters), written to {}",
                paged.course_id,
                before,
                paged.total_pages,
                paged.total_chapters,
                target.display()
            );
            Ok(())
        }
        Commands::Narrate { dir } => {
            let settings = load_settings(&cli.config)?;
            let dir = dir.unwrap_or_else(|| settings.output_dir.clone());
            let courses = settings
                .courses
                .iter()
                .map(|c| read_course(&course_path(&dir, &c.course_id)))
                .collect::<anyhow::Result<Vec<_>>>()?;
            narrate(&settings, &courses, &dir)
        }
        Commands::Stats { files } => {
            let files = if files.is_empty() {
                let settings = load_settings(&cli.config)?;
                settings
                    .courses
                    .iter()
                    .map(|c| course_path(&settings.output_dir, &c.course_id))
                    .collect()
            } else {
                files
            };
            print_stats(&files)
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let settings = Settings::load(path).with_context(|| format!("loading {}", path.display()))?;
    info!(config = %path.display(), courses = settings.courses.len(), "configuration loaded");
    Ok(settings)
}

fn select_courses<'a>(settings: &'a Settings, only: Option<&str>) -> anyhow::Result<Vec<&'a CourseSettings>> {
    match only {
        Some(id) => match settings.course(id) {
            Some(c) => Ok(vec![c]),
            None => bail!("no course `{id}` in the configuration"),
        },
        None => Ok(settings.courses.iter().collect()),
    }
}

fn course_path(dir: &Path, course_id: &str) -> PathBuf {
    dir.join(format!("{course_id}.json"))
}

/// Sources are all read before any work starts; one unreadable file stops the run.
fn build_courses(settings: &Settings, selected: &[&CourseSettings], out_dir: &Path) -> anyhow::Result<Vec<BuildReport>> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let mut jobs = Vec::with_capacity(selected.len());
    for course in selected {
        let raw = error::read_source(&course.source)?;
        let patterns = course.patterns()?;
        jobs.push((*course, raw, patterns));
    }

    let pb = ProgressBar::new(jobs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let options = settings.structure.segment_options();
    let built: Vec<(Course, BuildReport)> = jobs
        .par_iter()
        .map(|(course, raw, patterns)| {
            let result = build_course(&course.meta(), raw, patterns, &options, &settings.pagination);
            pb.inc(1);
            pb.set_message(course.course_id.clone());
            result
        })
        .collect();
    pb.finish_and_clear();

    std::fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let mut reports = Vec::with_capacity(built.len());
    for (course, report) in built {
        write_json(&course_path(out_dir, &course.course_id), &course.to_json_pretty()?)?;
        reports.push(report);
    }
    Ok(reports)
}

fn narrate(settings: &Settings, courses: &[Course], dir: &Path) -> anyhow::Result<()> {
    let narration_dir = dir.join("narration");
    std::fs::create_dir_all(&narration_dir).with_context(|| format!("creating {}", narration_dir.display()))?;

    let max_chunk = settings.narration.max_chunk_chars;
    for course in courses {
        let units = narration::narration_units(course, max_chunk);
        let path = course_path(&narration_dir, &course.course_id);
        write_json(&path, &serde_json::to_string_pretty(&units)?)?;
        println!("{}: {} narration units", course.course_id, units.len());
    }

    let audio_dir = dir.join("audio");
    std::fs::create_dir_all(&audio_dir).with_context(|| format!("creating {}", audio_dir.display()))?;
    let manifest = AudioManifest::build(
        courses,
        &settings.narration.voices,
        &settings.narration.default_voice,
        &audio_dir,
    );
    let manifest_path = audio_dir.join("manifest.json");
    write_json(&manifest_path, &serde_json::to_string_pretty(&manifest)?)?;

    println!(
        "Manifest: {} voices, {} audio files -> {}",
        manifest.voices.len(),
        manifest.recordings(),
        manifest_path.display()
    );
    Ok(())
}

fn print_stats(files: &[PathBuf]) -> anyhow::Result<()> {
    println!(
        "{:<24} | {:>8} | {:>5} | {:>7} | {:>5} | {:>5} | {:>5}",
        "Course", "Chapters", "Pages", "Words", "Min", "Mean", "Max"
    );
    println!("{}", "-".repeat(78));
    for path in files {
        let course = read_course(path)?;
        let s = course.stats();
        println!(
            "{:<24} | {:>8} | {:>5} | {:>7} | {:>5} | {:>5} | {:>5}",
            truncate(&course.course_id, 24),
            s.chapters,
            s.pages,
            s.words,
            s.shortest,
            s.mean(),
            s.longest
        );
    }
    Ok(())
}

fn read_course(path: &Path) -> anyhow::Result<Course> {
    let json = error::read_source(path)?;
    Course::from_json(&json).with_context(|| format!("parsing {}", path.display()))
}

fn write_json(path: &Path, json: &str) -> anyhow::Result<()> {
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
