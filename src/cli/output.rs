//! Console output and progress display

use crate::cli::args::VerbosityLevel;
use crate::core::ingest::IngestReport;
use crate::core::track::TrackRecord;
use crate::platform::cipher::DecoderProgram;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct OutputFormatter {
    verbosity: VerbosityLevel,
}

impl OutputFormatter {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self { verbosity }
    }

    fn is_quiet(&self) -> bool {
        self.verbosity == VerbosityLevel::Quiet
    }

    /// Spinner shown while a listing is ingested
    pub fn spinner(&self, message: &str) -> Option<ProgressBar> {
        if self.is_quiet() {
            return None;
        }

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed}] {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        Some(spinner)
    }

    pub fn info(&self, message: &str) {
        if !self.is_quiet() {
            println!("{} {}", "info:".cyan().bold(), message);
        }
    }

    pub fn success(&self, message: &str) {
        if !self.is_quiet() {
            println!("{} {}", "done:".green().bold(), message);
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.is_quiet() {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        }
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "error:".red().bold(), message);
    }

    pub fn print_report(&self, report: &IngestReport) {
        if self.is_quiet() {
            return;
        }
        println!(
            "{} {} new tracks in \"{}\" ({} pages)",
            "done:".green().bold(),
            report.added_count(),
            report.label,
            report.pages
        );
    }

    pub fn print_tracks(&self, tracks: &[TrackRecord]) {
        for (index, track) in tracks.iter().enumerate() {
            let duration = track
                .duration
                .map(|secs| format_duration(Duration::from_secs(secs)))
                .unwrap_or_else(|| "?".to_string());
            println!(
                "{:>4}. {} {} {}",
                index + 1,
                track.title.bold(),
                format!("[{}]", duration).dimmed(),
                track.permalink.dimmed()
            );
        }
    }

    pub fn print_program(&self, program: &DecoderProgram) {
        if program.is_empty() {
            self.warning("Extracted program has no steps");
            return;
        }
        for (index, step) in program.steps().iter().enumerate() {
            println!("{:>3}. {:?}({})", index + 1, step.mutator, step.param);
        }
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    if total_seconds < 60 {
        format!("{}s", total_seconds)
    } else if total_seconds < 3600 {
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        if seconds == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    } else {
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}
