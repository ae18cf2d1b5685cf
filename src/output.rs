use std::io::{self, Write};

use crossterm::style::Stylize;
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunReport};
use crate::domain::DownloadStatus;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable progress on stderr.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let line = render_event(&event.message);
        match event.elapsed {
            Some(elapsed) => eprintln!("{line} {}", format!("({:.1}s)", elapsed.as_secs_f64()).dim()),
            None => eprintln!("{line}"),
        }
    }
}

fn render_event(message: &str) -> String {
    if let Some(rest) = message.strip_prefix("phase=") {
        let (phase, detail) = rest.split_once(';').unwrap_or((rest, ""));
        return format!("{} {}", format!("[{phase}]").cyan().bold(), detail.trim());
    }
    for (prefix, label) in [
        ("download.ok ", "✅ saved"),
        ("download.cached ", "♻️  present"),
        ("download.skipped ", "⏭️  skipped"),
        ("download.failed ", "❌ failed"),
        ("expand.failed ", "⚠️  expansion failed"),
    ] {
        if let Some(detail) = message.strip_prefix(prefix) {
            return format!("   {label}: {detail}");
        }
    }
    message.to_string()
}

impl ConsoleOutput {
    pub fn print_summary(report: &RunReport) {
        let downloads = &report.downloads;
        println!();
        println!("{}", "📚 paper-fetcher summary".cyan().bold());
        println!("   Seed: {} ({})", report.seed_title, report.seed_id);
        println!(
            "   Papers discovered: {} (depth {}{})",
            report.discovered,
            report.max_depth,
            if report.truncated { ", capped" } else { "" }
        );
        println!(
            "   {}",
            format!(
                "PDFs saved: {} new, {} already present",
                downloads.downloaded, downloads.already_present
            )
            .green()
        );
        println!(
            "   {}",
            format!(
                "Without PDF: {} skipped, {} failed",
                downloads.skipped, downloads.failed
            )
            .yellow()
        );
        if report.expansion_failures > 0 {
            println!(
                "   {}",
                format!("Expansion failures: {}", report.expansion_failures).red()
            );
        }
        for item in &report.papers {
            let marker = match item.status {
                DownloadStatus::Downloaded | DownloadStatus::AlreadyPresent => "⬇️",
                DownloadStatus::Skipped => "•",
                DownloadStatus::Failed => "✗",
                DownloadStatus::Pending => "?",
            };
            println!("   {marker} [d{}] {}", item.depth, item.title);
        }
        println!("   PDFs saved to: {}/", report.output_dir);
        println!("   Metadata saved to: {}", report.metadata_path);
    }
}
