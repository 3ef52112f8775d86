//! Display formatting utilities for CLI output

use colored::*;

use crate::server::models::{FeedbackRecord, Origin, Severity};
use crate::server::types::{GenerateDiagnosisResponse, StatusResponse};

const WRAP_WIDTH: usize = 80;

/// Wrap text to fit within a specified width
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
  let mut lines = Vec::new();

  for paragraph in text.split('\n') {
    if paragraph.trim().is_empty() {
      lines.push(String::new());
      continue;
    }

    let mut current_line = String::new();
    for word in paragraph.split_whitespace() {
      if current_line.is_empty() {
        current_line = word.to_string();
      } else if current_line.chars().count() + 1 + word.chars().count() <= width {
        current_line.push(' ');
        current_line.push_str(word);
      } else {
        lines.push(std::mem::take(&mut current_line));
        current_line = word.to_string();
      }
    }

    if !current_line.is_empty() {
      lines.push(current_line);
    }
  }

  lines
}

pub fn severity_label(severity: Severity) -> ColoredString {
  let label = severity.to_string();
  match severity {
    Severity::Low => label.green(),
    Severity::Medium => label.yellow(),
    Severity::High => label.red(),
    Severity::Critical => label.red().bold(),
  }
}

fn origin_label(origin: Origin) -> ColoredString {
  match origin {
    Origin::Ai => "ai".cyan(),
    Origin::User => "user".green(),
  }
}

fn tags_or_dash(tags: &[String]) -> String {
  if tags.is_empty() {
    "-".to_string()
  } else {
    tags.join(", ")
  }
}

/// Print a generated diagnosis with the exemplars it was grounded on
pub fn display_suggestion(response: &GenerateDiagnosisResponse) {
  println!("{}", "=== Suggested description ===".blue().bold());
  for line in wrap_text(&response.description_text, WRAP_WIDTH) {
    println!("{line}");
  }
  println!();

  let summary = &response.summary;
  println!("{} {}", "Severity:".bold(), severity_label(summary.severity));
  println!("{} {}", "Defects:".bold(), tags_or_dash(&summary.defect_tags));
  println!("{} {:.2}", "Confidence:".bold(), summary.confidence);
  if !summary.recommendations.is_empty() {
    println!("{} {}", "Recommendations:".bold(), summary.recommendations);
  }

  match response.feedback_id {
    Some(id) => println!("{} {}", "Feedback id:".bold(), id.to_string().yellow()),
    None => println!("{} {}", "Feedback id:".bold(), "not recorded".red()),
  }

  if response.exemplars.is_empty() {
    println!("\n{}", "No validated examples matched this context.".dimmed());
    return;
  }

  println!("\n{}", "Grounded on:".bold());
  for (i, exemplar) in response.exemplars.iter().enumerate() {
    println!(
      "  {}. [{:.1}% {}] {}",
      i + 1,
      exemplar.similarity_percent,
      origin_label(exemplar.origin),
      exemplar.text
    );
  }
}

/// Print the ledger history of one photo
pub fn display_history(photo_id: &str, records: &[FeedbackRecord]) {
  if records.is_empty() {
    println!("No feedback recorded for photo {}", photo_id.yellow());
    return;
  }

  println!("{} {}", "Feedback for photo".bold(), photo_id.yellow().bold());
  for record in records {
    let state = if record.is_superseded() {
      "superseded".dimmed()
    } else if record.validated {
      "validated".green()
    } else {
      "draft".yellow()
    };

    println!(
      "\n{} {} {} {}",
      record.created_at.format("%Y-%m-%d %H:%M:%S").to_string().cyan(),
      origin_label(record.origin),
      state,
      record.id.to_string().dimmed()
    );
    if let Some(parent) = record.parent_feedback_id {
      println!("  {} {}", "edited from".dimmed(), parent.to_string().dimmed());
    }
    for line in wrap_text(&record.description, WRAP_WIDTH - 2) {
      println!("  {line}");
    }
    println!("  {} {}", "Defects:".bold(), tags_or_dash(&record.tags));
  }
}

pub fn display_status(status: &StatusResponse) {
  println!("{} {}", "Status:".bold(), status.status.green());
  println!("{} {}", "Version:".bold(), status.version);
  println!("{} {}", "Data root:".bold(), status.data_root);
  println!("{} {}", "Index backend:".bold(), status.index_backend);
  println!("{} {}", "Feedback records:".bold(), status.feedback_records);
  println!("{} {}", "Indexed embeddings:".bold(), status.indexed_embeddings);
}
