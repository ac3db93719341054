/// Console output shared by the subcommands
use colored::*;

/// Outcome marker printed in front of a step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepStatus {
    Complete,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn symbol(&self) -> &str {
        match self {
            StepStatus::Complete => "✓",
            StepStatus::Failed => "✗",
            StepStatus::Skipped => "─",
        }
    }

    pub fn colored_symbol(&self) -> ColoredString {
        match self {
            StepStatus::Complete => self.symbol().green(),
            StepStatus::Failed => self.symbol().red(),
            StepStatus::Skipped => self.symbol().dimmed(),
        }
    }
}

pub fn section_header(title: &str) {
    println!("\n{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

pub fn step(status: StepStatus, message: &str) {
    println!("{} {}", status.colored_symbol(), message);
}

/// `├─ label: value` or `└─ label: value` for the last item
pub fn tree_item(last: bool, label: &str, value: &str) {
    let branch = if last { "└─" } else { "├─" };
    println!("  {} {}: {}", branch.dimmed(), label, value.cyan());
}
