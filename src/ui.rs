use std::io::{self, IsTerminal};

use crate::app::CaseListEntry;
use crate::autosave::SaveStatus;
use crate::case_id::display_id;
use crate::domain::case_meta::CaseMeta;
use crate::domain::form_data::FormData;
use crate::repository::StorageUsage;

const USAGE_WARN_PERCENT: f64 = 80.0;

pub fn print_case_list(cases: &[CaseListEntry]) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Cases"));
    if cases.is_empty() {
        println!("{}", palette.dim("no cases stored"));
        return;
    }
    for entry in cases {
        println!("{}", format_case_row(entry, &palette));
    }
    println!("{}", palette.dim(&format!("{} case(s)", cases.len())));
}

pub fn print_case(meta: &CaseMeta, doc: &FormData) {
    let palette = Palette::auto();
    println!("{} {}", palette.id(&display_id(&meta.id)), meta.name);
    println!("{}", palette.dim(&format!("created {}", meta.created)));
    println!(
        "{}",
        palette.dim(&format!("last modified {}", meta.last_modified))
    );
    match doc.to_pretty() {
        Ok(text) => println!("{text}"),
        Err(err) => println!("{}", palette.warn(&format!("document unreadable: {err}"))),
    }
}

pub fn print_usage(usage: &StorageUsage) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Storage"));
    let line = format_usage_line(usage);
    if usage.percent_used >= USAGE_WARN_PERCENT {
        println!("{}", palette.warn(&line));
    } else {
        println!("{line}");
    }
    println!(
        "{}",
        palette.dim(&format!(
            "{} key(s), {} case document(s)",
            usage.keys, usage.case_documents
        ))
    );
}

pub fn status_label(status: &SaveStatus) -> String {
    let palette = Palette::auto();
    match status {
        SaveStatus::Saved => palette.saved("saved"),
        SaveStatus::Unsaved => palette.dim("unsaved changes"),
        SaveStatus::Failed(message) => palette.warn(&format!("save failed: {message}")),
    }
}

fn format_case_row(entry: &CaseListEntry, palette: &Palette) -> String {
    let marker = if entry.current { "*" } else { " " };
    format!(
        "{} {} {} {}",
        marker,
        palette.id(&display_id(&entry.meta.id)),
        entry.meta.name,
        palette.dim(&entry.meta.last_modified)
    )
}

fn format_usage_line(usage: &StorageUsage) -> String {
    format!(
        "{} of {} used ({:.1}%)",
        human_bytes(usage.used),
        human_bytes(usage.quota),
        usage.percent_used
    )
}

fn human_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn saved(&self, text: &str) -> String {
        self.paint("32", text)
    }

    fn warn(&self, text: &str) -> String {
        self.paint("1;31", text)
    }
}
