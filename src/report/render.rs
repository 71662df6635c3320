//! Markdown rendering of a report

use std::fmt::Write;

use super::Report;

const ZWSP_FENCE: &str = "`\u{200B}`\u{200B}`";

const MATCH: &str = "  - Match: ";
const ERROR: &str = "  - Error: ";

/// Fenced code block. Lines after the opening fence are indented by `indent`
/// so the block lines up under a list item prefix.
pub fn code_block(content: &str, indent: usize) -> String {
    let pad = " ".repeat(indent);
    let body = content
        .replace("```", ZWSP_FENCE)
        .split('\n')
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!("```\n{body}\n{pad}```")
}

/// Render the full text report
pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Vencord Report{}", report.channel.suffix());

    if let Some(fatal) = &report.fatal {
        section(&mut out, "Fatal Error", &[code_block(fatal, 0)]);
    }

    let patches: Vec<String> = report
        .bad_patches
        .iter()
        .map(|p| {
            let mut entry = format!(
                "- {} ({})\n  - ID: `{}`\n{MATCH}{}",
                p.plugin,
                p.kind,
                p.id,
                code_block(&p.match_text, MATCH.len())
            );
            if let Some(error) = &p.error {
                let _ = write!(entry, "\n{ERROR}{}", code_block(error, ERROR.len()));
            }
            entry
        })
        .collect();
    section(&mut out, "Bad Patches", &patches);

    section(&mut out, "Bad Webpack Finds", &list(&report.bad_webpack_finds));

    let starts: Vec<String> = report
        .bad_starts
        .iter()
        .map(|s| format!("- {}\n{ERROR}{}", s.plugin, code_block(&s.error, ERROR.len())))
        .collect();
    section(&mut out, "Bad Starts", &starts);

    section(&mut out, "Discord Errors", &list(&report.other_errors));
    section(&mut out, "Ignored Discord Errors", &list(&report.ignored_errors));

    out
}

fn list(items: &[String]) -> Vec<String> {
    items.iter().map(|item| format!("- {}", code_block(item, 2))).collect()
}

fn section(out: &mut String, title: &str, entries: &[String]) {
    let _ = writeln!(out, "\n## {title}");
    if entries.is_empty() {
        let _ = writeln!(out, "None");
    } else {
        for entry in entries {
            let _ = writeln!(out, "{entry}");
        }
    }
}
