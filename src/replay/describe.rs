//! Human-readable descriptions of failed module searches

use crate::host::{SearchArg, SearchRecord};
use crate::utils::truncate_chars;

/// Rendered in place of the host's documented chunk-extraction pattern
pub const DEFAULT_EXTRACT_REGEX_NAME: &str = "DefaultExtractAndLoadChunksRegex";

/// Filter sources longer than this are cut to `FILTER_KEEP` chars plus `...`
const FILTER_MAX: usize = 150;
const FILTER_KEEP: usize = 147;

/// Search kinds whose first argument is a filter function
const FILTER_FINDS: [&str; 3] = ["find", "proxyLazyWebpack", "LazyComponentWebpack"];

/// Pick the finder a recorded search is replayed with
pub fn resolve_method<'a>(kind: &'a str, args: &[SearchArg]) -> &'a str {
    match kind {
        "findComponent" => "find",
        "findExportedComponent" => "findByProps",
        "waitFor" | "waitForComponent" => match args.first() {
            Some(SearchArg::String { .. } | SearchArg::Strings { .. }) => "findByProps",
            _ => "find",
        },
        "waitForStore" => "findStore",
        other => other,
    }
}

/// Describe a search that no longer resolves
pub fn describe(record: &SearchRecord) -> String {
    let kind = record.kind.as_str();
    let args = &record.args;

    let inner = if FILTER_FINDS.contains(&kind) {
        args.first().map(describe_filter).unwrap_or_default()
    } else if kind == "extractAndLoadChunks" {
        describe_extract(args)
    } else if kind == "mapMangledModule" {
        describe_mapper(args)
    } else {
        args.iter()
            .map(|arg| quote(&arg.to_js_string()))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!("{kind}({inner})")
}

fn quote(s: &str) -> String {
    format!("\"{s}\"")
}

fn describe_filter(arg: &SearchArg) -> String {
    match arg {
        SearchArg::Filter {
            props: Some(props), ..
        } => props.iter().map(|p| quote(p)).collect::<Vec<_>>().join(", "),
        SearchArg::Filter { source, .. } if source.chars().count() > FILTER_MAX => {
            format!("{}...", truncate_chars(source, FILTER_KEEP))
        }
        other => other.to_js_string(),
    }
}

fn describe_extract(args: &[SearchArg]) -> String {
    let code: Vec<String> = match args.first() {
        Some(SearchArg::Strings { values }) => values.iter().map(|v| quote(v)).collect(),
        Some(other) => vec![quote(&other.to_js_string())],
        None => Vec::new(),
    };

    let matcher = match args.get(1) {
        None | Some(SearchArg::Regex { default: true, .. }) => DEFAULT_EXTRACT_REGEX_NAME.to_string(),
        Some(other) => other.to_js_string(),
    };

    format!("[{}], {matcher}", code.join(", "))
}

fn describe_mapper(args: &[SearchArg]) -> String {
    let code = match args.first() {
        Some(SearchArg::Strings { values }) => values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(", "),
        Some(other) => quote(&other.to_js_string()),
        None => String::new(),
    };

    let entries = match args.get(1) {
        Some(SearchArg::Mapper { entries }) => entries
            .iter()
            .map(|entry| format!("\t{}: {},\n", entry.key, describe_filter(&entry.value)))
            .collect::<String>(),
        _ => String::new(),
    };

    format!("{code}, {{\n{entries}}}")
}
