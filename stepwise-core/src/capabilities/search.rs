use super::{resolve, str_arg, truncate_chars};
use crate::tooling::{Capability, CapabilityError, RejectionKind, Validation};
use crate::types::Arguments;
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::task;

const GLOB_PREVIEW: usize = 10;
const DEFAULT_MAX_MATCHES: usize = 20;
const MATCHES_PER_FILE: usize = 3;
const SAMPLES_PER_FILE: usize = 5;
const SAMPLE_LINE_CHARS: usize = 100;

fn expand_pattern(workdir: &Path, pattern: &str) -> Result<Vec<PathBuf>, CapabilityError> {
    let rooted = resolve(workdir, pattern);
    let paths = glob::glob(&rooted.to_string_lossy())
        .map_err(|err| CapabilityError::Pattern(err.to_string()))?;
    Ok(paths
        .filter_map(Result::ok)
        .map(|path| std::path::absolute(&path).unwrap_or(path))
        .collect())
}

pub struct GlobTool {
    workdir: PathBuf,
}

impl GlobTool {
    pub fn new(workdir: PathBuf) -> Self {
        Self { workdir }
    }
}

#[async_trait]
impl Capability for GlobTool {
    fn name(&self) -> &str {
        "GlobTool"
    }

    fn describe(&self) -> String {
        "Find files using glob patterns. Required parameter: 'pattern' (e.g., 'src/**/*.py'). \
         Optional: 'ignore' (list of paths to exclude). Returns absolute paths."
            .into()
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn validate(&self, args: &Arguments) -> Validation {
        let Some(pattern) = str_arg(args, "pattern") else {
            return Validation::missing("pattern");
        };
        if let Err(err) = glob::Pattern::new(pattern) {
            return Validation::reject(
                RejectionKind::InvalidArgument,
                format!("Invalid glob pattern: {err}"),
            );
        }
        match args.get("ignore") {
            None | Some(Value::Array(_)) => Validation::accept(),
            Some(_) => Validation::reject(
                RejectionKind::InvalidArgument,
                "Parameter 'ignore' must be a list of paths",
            ),
        }
    }

    async fn execute(&self, args: &Arguments) -> String {
        let pattern = str_arg(args, "pattern").unwrap_or_default().to_string();
        let ignore: Vec<String> = args
            .get("ignore")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let workdir = self.workdir.clone();
        let search = pattern.clone();
        let found = task::spawn_blocking(move || expand_pattern(&workdir, &search)).await;
        let files: Vec<String> = match found {
            Ok(Ok(files)) => files
                .into_iter()
                .map(|path| path.display().to_string())
                .filter(|path| !ignore.iter().any(|skip| path.contains(skip.as_str())))
                .collect(),
            Ok(Err(err)) => return format!("Error finding files: {err}"),
            Err(err) => return format!("Error finding files: {err}"),
        };

        if files.is_empty() {
            return format!("No files found matching pattern: {pattern}");
        }

        let mut lines = vec![format!("Found {} files matching {pattern}:", files.len())];
        lines.extend(files.iter().take(GLOB_PREVIEW).map(|file| format!("- {file}")));
        if files.len() > GLOB_PREVIEW {
            lines.push(format!("... and {} more files", files.len() - GLOB_PREVIEW));
        }
        lines.join("\n")
    }
}

pub struct GrepTool {
    workdir: PathBuf,
}

impl GrepTool {
    pub fn new(workdir: PathBuf) -> Self {
        Self { workdir }
    }
}

struct FileMatch {
    file: PathBuf,
    line_numbers: Vec<usize>,
    samples: Vec<String>,
}

fn build_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
}

fn scan_file(regex: &Regex, file: &Path) -> Option<FileMatch> {
    let bytes = std::fs::read(file).ok()?;
    let content = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = content.lines().collect();

    let mut line_numbers = Vec::new();
    let mut samples = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        if !regex.is_match(line) {
            continue;
        }
        line_numbers.push(index + 1);
        let from = index.saturating_sub(1);
        let to = (index + 2).min(lines.len());
        for (offset, context) in lines[from..to].iter().enumerate() {
            let (clipped, _) = truncate_chars(context, SAMPLE_LINE_CHARS);
            samples.push(format!("Line {}: {clipped}", from + offset + 1));
        }
        if line_numbers.len() >= MATCHES_PER_FILE {
            break;
        }
    }

    if line_numbers.is_empty() {
        return None;
    }
    samples.truncate(SAMPLES_PER_FILE);
    Some(FileMatch {
        file: file.to_path_buf(),
        line_numbers,
        samples,
    })
}

/// Newest first, keeping `max_matches` matching files and counting the rest.
fn grep(
    workdir: &Path,
    regex: &Regex,
    include: &str,
    max_matches: usize,
) -> Result<(Vec<FileMatch>, usize), CapabilityError> {
    let mut files: Vec<(PathBuf, SystemTime)> = expand_pattern(workdir, include)?
        .into_iter()
        .filter(|path| path.is_file())
        .map(|path| {
            let modified = path
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (path, modified)
        })
        .collect();
    files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut matches = Vec::new();
    let mut omitted = 0;
    for (file, _) in &files {
        if let Some(found) = scan_file(regex, file) {
            if matches.len() < max_matches {
                matches.push(found);
            } else {
                omitted += 1;
            }
        }
    }
    Ok((matches, omitted))
}

#[async_trait]
impl Capability for GrepTool {
    fn name(&self) -> &str {
        "GrepTool"
    }

    fn describe(&self) -> String {
        "Search file contents with a regular expression. Required parameters: 'pattern' \
         (regex, e.g. \"log.*Error\") and 'include' (file glob, e.g. \"*.py\" or \"src/**/*.rs\"). \
         Optional: 'case_sensitive' (default true) and 'max_matches' (default 20). \
         Shows up to 3 matching lines per file with surrounding context, newest files first."
            .into()
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn validate(&self, args: &Arguments) -> Validation {
        let Some(pattern) = str_arg(args, "pattern") else {
            return Validation::reject(
                RejectionKind::MissingArgument,
                "Missing required parameter: 'pattern' (regex pattern to search)",
            );
        };
        let Some(include) = str_arg(args, "include") else {
            return Validation::reject(
                RejectionKind::MissingArgument,
                "Missing required parameter: 'include' (file pattern to search, e.g., '*.py')",
            );
        };
        if let Err(err) = Regex::new(pattern) {
            return Validation::reject(
                RejectionKind::InvalidArgument,
                format!("Invalid regular expression: {err}"),
            );
        }
        if let Err(err) = glob::Pattern::new(include) {
            return Validation::reject(
                RejectionKind::InvalidArgument,
                format!("Invalid include pattern: {err}"),
            );
        }
        Validation::accept()
    }

    async fn execute(&self, args: &Arguments) -> String {
        let pattern = str_arg(args, "pattern").unwrap_or_default().to_string();
        let include = str_arg(args, "include").unwrap_or_default().to_string();
        let case_sensitive = args
            .get("case_sensitive")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let max_matches = args
            .get("max_matches")
            .and_then(Value::as_u64)
            .map(|value| value.max(1) as usize)
            .unwrap_or(DEFAULT_MAX_MATCHES);

        let regex = match build_regex(&pattern, case_sensitive) {
            Ok(regex) => regex,
            Err(err) => return format!("Error during grep operation: {err}"),
        };

        let workdir = self.workdir.clone();
        let glob_include = include.clone();
        let searched =
            task::spawn_blocking(move || grep(&workdir, &regex, &glob_include, max_matches)).await;
        let (matches, omitted) = match searched {
            Ok(Ok(found)) => found,
            Ok(Err(err)) => return format!("Error during grep operation: {err}"),
            Err(err) => return format!("Error during grep operation: {err}"),
        };

        if matches.is_empty() {
            return format!(
                "No files matching pattern '{pattern}' found in files matching '{include}'"
            );
        }

        let mut lines = vec![format!(
            "Found {} files containing pattern '{pattern}':",
            matches.len()
        )];
        for found in &matches {
            lines.push(format!("\n- {}", found.file.display()));
            let numbers: Vec<String> = found.line_numbers.iter().map(usize::to_string).collect();
            lines.push(format!("  Lines: {}", numbers.join(", ")));
            lines.extend(found.samples.iter().map(|sample| format!("  {sample}")));
        }
        if omitted > 0 {
            lines.push(format!(
                "\n... and {omitted} more files (limited to {max_matches} results)"
            ));
        }
        lines.join("\n")
    }
}
