//! Line-oriented markdown preprocessing.
//!
//! Single forward pass over one document string: rewrites file imports,
//! `[TOC]` markers, heading ids/options, scroll-sync anchors, task lists, and
//! raw HTML spans into plain markdown/HTML fragments for a downstream
//! renderer. The transform is total; malformed content degrades instead of
//! failing.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::attributes::{AttributeMap, AttributeValue, parse_attributes, stringify_attributes};
use crate::heading_id::HeadingIdGenerator;

/// Sentinel the transformer substitutes for a `[TOC]` line. The downstream
/// renderer replaces it with the generated table of contents.
pub const TOC_SENTINEL: &str = "[PREMARKTOC]";

static CMD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""?cmd"?\s*[:=\s}]"#).expect("cmd regex"));
static TOC_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*\[toc\]\s*$").expect("toc regex"));
static TASK_LIST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[*\-+]|\d+\.)\s+(\[[xX\s]\])\s").expect("task list regex"));
static HTML_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*<(?:([a-zA-Z]+)|([a-zA-Z]+)\s+(?:.+?))>").expect("html regex"));
static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(\s*)@import(\s+)"([^"]+)";?"#).expect("import regex"));
static COMMENT_SUBJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<!--\s+(\S+)").expect("comment subject regex"));
static HEADING_OPTIONS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\s+\{|^\{)(.+?)\}\s*$").expect("heading options regex"));
static PANDOC_ID_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d\-]+").expect("pandoc id prefix regex"));

/// Tags that never need a closing counterpart; lines opening with one of
/// these are not scanned for a matching close tag.
const SELF_CLOSING_TAGS: &[&str] = &[
    "area", "base", "br", "col", "command", "embed", "hr", "img", "input", "keygen", "link",
    "meta", "param", "source", "track", "wbr",
];

/// Extensions rewritten to image markup by `@import`.
const IMAGE_EXTENSIONS: &[&str] = &["jpeg", "jpg", "gif", "png", "apng", "svg", "bmp"];

/// One heading collected during the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingRecord {
    /// Heading text with hashes and the option block stripped.
    pub content: String,
    /// Count of leading `#` characters (1..=7).
    pub level: usize,
    /// Explicit `id` option or the generated slug.
    pub id: String,
}

/// Everything one transform call produces.
#[derive(Debug, Default, Serialize)]
pub struct TransformResult {
    /// The rewritten markdown handed to the downstream renderer.
    pub output_string: String,
    /// Headings in document order, minus those marked `ignore`.
    pub headings: Vec<HeadingRecord>,
    /// Whether a `[TOC]` line was found and replaced with [`TOC_SENTINEL`].
    pub toc_bracket_enabled: bool,
    /// Raw front-matter text (`---\n...\n---\n`), empty when absent.
    pub front_matter_string: String,
    /// Assets referenced by import kinds this core defines no handling for.
    /// Reserved; stays empty.
    pub imported_assets: Vec<String>,
    /// Reserved for slide/presentation segmentation; always empty.
    pub slide_configs: Vec<serde_json::Value>,
}

/// Caller-supplied configuration for one transform call.
///
/// `files_cache` outlives the call and is shared across one document so
/// repeated imports of the same path resolve to the identical src.
pub struct TransformOptions<'a> {
    /// Base directory for relative import paths.
    pub file_directory_path: &'a Path,
    /// Base directory for root-absolute (`/...`) import paths.
    pub project_directory_path: &'a Path,
    /// Import path → resolved src, owned by the caller.
    pub files_cache: &'a mut HashMap<String, String>,
    /// Resolve image srcs relative to the file directory instead of the
    /// project root.
    pub use_relative_file_path: bool,
    /// Emit scroll-sync anchors and line-number attributes.
    pub for_preview: bool,
    /// Suppress HTML-specific heading/task rewriting.
    pub for_markdown_export: bool,
    /// Paths matching this pattern are kept verbatim (URL schemes).
    pub protocols_white_list: Option<&'a Regex>,
    /// Emit pandoc-style heading attribute blocks.
    pub use_pandoc_parser: bool,
    /// Disables code-chunk offset bookkeeping.
    pub not_source_file: bool,
    /// Injected id generator; counters last for this call only.
    pub heading_id_generator: HeadingIdGenerator,
}

impl<'a> TransformOptions<'a> {
    /// Options with empty base directories and all modes off.
    pub fn new(files_cache: &'a mut HashMap<String, String>) -> Self {
        Self {
            file_directory_path: Path::new(""),
            project_directory_path: Path::new(""),
            files_cache,
            use_relative_file_path: false,
            for_preview: false,
            for_markdown_export: false,
            protocols_white_list: None,
            use_pandoc_parser: false,
            not_source_file: false,
            heading_id_generator: HeadingIdGenerator::new(),
        }
    }
}

/// Zero-width anchor tying rendered output back to a source line for
/// preview scroll synchronization.
fn sync_anchor(line_no: usize) -> String {
    format!("\n\n<p data-line=\"{}\" class=\"sync-line\" style=\"margin:0;\"></p>\n\n", line_no)
}

fn leading_backtick_run(line: &str) -> usize {
    line.bytes().take_while(|b| *b == b'`').count()
}

/// Resolves `.` and `..` components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Relative path from `base` to `target`, both normalized first.
fn relative_from(base: &Path, target: &Path) -> PathBuf {
    let base = normalize_path(base);
    let target = normalize_path(target);

    let base_components: Vec<Component<'_>> = base.components().collect();
    let target_components: Vec<Component<'_>> = target.components().collect();

    let common = base_components
        .iter()
        .zip(target_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_components.len() {
        out.push("..");
    }
    for component in &target_components[common..] {
        out.push(component.as_os_str());
    }
    out
}

/// Random hex token appended as a cache-busting query to image srcs.
fn cache_busting_token() -> String {
    let mut bytes = [0u8; 8];
    // A failed fill leaves zeroes; the token is still usable.
    let _ = getrandom::fill(&mut bytes);
    let mut token = String::with_capacity(16);
    for byte in bytes {
        let _ = write!(token, "{:02x}", byte);
    }
    token
}

/// Front-matter pre-pass: `(front_matter, scan_offset, scan_line_no)`.
fn split_front_matter(input: &str) -> (&str, usize, usize) {
    if input.starts_with("---")
        && let Some(pos) = input.find("\n---")
    {
        let mut end = pos + 4;
        if input.as_bytes().get(end) == Some(&b'\n') {
            end += 1;
        }
        let front = &input[..end];
        let line_no = front.matches('\n').count();
        return (front, end, line_no);
    }
    ("", 0, 0)
}

/// Heading options pulled out of a trailing `{...}` block.
struct HeadingOptions {
    /// Heading text with the option block removed.
    remaining: String,
    classes: String,
    id: String,
    ignore: bool,
    /// Pass-through attributes (everything but class/id/ignore).
    extra: AttributeMap,
}

/// Splits a heading into text and options. `Err` carries the raw unterminated
/// option text, which surfaces as a visible `OptionsError` placeholder.
fn extract_heading_options(heading: &str) -> Result<Option<HeadingOptions>, String> {
    if let Some(matched) = HEADING_OPTIONS_RE.find(heading) {
        let mut attributes = parse_attributes(matched.as_str());
        let classes = attributes
            .shift_remove("class")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let id = attributes
            .shift_remove("id")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let ignore = attributes
            .shift_remove("ignore")
            .is_some_and(|v| v.is_truthy());
        return Ok(Some(HeadingOptions {
            remaining: heading[..matched.start()].to_string(),
            classes,
            id,
            ignore,
            extra: attributes,
        }));
    }

    // An opener with no closing brace before end of line is the one
    // attribute-syntax failure that surfaces to the user.
    if let Some(open) = heading.rfind('{') {
        let at_start = open == 0;
        let after_whitespace = heading[..open]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        if (at_start || after_whitespace) && !heading[open..].contains('}') {
            return Err(heading[open..].to_string());
        }
    }

    Ok(None)
}

/// Pandoc-style attribute block: `{#id .c1 .c2 key=val key2="str"}`.
fn pandoc_options_block(id: &str, classes: &str, extra: &AttributeMap) -> String {
    let mut block = String::from("{");
    if !id.is_empty() {
        let _ = write!(block, "#{} ", id);
    }
    if !classes.is_empty() {
        let dotted: Vec<String> = classes
            .split_whitespace()
            .map(|class| format!(".{}", class))
            .collect();
        let _ = write!(block, "{} ", dotted.join(" "));
    }
    for (key, value) in extra {
        match value {
            AttributeValue::Number(n) => {
                let _ = write!(block, " {}={}", key, n);
            }
            other => {
                let _ = write!(block, " {}=\"{}\"", key, other);
            }
        }
    }
    block.push('}');
    block
}

struct Scanner<'a, 'o> {
    input: &'a str,
    options: TransformOptions<'o>,
    output: String,
    headings: Vec<HeadingRecord>,
    toc_bracket_enabled: bool,
    /// Length of the backtick run that opened the currently-unclosed fence.
    open_fence_len: Option<usize>,
    code_chunk_offset: usize,
}

impl Scanner<'_, '_> {
    fn push_anchor(&mut self, line_no: usize) {
        if self.options.for_preview {
            self.output.push_str(&sync_anchor(line_no));
        }
    }

    /// Fence toggle (rule 1). Returns the rewritten line to copy through.
    fn handle_fence_line(&mut self, line: &str, in_code_block: bool, line_no: usize) -> String {
        let run = leading_backtick_run(line);
        let mut line = line.to_string();

        if !in_code_block {
            self.push_anchor(line_no);
            if !self.options.not_source_file && CMD_RE.is_match(&line) {
                // Executable chunk: claim a sequential offset so a host can
                // correlate chunks across re-renders.
                line = line.replacen(
                    '{',
                    &format!("{{code_chunk_offset={}, ", self.code_chunk_offset),
                    1,
                );
                self.code_chunk_offset += 1;
            }
            self.open_fence_len = Some(run);
        } else if self
            .open_fence_len
            .is_some_and(|open_len| run >= open_len)
        {
            self.open_fence_len = None;
        }

        line
    }

    /// Heading rewrite (rule 3).
    fn handle_heading(&mut self, line: &str, line_no: usize) {
        self.push_anchor(line_no);

        let hashes = line.bytes().take_while(|b| *b == b'#').count().min(7);
        let tag = &line[..hashes];
        let raw_heading = &line[hashes..];

        let (mut heading, classes, explicit_id, ignore, extra) =
            match extract_heading_options(raw_heading) {
                Ok(Some(opts)) => (
                    opts.remaining,
                    opts.classes,
                    opts.id,
                    opts.ignore,
                    opts.extra,
                ),
                Ok(None) => (
                    raw_heading.to_string(),
                    String::new(),
                    String::new(),
                    false,
                    AttributeMap::new(),
                ),
                Err(raw) => {
                    log::debug!("unterminated heading option block: {raw:?}");
                    (
                        format!("OptionsError: {raw}"),
                        String::new(),
                        String::new(),
                        true,
                        AttributeMap::new(),
                    )
                }
            };
        heading = heading.trim().to_string();

        let id = if explicit_id.is_empty() {
            let mut generated = self.options.heading_id_generator.generate_id(&heading);
            if self.options.use_pandoc_parser {
                generated = PANDOC_ID_PREFIX_RE.replace(&generated, "").into_owned();
                if generated.is_empty() {
                    generated = "section".to_string();
                }
            }
            generated
        } else {
            explicit_id
        };

        // Ignored headings are excluded from the collection but still
        // rewritten below.
        if !ignore {
            self.headings.push(HeadingRecord {
                content: heading.clone(),
                level: hashes,
                id: id.clone(),
            });
        }

        if self.options.use_pandoc_parser {
            let block = pandoc_options_block(&id, &classes, &extra);
            let _ = writeln!(self.output, "{} {} {}", tag, heading, block);
        } else if self.options.for_markdown_export {
            let _ = write!(self.output, "{} {}\n\n", tag, heading);
        } else {
            // Adjacent marker element carries id/class; the heading line
            // itself stays plain markdown. The extra blank line keeps the
            // downstream renderer from gluing following content to it.
            let _ = write!(
                self.output,
                "{} {}\n<p class=\"premark-header {}\" id=\"{}\"></p>\n\n",
                tag, heading, classes, id
            );
        }
    }

    /// Task-list checkbox rewrite (rule 6).
    fn rewrite_task_list_item(&self, line: &str, checkbox: &str, line_no: usize) -> String {
        let checked = checkbox != "[ ]";
        let sync_class = if self.options.for_preview {
            " sync-line"
        } else {
            ""
        };
        let data_line = if self.options.for_preview {
            format!("data-line=\"{}\"", line_no)
        } else {
            String::new()
        };
        let checked_attr = if checked { " checked" } else { "" };
        let control = format!(
            "<input type=\"checkbox\" class=\"task-list-item-checkbox{}\" {}{}>",
            sync_class, data_line, checked_attr
        );
        line.replacen(checkbox, &control, 1)
    }

    /// `@import` image rewrite. The resolved src is memoized per source path
    /// in the caller-owned cache so repeated imports share the token.
    fn resolve_image_src(&mut self, file_path: &str, absolute: &Path, whitelisted: bool) -> String {
        if let Some(cached) = self.options.files_cache.get(file_path) {
            return cached.clone();
        }

        let mut src = if whitelisted {
            file_path.to_string()
        } else if self.options.use_relative_file_path {
            format!(
                "{}?{}",
                relative_from(self.options.file_directory_path, absolute).display(),
                cache_busting_token()
            )
        } else {
            format!(
                "/{}?{}",
                relative_from(self.options.project_directory_path, absolute).display(),
                cache_busting_token()
            )
        };
        src = src.replace(' ', "%20").replace('\\', "/");

        self.options
            .files_cache
            .insert(file_path.to_string(), src.clone());
        src
    }

    fn render_image_import(&self, src: &str, config: Option<&AttributeMap>) -> String {
        match config {
            Some(cfg)
                if ["width", "height", "class", "id"]
                    .iter()
                    .any(|key| cfg.get(*key).is_some_and(AttributeValue::is_truthy)) =>
            {
                let mut out = format!("<img src=\"{}\" ", src);
                for (key, value) in cfg {
                    let _ = write!(out, " {}=\"{}\" ", key, value);
                }
                out.push('>');
                out
            }
            Some(cfg) => {
                let mut out = String::from("![");
                if let Some(alt) = cfg.get("alt").filter(|v| v.is_truthy()) {
                    let _ = write!(out, "{}", alt);
                }
                let _ = write!(out, "]({}", src);
                if let Some(title) = cfg.get("title").filter(|v| v.is_truthy()) {
                    let _ = write!(out, " \"{}\"", title);
                }
                out.push_str(")  ");
                out
            }
            None => format!("![]({})  ", src),
        }
    }

    /// `@import "[TOC]"`: synthesized fenced block encoding the toc command.
    fn render_toc_import(&mut self, config: Option<AttributeMap>) -> String {
        let mut cfg = config.unwrap_or_else(|| {
            let mut defaults = AttributeMap::new();
            defaults.insert("depth_from".into(), AttributeValue::Number(1.0));
            defaults.insert("depth_to".into(), AttributeValue::Number(6.0));
            defaults.insert("ordered_list".into(), AttributeValue::Bool(true));
            defaults
        });
        cfg.insert("cmd".into(), AttributeValue::String("toc".into()));
        cfg.insert("hide".into(), AttributeValue::Bool(true));
        cfg.insert("run_on_save".into(), AttributeValue::Bool(true));
        cfg.insert("modify_source".into(), AttributeValue::Bool(true));
        if !self.options.not_source_file {
            cfg.insert(
                "code_chunk_offset".into(),
                AttributeValue::Number(self.code_chunk_offset as f64),
            );
            self.code_chunk_offset += 1;
        }

        format!("```text {}  \n```  ", stringify_attributes(&cfg, false))
    }
}

/// Rewrites one markdown document. Never fails; any input yields a result.
pub fn transform_markdown(input: &str, options: TransformOptions<'_>) -> TransformResult {
    let (front_matter, start_offset, start_line) = split_front_matter(input);

    let mut scanner = Scanner {
        input,
        options,
        output: String::with_capacity(input.len()),
        headings: Vec::new(),
        toc_bracket_enabled: false,
        open_fence_len: None,
        code_chunk_offset: 0,
    };

    scan(&mut scanner, start_offset, start_line);

    TransformResult {
        output_string: scanner.output,
        headings: scanner.headings,
        toc_bracket_enabled: scanner.toc_bracket_enabled,
        front_matter_string: front_matter.to_string(),
        imported_assets: Vec::new(),
        slide_configs: Vec::new(),
    }
}

/// The iterative line walk. One line per iteration unless a multi-line
/// construct (comment, raw HTML span) consumes more; `line_no` then advances
/// by the exact count of embedded newlines.
fn scan(scanner: &mut Scanner<'_, '_>, mut i: usize, mut line_no: usize) {
    let input = scanner.input;
    let bytes = input.as_bytes();

    while i < input.len() {
        if bytes[i] == b'\n' {
            i += 1;
            line_no += 1;
            scanner.output.push('\n');
            continue;
        }

        let end = input[i..]
            .find('\n')
            .map(|pos| i + pos)
            .unwrap_or(input.len());
        let mut line = input[i..end].to_string();

        let in_code_block = scanner.open_fence_len.is_some();

        // Rule 1: fence toggle. While open, every line is copied verbatim.
        if leading_backtick_run(&line) >= 3 {
            let rewritten = scanner.handle_fence_line(&line, in_code_block, line_no);
            scanner.output.push_str(&rewritten);
            scanner.output.push('\n');
            i = end + 1;
            line_no += 1;
            continue;
        }
        if in_code_block {
            scanner.output.push_str(&line);
            scanner.output.push('\n');
            i = end + 1;
            line_no += 1;
            continue;
        }

        if (line.starts_with("![") || line.starts_with("@import"))
            && i >= 2
            && bytes[i - 1] == b'\n'
            && bytes[i - 2] == b'\n'
        {
            // Blank-preceded image or import: anchor only, then fall through
            // to the import rule. An anchor directly between a list and its
            // trailing image would break the preview layout otherwise.
            scanner.push_anchor(line_no);
        } else if line.starts_with('#') {
            scanner.handle_heading(&line, line_no);
            i = end + 1;
            line_no += 1;
            continue;
        } else if line.starts_with("<!--") {
            scanner.push_anchor(line_no);

            let search_from = (i + 4).min(input.len());
            let Some(found) = input[search_from..].find("-->") else {
                // Unterminated comment consumes the rest of the input.
                log::debug!("unterminated HTML comment at line {line_no}");
                scanner.output.push('\n');
                i = input.len();
                line_no += 1;
                continue;
            };
            let comment_end = search_from + found + 3;

            let subject = COMMENT_SUBJECT_RE
                .captures(&line)
                .map(|caps| caps[1].to_string());
            match subject.as_deref() {
                Some("@import") => {
                    // Unwrap `<!-- @import "..." -->` into a bare import line
                    // and handle it in this same iteration.
                    if let Some(close_in_line) = line.rfind("-->").filter(|pos| *pos > 0) {
                        line = line[4..close_in_line].trim().to_string();
                    }
                }
                _ => {
                    // Delete the comment, leaving one blank line.
                    let content = input[i + 4..comment_end - 3].trim();
                    let newlines = content.matches('\n').count();
                    scanner.output.push('\n');
                    i = comment_end;
                    line_no += newlines;
                    continue;
                }
            }
        } else if TOC_LINE_RE.is_match(&line) {
            scanner.push_anchor(line_no);
            scanner.toc_bracket_enabled = true;
            let _ = write!(scanner.output, "\n{}\n\n", TOC_SENTINEL);
            i = end + 1;
            line_no += 1;
            continue;
        } else if let Some(caps) = TASK_LIST_RE.captures(&line) {
            if !scanner.options.for_markdown_export {
                let checkbox = caps[1].to_string();
                line = scanner.rewrite_task_list_item(&line, &checkbox, line_no);
            }
            scanner.output.push_str(&line);
            scanner.output.push('\n');
            i = end + 1;
            line_no += 1;
            continue;
        } else if let Some(caps) = HTML_TAG_RE.captures(&line) {
            let tag_name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if !SELF_CLOSING_TAGS.contains(&tag_name.to_ascii_lowercase().as_str()) {
                let close_tag = format!("</{}>", tag_name);
                let search_from = i + caps.get(0).map_or(0, |m| m.end());
                if let Some(found) = input
                    .get(search_from..)
                    .and_then(|rest| rest.find(&close_tag))
                {
                    // Copy the whole span verbatim so the downstream renderer
                    // treats it as raw HTML.
                    let span_end = search_from + found + close_tag.len();
                    let html_span = &input[i..span_end];
                    scanner.output.push_str(html_span);
                    line_no += html_span.matches('\n').count();
                    i = span_end;
                    continue;
                }
                // No close tag found: no special handling for this line.
            }
        }

        // Rule 8: file import.
        if let Some(caps) = IMPORT_RE.captures(&line) {
            let indent = caps[1].to_string();
            let file_path = caps[3].trim().to_string();

            let config = parse_import_config(&line);

            let whitelisted = scanner
                .options
                .protocols_white_list
                .is_some_and(|re| re.is_match(&file_path));
            let absolute = if whitelisted {
                PathBuf::from(&file_path)
            } else if let Some(root_relative) = file_path.strip_prefix('/') {
                normalize_path(&scanner.options.project_directory_path.join(root_relative))
            } else {
                normalize_path(&scanner.options.file_directory_path.join(&file_path))
            };

            let extension = Path::new(&file_path)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_lowercase)
                .unwrap_or_default();

            if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
                let src = scanner.resolve_image_src(&file_path, &absolute, whitelisted);
                let rendered = scanner.render_image_import(&src, config.as_ref());
                let _ = writeln!(scanner.output, "{}{}", indent, rendered);
                i = end + 1;
                line_no += 1;
                continue;
            }

            if file_path == "[TOC]" {
                let rendered = scanner.render_toc_import(config);
                let _ = writeln!(scanner.output, "{}{}", indent, rendered);
                i = end + 1;
                line_no += 1;
                continue;
            }

            // Unsupported import kind: pass the line through unchanged.
        }

        scanner.output.push_str(&line);
        scanner.output.push('\n');
        i = end + 1;
        line_no += 1;
    }
}

/// Optional `{...}` config on an import line. A missing or mismatched brace
/// pair means no config, never an error.
fn parse_import_config(line: &str) -> Option<AttributeMap> {
    let open = line.find('{').filter(|pos| *pos > 0)?;
    let Some(close) = line.rfind('}').filter(|pos| *pos > open) else {
        log::debug!("mismatched braces in import config: {line:?}");
        return None;
    };
    Some(parse_attributes(&line[open + 1..close]))
}
