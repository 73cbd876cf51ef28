//! Pulling fenced code out of assistant replies and packaging it as a zip archive.

use std::io::{Cursor, Write};
use std::sync::OnceLock;

use regex::Regex;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;
use crate::observability::EXPORT_FILES;
use crate::types::{Message, Role};

/// Folder every archive entry lives under.
pub const ARCHIVE_FOLDER: &str = "spurify_code";

/// Suggested filename for a saved archive.
pub const ARCHIVE_NAME: &str = "spurify_code.zip";

/// The outcome of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Export {
    /// The log held no code.
    Nothing,
    /// A zip archive of every extracted file.
    Archive(Vec<u8>),
}

/// One fenced segment of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFence {
    /// Lowercased language tag, if the fence had one.
    pub language: Option<String>,
    pub content: String,
}

/// A file destined for the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub name: String,
    pub content: String,
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"```(\w+)?\n([\s\S]*?)```").expect("fence regex compiles")
    })
}

fn hint_regex() -> &'static Regex {
    static HINT: OnceLock<Regex> = OnceLock::new();
    HINT.get_or_init(|| {
        Regex::new(r"^(?://|#|<!--)\s*(?:filename:)?\s*([\w.-]+\.\w+)\s*(?:-->)?")
            .expect("hint regex compiles")
    })
}

/// Find every fenced code segment in `text`, in order.
///
/// Segments whose content is only whitespace are skipped.  An unterminated fence is ignored.
pub fn scan_fences(text: &str) -> Vec<CodeFence> {
    fence_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let content = caps.get(2).map_or("", |m| m.as_str());
            if content.trim().is_empty() {
                return None;
            }
            Some(CodeFence {
                language: caps.get(1).map(|m| m.as_str().to_lowercase()),
                content: content.to_string(),
            })
        })
        .collect()
}

/// The filename named by a hint comment on the first line of `content`.
pub fn filename_hint(content: &str) -> Option<String> {
    let first_line = content.lines().next()?;
    hint_regex()
        .captures(first_line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// File extension for a language tag.  Unknown tags map to `txt`.
pub fn extension_for(language: &str) -> &'static str {
    match language.to_lowercase().as_str() {
        "javascript" | "js" => "js",
        "typescript" | "ts" => "ts",
        "typescriptreact" | "tsx" => "tsx",
        "jsx" => "jsx",
        "python" | "py" => "py",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "json" => "json",
        "java" => "java",
        "c" => "c",
        "cpp" => "cpp",
        "csharp" => "cs",
        "go" => "go",
        "rust" => "rs",
        "php" => "php",
        "ruby" => "rb",
        "swift" => "swift",
        "kotlin" => "kt",
        "bash" | "sh" | "shell" => "sh",
        "sql" => "sql",
        "markdown" | "md" => "md",
        "yaml" | "yml" => "yaml",
        "xml" => "xml",
        _ => "txt",
    }
}

/// Collect the files held by the finalized assistant messages of `messages`.
///
/// Unnamed segments are numbered `snippet_1`, `snippet_2`, ... across the whole log.  A later
/// file with an existing name replaces the earlier one in place.
pub fn collect_files(messages: &[Message]) -> Vec<ExtractedFile> {
    let mut files: Vec<ExtractedFile> = Vec::new();
    let mut unnamed = 0;
    let replies = messages
        .iter()
        .filter(|msg| msg.role == Role::Assistant && msg.is_settled());
    for msg in replies {
        for fence in scan_fences(&msg.text) {
            let file = match filename_hint(&fence.content) {
                Some(name) => {
                    let content = fence
                        .content
                        .split_once('\n')
                        .map_or("", |(_, rest)| rest)
                        .to_string();
                    ExtractedFile { name, content }
                }
                None => {
                    unnamed += 1;
                    let ext = extension_for(fence.language.as_deref().unwrap_or("txt"));
                    ExtractedFile {
                        name: format!("snippet_{unnamed}.{ext}"),
                        content: fence.content,
                    }
                }
            };
            match files.iter_mut().find(|existing| existing.name == file.name) {
                Some(existing) => existing.content = file.content,
                None => files.push(file),
            }
        }
    }
    files
}

/// Zip `files` under [`ARCHIVE_FOLDER`].
pub fn package(files: &[ExtractedFile]) -> Result<Vec<u8>> {
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for file in files {
        zip.start_file(format!("{ARCHIVE_FOLDER}/{}", file.name), options)?;
        zip.write_all(file.content.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Extract and package the code in `messages`.
pub fn export_archive(messages: &[Message]) -> Result<Export> {
    let files = collect_files(messages);
    if files.is_empty() {
        return Ok(Export::Nothing);
    }
    let archive = package(&files)?;
    files.iter().for_each(|_| EXPORT_FILES.click());
    tracing::debug!(files = files.len(), bytes = archive.len(), "packaged code archive");
    Ok(Export::Archive(archive))
}
