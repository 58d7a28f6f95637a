//! Fenced code block rendering.
//!
//! A fence body is emitted inside `<pre data-role="codeBlock">` carrying the
//! raw, parsed, and normalized info strings as escaped attributes, so
//! client-side runners can recover the metadata without reimplementing the
//! attribute grammar.

use premark_core::block_info::{normalize_block_info, parse_block_info};
use thiserror::Error;

/// Errors produced while rendering a code fence.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Block info metadata could not be serialized to JSON.
    #[error("failed to serialize block info: {0}")]
    InfoSerialization(#[from] serde_json::Error),
}

/// Renders one fenced code block to HTML.
///
/// `info` is the text following the opening backticks; `content` is the fence
/// body. The title bar shows the `file` attribute when present, the literal
/// `code` otherwise.
pub fn render_code_fence(info: &str, content: &str) -> Result<String, RenderError> {
    let info = info.trim();
    let parsed = parse_block_info(info);
    let normalized = normalize_block_info(&parsed);

    let parsed_json = serde_json::to_string(&parsed)?;
    let normalized_json = serde_json::to_string(&*normalized)?;

    let file = parsed
        .attributes
        .get("file")
        .map(|value| value.to_string())
        .unwrap_or_default();
    let title = if file.is_empty() { "code" } else { &file };

    Ok(format!(
        "\n<div class=\"code-title\">\n  \
         <a name=\"{file}\">{title}</a>\n  \
         <span>{language}</span>\n</div>\n\
         <pre data-role=\"codeBlock\" data-info=\"{info}\" \
         data-parsed-info=\"{parsed}\" \
         data-normalized-info=\"{normalized}\">{content}</pre>",
        file = html_escape::encode_double_quoted_attribute(&file),
        title = html_escape::encode_text(title),
        language = html_escape::encode_text(&parsed.language),
        info = html_escape::encode_double_quoted_attribute(info),
        parsed = html_escape::encode_double_quoted_attribute(&parsed_json),
        normalized = html_escape::encode_double_quoted_attribute(&normalized_json),
        content = html_escape::encode_text(content),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_pre_with_info_attributes() {
        let html = render_code_fence("js {cmd=true}", "console.log(1);\n").unwrap();
        assert!(html.contains("data-role=\"codeBlock\""));
        assert!(html.contains("data-info=\"js {cmd=true}\""));
        assert!(html.contains("&quot;language&quot;:&quot;js&quot;"));
        assert!(html.contains("&quot;cmd&quot;:true"));
        assert!(html.contains("<span>js</span>"));
        assert!(html.ends_with("console.log(1);\n</pre>"));
    }

    #[test]
    fn file_attribute_becomes_title() {
        let html = render_code_fence("js {file=\"main.js\"}", "").unwrap();
        assert!(html.contains("<a name=\"main.js\">main.js</a>"));
    }

    #[test]
    fn missing_file_falls_back_to_code() {
        let html = render_code_fence("python", "print(1)\n").unwrap();
        assert!(html.contains("<a name=\"\">code</a>"));
    }

    #[test]
    fn content_is_escaped() {
        let html = render_code_fence("html", "<script>1 && 2</script>\n").unwrap();
        assert!(html.contains("&lt;script&gt;1 &amp;&amp; 2&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn normalized_info_reflects_key_rewriting() {
        let html = render_code_fence("JS {lineNumbers=true}", "").unwrap();
        assert!(html.contains("line_numbers"));
        // Raw info is preserved verbatim, parsed/normalized diverge.
        assert!(html.contains("data-info=\"JS {lineNumbers=true}\""));
        assert!(html.contains("&quot;language&quot;:&quot;js&quot;"));
    }

    #[test]
    fn empty_info_renders() {
        let html = render_code_fence("", "x\n").unwrap();
        assert!(html.contains("data-info=\"\""));
        assert!(html.contains("<span></span>"));
    }
}
