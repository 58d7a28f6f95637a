#![deny(missing_docs)]
//! Premark render: HTML output for preprocessed fenced code blocks.

/// Fenced code block rendering.
pub mod code_fence;

pub use code_fence::{RenderError, render_code_fence};
