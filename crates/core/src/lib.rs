#![deny(missing_docs)]
//! Premark core: markdown preprocessing, fence info parsing, and heading ids.

/// Brace-delimited attribute parsing and stringification.
pub mod attributes;
/// Fence info-string parsing and normalization.
pub mod block_info;
/// YAML front-matter parsing helpers.
pub mod frontmatter;
/// Heading id generation utilities.
pub mod heading_id;
/// Line-oriented markdown transformation.
pub mod transformer;

pub use attributes::{AttributeMap, AttributeValue, parse_attributes, stringify_attributes};
pub use block_info::{
    BlockInfo, normalize_attribute_keys, normalize_block_info, parse_block_info,
};
pub use frontmatter::{FrontMatterError, parse_front_matter};
pub use heading_id::HeadingIdGenerator;
pub use transformer::{
    HeadingRecord, TOC_SENTINEL, TransformOptions, TransformResult, transform_markdown,
};
