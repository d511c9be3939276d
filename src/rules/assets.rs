//! Image asset rules

use crate::finding::Severity;
use crate::registry::ConfigurationError;
use crate::rule::{Category, Rule, Target};

/// Image and media asset rules
pub fn rules() -> Result<Vec<Rule>, ConfigurationError> {
    Ok(vec![
        Rule::condition(
            "image-missing-dimensions",
            Category::Assets,
            Severity::Low,
            Target::tag("img"),
            "!attributes.width || !attributes.height",
            "<img src=\"{attributes.src}\"> has no explicit width and height",
        )?
        .with_name("Image without dimensions")
        .with_description("Set width and height on images so the browser reserves space and avoids layout shift")
        .with_tag("performance"),
        Rule::condition(
            "legacy-image-format",
            Category::Assets,
            Severity::Low,
            Target::tag("img"),
            r"attributes.src =~ /(?i)\.(bmp|tiff?)([?#].*)?$/",
            "<img src=\"{attributes.src}\"> uses an uncompressed legacy format",
        )?
        .with_name("Legacy image format")
        .with_description("Convert BMP and TIFF images to WebP, AVIF, PNG or JPEG")
        .with_tag("performance"),
    ])
}
