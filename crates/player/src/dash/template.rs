// References:
// 1. https://github.com/clitic/vsd/blob/30ca1985e4a467ea3304b11c08d3176deaafd22a/vsd/src/dash/template.rs
// 2. https://github.com/emarsden/dash-mpd-rs/blob/6ebdfb4759adbda8233b5b3520804e23ff86e7de/src/fetch.rs#L435-L466

use regex::{Regex, Replacer};
use std::{collections::HashMap, sync::LazyLock};

// From https://dashif.org/docs/DASH-IF-IOP-v4.3.pdf:
// "For the avoidance of doubt, only %0[width]d is permitted and no other identifiers. The reason
// is that such a string replacement can be easily implemented without requiring a specific library."
//
// Example template: "$RepresentationID$/$Number%06d$.m4s"
// An empty identifier ("$$") is an escaped dollar sign.
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(RepresentationID|Number|Time|Bandwidth|)(?:%0(\d+)d)?\$").unwrap()
});

/// A `media` or `initialization` attribute of a `SegmentTemplate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolves the initialization URL, where only the representation identifiers are known.
    pub fn resolve_initialization(&self, representation_id: &str, bandwidth: Option<u64>) -> String {
        let mut template = Template::new();
        template.insert(Template::REPRESENTATION_ID, representation_id.to_string());
        if let Some(bandwidth) = bandwidth {
            template.insert(Template::BANDWIDTH, bandwidth.to_string());
        }
        template.resolve(&self.0)
    }

    pub fn resolve_media(
        &self,
        representation_id: &str,
        bandwidth: Option<u64>,
        number: u64,
        time: u64,
    ) -> String {
        let mut template = Template::new();
        template.insert(Template::REPRESENTATION_ID, representation_id.to_string());
        if let Some(bandwidth) = bandwidth {
            template.insert(Template::BANDWIDTH, bandwidth.to_string());
        }
        template.insert(Template::NUMBER, number.to_string());
        template.insert(Template::TIME, time.to_string());
        template.resolve(&self.0)
    }
}

pub struct Template<'a> {
    args: HashMap<&'a str, String>,
}

impl Template<'_> {
    pub const REPRESENTATION_ID: &'static str = "RepresentationID";
    pub const NUMBER: &'static str = "Number";
    pub const TIME: &'static str = "Time";
    pub const BANDWIDTH: &'static str = "Bandwidth";

    pub fn new() -> Self {
        Self {
            args: HashMap::with_capacity(4),
        }
    }

    pub fn insert(&mut self, key: &'static str, value: String) {
        self.args.insert(key, value);
    }

    pub fn resolve(&self, template: &str) -> String {
        TEMPLATE_REGEX
            .replace_all(template, TemplateReplacer(&self.args))
            .to_string()
    }
}

impl Default for Template<'_> {
    fn default() -> Self {
        Self::new()
    }
}

struct TemplateReplacer<'a>(&'a HashMap<&'a str, String>);

impl Replacer for TemplateReplacer<'_> {
    fn replace_append(&mut self, caps: &regex::Captures<'_>, dst: &mut String) {
        let key = caps.get(1).map_or("", |m| m.as_str());
        if key.is_empty() {
            dst.push('$');
            return;
        }

        let Some(value) = self.0.get(key) else {
            dst.push_str(caps.get(0).map_or("", |m| m.as_str()));
            return;
        };

        let width = caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok());
        if let Some(width) = width {
            dst.push_str(&format!("{value:0>width$}"));
        } else {
            dst.push_str(value.as_str());
        }
    }
}
