//! A minimal element tree on top of `quick-xml`.
//!
//! The MPD parser walks the document top-down and threads inherited values through the
//! recursion, which is much simpler over a tree than over the raw event stream.

use std::{str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use quick_xml::{events::BytesStart, events::Event, Reader};

use crate::{DashError, DashResult};

#[derive(Debug, Default)]
pub(crate) struct XmlElement {
    /// Local name, without namespace prefix.
    pub name: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    fn from_start(e: &BytesStart<'_>) -> DashResult<Self> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            name,
            attributes,
            ..Default::default()
        })
    }

    /// Looks an attribute up by its qualified name, e.g. `cenc:default_KID`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Attribute parsed with [`FromStr`]. A present but unparsable value is an error.
    pub fn parse_attr<T: FromStr>(&self, name: &str) -> DashResult<Option<T>> {
        match self.attr(name) {
            Some(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
                DashError::ManifestError(format!(
                    "Invalid {}@{name} value: {value}",
                    self.name
                ))
            }),
            None => Ok(None),
        }
    }

    /// `xs:duration` attribute.
    pub fn duration_attr(&self, name: &str) -> DashResult<Option<Duration>> {
        match self.attr(name) {
            Some(value) => parse_xs_duration(value).map(Some).ok_or_else(|| {
                DashError::ManifestError(format!(
                    "Invalid {}@{name} duration: {value}",
                    self.name
                ))
            }),
            None => Ok(None),
        }
    }

    /// `xs:dateTime` attribute.
    pub fn datetime_attr(&self, name: &str) -> DashResult<Option<DateTime<Utc>>> {
        match self.attr(name) {
            Some(value) => parse_xs_datetime(value).map(Some).ok_or_else(|| {
                DashError::ManifestError(format!(
                    "Invalid {}@{name} date: {value}",
                    self.name
                ))
            }),
            None => Ok(None),
        }
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn text(&self) -> &str {
        self.text.trim()
    }
}

fn parse_xs_duration(value: &str) -> Option<Duration> {
    iso8601_duration::Duration::parse(value.trim()).ok()?.to_std()
}

fn parse_xs_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }
    // xs:dateTime without a timezone is treated as UTC
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|date| date.and_utc())
}

/// Parses a whole document and returns its root element.
pub(crate) fn parse_document(xml: &str) -> DashResult<XmlElement> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => stack.push(XmlElement::from_start(e)?),
            Event::Empty(ref e) => {
                let element = XmlElement::from_start(e)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(ref e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(ref e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(DashError::ManifestError(
            "Unexpected end of document".to_string(),
        ));
    }
    root.ok_or_else(|| DashError::ManifestError("No root element found".to_string()))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}
