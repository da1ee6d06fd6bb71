use url::Url;

use crate::{ByteRange, DashError, DashResult};

pub(crate) fn is_absolute_url(s: &str) -> bool {
    s.starts_with("http://")
        || s.starts_with("https://")
        || s.starts_with("file://")
        || s.starts_with("ftp://")
}

/// Resolves a `BaseURL` (or any relative reference) against the current base.
pub(crate) fn merge_baseurls(current: &Url, new: &str) -> DashResult<Url> {
    let new = new.trim();
    if is_absolute_url(new) {
        Ok(Url::parse(new)?)
    } else {
        // The query of the current URL is carried over unless the new reference has its own.
        //
        // merge_baseurls(https://example.com/manifest.mpd?auth=secret, /video42.mp4) =>
        //   https://example.com/video42.mp4?auth=secret
        //
        // merge_baseurls(https://example.com/manifest.mpd?auth=old, /video42.mp4?auth=new) =>
        //   https://example.com/video42.mp4?auth=new
        let mut merged = current.join(new)?;
        if merged.query().is_none() {
            merged.set_query(current.query());
        }
        Ok(merged)
    }
}

/// The byte range shall be expressed and formatted as a byte-range-spec as defined in
/// IETF RFC 7233:2014, subclause 2.1. It is restricted to a single expression identifying
/// a contiguous range of bytes.
///
/// `"a-b"` yields offset `a` and length `b - a + 1`, a bare `"a"` leaves the length open.
pub(crate) fn parse_media_range<S>(s: S) -> DashResult<ByteRange>
where
    S: AsRef<str>,
{
    let s = s.as_ref().trim();
    let invalid = || DashError::ManifestError(format!("Invalid media range: {s}"));

    let (start, end) = match s.split_once('-') {
        Some((start, end)) => (start, Some(end)),
        None => (s, None),
    };

    let first_byte_pos = start.trim().parse::<u64>().map_err(|_| invalid())?;
    let last_byte_pos = match end.map(str::trim) {
        Some("") | None => None,
        Some(end) => Some(end.parse::<u64>().map_err(|_| invalid())?),
    };

    let length = match last_byte_pos {
        // 0 - 500 means 501 bytes
        Some(last_byte_pos) if last_byte_pos >= first_byte_pos => {
            Some(last_byte_pos - first_byte_pos + 1)
        }
        Some(_) => return Err(invalid()),
        None => None,
    };

    Ok(ByteRange {
        offset: first_byte_pos,
        length,
    })
}
