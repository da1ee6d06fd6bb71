//! # MPEG-DASH manifest support
//!
//! This module turns an MPD document into the immutable model in [`mpd`]:
//!
//! *   [`loader::ManifestLoader`] fetches the document over HTTP and follows `MPD.Location`
//!     on refresh.
//! *   [`Manifest::parse`] walks the document once. Inherited attributes (base URL, segment
//!     base, timescale, period duration) are resolved while walking, so every
//!     [`Representation`] is self-contained.
//! *   `SegmentTimeline` entries are expanded into one [`TimelineElement`] per segment,
//!     including open ended repeats.
//!
//! Only the first `BaseURL` at each level is honored.
//!
//! ```no_run
//! # async fn run() -> iori_player::DashResult<()> {
//! use iori_player::{dash::loader::ManifestLoader, HttpClient};
//! use url::Url;
//!
//! let url = Url::parse("https://example.com/vod/manifest.mpd")?;
//! let mut loader = ManifestLoader::new(HttpClient::default(), url);
//! let manifest = loader.load().await?;
//! for period in &manifest.periods {
//!     println!("{:?} starts at {:?}", period.id, period.start);
//! }
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod mime;
pub mod mpd;
mod parser;
pub mod template;
mod url;
mod xml;

pub use mpd::*;

pub(crate) use self::url::{merge_baseurls, parse_media_range};
