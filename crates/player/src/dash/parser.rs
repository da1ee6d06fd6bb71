//! MPD document parser.
//!
//! Inherited values (base URL, segment base, period duration, descriptors) are passed down
//! explicitly. Each level may override what it inherits, children see the resolved value of
//! their parent otherwise.

use std::{sync::Arc, sync::LazyLock, time::Duration};

use regex::Regex;
use url::Url;

use super::{
    merge_baseurls,
    mime::{self, ContentType},
    mpd::*,
    parse_media_range,
    template::UrlTemplate,
    xml::{parse_document, XmlElement},
};
use crate::{util::duration_to_ticks, ByteRange, DashError, DashResult};

static FRAME_RATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:/(\d+))?").unwrap());
static CEA608_ACCESSIBILITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CC([1-4])=.*").unwrap());
static CEA708_ACCESSIBILITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([1-9]|[1-5][0-9]|6[0-3])=.*").unwrap());

const DASH_ROLE_SCHEME: &str = "urn:mpeg:dash:role:2011";
const TVA_AUDIO_PURPOSE_SCHEME: &str = "urn:tva:metadata:cs:AudioPurposeCS:2007";
const MP4_PROTECTION_SCHEME: &str = "urn:mpeg:dash:mp4protection:2011";
const LAST_SEGMENT_NUMBER_SCHEME: &str = "http://dashif.org/guidelines/last-segment-number";
const CEA608_SCHEME: &str = "urn:scte:dash:cc:cea-608:2015";
const CEA708_SCHEME: &str = "urn:scte:dash:cc:cea-708:2015";
const MPEG_CHANNEL_CONFIGURATION_SCHEME: &str =
    "urn:mpeg:dash:23003:3:audio_channel_configuration:2011";
const DOLBY_CHANNEL_CONFIGURATION_SCHEMES: [&str; 2] = [
    "tag:dolby.com,2014:dash:audio_channel_configuration:2011",
    "urn:dolby:dash:audio_channel_configuration:2011",
];
const EC3_EXTENSION_SCHEME: &str = "tag:dolby.com,2018:dash:EC3_ExtensionType:2018";
const DDP_EXTENSION_SCHEME: &str = "tag:dolby.com,2014:dash:DolbyDigitalPlusExtensionType:2014";

impl Manifest {
    /// Parses an MPD document. Relative URLs are resolved against `base_url`, usually the
    /// address the manifest was fetched from.
    pub fn parse(document: &[u8], base_url: &Url) -> DashResult<Self> {
        let document = std::str::from_utf8(document)
            .map_err(|e| DashError::ManifestError(format!("Manifest is not valid UTF-8: {e}")))?;
        let root = parse_document(document.trim_start_matches('\u{feff}'))?;
        if root.name != "MPD" {
            return Err(DashError::ManifestError(format!(
                "No MPD element found, root element is {}",
                root.name
            )));
        }
        parse_mpd(&root, base_url)
    }
}

fn parse_mpd(mpd: &XmlElement, manifest_url: &Url) -> DashResult<Manifest> {
    let mut duration = mpd.duration_attr("mediaPresentationDuration")?;
    let dynamic = mpd.attr("type").unwrap_or("static") == "dynamic";

    let mut base_url = manifest_url.clone();
    let mut seen_first_base_url = false;
    let mut seen_early_access_period = false;
    let mut program_information = None;
    let mut utc_timing = None;
    let mut location = None;
    let mut periods = Vec::new();
    let mut next_period_start = (!dynamic).then_some(Duration::ZERO);

    let period_elements: Vec<&XmlElement> = mpd.children_named("Period").collect();
    let mut period_index = 0;

    for element in &mpd.children {
        match element.name.as_str() {
            "BaseURL" if !seen_first_base_url => {
                base_url = merge_baseurls(&base_url, element.text())?;
                seen_first_base_url = true;
            }
            "ProgramInformation" => {
                program_information = Some(parse_program_information(element));
            }
            "Location" => location = Some(merge_baseurls(manifest_url, element.text())?),
            "UTCTiming" => {
                utc_timing = Some(UtcTiming {
                    scheme_id_uri: element.attr("schemeIdUri").unwrap_or_default().to_string(),
                    value: element.attr("value").unwrap_or_default().to_string(),
                });
            }
            "Period" => {
                period_index += 1;
                if seen_early_access_period {
                    continue;
                }

                let start = element.duration_attr("start")?.or(next_period_start);
                let Some(start) = start else {
                    if dynamic {
                        seen_early_access_period = true;
                        continue;
                    }
                    return Err(DashError::ManifestError(
                        "Period doesn't have a start time".to_string(),
                    ));
                };

                // the explicit duration, or the distance to whatever bounds this period
                let end = match period_elements.get(period_index) {
                    Some(next) => next.duration_attr("start")?,
                    None => mpd.duration_attr("mediaPresentationDuration")?,
                };
                let period_duration = element
                    .duration_attr("duration")?
                    .or_else(|| end.map(|end| end.saturating_sub(start)));

                let period = parse_period(element, &base_url, start, period_duration)?;
                next_period_start = period_duration.map(|d| start + d);
                periods.push(Arc::new(period));
            }
            _ => {}
        }
    }

    if duration.is_none() {
        duration = next_period_start;
    }
    if duration.is_none() && !dynamic {
        return Err(DashError::ManifestError(
            "Unable to determine the presentation duration".to_string(),
        ));
    }

    Ok(Manifest {
        duration,
        availability_start_time: mpd.datetime_attr("availabilityStartTime")?,
        publish_time: mpd.datetime_attr("publishTime")?,
        min_buffer_time: mpd.duration_attr("minBufferTime")?,
        time_shift_buffer_depth: mpd.duration_attr("timeShiftBufferDepth")?,
        suggested_presentation_delay: mpd.duration_attr("suggestedPresentationDelay")?,
        minimum_update_period: mpd.duration_attr("minimumUpdatePeriod")?,
        program_information,
        utc_timing,
        periods,
        dynamic,
        location,
    })
}

fn parse_program_information(element: &XmlElement) -> ProgramInformation {
    let child_text = |name: &str| {
        element
            .children_named(name)
            .next()
            .map(|e| e.text().to_string())
    };
    ProgramInformation {
        title: child_text("Title"),
        source: child_text("Source"),
        copyright: child_text("Copyright"),
        lang: element.attr("lang").map(str::to_string),
        more_information_url: element.attr("moreInformationURL").map(str::to_string),
    }
}

fn parse_period(
    element: &XmlElement,
    base_url: &Url,
    start: Duration,
    period_duration: Option<Duration>,
) -> DashResult<Period> {
    let mut base_url = base_url.clone();
    let mut seen_first_base_url = false;
    let mut segment_base: Option<SegmentBase> = None;
    let mut asset_identifier = None;
    let mut adaptation_sets = Vec::new();

    for child in &element.children {
        match child.name.as_str() {
            "BaseURL" if !seen_first_base_url => {
                base_url = merge_baseurls(&base_url, child.text())?;
                seen_first_base_url = true;
            }
            "AdaptationSet" => {
                let adaptation_set =
                    parse_adaptation_set(child, &base_url, segment_base.as_ref(), period_duration)?;
                adaptation_sets.push(Arc::new(adaptation_set));
            }
            "SegmentBase" => segment_base = Some(parse_segment_base(child, None)?),
            "SegmentList" => segment_base = Some(parse_segment_list(child, None, period_duration)?),
            "SegmentTemplate" => {
                segment_base = Some(parse_segment_template(child, None, &[], period_duration)?)
            }
            "AssetIdentifier" => asset_identifier = Some(parse_descriptor(child)),
            _ => {}
        }
    }

    Ok(Period {
        id: element.attr("id").map(str::to_string),
        start: Some(start),
        duration: element.duration_attr("duration")?,
        adaptation_sets,
        asset_identifier,
    })
}

/// Attributes an `AdaptationSet` hands down to its representations.
struct AdaptationSetContext<'a> {
    base_url: &'a Url,
    mime_type: Option<&'a str>,
    codecs: Option<&'a str>,
    width: Option<u32>,
    height: Option<u32>,
    frame_rate: Option<f32>,
    audio_channels: Option<u32>,
    audio_sampling_rate: Option<u32>,
    language: Option<&'a str>,
    role_descriptors: &'a [Descriptor],
    accessibility_descriptors: &'a [Descriptor],
    supplemental_properties: &'a [Descriptor],
    segment_base: Option<&'a SegmentBase>,
    period_duration: Option<Duration>,
}

/// A representation before the adaptation set level values are merged in.
struct RepresentationInfo {
    format: Format,
    base_url: Url,
    segment_base: SegmentBase,
    drm_scheme_type: Option<String>,
    content_protections: Vec<ContentProtection>,
    inband_event_streams: Vec<Descriptor>,
}

fn parse_adaptation_set(
    element: &XmlElement,
    base_url: &Url,
    segment_base: Option<&SegmentBase>,
    period_duration: Option<Duration>,
) -> DashResult<AdaptationSet> {
    let mut base_url = base_url.clone();
    let mut segment_base = segment_base.cloned();
    let mut content_type = ContentType::from_attribute(element.attr("contentType"));
    let mut language = element.attr("lang").map(str::to_string);
    let mut label = element.attr("label").map(str::to_string);
    let mut audio_channels = None;
    let mut drm_scheme_type = None;
    let mut content_protections = Vec::new();
    let mut inband_event_streams = Vec::new();
    let mut accessibility_descriptors = Vec::new();
    let mut role_descriptors = Vec::new();
    let mut supplemental_properties = Vec::new();
    let mut representation_infos = Vec::new();
    let mut seen_first_base_url = false;

    let width = element.parse_attr("width")?;
    let height = element.parse_attr("height")?;
    let frame_rate = parse_frame_rate(element, None);
    let audio_sampling_rate = element.parse_attr("audioSamplingRate")?;

    for child in &element.children {
        match child.name.as_str() {
            "BaseURL" if !seen_first_base_url => {
                base_url = merge_baseurls(&base_url, child.text())?;
                seen_first_base_url = true;
            }
            "ContentProtection" => {
                let (scheme_type, protection) = parse_content_protection(child);
                if scheme_type.is_some() {
                    drm_scheme_type = scheme_type;
                }
                content_protections.push(protection);
            }
            "ContentComponent" => {
                if language.is_none() {
                    language = child.attr("lang").map(str::to_string);
                }
                if content_type == ContentType::Unknown {
                    content_type = ContentType::from_attribute(child.attr("contentType"));
                }
            }
            "Role" => role_descriptors.push(parse_descriptor(child)),
            "AudioChannelConfiguration" => audio_channels = parse_audio_channel_configuration(child)?,
            "Accessibility" => accessibility_descriptors.push(parse_descriptor(child)),
            "SupplementalProperty" => supplemental_properties.push(parse_descriptor(child)),
            "Representation" => {
                let context = AdaptationSetContext {
                    base_url: &base_url,
                    mime_type: element.attr("mimeType"),
                    codecs: element.attr("codecs"),
                    width,
                    height,
                    frame_rate,
                    audio_channels,
                    audio_sampling_rate,
                    language: language.as_deref(),
                    role_descriptors: &role_descriptors,
                    accessibility_descriptors: &accessibility_descriptors,
                    supplemental_properties: &supplemental_properties,
                    segment_base: segment_base.as_ref(),
                    period_duration,
                };
                let info = parse_representation(child, &context)?;
                if content_type == ContentType::Unknown {
                    let format = &info.format;
                    content_type = ContentType::from_sample_mime_type(
                        format
                            .sample_mime_type
                            .as_deref()
                            .or(format.container_mime_type.as_deref()),
                    );
                }
                representation_infos.push(info);
            }
            "SegmentBase" => {
                segment_base = Some(parse_segment_base(child, segment_base.as_ref())?);
            }
            "SegmentList" => {
                segment_base = Some(parse_segment_list(
                    child,
                    segment_base.as_ref(),
                    period_duration,
                )?);
            }
            "SegmentTemplate" => {
                segment_base = Some(parse_segment_template(
                    child,
                    segment_base.as_ref(),
                    &supplemental_properties,
                    period_duration,
                )?);
            }
            "InbandEventStream" => inband_event_streams.push(parse_descriptor(child)),
            "Label" => label = Some(child.text().to_string()),
            _ => {}
        }
    }

    let representations = representation_infos
        .into_iter()
        .map(|info| {
            let mut format = info.format;
            if label.is_some() {
                format.label = label.clone();
            }
            let mut protections = info.content_protections;
            protections.extend(content_protections.iter().cloned());
            let mut event_streams = info.inband_event_streams;
            event_streams.extend(inband_event_streams.iter().cloned());

            Arc::new(Representation {
                format,
                base_url: info.base_url,
                segment_base: info.segment_base,
                inband_event_streams: event_streams,
                content_protections: protections,
                drm_scheme_type: info.drm_scheme_type.or_else(|| drm_scheme_type.clone()),
            })
        })
        .collect();

    Ok(AdaptationSet {
        id: element.parse_attr("id")?,
        content_type,
        representations,
        accessibility_descriptors,
        supplemental_properties,
        role_descriptors,
    })
}

fn parse_representation(
    element: &XmlElement,
    context: &AdaptationSetContext<'_>,
) -> DashResult<RepresentationInfo> {
    let mut base_url = context.base_url.clone();
    let mut seen_first_base_url = false;
    let mut audio_channels = context.audio_channels;
    let mut segment_base = context.segment_base.cloned();
    let mut drm_scheme_type = None;
    let mut content_protections = Vec::new();
    let mut inband_event_streams = Vec::new();
    let mut supplemental_properties = Vec::new();

    for child in &element.children {
        match child.name.as_str() {
            "BaseURL" if !seen_first_base_url => {
                base_url = merge_baseurls(&base_url, child.text())?;
                seen_first_base_url = true;
            }
            "AudioChannelConfiguration" => audio_channels = parse_audio_channel_configuration(child)?,
            "SegmentBase" => {
                segment_base = Some(parse_segment_base(child, segment_base.as_ref())?);
            }
            "SegmentList" => {
                segment_base = Some(parse_segment_list(
                    child,
                    segment_base.as_ref(),
                    context.period_duration,
                )?);
            }
            "SegmentTemplate" => {
                segment_base = Some(parse_segment_template(
                    child,
                    segment_base.as_ref(),
                    context.supplemental_properties,
                    context.period_duration,
                )?);
            }
            "ContentProtection" => {
                let (scheme_type, protection) = parse_content_protection(child);
                if scheme_type.is_some() {
                    drm_scheme_type = scheme_type;
                }
                content_protections.push(protection);
            }
            "InbandEventStream" => inband_event_streams.push(parse_descriptor(child)),
            "SupplementalProperty" => supplemental_properties.push(parse_descriptor(child)),
            _ => {}
        }
    }

    let format = Format {
        id: element.attr("id").unwrap_or_default().to_string(),
        bitrate: element.parse_attr("bandwidth")?,
        codecs: element.attr("codecs").or(context.codecs).map(str::to_string),
        container_mime_type: element
            .attr("mimeType")
            .or(context.mime_type)
            .map(str::to_string),
        width: element.parse_attr("width")?.or(context.width),
        height: element.parse_attr("height")?.or(context.height),
        frame_rate: parse_frame_rate(element, context.frame_rate),
        channel_count: audio_channels,
        sample_rate: element
            .parse_attr("audioSamplingRate")?
            .or(context.audio_sampling_rate),
        language: context.language.map(str::to_string),
        ..Default::default()
    };

    Ok(RepresentationInfo {
        format: build_format(
            format,
            context.role_descriptors,
            context.accessibility_descriptors,
            &supplemental_properties,
        ),
        base_url,
        segment_base: segment_base.unwrap_or_default(),
        drm_scheme_type,
        content_protections,
        inband_event_streams,
    })
}

/// Fills in the derived fields of a format and keeps only the ones meaningful for its type.
fn build_format(
    format: Format,
    role_descriptors: &[Descriptor],
    accessibility_descriptors: &[Descriptor],
    supplemental_properties: &[Descriptor],
) -> Format {
    let mut sample_mime_type =
        mime::sample_mime_type(format.container_mime_type.as_deref(), format.codecs.as_deref());
    if sample_mime_type.as_deref() == Some(mime::AUDIO_EAC3) {
        sample_mime_type = Some(parse_eac3_supplemental_properties(supplemental_properties).to_string());
    }

    let selection_flags = if role_descriptors
        .iter()
        .any(|d| d.scheme_id_uri.eq_ignore_ascii_case(DASH_ROLE_SCHEME) && d.value.as_deref() == Some("main"))
    {
        SelectionFlags::Default
    } else {
        SelectionFlags::Unknown
    };
    let role_flags = parse_role_flags(role_descriptors) | parse_accessibility_flags(accessibility_descriptors);

    let base = Format {
        id: format.id,
        label: format.label,
        selection_flags,
        role_flags,
        bitrate: format.bitrate,
        codecs: format.codecs,
        container_mime_type: format.container_mime_type,
        sample_mime_type: sample_mime_type.clone(),
        ..Default::default()
    };

    match sample_mime_type.as_deref() {
        Some(m) if mime::is_video(m) => Format {
            width: format.width,
            height: format.height,
            frame_rate: format.frame_rate,
            ..base
        },
        Some(m) if mime::is_audio(m) => Format {
            channel_count: format.channel_count,
            sample_rate: format.sample_rate,
            language: format.language,
            ..base
        },
        Some(m) if mime::is_raw_text(m) => {
            let accessibility_channel = match m {
                mime::APPLICATION_CEA608 => accessibility_channel(
                    accessibility_descriptors,
                    CEA608_SCHEME,
                    &CEA608_ACCESSIBILITY_REGEX,
                ),
                mime::APPLICATION_CEA708 => accessibility_channel(
                    accessibility_descriptors,
                    CEA708_SCHEME,
                    &CEA708_ACCESSIBILITY_REGEX,
                ),
                _ => None,
            };
            Format {
                language: format.language,
                accessibility_channel,
                ..base
            }
        }
        _ => Format {
            language: format.language,
            ..base
        },
    }
}

fn parse_eac3_supplemental_properties(supplemental_properties: &[Descriptor]) -> &'static str {
    let is_joc = supplemental_properties.iter().any(|d| {
        let value = d.value.as_deref();
        (d.scheme_id_uri == EC3_EXTENSION_SCHEME && value == Some("JOC"))
            || (d.scheme_id_uri == DDP_EXTENSION_SCHEME && value == Some("ec+3"))
    });
    if is_joc {
        mime::AUDIO_EAC3_JOC
    } else {
        mime::AUDIO_EAC3
    }
}

fn dash_role_flag(value: Option<&str>) -> RoleFlags {
    match value {
        Some("main") => RoleFlags::MAIN,
        Some("alternate") => RoleFlags::ALTERNATE,
        Some("supplementary") => RoleFlags::SUPPLEMENTARY,
        Some("commentary") => RoleFlags::COMMENTARY,
        Some("dub") => RoleFlags::DUB,
        Some("emergency") => RoleFlags::EMERGENCY,
        Some("caption") => RoleFlags::CAPTION,
        Some("subtitle") => RoleFlags::SUBTITLE,
        Some("sign") => RoleFlags::SIGN,
        Some("description" | "describes-video") => RoleFlags::DESCRIBES_VIDEO,
        Some("enhanced-audio-intelligibility" | "enhanced-dialog-intelligibility") => {
            RoleFlags::ENHANCED_DIALOG_INTELLIGIBILITY
        }
        _ => RoleFlags::NONE,
    }
}

fn tva_audio_purpose_flag(value: Option<&str>) -> RoleFlags {
    match value {
        Some("1") => RoleFlags::DESCRIBES_VIDEO,
        Some("2") => RoleFlags::ENHANCED_DIALOG_INTELLIGIBILITY,
        Some("3") => RoleFlags::SUPPLEMENTARY,
        Some("4") => RoleFlags::COMMENTARY,
        Some("6") => RoleFlags::MAIN,
        _ => RoleFlags::NONE,
    }
}

fn parse_role_flags(role_descriptors: &[Descriptor]) -> RoleFlags {
    role_descriptors
        .iter()
        .filter(|d| d.scheme_id_uri.eq_ignore_ascii_case(DASH_ROLE_SCHEME))
        .fold(RoleFlags::NONE, |flags, d| flags | dash_role_flag(d.value.as_deref()))
}

fn parse_accessibility_flags(accessibility_descriptors: &[Descriptor]) -> RoleFlags {
    accessibility_descriptors
        .iter()
        .fold(RoleFlags::NONE, |flags, d| {
            if d.scheme_id_uri.eq_ignore_ascii_case(DASH_ROLE_SCHEME) {
                flags | dash_role_flag(d.value.as_deref())
            } else if d.scheme_id_uri.eq_ignore_ascii_case(TVA_AUDIO_PURPOSE_SCHEME) {
                flags | tva_audio_purpose_flag(d.value.as_deref())
            } else {
                flags
            }
        })
}

fn accessibility_channel(
    accessibility_descriptors: &[Descriptor],
    scheme: &str,
    regex: &Regex,
) -> Option<u32> {
    accessibility_descriptors
        .iter()
        .filter(|d| d.scheme_id_uri == scheme)
        .filter_map(|d| regex.captures(d.value.as_deref()?))
        .find_map(|captures| captures.get(1)?.as_str().parse().ok())
}

fn parse_audio_channel_configuration(element: &XmlElement) -> DashResult<Option<u32>> {
    let scheme_id_uri = element.attr("schemeIdUri").unwrap_or_default();
    if scheme_id_uri == MPEG_CHANNEL_CONFIGURATION_SCHEME {
        return element.parse_attr("value");
    }
    if DOLBY_CHANNEL_CONFIGURATION_SCHEMES.contains(&scheme_id_uri) {
        let value = element.attr("value").map(str::to_ascii_lowercase);
        return Ok(match value.as_deref() {
            Some("4000") => Some(1),
            Some("a000") => Some(2),
            Some("f801") => Some(6),
            Some("fa01") => Some(8),
            _ => None,
        });
    }
    Ok(None)
}

fn parse_frame_rate(element: &XmlElement, default: Option<f32>) -> Option<f32> {
    let Some(captures) = element
        .attr("frameRate")
        .and_then(|value| FRAME_RATE_REGEX.captures(value.trim()))
    else {
        return default;
    };
    let numerator: f32 = captures.get(1)?.as_str().parse().ok()?;
    match captures.get(2).and_then(|d| d.as_str().parse::<f32>().ok()) {
        Some(denominator) if denominator > 0.0 => Some(numerator / denominator),
        _ => Some(numerator),
    }
}

fn parse_descriptor(element: &XmlElement) -> Descriptor {
    Descriptor {
        scheme_id_uri: element.attr("schemeIdUri").unwrap_or_default().to_string(),
        value: element.attr("value").map(str::to_string),
        id: element.attr("id").map(str::to_string),
    }
}

/// Returns the DRM scheme type carried by the descriptor, if any, and the descriptor itself.
fn parse_content_protection(element: &XmlElement) -> (Option<String>, ContentProtection) {
    let scheme_id_uri = element.attr("schemeIdUri").unwrap_or_default().to_string();
    let value = element.attr("value").map(str::to_string);
    let scheme_type = scheme_id_uri
        .eq_ignore_ascii_case(MP4_PROTECTION_SCHEME)
        .then(|| value.clone())
        .flatten();

    let protection = ContentProtection {
        default_kid: element
            .attr("cenc:default_KID")
            .or_else(|| element.attr("default_KID"))
            .map(str::to_string),
        pssh: element
            .children_named("pssh")
            .next()
            .map(|e| e.text().to_string())
            .filter(|pssh| !pssh.is_empty()),
        scheme_id_uri,
        value,
    };
    (scheme_type, protection)
}

fn parse_ranged_url(element: &XmlElement, url_attr: &str, range_attr: &str) -> DashResult<RangedUri> {
    let url = element
        .attr(url_attr)
        .filter(|url| !url.is_empty())
        .map(str::to_string);
    let range = match element.attr(range_attr) {
        Some(range) => parse_media_range(range)?,
        None => ByteRange::default(),
    };
    Ok(RangedUri::new(url, range))
}

fn parse_initialization(element: &XmlElement) -> DashResult<Option<RangedUri>> {
    element
        .children_named("Initialization")
        .next()
        .map(|e| parse_ranged_url(e, "sourceURL", "range"))
        .transpose()
}

fn parse_segment_base(element: &XmlElement, parent: Option<&SegmentBase>) -> DashResult<SegmentBase> {
    let (parent_initialization, parent_timescale, parent_pto, parent_index_range) = match parent {
        Some(SegmentBase::Single {
            initialization,
            timescale,
            presentation_time_offset,
            index_range,
        }) => (
            initialization.clone(),
            *timescale,
            *presentation_time_offset,
            *index_range,
        ),
        _ => (None, 1, 0, None),
    };

    let index_range = match element.attr("indexRange") {
        Some(range) => Some(parse_media_range(range)?),
        None => parent_index_range,
    };

    Ok(SegmentBase::Single {
        initialization: parse_initialization(element)?.or(parent_initialization),
        timescale: element.parse_attr("timescale")?.unwrap_or(parent_timescale),
        presentation_time_offset: element
            .parse_attr("presentationTimeOffset")?
            .unwrap_or(parent_pto),
        index_range,
    })
}

fn parse_multi_segment_base(
    element: &XmlElement,
    parent: Option<&MultiSegmentBase>,
    period_duration: Option<Duration>,
) -> DashResult<MultiSegmentBase> {
    let default = MultiSegmentBase::default();
    let parent = parent.unwrap_or(&default);

    let timescale = element.parse_attr("timescale")?.unwrap_or(parent.timescale);
    let timeline = match element.children_named("SegmentTimeline").next() {
        Some(timeline) => Some(parse_segment_timeline(timeline, timescale, period_duration)?),
        None => parent.timeline.clone(),
    };

    Ok(MultiSegmentBase {
        initialization: parse_initialization(element)?.or_else(|| parent.initialization.clone()),
        timescale,
        presentation_time_offset: element
            .parse_attr("presentationTimeOffset")?
            .unwrap_or(parent.presentation_time_offset),
        start_number: element.parse_attr("startNumber")?.unwrap_or(parent.start_number),
        duration: element.parse_attr("duration")?.or(parent.duration),
        timeline,
    })
}

fn parse_segment_list(
    element: &XmlElement,
    parent: Option<&SegmentBase>,
    period_duration: Option<Duration>,
) -> DashResult<SegmentBase> {
    let (parent_multi, parent_segments) = match parent {
        Some(SegmentBase::List {
            multi,
            media_segments,
        }) => (Some(multi), Some(media_segments)),
        _ => (None, None),
    };

    let multi = parse_multi_segment_base(element, parent_multi, period_duration)?;
    let segments = element
        .children_named("SegmentURL")
        .map(|e| parse_ranged_url(e, "media", "mediaRange"))
        .collect::<DashResult<Vec<_>>>()?;
    let media_segments = match parent_segments {
        Some(parent_segments) if segments.is_empty() => parent_segments.clone(),
        _ => segments,
    };

    Ok(SegmentBase::List {
        multi,
        media_segments,
    })
}

fn parse_segment_template(
    element: &XmlElement,
    parent: Option<&SegmentBase>,
    supplemental_properties: &[Descriptor],
    period_duration: Option<Duration>,
) -> DashResult<SegmentBase> {
    let (parent_multi, parent_initialization, parent_media, parent_end_number) = match parent {
        Some(SegmentBase::Template {
            multi,
            initialization_template,
            media_template,
            end_number,
        }) => (
            Some(multi),
            initialization_template.clone(),
            media_template.clone(),
            *end_number,
        ),
        _ => (None, None, None, None),
    };

    let template_attr = |name: &str| {
        element
            .attr(name)
            .filter(|template| !template.is_empty())
            .map(UrlTemplate::new)
    };

    Ok(SegmentBase::Template {
        multi: parse_multi_segment_base(element, parent_multi, period_duration)?,
        initialization_template: template_attr("initialization").or(parent_initialization),
        media_template: template_attr("media").or(parent_media),
        end_number: parse_last_segment_number(supplemental_properties)?.or(parent_end_number),
    })
}

fn parse_last_segment_number(supplemental_properties: &[Descriptor]) -> DashResult<Option<u64>> {
    let Some(descriptor) = supplemental_properties
        .iter()
        .find(|d| d.scheme_id_uri.eq_ignore_ascii_case(LAST_SEGMENT_NUMBER_SCHEME))
    else {
        return Ok(None);
    };
    let value = descriptor.value.as_deref().unwrap_or_default();
    value.trim().parse().map(Some).map_err(|_| {
        DashError::ManifestError(format!("Invalid last segment number: {value}"))
    })
}

/// Expands `S@t`, `S@d` and `S@r` into one element per segment.
///
/// A negative `r` repeats until the next `S@t`, or until the end of the period for the last
/// entry.
fn parse_segment_timeline(
    element: &XmlElement,
    timescale: u64,
    period_duration: Option<Duration>,
) -> DashResult<Vec<TimelineElement>> {
    let mut timeline = Vec::new();
    let mut start_time = 0;
    let mut pending: Option<(u64, i64)> = None;

    for s in element.children_named("S") {
        let t = s.parse_attr::<u64>("t")?;
        if let Some((duration, repeat)) = pending {
            start_time = expand_timeline_element(&mut timeline, start_time, duration, repeat, t)?;
        }
        if let Some(t) = t {
            start_time = t;
        }

        let duration = s
            .parse_attr::<u64>("d")?
            .ok_or_else(|| DashError::ManifestError("S element without duration".to_string()))?;
        let repeat = s.parse_attr::<i64>("r")?.unwrap_or(0);
        pending = Some((duration, repeat));
    }

    if let Some((duration, repeat)) = pending {
        let end_time = period_duration.map(|d| duration_to_ticks(d, timescale));
        expand_timeline_element(&mut timeline, start_time, duration, repeat, end_time)?;
    }

    Ok(timeline)
}

fn expand_timeline_element(
    timeline: &mut Vec<TimelineElement>,
    mut start_time: u64,
    duration: u64,
    repeat: i64,
    end_time: Option<u64>,
) -> DashResult<u64> {
    let count = if repeat >= 0 {
        repeat as u64 + 1
    } else {
        let end_time = end_time.ok_or_else(|| {
            DashError::ManifestError("Open ended S@r without a known end time".to_string())
        })?;
        if duration == 0 {
            return Err(DashError::ManifestError(
                "Open ended S@r with zero duration".to_string(),
            ));
        }
        end_time.saturating_sub(start_time).div_ceil(duration)
    };

    for _ in 0..count {
        timeline.push(TimelineElement {
            start_time,
            duration,
        });
        start_time += duration;
    }
    Ok(start_time)
}
