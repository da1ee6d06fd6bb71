use std::{sync::Arc, time::Duration};

use iori_player::prelude::*;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{
    common::{parse_manifest, video_manifest, Harness, MockDemuxer, MockDownloader},
    AssertWrapper,
};

fn live_manifest(starts: &[u64]) -> Manifest {
    let periods: String = starts
        .iter()
        .map(|start| {
            format!(
                r#"<Period id="p{start}" start="PT{start}S">
    <AdaptationSet contentType="video" mimeType="video/mp4">
      <SegmentTemplate timescale="1" duration="2" media="$Number$.m4s"/>
      <Representation id="v" bandwidth="1000000" codecs="avc1.4d401f"/>
    </AdaptationSet>
  </Period>"#
            )
        })
        .collect();
    parse_manifest(&format!(
        r#"<MPD type="dynamic" availabilityStartTime="2024-01-01T00:00:00Z">{periods}</MPD>"#
    ))
}

const AUDIO_VIDEO_TEXT: &str = r#"<MPD type="static" mediaPresentationDuration="PT60S">
  <Period>
    <AdaptationSet contentType="video" mimeType="video/mp4">
      <SegmentTemplate timescale="1" duration="2" media="$RepresentationID$/$Number$.m4s"/>
      <Representation id="v1" bandwidth="800000" codecs="avc1.4d401f"/>
      <Representation id="v2" bandwidth="3000000" codecs="avc1.640028"/>
    </AdaptationSet>
    <AdaptationSet contentType="audio" mimeType="audio/mp4" lang="en">
      <SegmentTemplate timescale="1" duration="2" media="$RepresentationID$/$Number$.m4s"/>
      <Representation id="a1" bandwidth="64000" codecs="mp4a.40.2"/>
      <Representation id="a2" bandwidth="128000" codecs="mp4a.40.2"/>
    </AdaptationSet>
    <AdaptationSet contentType="text" mimeType="application/mp4">
      <Representation id="t1" bandwidth="1000" codecs="wvtt"><BaseURL>subs.mp4</BaseURL></Representation>
    </AdaptationSet>
  </Period>
</MPD>"#;

#[tokio::test]
async fn test_periods_roll_off() -> anyhow::Result<()> {
    let harness = Harness::new(PlayerConfig::default());
    let provider = &harness.provider;

    let timeline = provider.update_manifest(live_manifest(&[0, 100]));
    assert!(timeline.dynamic);
    assert_eq!(
        timeline.periods.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![0, 1]
    );
    assert_eq!(timeline.periods[0].duration, Some(Duration::from_secs(100)));
    let p1 = provider.dash_period(1)?;

    let timeline = provider.update_manifest(live_manifest(&[100, 200]));
    assert_eq!(
        timeline.periods,
        vec![
            ClientPeriod {
                id: 1,
                start: Some(Duration::from_secs(100)),
                duration: Some(Duration::from_secs(100)),
            },
            ClientPeriod {
                id: 2,
                start: Some(Duration::from_secs(200)),
                duration: None,
            },
        ]
    );
    assert!(Arc::ptr_eq(&p1, &provider.dash_period(1)?));
    assert!(matches!(
        provider.dash_period(0),
        Err(DashError::InvalidPeriod(0))
    ));
    Ok(())
}

#[tokio::test]
async fn test_refresh_with_fewer_periods() -> anyhow::Result<()> {
    let harness = Harness::new(PlayerConfig::default());
    let provider = &harness.provider;

    provider.update_manifest(live_manifest(&[0, 100, 200]));
    let dropped = provider.dash_period(2)?;
    let timeline = provider.update_manifest(live_manifest(&[0, 100]));
    assert_eq!(timeline.periods.len(), 2);
    provider.dash_period(2).assert_error();

    // the dropped id stays retired, even for a period at the same position
    let timeline = provider.update_manifest(live_manifest(&[0, 100, 150]));
    assert_eq!(
        timeline.periods.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![0, 1, 3]
    );
    assert_eq!(timeline.periods[2].start, Some(Duration::from_secs(150)));
    provider.dash_period(2).assert_error();
    assert!(!Arc::ptr_eq(&dropped, &provider.dash_period(3)?));

    let timeline = provider.update_manifest(live_manifest(&[100, 150, 300]));
    assert_eq!(
        timeline.periods.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![1, 3, 4]
    );
    Ok(())
}

#[tokio::test]
async fn test_selector_fixup() -> anyhow::Result<()> {
    let harness = Harness::new(PlayerConfig::default());
    let provider = &harness.provider;
    let timeline = provider.update_manifest(parse_manifest(AUDIO_VIDEO_TEXT));
    let period = &timeline.periods[0];
    let groups = provider.get_stream_groups(period)?;
    assert_eq!(groups.len(), 3);
    assert_eq!(groups[1].content_type, ContentType::Audio);

    let video = provider.create_stream(period, &groups[0], None)?;
    assert!(video.stream_selector().is_throughput());

    // no seamless audio switching: the best audio stream, fixed
    let audio = provider.create_stream(period, &groups[1], None)?;
    assert!(matches!(audio.stream_selector(), StreamSelector::Fixed(1)));

    let throughput = StreamSelector::throughput(provider.throughput_history().clone());
    assert!(matches!(
        provider.create_stream(period, &groups[1], Some(throughput.clone())),
        Err(DashError::StreamSelectionError(_))
    ));
    assert!(matches!(
        provider.update_stream(&audio, Some(throughput)),
        Err(DashError::StreamSelectionError(_))
    ));
    provider.update_stream(&audio, Some(StreamSelector::fixed(0)))?;
    assert!(matches!(audio.stream_selector(), StreamSelector::Fixed(0)));

    assert!(matches!(
        provider.create_stream(period, &groups[2], None),
        Err(DashError::StreamSelectionError(_))
    ));

    assert_eq!(provider.streams().len(), 2);
    provider.release_stream(&audio);
    assert_eq!(provider.streams().len(), 1);
    assert_eq!(provider.get_duration(), Some(Duration::from_secs(60)));
    Ok(())
}

#[tokio::test]
async fn test_seamless_audio_uses_throughput() -> anyhow::Result<()> {
    let harness = Harness::new(PlayerConfig {
        supports_seamless_audio_change: true,
        ..Default::default()
    });
    let provider = &harness.provider;
    let timeline = provider.update_manifest(parse_manifest(AUDIO_VIDEO_TEXT));
    let period = &timeline.periods[0];
    let groups = provider.get_stream_groups(period)?;

    let audio = provider.create_stream(period, &groups[1], None)?;
    assert!(audio.stream_selector().is_throughput());

    let foreign = StreamGroup {
        content_type: ContentType::Video,
        streams: vec![],
    };
    assert!(matches!(
        provider.create_stream(period, &foreign, None),
        Err(DashError::InvalidStreamGroup)
    ));
    let missing = ClientPeriod {
        id: 42,
        start: None,
        duration: None,
    };
    assert!(matches!(
        provider.get_stream_groups(&missing),
        Err(DashError::InvalidPeriod(42))
    ));
    Ok(())
}

#[tokio::test]
async fn test_prepare_over_http() -> anyhow::Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vod/manifest.mpd"))
        .respond_with(ResponseTemplate::new(200).set_body_string(video_manifest("PT30S")))
        .mount(&mock_server)
        .await;

    let url = url::Url::parse(&format!("{}/vod/manifest.mpd", mock_server.uri()))?;
    let demuxer = MockDemuxer::new();
    let provider = DashStreamProvider::new(
        ManifestLoader::new(HttpClient::default(), url),
        MockDownloader::new(),
        Arc::new(MonotonicClock::new()),
        demuxer.factory(),
        PlayerConfig::default(),
    );

    let timeline = provider.prepare().await?;
    assert!(!timeline.dynamic);
    assert_eq!(timeline.periods.len(), 1);
    assert_eq!(timeline.periods[0].duration, Some(Duration::from_secs(30)));

    let groups = provider.get_stream_groups(&timeline.periods[0])?;
    assert_eq!(groups[0].streams.len(), 2);
    assert_eq!(groups[0].streams[0].format.width, Some(640));
    Ok(())
}
