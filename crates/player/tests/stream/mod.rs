use std::{collections::HashSet, sync::Arc, time::Duration};

use byteorder::{BigEndian, WriteBytesExt};
use iori_player::prelude::*;
use reqwest::StatusCode;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::common::{parse_manifest, video_manifest, DemuxerCall, Harness};

fn video_stream(harness: &Harness, duration: &str, index: usize) -> Arc<DashStream> {
    harness.video_stream(
        parse_manifest(&video_manifest(duration)),
        StreamSelector::fixed(index),
    )
}

fn spawn_load(
    harness: &Harness,
    stream: &Arc<DashStream>,
    cancel: &CancellationToken,
) -> JoinHandle<DashResult<()>> {
    let stream = stream.clone();
    let renderer = harness.renderer();
    let cancel = cancel.clone();
    tokio::spawn(async move {
        stream
            .load_chunks(PlaybackSegment::default(), renderer, &cancel)
            .await
    })
}

/// Version 0 `sidx` box, timescale 1000, with `(size, duration)` references.
fn sidx(references: &[(u32, u32)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.write_u32::<BigEndian>(0).unwrap(); // version, flags
    body.write_u32::<BigEndian>(1).unwrap(); // reference_ID
    body.write_u32::<BigEndian>(1000).unwrap();
    body.write_u32::<BigEndian>(0).unwrap(); // earliest_presentation_time
    body.write_u32::<BigEndian>(0).unwrap(); // first_offset
    body.write_u16::<BigEndian>(0).unwrap();
    body.write_u16::<BigEndian>(references.len() as u16).unwrap();
    for (size, duration) in references {
        body.write_u32::<BigEndian>(*size).unwrap();
        body.write_u32::<BigEndian>(*duration).unwrap();
        body.write_u32::<BigEndian>(0x9000_0000).unwrap();
    }

    let mut data = Vec::new();
    data.write_u32::<BigEndian>(body.len() as u32 + 8).unwrap();
    data.extend_from_slice(b"sidx");
    data.extend_from_slice(&body);
    data
}

const INDEXED_MANIFEST: &str = r#"<MPD type="static" mediaPresentationDuration="PT5.5S">
  <Period>
    <AdaptationSet contentType="video" mimeType="video/mp4">
      <Representation id="v" bandwidth="1000000" codecs="avc1.4d401f">
        <BaseURL>video.mp4</BaseURL>
        <SegmentBase indexRange="800-867">
          <Initialization range="0-799"/>
        </SegmentBase>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#;

#[tokio::test(start_paused = true)]
async fn test_sleeps_while_buffer_is_full() -> anyhow::Result<()> {
    let harness = Harness::new(PlayerConfig::default());
    let stream = video_stream(&harness, "PT100S", 0);
    let cancel = CancellationToken::new();
    let task = spawn_load(&harness, &stream, &cancel);

    // 4 segments of 2.5s put the buffer 10s ahead, the loop then sleeps 10s - 8s / 2
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.downloader.data_requests(), 4);

    tokio::time::sleep(Duration::from_millis(5800)).await;
    assert_eq!(harness.downloader.data_requests(), 4);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.downloader.data_requests(), 6);

    cancel.cancel();
    task.await??;
    assert!(!harness
        .renderer
        .packets()
        .iter()
        .any(|p| matches!(p, Packet::Eos(_))));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_end_of_stream() -> anyhow::Result<()> {
    let harness = Harness::new(PlayerConfig::default());
    let stream = video_stream(&harness, "PT10S", 1);
    let cancel = CancellationToken::new();

    spawn_load(&harness, &stream, &cancel).await??;

    let requests = harness.downloader.requests();
    assert_eq!(
        requests,
        vec![
            "/vod/high/init.mp4",
            "/vod/high/1.m4s",
            "/vod/high/2.m4s",
            "/vod/high/3.m4s",
            "/vod/high/4.m4s",
        ]
    );
    let unique: HashSet<_> = requests.iter().collect();
    assert_eq!(unique.len(), requests.len());

    let packets = harness.renderer.packets();
    assert_eq!(packets.len(), 5);
    assert_eq!(packets.last(), Some(&Packet::Eos(ContentType::Video)));
    let Packet::Media(first) = &packets[0] else {
        panic!("expected a media packet first");
    };
    assert_eq!(&first.data[..], b"/vod/high/1.m4s");

    let drm = harness.renderer.drm_init_data();
    assert_eq!(drm.len(), 1);
    assert_eq!(&drm[0].data[..], b"/vod/high/init.mp4");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_last_segment_is_end_of_stream() -> anyhow::Result<()> {
    let harness = Harness::new(PlayerConfig::default());
    harness.downloader.fail("/vod/low/4.m4s", StatusCode::NOT_FOUND);
    let stream = video_stream(&harness, "PT10S", 0);
    let mut events = stream.subscribe();
    let cancel = CancellationToken::new();

    spawn_load(&harness, &stream, &cancel).await??;

    assert_eq!(harness.downloader.data_requests(), 4);
    assert_eq!(
        harness.renderer.packets().last(),
        Some(&Packet::Eos(ContentType::Video))
    );
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, StreamEvent::Error(_)));
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_middle_segment_is_an_error() -> anyhow::Result<()> {
    let harness = Harness::new(PlayerConfig::default());
    harness.downloader.fail("/vod/low/3.m4s", StatusCode::NOT_FOUND);
    let stream = video_stream(&harness, "PT10S", 0);
    let mut events = stream.subscribe();
    let cancel = CancellationToken::new();

    let result = spawn_load(&harness, &stream, &cancel).await?;
    assert!(matches!(&result, Err(DashError::HttpError(status)) if *status == StatusCode::NOT_FOUND));
    assert!(result.is_err_and(|e| e.is_chunk_load_error()));

    assert_eq!(harness.downloader.data_requests(), 3);
    assert!(!harness
        .renderer
        .packets()
        .iter()
        .any(|p| matches!(p, Packet::Eos(_))));

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        saw_error |= matches!(event, StreamEvent::Error(_));
    }
    assert!(saw_error);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_representation_switch_drains_demuxer_first() -> anyhow::Result<()> {
    let harness = Harness::new(PlayerConfig::default());
    let stream = video_stream(&harness, "PT100S", 0);
    let mut events = stream.subscribe();
    let cancel = CancellationToken::new();
    let task = spawn_load(&harness, &stream, &cancel);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let before_switch = harness.demuxer.calls().len();
    stream.set_stream_selector(StreamSelector::fixed(1));

    tokio::time::sleep(Duration::from_secs(6)).await;
    cancel.cancel();
    task.await??;

    let calls = harness.demuxer.calls().split_off(before_switch);
    let position = |call: &DemuxerCall| calls.iter().position(|c| c == call);
    let complete = position(&DemuxerCall::Complete).expect("complete");
    let completion = position(&DemuxerCall::Completion).expect("completion");
    let drained = position(&DemuxerCall::Drained).expect("drained");
    let reset = position(&DemuxerCall::Reset).expect("reset");
    let init_push = position(&DemuxerCall::PushChunk { offset: 0 }).expect("push");
    let init = position(&DemuxerCall::InitForEs).expect("init");
    assert!(complete < completion);
    assert!(completion < reset && drained < reset);
    assert!(reset < init_push && init_push < init);

    // segments continue where the previous representation stopped
    let requests = harness.downloader.requests();
    let high: Vec<_> = requests
        .iter()
        .filter(|r| r.starts_with("/vod/high/"))
        .collect();
    assert_eq!(high[0], "/vod/high/init.mp4");
    assert_eq!(high[1], "/vod/high/5.m4s");

    let mut switches = vec![];
    while let Ok(event) = events.try_recv() {
        if let StreamEvent::StreamInfoChanged {
            selected_index,
            position,
            ..
        } = event
        {
            switches.push((selected_index, position));
        }
    }
    assert_eq!(
        switches,
        vec![(0, Duration::ZERO), (1, Duration::from_secs(10))]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stream_config_and_seek_position() -> anyhow::Result<()> {
    let harness = Harness::new(PlayerConfig::default());
    let stream = video_stream(&harness, "PT10S", 0);
    let cancel = CancellationToken::new();

    assert_eq!(
        stream.adjusted_seek_position(Duration::from_secs(6)),
        Duration::from_secs(5)
    );
    stream.prepare(&cancel).await?;
    assert!(harness.downloader.requests().is_empty());

    let config = {
        let stream = stream.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { stream.get_stream_config(&cancel).await })
    };
    spawn_load(&harness, &stream, &cancel).await??;

    let config = config.await??;
    assert_eq!(config.codec.as_deref(), Some("/vod/low/init.mp4"));
    assert_eq!(stream.get_stream_config(&cancel).await?, config);
    Ok(())
}

#[tokio::test]
async fn test_stream_config_wait_is_cancellable() {
    let harness = Harness::new(PlayerConfig::default());
    let stream = video_stream(&harness, "PT10S", 0);
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(matches!(
        stream.get_stream_config(&cancel).await,
        Err(DashError::Cancelled)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_indexed_representation() -> anyhow::Result<()> {
    let harness = Harness::new(PlayerConfig::default());
    let index = sidx(&[(100, 2000), (200, 2000), (300, 1500)]);
    assert_eq!(index.len(), 68);
    let mut media = vec![0u8; 1468];
    media[800..868].copy_from_slice(&index);
    harness.downloader.serve("/vod/video.mp4", media);

    let stream = harness.video_stream(parse_manifest(INDEXED_MANIFEST), StreamSelector::fixed(0));
    let cancel = CancellationToken::new();
    assert_eq!(
        stream.adjusted_seek_position(Duration::from_secs(3)),
        Duration::from_secs(3)
    );
    stream.prepare(&cancel).await?;
    assert_eq!(
        stream.adjusted_seek_position(Duration::from_secs(3)),
        Duration::from_secs(2)
    );

    spawn_load(&harness, &stream, &cancel).await??;

    let ranges: Vec<_> = harness
        .downloader
        .ranged_requests()
        .into_iter()
        .map(|(path, range)| {
            assert_eq!(path, "/vod/video.mp4");
            (range.offset, range.length)
        })
        .collect();
    assert_eq!(
        ranges,
        vec![
            (800, Some(68)),
            (0, Some(800)),
            (868, Some(100)),
            (968, Some(200)),
            (1168, Some(300)),
        ]
    );

    let packets = harness.renderer.packets();
    assert_eq!(packets.len(), 4);
    assert_eq!(packets.last(), Some(&Packet::Eos(ContentType::Video)));
    let Packet::Media(second) = &packets[1] else {
        panic!("expected media packets before the end of stream");
    };
    assert_eq!(second.data.len(), 200);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_during_initialization() -> anyhow::Result<()> {
    let harness = Harness::new(PlayerConfig::default());
    let stream = video_stream(&harness, "PT10S", 0);
    let cancel = CancellationToken::new();
    harness
        .downloader
        .cancel_after("/vod/low/init.mp4", &cancel);

    spawn_load(&harness, &stream, &cancel).await??;

    assert_eq!(harness.downloader.requests(), vec!["/vod/low/init.mp4"]);
    assert!(!harness.demuxer.calls().contains(&DemuxerCall::InitForEs));
    assert!(harness.renderer.packets().is_empty());
    Ok(())
}
