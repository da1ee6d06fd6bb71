use bytes::Bytes;
use iori_player::prelude::*;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn test_ranged_download_is_rechunked() -> anyhow::Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media.mp4"))
        .and(header("range", "bytes=100-109"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(b"0123456789".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let downloader = HttpDownloader::new(HttpClient::default()).with_chunk_size(4);
    let history = ThroughputHistory::new();
    let url = Url::parse(&format!("{}/media.mp4", mock_server.uri()))?;

    let mut chunks = Vec::new();
    downloader
        .download(
            &url,
            ByteRange::new(100, Some(10)),
            &mut |bytes: Bytes| chunks.push(bytes),
            &history,
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(
        chunks.iter().map(|c| c.len()).collect::<Vec<_>>(),
        vec![4, 4, 2]
    );
    assert_eq!(chunks.concat(), b"0123456789");
    assert_eq!(history.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_download_still_reports_throughput() -> anyhow::Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.m4s"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&mock_server)
        .await;

    let downloader = HttpDownloader::new(HttpClient::default());
    let history = ThroughputHistory::new();
    let url = Url::parse(&format!("{}/missing.m4s", mock_server.uri()))?;

    let result = downloader
        .download_bytes(&url, ByteRange::default(), &history, &CancellationToken::new())
        .await;
    assert!(matches!(&result, Err(DashError::HttpError(status)) if status.as_u16() == 404));
    assert!(result.is_err_and(|e| e.is_chunk_load_error()));
    assert_eq!(history.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_download() -> anyhow::Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(30)))
        .mount(&mock_server)
        .await;

    let downloader = HttpDownloader::new(HttpClient::default());
    let history = ThroughputHistory::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = downloader
        .download_bytes(
            &Url::parse(&mock_server.uri())?,
            ByteRange::default(),
            &history,
            &cancel,
        )
        .await;
    assert!(matches!(result, Err(DashError::Cancelled)));
    Ok(())
}
