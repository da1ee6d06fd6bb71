mod sink;

use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use iori_player::{dash::loader::ManifestLoader, prelude::*};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    ClientBuilder,
};
use sink::{CountingDemuxer, LoggingRenderer};
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct DashPlayArgs {
    /// Debug output
    #[clap(long, alias = "debug")]
    verbose: bool,

    /// Seconds of media to buffer ahead of playback
    #[clap(long, default_value = "8", env = "DASHPLAY_MAX_BUFFER")]
    max_buffer: f64,

    /// HTTP Header used to download
    ///
    /// Custom header. eg. "Referer: xxxxx".
    #[clap(short = 'H', long)]
    headers: Vec<String>,

    /// Cookies used to download
    #[clap(long)]
    cookies: Vec<String>,

    /// User agent used to download
    #[clap(long, env = "DASHPLAY_USER_AGENT")]
    user_agent: Option<String>,

    /// HTTP timeout in seconds
    #[clap(long, default_value = "30")]
    timeout: u64,

    /// Run the audio and video load loops of the first period for this many seconds
    #[clap(long)]
    play: Option<u64>,

    /// Assume the renderer can switch audio representations seamlessly
    #[clap(long)]
    seamless_audio: bool,

    /// MPD URL
    url: Url,
}

impl DashPlayArgs {
    fn client(&self) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            let (key, value) = header
                .split_once(':')
                .with_context(|| format!("Invalid header: {header}"))?;
            headers.insert(
                HeaderName::from_str(key.trim())?,
                HeaderValue::from_str(value.trim())?,
            );
        }

        let mut builder = ClientBuilder::new()
            .default_headers(headers)
            .timeout(Duration::from_secs(self.timeout));
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent);
        }
        let client = HttpClient::new(builder)?;
        if !self.cookies.is_empty() {
            client.add_cookies(self.cookies.clone(), self.url.clone())?;
        }
        Ok(client)
    }

    fn config(&self) -> anyhow::Result<PlayerConfig> {
        Ok(PlayerConfig {
            max_buffer_time: Duration::try_from_secs_f64(self.max_buffer)?,
            supports_seamless_audio_change: self.seamless_audio,
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = DashPlayArgs::parse();

    let default_directive = if args.verbose {
        "iori_player=debug,dashplay=debug"
    } else {
        "iori_player=info,dashplay=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = args.client()?;
    let config = args.config()?;
    let downloader =
        HttpDownloader::new(client.clone()).with_chunk_size(config.download_chunk_size);
    let provider = DashStreamProvider::new(
        ManifestLoader::new(client, args.url.clone()),
        Arc::new(downloader),
        Arc::new(MonotonicClock::new()),
        Arc::new(|| Arc::new(CountingDemuxer::new()) as Arc<dyn Demuxer>),
        config,
    );

    let timeline = provider.prepare().await?;
    println!(
        "{} presentation, duration {:?}",
        if timeline.dynamic { "dynamic" } else { "static" },
        provider.get_duration()
    );
    for period in &timeline.periods {
        println!(
            "period #{}: start {:?}, duration {:?}",
            period.id, period.start, period.duration
        );
        for group in provider.get_stream_groups(period)? {
            println!("  {} ({} streams)", group.content_type, group.streams.len());
            for stream in &group.streams {
                let format = &stream.format;
                println!(
                    "    {:<16} {:>9} bps  {:<24} {}",
                    format.id,
                    format.bitrate.unwrap_or_default(),
                    format.codecs.as_deref().unwrap_or("-"),
                    match (format.width, format.height, format.channel_count) {
                        (Some(w), Some(h), _) => format!("{w}x{h}"),
                        (_, _, Some(channels)) => format!("{channels}ch"),
                        _ => String::new(),
                    }
                );
            }
        }
    }

    let (Some(seconds), Some(period)) = (args.play, timeline.periods.first()) else {
        return Ok(());
    };

    let cancel = CancellationToken::new();
    let renderer = Arc::new(LoggingRenderer::default());
    let mut tasks = Vec::new();
    for group in provider.get_stream_groups(period)? {
        if !matches!(group.content_type, ContentType::Audio | ContentType::Video) {
            continue;
        }
        let stream = provider.create_stream(period, &group, None)?;
        let renderer = renderer.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            let result = stream
                .load_chunks(PlaybackSegment::default(), renderer, &cancel)
                .await;
            (stream.content_type(), result)
        }));
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    cancel.cancel();

    for task in tasks {
        let (content_type, result) = task.await?;
        if let Err(e) = result {
            tracing::error!("{content_type} stream failed: {e}");
        }
    }
    println!(
        "received {} packets, {} bytes, estimated throughput {:.0} bps",
        renderer.packets(),
        renderer.bytes(),
        provider.throughput_history().average_throughput()
    );
    Ok(())
}
