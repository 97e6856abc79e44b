use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gateway_audio::frame::FRAME_BYTES;
use log::{debug, info, warn};

use crate::error::GatewayError;
use crate::time::now_ms;
use crate::tts::metrics::TtsMetrics;

/// One item handed from the blocking producer thread to the async consumer.
pub enum ProducedItem {
    Frame(Vec<u8>),
    /// Sentinel marking end of stream, whether by normal completion, a
    /// producer error, or the stop flag being raised.
    End,
}

const READ_CHUNK_BYTES: usize = 8192;

/// Fetches synthesized PCM audio over a blocking HTTP stream and slices it
/// into exact transport frames, handing each one to the consumer over a
/// bounded channel. Runs on its own OS thread because `reqwest::blocking`
/// and tokio's cooperative scheduler don't mix on the same thread.
pub struct TtsProducer;

impl TtsProducer {
    /// Spawns the producer thread. `tx.send` blocks (via `handle.block_on`)
    /// when the consumer's queue is full, giving genuine backpressure
    /// instead of an unbounded buffer.
    pub fn spawn(
        tts_addr: String,
        text: String,
        stop_flag: Arc<AtomicBool>,
        tx: tokio::sync::mpsc::Sender<ProducedItem>,
        handle: tokio::runtime::Handle,
        read_timeout: Duration,
        total_timeout: Duration,
        max_bytes: usize,
        metrics: Arc<Mutex<TtsMetrics>>,
    ) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let outcome = Self::run(
                &tts_addr,
                &text,
                &stop_flag,
                &tx,
                &handle,
                read_timeout,
                total_timeout,
                max_bytes,
                &metrics,
            );
            if let Err(e) = outcome {
                warn!("tts producer ended with error: {e}");
            }
            let _ = handle.block_on(tx.send(ProducedItem::End));
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        tts_addr: &str,
        text: &str,
        stop_flag: &AtomicBool,
        tx: &tokio::sync::mpsc::Sender<ProducedItem>,
        handle: &tokio::runtime::Handle,
        read_timeout: Duration,
        total_timeout: Duration,
        max_bytes: usize,
        metrics: &Mutex<TtsMetrics>,
    ) -> Result<(), GatewayError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(total_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| GatewayError::TtsProducerHttpError(e.to_string()))?;

        let url = format!("http://{tts_addr}/synthesize");
        info!("tts producer connecting to {url}");
        let mut response = client
            .post(&url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .map_err(|e| GatewayError::TtsProducerHttpError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::TtsProducerHttpError(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        metrics.lock().unwrap().mark_producer_connected(now_ms());

        let mut carry: Vec<u8> = Vec::with_capacity(FRAME_BYTES * 2);
        let mut buf = [0u8; READ_CHUNK_BYTES];
        let mut total_bytes = 0usize;
        let mut wav_sniffed = false;

        loop {
            if stop_flag.load(Ordering::Relaxed) {
                debug!("tts producer observed stop flag, abandoning stream");
                return Ok(());
            }

            let n = response
                .read(&mut buf)
                .map_err(|e| GatewayError::TtsProducerHttpError(e.to_string()))?;
            if n == 0 {
                break;
            }

            metrics.lock().unwrap().mark_first_byte(now_ms());
            total_bytes += n;
            if total_bytes > max_bytes {
                return Err(GatewayError::TtsTruncated(max_bytes));
            }
            carry.extend_from_slice(&buf[..n]);

            // The synthesis endpoint normally streams raw PCM directly, but
            // some responses (notably a pre-recorded greeting clip) come
            // back RIFF/WAVE-framed. That framing can only be detected at
            // the very start of the stream, so the whole response is
            // buffered once RIFF magic is seen rather than sliced into
            // frames as it arrives.
            if !wav_sniffed {
                wav_sniffed = true;
                if carry.len() >= 4 && &carry[0..4] == b"RIFF" {
                    debug!("tts response is RIFF/WAVE-framed, buffering to locate data chunk");
                    return Self::drain_wav(
                        response, stop_flag, tx, handle, max_bytes, carry, total_bytes, metrics,
                    );
                }
            }

            while carry.len() >= FRAME_BYTES {
                if stop_flag.load(Ordering::Relaxed) {
                    return Ok(());
                }
                let frame: Vec<u8> = carry.drain(..FRAME_BYTES).collect();
                if handle.block_on(tx.send(ProducedItem::Frame(frame))).is_err() {
                    debug!("tts consumer dropped, ending producer early");
                    return Ok(());
                }
            }
        }

        if !carry.is_empty() && !stop_flag.load(Ordering::Relaxed) {
            carry.resize(FRAME_BYTES, 0);
            let _ = handle.block_on(tx.send(ProducedItem::Frame(carry)));
        }

        metrics.lock().unwrap().mark_producer_ended(now_ms(), total_bytes);
        Ok(())
    }

    /// Reads the remainder of a RIFF/WAVE-framed response to completion,
    /// parses the header to locate the `data` chunk, and frames just that
    /// payload. Used only for the rare non-streaming response; buffering
    /// the whole clip is fine since these are short greeting-sized clips.
    #[allow(clippy::too_many_arguments)]
    fn drain_wav(
        mut response: reqwest::blocking::Response,
        stop_flag: &AtomicBool,
        tx: &tokio::sync::mpsc::Sender<ProducedItem>,
        handle: &tokio::runtime::Handle,
        max_bytes: usize,
        mut buf: Vec<u8>,
        mut total_bytes: usize,
        metrics: &Mutex<TtsMetrics>,
    ) -> Result<(), GatewayError> {
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            if stop_flag.load(Ordering::Relaxed) {
                return Ok(());
            }
            let n = response
                .read(&mut chunk)
                .map_err(|e| GatewayError::TtsProducerHttpError(e.to_string()))?;
            if n == 0 {
                break;
            }
            total_bytes += n;
            if total_bytes > max_bytes {
                return Err(GatewayError::TtsTruncated(max_bytes));
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let header = gateway_audio::wav::parse_header(&buf)?;
        let mut payload = gateway_audio::wav::read_pcm_bytes(&buf, &header).to_vec();

        while payload.len() >= FRAME_BYTES {
            if stop_flag.load(Ordering::Relaxed) {
                return Ok(());
            }
            let frame: Vec<u8> = payload.drain(..FRAME_BYTES).collect();
            if handle.block_on(tx.send(ProducedItem::Frame(frame))).is_err() {
                debug!("tts consumer dropped, ending producer early");
                return Ok(());
            }
        }
        if !payload.is_empty() && !stop_flag.load(Ordering::Relaxed) {
            payload.resize(FRAME_BYTES, 0);
            let _ = handle.block_on(tx.send(ProducedItem::Frame(payload)));
        }
        metrics.lock().unwrap().mark_producer_ended(now_ms(), total_bytes);
        Ok(())
    }
}
