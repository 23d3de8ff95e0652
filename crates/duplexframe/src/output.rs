use std::fmt::Write as _;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

/// Binary payloads longer than this are shown truncated.
const HEX_PREVIEW_LIMIT: usize = 64;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    seq: u64,
    size: usize,
    encoding: &'static str,
    payload: String,
    source: &'a str,
    timestamp: String,
}

/// Print one received payload. `seq` counts frames from this source, starting at 1.
pub fn print_frame(payload: &Bytes, seq: u64, source: &str, format: OutputFormat) {
    let (encoding, preview) = payload_preview(payload.as_ref());
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                seq,
                size: payload.len(),
                encoding,
                payload: preview,
                source,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "SIZE", "SOURCE", "PAYLOAD"])
                .add_row(vec![
                    seq.to_string(),
                    payload.len().to_string(),
                    source.to_string(),
                    preview,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "#{seq} size={} source={source} {encoding}={preview}",
                payload.len()
            );
        }
        OutputFormat::Raw => {
            print_raw(payload.as_ref());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> (&'static str, String) {
    match std::str::from_utf8(payload) {
        Ok(text) => ("utf8", text.to_string()),
        Err(_) => {
            let shown = payload.len().min(HEX_PREVIEW_LIMIT);
            let mut hex = String::with_capacity(shown * 2 + 3);
            for byte in &payload[..shown] {
                let _ = write!(hex, "{byte:02x}");
            }
            if shown < payload.len() {
                hex.push_str("...");
            }
            ("hex", hex)
        }
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
