use async_stream::stream;
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::{error::PipeError, models::TextStream, telemetry};

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/**
 * \brief 单行 SSE 的解析结果。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /** \brief 非数据行、坏 JSON 或无内容增量 */
    Skip,
    /** \brief 收到 `[DONE]` */
    Done,
    Fragment(String),
}

/**
 * \brief 解析一行上游输出。
 */
pub fn parse_line(line: &str) -> LineEvent {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return LineEvent::Skip;
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload.trim() == DONE_SENTINEL {
        return LineEvent::Done;
    }
    match parse_delta(payload) {
        Some(content) if !content.is_empty() => LineEvent::Fragment(content),
        _ => LineEvent::Skip,
    }
}

fn parse_delta(payload: &str) -> Option<String> {
    let v: Value = serde_json::from_str(payload).ok()?;
    v.get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

/**
 * \brief 将字节流按行切分并转换为文本增量流。
 *
 * 传输中断时，将错误文本作为最后一段产出后结束。
 */
pub fn text_fragments<S, B>(upstream: S) -> TextStream
where
    S: Stream<Item = Result<B, PipeError>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let out = stream! {
        let mut upstream = Box::pin(upstream);
        let mut buf = Vec::<u8>::new();
        let mut finished = false;

        'read: while let Some(chunk) = upstream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    telemetry::log_error("pipe.stream", &format!("stream interrupted: {}", e));
                    finished = true;
                    yield e.to_string();
                    break 'read;
                }
            };
            buf.extend_from_slice(chunk.as_ref());
            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line = buf.drain(..=pos).collect::<Vec<u8>>();
                match parse_line(&String::from_utf8_lossy(&line)) {
                    LineEvent::Fragment(text) => yield text,
                    LineEvent::Done => {
                        finished = true;
                        break 'read;
                    }
                    LineEvent::Skip => {}
                }
            }
        }

        if !finished && !buf.is_empty() {
            if let LineEvent::Fragment(text) = parse_line(&String::from_utf8_lossy(&buf)) {
                yield text;
            }
        }
    };

    Box::pin(out)
}
