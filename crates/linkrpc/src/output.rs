use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use linkrpc_dispatch::RpcError;
use linkrpc_frame::{Frame, FrameKind};
use serde::Serialize;
use serde_json::Value;

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
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    src: &'a str,
    dst: &'a str,
    tag: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorOutput<'a>>,
    has_auth: bool,
}

#[derive(Serialize)]
struct ErrorOutput<'a> {
    code: i64,
    message: &'a str,
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorOutput<'a>>,
}

pub fn kind_name(kind: FrameKind) -> &'static str {
    match kind {
        FrameKind::Request => "request",
        FrameKind::Notification => "notification",
        FrameKind::Response => "response",
    }
}

/// Print a decoded frame. The `auth` member is reported only by presence.
pub fn print_frame(frame: &Frame, format: OutputFormat) {
    let out = FrameOutput {
        kind: kind_name(frame.kind()),
        id: frame.id.as_ref().map(|id| id.as_str()),
        src: &frame.src,
        dst: &frame.dst,
        tag: &frame.tag,
        method: frame.method.as_deref(),
        params: frame.params.as_ref(),
        result: frame.result.as_ref(),
        error: frame.error.as_ref().map(|err| ErrorOutput {
            code: err.code,
            message: &err.message,
        }),
        has_auth: frame.auth.is_some(),
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut rows = vec![
                ("KIND", out.kind.to_string()),
                ("ID", out.id.unwrap_or("").to_string()),
                ("SRC", out.src.to_string()),
                ("DST", out.dst.to_string()),
                ("TAG", out.tag.to_string()),
            ];
            if let Some(method) = out.method {
                rows.push(("METHOD", method.to_string()));
            }
            if let Some(params) = out.params {
                rows.push(("PARAMS", params.to_string()));
            }
            if let Some(result) = out.result {
                rows.push(("RESULT", result.to_string()));
            }
            if let Some(error) = &out.error {
                rows.push(("ERROR", format!("{}: {}", error.code, error.message)));
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in rows {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let mut line = format!("kind={}", out.kind);
            if let Some(id) = out.id {
                line.push_str(&format!(" id={id}"));
            }
            for (name, value) in [("src", out.src), ("dst", out.dst), ("tag", out.tag)] {
                if !value.is_empty() {
                    line.push_str(&format!(" {name}={value}"));
                }
            }
            if let Some(method) = out.method {
                line.push_str(&format!(" method={method}"));
            }
            if let Some(params) = out.params {
                line.push_str(&format!(" params={params}"));
            }
            if let Some(result) = out.result {
                line.push_str(&format!(" result={result}"));
            }
            if let Some(error) = &out.error {
                line.push_str(&format!(" error={}:{}", error.code, error.message));
            }
            println!("{line}");
        }
        OutputFormat::Raw => {
            let mut bytes = frame.to_bytes();
            bytes.push(b'\n');
            print_raw(&bytes);
        }
    }
}

/// Print the outcome of a call.
pub fn print_reply(method: &str, outcome: &Result<Value, RpcError>, format: OutputFormat) {
    let out = ReplyOutput {
        method,
        result: outcome.as_ref().ok(),
        error: outcome.as_ref().err().map(|err| ErrorOutput {
            code: err.code,
            message: &err.message,
        }),
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let (status, body) = match outcome {
                Ok(result) => ("ok".to_string(), result.to_string()),
                Err(err) => (err.code.to_string(), err.message.clone()),
            };
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "STATUS", "RESULT"])
                .add_row(vec![method.to_string(), status, body]);
            println!("{table}");
        }
        OutputFormat::Pretty => match outcome {
            Ok(result) => {
                let body = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
                println!("{method} ok\n{body}");
            }
            Err(err) => println!("{method} error {}: {}", err.code, err.message),
        },
        OutputFormat::Raw => {
            let body = match outcome {
                Ok(result) => result.to_string(),
                Err(err) => err.to_string(),
            };
            print_raw(format!("{body}\n").as_bytes());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}
