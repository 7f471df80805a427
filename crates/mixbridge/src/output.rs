use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use mixbridge::frame::OutboundFrame;
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
    channel: &'a str,
    reply_to: Option<&'a str>,
    args: &'a [Value],
}

/// Print one frame the plugin sent to the host.
pub fn print_frame(frame: &OutboundFrame, format: OutputFormat) {
    let reply_to = frame.reply_to.as_ref().map(|token| token.as_str());
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                channel: &frame.channel,
                reply_to,
                args: &frame.args,
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
                .set_header(vec!["CHANNEL", "REPLY TO", "ARGS"])
                .add_row(vec![
                    frame.channel.clone(),
                    reply_to.unwrap_or("-").to_string(),
                    args_preview(&frame.args),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match reply_to {
            Some(token) => println!(
                "{} reply_to={} args={}",
                frame.channel,
                token,
                args_preview(&frame.args)
            ),
            None => println!("{} args={}", frame.channel, args_preview(&frame.args)),
        },
        OutputFormat::Raw => {
            let mut line = serde_json::to_vec(frame).unwrap_or_default();
            line.push(b'\n');
            print_raw(&line);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn args_preview(args: &[Value]) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| format!("<{} args>", args.len()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn frame_output_names_fields() {
        let args = vec![json!("ch1"), json!(0.5)];
        let out = FrameOutput {
            channel: "plugin-setIndicator-volume",
            reply_to: None,
            args: &args,
        };
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({
                "channel": "plugin-setIndicator-volume",
                "reply_to": null,
                "args": ["ch1", 0.5],
            })
        );
    }

    #[test]
    fn args_preview_is_compact_json() {
        assert_eq!(args_preview(&[json!("a"), json!(true)]), r#"["a",true]"#);
    }
}
