use std::path::Path;

use bytes::Bytes;
use edcp::pft::{FecRetryPolicy, PftConfig, PftOutcome};
use edcp::{DcpDecoder, DecodeReport, HandlerRegistry, PayloadReport};
use tracing::{debug, info, warn};

use crate::cmd::{DecodeArgs, FecRetry, InputFormat};
use crate::exit::{hex_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_datagram, print_undelivered, DatagramOutput, OutputFormat, UndeliveredOutput};

/// A datagram and where it came from.
struct Input {
    source: String,
    data: Bytes,
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut inputs = Vec::new();
    for path in &args.files {
        inputs.extend(read_inputs(path, args.input)?);
    }

    let mut decoder = DcpDecoder::new(pft_config(&args), HandlerRegistry::new());
    let mut decoded = 0usize;
    let mut skipped = 0usize;
    let mut problems = 0usize;

    for (n, input) in inputs.into_iter().enumerate() {
        let Some(report) = decoder.decode(input.data) else {
            debug!(source = %input.source, "not a DCP datagram");
            skipped += 1;
            continue;
        };
        decoded += 1;
        if is_problem(&report) {
            problems += 1;
        }
        for abandoned in decoder.take_abandoned() {
            warn!(
                sequence = abandoned.key.sequence,
                received = abandoned.received,
                total = abandoned.total,
                reason = ?abandoned.reason,
                "PFT message abandoned"
            );
        }
        let out = DatagramOutput::new(n, input.source, &report);
        print_datagram(&out, &report, format);
    }

    let undelivered = decoder.drain();
    problems += undelivered.len();
    for u in &undelivered {
        print_undelivered(&UndeliveredOutput::new(u), format);
    }

    info!(decoded, skipped, problems, "decode finished");

    if args.strict && problems > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{problems} datagram(s) did not decode cleanly"),
        ));
    }
    Ok(SUCCESS)
}

fn pft_config(args: &DecodeArgs) -> PftConfig {
    let mut config = PftConfig::default();
    if let Some(max) = args.max_fragments {
        config.store.max_fragments_per_message = max;
    }
    if let Some(max) = args.max_in_flight {
        config.store.max_in_flight = max;
    }
    if let Some(max) = args.max_message_bytes {
        config.max_message_bytes = max;
    }
    config.fec_retry = match args.fec_retry {
        FecRetry::Retry => FecRetryPolicy::RetryOnNewFragment,
        FecRetry::Fail => FecRetryPolicy::FailPermanently,
    };
    config.fec_with_gaps = !args.no_fec_gaps;
    config
}

fn is_problem(report: &DecodeReport) -> bool {
    if report.error.is_some() {
        return true;
    }
    if let Some(PftOutcome::Failed { .. }) = report.pft.as_ref().map(|p| &p.outcome) {
        return true;
    }
    match &report.af {
        Some(af) => {
            !af.frame.is_intact()
                || matches!(af.payload, PayloadReport::TagError(_))
                || matches!(
                    &af.payload,
                    PayloadReport::Handled(h) | PayloadReport::Tags { handoff: Some(h), .. }
                        if h.result.is_err()
                )
        }
        None => false,
    }
}

fn read_inputs(path: &Path, input: InputFormat) -> CliResult<Vec<Input>> {
    let display = path.display().to_string();
    let data =
        std::fs::read(path).map_err(|err| io_error(&format!("failed to read {display}"), err))?;

    match input {
        InputFormat::Raw => Ok(vec![Input {
            source: display,
            data: Bytes::from(data),
        }]),
        InputFormat::Hex => {
            let text = String::from_utf8(data).map_err(|err| {
                CliError::new(DATA_INVALID, format!("{display}: not UTF-8 text: {err}"))
            })?;
            parse_hex_lines(&display, &text)
        }
    }
}

fn parse_hex_lines(display: &str, text: &str) -> CliResult<Vec<Input>> {
    let mut out = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let context = format!("{display}:{}", line_no + 1);
        let hex: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        let mut bytes = vec![0u8; hex.len() / 2];
        if hex.len() % 2 != 0 {
            return Err(CliError::new(
                DATA_INVALID,
                format!("{context}: odd number of hex digits"),
            ));
        }
        faster_hex::hex_decode(hex.as_bytes(), &mut bytes).map_err(|err| hex_error(&context, err))?;
        out.push(Input {
            source: context,
            data: Bytes::from(bytes),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_lines_skip_comments_and_blanks() {
        let text = "# capture\n\n4146 0000\n  \n# end\nDEADbeef\n";
        let inputs = parse_hex_lines("cap.hex", text).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].data.as_ref(), b"AF\x00\x00");
        assert_eq!(inputs[0].source, "cap.hex:3");
        assert_eq!(inputs[1].data.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn bad_hex_is_data_invalid() {
        let err = parse_hex_lines("cap.hex", "41zz\n").err().unwrap();
        assert_eq!(err.code, DATA_INVALID);
        let err = parse_hex_lines("cap.hex", "414\n").err().unwrap();
        assert_eq!(err.code, DATA_INVALID);
    }
}
