use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use edcp::frame::{AfFrame, CrcStatus, LengthCheck, ProtocolPointer, TagName, TagRecord};
use edcp::pft::{PftOutcome, PftReport, Undelivered};
use edcp::{DecodeReport, HandoffOutcome, PayloadReport};
use serde::Serialize;

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

const PREVIEW_BYTES: usize = 16;

#[derive(Serialize)]
pub struct DatagramOutput {
    pub datagram: usize,
    pub source: String,
    pub sync: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pft: Option<PftView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub af: Option<AfView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct PftView {
    pub sequence: u16,
    pub index: u32,
    pub count: u32,
    pub first: bool,
    pub last: bool,
    pub header_crc_ok: bool,
    pub declared_len: u16,
    pub payload_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rs_k: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rs_z: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<u16>,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_max: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_min: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_symbols: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[derive(Serialize)]
pub struct AfView {
    pub sequence: u16,
    pub major: u8,
    pub minor: u8,
    pub payload_type: String,
    pub length: u32,
    pub length_check: String,
    pub crc: &'static str,
    pub intact: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_error: Option<String>,
}

#[derive(Serialize)]
pub struct TagView {
    pub name: String,
    pub offset: usize,
    pub bits: u32,
    pub value: String,
}

#[derive(Serialize)]
pub struct UndeliveredOutput {
    pub sequence: u16,
    pub reason: String,
    pub error: String,
}

impl DatagramOutput {
    pub fn new(datagram: usize, source: String, report: &DecodeReport) -> Self {
        Self {
            datagram,
            source,
            sync: report.sync.name(),
            pft: report.pft.as_ref().map(pft_view),
            af: report.af.as_ref().map(|af| af_view(&af.frame, &af.payload)),
            error: report.error.as_ref().map(ToString::to_string),
        }
    }
}

impl UndeliveredOutput {
    pub fn new(undelivered: &Undelivered) -> Self {
        Self {
            sequence: undelivered.key.sequence,
            reason: format!("{:?}", undelivered.reason).to_lowercase(),
            error: undelivered.error.to_string(),
        }
    }
}

fn pft_view(report: &PftReport) -> PftView {
    let header = &report.header;
    let mut view = PftView {
        sequence: header.sequence,
        index: header.index,
        count: header.count,
        first: header.is_first(),
        last: header.is_last(),
        header_crc_ok: header.hcrc_ok,
        declared_len: header.declared_len,
        payload_len: report.payload_len,
        rs_k: header.fec.map(|f| f.rs_k),
        rs_z: header.fec.map(|f| f.rs_z),
        source: header.address.map(|a| a.source),
        dest: header.address.map(|a| a.dest),
        outcome: outcome_name(&report.outcome),
        received: None,
        needed: None,
        c_max: None,
        rx_min: None,
        corrected_symbols: None,
        failure: None,
    };
    match &report.outcome {
        PftOutcome::Incomplete { received, needed } => {
            view.received = Some(*received);
            view.needed = Some(*needed);
        }
        PftOutcome::Delivered { fec: Some(fec), .. } => {
            view.received = Some(fec.received);
            view.c_max = Some(fec.codewords);
            view.rx_min = Some(fec.min_fragments);
            view.corrected_symbols = Some(fec.corrected_symbols);
        }
        PftOutcome::Failed { reason, .. } => view.failure = Some(reason.to_string()),
        _ => {}
    }
    view
}

fn outcome_name(outcome: &PftOutcome) -> &'static str {
    match outcome {
        PftOutcome::Unfragmented(_) => "unfragmented",
        PftOutcome::Incomplete { .. } => "incomplete",
        PftOutcome::Delivered { .. } => "delivered",
        PftOutcome::Duplicate => "duplicate",
        PftOutcome::Failed { aborted: true, .. } => "aborted",
        PftOutcome::Failed { aborted: false, .. } => "failed",
    }
}

fn af_view(frame: &AfFrame, payload: &PayloadReport) -> AfView {
    let header = &frame.header;
    let mut view = AfView {
        sequence: header.sequence,
        major: header.major,
        minor: header.minor,
        payload_type: payload_type_label(frame),
        length: header.length,
        length_check: length_check_label(frame.length_check),
        crc: crc_label(frame.crc_status),
        intact: frame.is_intact(),
        tags: Vec::new(),
        protocol: None,
        handler: None,
        handler_error: None,
        tag_error: None,
    };
    match payload {
        PayloadReport::Tags { packet, handoff } => {
            view.tags = packet.records.iter().map(tag_view).collect();
            view.protocol = packet
                .pointer
                .map(|p| format!("{} {}.{}", p.protocol, p.major, p.minor));
            if let Some(handoff) = handoff {
                apply_handoff(&mut view, handoff);
            }
        }
        PayloadReport::TagError(err) => view.tag_error = Some(err.to_string()),
        PayloadReport::Handled(handoff) => apply_handoff(&mut view, handoff),
        PayloadReport::Undissected => {}
    }
    view
}

fn apply_handoff(view: &mut AfView, handoff: &HandoffOutcome) {
    view.handler = Some(handoff.handler.clone());
    view.handler_error = handoff.result.as_ref().err().map(ToString::to_string);
}

fn tag_view(record: &TagRecord) -> TagView {
    let pointer = (record.name == TagName::PTR)
        .then(|| ProtocolPointer::parse(&record.value).ok())
        .flatten();
    let value = match pointer {
        Some(p) => format!("{} {}.{}", p.protocol, p.major, p.minor),
        None => hex_preview(&record.value),
    };
    TagView {
        name: record.name.to_string(),
        offset: record.offset,
        bits: record.bits,
        value,
    }
}

fn payload_type_label(frame: &AfFrame) -> String {
    let pt = frame.header.payload_type;
    format!("{} ({})", pt.name(), escape_byte(pt.as_byte()))
}

fn escape_byte(b: u8) -> String {
    if b.is_ascii_graphic() {
        (b as char).to_string()
    } else {
        format!("{b:#04x}")
    }
}

fn length_check_label(check: LengthCheck) -> String {
    match check {
        LengthCheck::Exact => "exact".to_string(),
        LengthCheck::Truncated {
            declared,
            available,
        } => format!("truncated ({available} of {declared})"),
        LengthCheck::TrailingBytes { count } => format!("{count} trailing bytes"),
    }
}

fn crc_label(status: CrcStatus) -> &'static str {
    match status {
        CrcStatus::NotPresent => "not-present",
        CrcStatus::Valid => "valid",
        CrcStatus::Invalid => "invalid",
        CrcStatus::Unavailable => "unavailable",
    }
}

fn hex_preview(value: &[u8]) -> String {
    let shown = &value[..value.len().min(PREVIEW_BYTES)];
    let mut out = faster_hex::hex_string(shown);
    if value.len() > PREVIEW_BYTES {
        out.push_str(&format!("... ({} bytes)", value.len()));
    }
    out
}

pub fn print_datagram(out: &DatagramOutput, report: &DecodeReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => print_table(out),
        OutputFormat::Pretty => print_pretty(out),
        OutputFormat::Raw => {
            if let Some(af) = &report.af {
                print_raw(af.frame.payload.as_ref());
            }
        }
    }
}

pub fn print_undelivered(out: &UndeliveredOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!(
                "undelivered seq={} reason={} error={}",
                out.sequence, out.reason, out.error
            );
        }
        OutputFormat::Raw => {}
    }
}

fn print_table(out: &DatagramOutput) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["LAYER", "FIELD", "VALUE"]);

    table.add_row(vec![
        out.sync.to_string(),
        "datagram".to_string(),
        format!("#{} {}", out.datagram, out.source),
    ]);
    if let Some(pft) = &out.pft {
        table.add_row(vec![
            "PFT".to_string(),
            "fragment".to_string(),
            format!(
                "seq={} {}/{} len={}",
                pft.sequence, pft.index, pft.count, pft.payload_len
            ),
        ]);
        table.add_row(vec![
            "PFT".to_string(),
            "outcome".to_string(),
            pft.failure
                .as_ref()
                .map_or_else(|| pft.outcome.to_string(), |f| format!("{}: {f}", pft.outcome)),
        ]);
    }
    if let Some(af) = &out.af {
        table.add_row(vec![
            "AF".to_string(),
            "frame".to_string(),
            format!(
                "seq={} rev={}.{} pt={} crc={} length={}",
                af.sequence, af.major, af.minor, af.payload_type, af.crc, af.length_check
            ),
        ]);
        for tag in &af.tags {
            table.add_row(vec![
                "TAG".to_string(),
                tag.name.clone(),
                format!("@{} {} bits {}", tag.offset, tag.bits, tag.value),
            ]);
        }
        if let Some(err) = &af.tag_error {
            table.add_row(vec!["TAG".to_string(), "error".to_string(), err.clone()]);
        }
    }
    if let Some(err) = &out.error {
        table.add_row(vec!["-".to_string(), "error".to_string(), err.clone()]);
    }
    println!("{table}");
}

fn print_pretty(out: &DatagramOutput) {
    let mut line = format!("#{} {}", out.datagram, out.sync);
    if let Some(pft) = &out.pft {
        line.push_str(&format!(
            " pft seq={} frag={}/{} {}",
            pft.sequence, pft.index, pft.count, pft.outcome
        ));
    }
    if let Some(af) = &out.af {
        line.push_str(&format!(
            " af seq={} pt={} crc={} tags={}",
            af.sequence,
            af.payload_type,
            af.crc,
            af.tags.len()
        ));
        if let Some(protocol) = &af.protocol {
            line.push_str(&format!(" ptr={protocol}"));
        }
    }
    if let Some(err) = &out.error {
        line.push_str(&format!(" error={err}"));
    }
    println!("{line}");
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}
