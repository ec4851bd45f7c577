//! File decompression and multi-format parsing
//!
//! Extract sources arrive as raw bytes (downloaded or uploaded) that
//! may be compressed and hold CSV, JSON, or XML. Both steps support an
//! AUTO mode that sniffs the content.

use std::io::Read;

use flate2::read::{GzDecoder, ZlibDecoder};
use serde_json::{Map, Value};

use crate::domain::{DecompressionMethod, FileType};
use crate::error::{IntegrationError, IntegrationResult};

/// Decompress `bytes` according to `method`. AUTO sniffs magic bytes
/// and falls through to identity when nothing matches.
pub fn decompress(bytes: &[u8], method: DecompressionMethod) -> IntegrationResult<Vec<u8>> {
    let method = match method {
        DecompressionMethod::Auto => sniff_compression(bytes),
        other => other,
    };

    match method {
        DecompressionMethod::None | DecompressionMethod::Auto => Ok(bytes.to_vec()),
        DecompressionMethod::Gzip => {
            let mut out = Vec::new();
            GzDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(|e| IntegrationError::Parse(format!("gzip decompression failed: {}", e)))?;
            Ok(out)
        }
        DecompressionMethod::Deflate => {
            let mut out = Vec::new();
            ZlibDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(|e| {
                    IntegrationError::Parse(format!("deflate decompression failed: {}", e))
                })?;
            Ok(out)
        }
        DecompressionMethod::Zip => {
            let cursor = std::io::Cursor::new(bytes);
            let mut archive = zip::ZipArchive::new(cursor)
                .map_err(|e| IntegrationError::Parse(format!("zip archive unreadable: {}", e)))?;
            if archive.len() == 0 {
                return Err(IntegrationError::Parse("zip archive is empty".into()));
            }
            let mut file = archive
                .by_index(0)
                .map_err(|e| IntegrationError::Parse(format!("zip entry unreadable: {}", e)))?;
            let mut out = Vec::new();
            file.read_to_end(&mut out)
                .map_err(|e| IntegrationError::Parse(format!("zip entry unreadable: {}", e)))?;
            Ok(out)
        }
    }
}

fn sniff_compression(bytes: &[u8]) -> DecompressionMethod {
    match bytes {
        [0x1f, 0x8b, ..] => DecompressionMethod::Gzip,
        [0x50, 0x4b, 0x03, 0x04, ..] => DecompressionMethod::Zip,
        [0x78, 0x01 | 0x9c | 0xda, ..] => DecompressionMethod::Deflate,
        _ => DecompressionMethod::None,
    }
}

/// Parse decompressed bytes into JSON. AUTO dispatches on the first
/// non-whitespace byte: `{`/`[` is JSON, `<` is XML, anything else CSV.
pub fn parse(bytes: &[u8], file_type: FileType) -> IntegrationResult<Value> {
    let file_type = match file_type {
        FileType::Auto => sniff_file_type(bytes),
        other => other,
    };

    match file_type {
        FileType::Json | FileType::Auto => serde_json::from_slice(bytes)
            .map_err(|e| IntegrationError::Parse(format!("invalid JSON: {}", e))),
        FileType::Csv => parse_csv(bytes),
        FileType::Xml => parse_xml(bytes),
    }
}

fn sniff_file_type(bytes: &[u8]) -> FileType {
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') | Some(b'[') => FileType::Json,
        Some(b'<') => FileType::Xml,
        _ => FileType::Csv,
    }
}

/// CSV with a header row, RFC 4180 quoting. Cell values are
/// type-inferred so downstream schemas see numbers and booleans.
fn parse_csv(bytes: &[u8]) -> IntegrationResult<Value> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IntegrationError::Parse(format!("invalid CSV header: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| IntegrationError::Parse(format!("invalid CSV row: {}", e)))?;
        let mut row = Map::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            row.insert(header.clone(), infer_scalar(cell));
        }
        rows.push(Value::Object(row));
    }
    Ok(Value::Array(rows))
}

fn infer_scalar(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(f) {
            return Value::Number(num);
        }
    }
    match trimmed {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(cell.to_string()),
    }
}

/// Attribute-preserving XML to JSON: attributes keyed as `@name`, text
/// content as `#text`, repeated sibling elements collected into arrays.
/// Elements holding only text collapse to that scalar.
fn parse_xml(bytes: &[u8]) -> IntegrationResult<Value> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    // Stack of (element name, accumulated object)
    let mut stack: Vec<(String, Map<String, Value>)> = vec![(String::new(), Map::new())];
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| IntegrationError::Parse(format!("invalid XML: {}", e)))?;
        match event {
            Event::Start(ref start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                let mut node = Map::new();
                for attr in start.attributes().flatten() {
                    let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    node.insert(key, Value::String(value));
                }
                stack.push((name, node));
            }
            Event::Empty(ref start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                let mut node = Map::new();
                for attr in start.attributes().flatten() {
                    let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    node.insert(key, Value::String(value));
                }
                let parent = &mut stack.last_mut().expect("xml stack").1;
                insert_child(parent, &name, collapse(node));
            }
            Event::Text(text) => {
                let content = text
                    .unescape()
                    .map_err(|e| IntegrationError::Parse(format!("invalid XML text: {}", e)))?
                    .to_string();
                if !content.is_empty() {
                    let node = &mut stack.last_mut().expect("xml stack").1;
                    match node.get_mut("#text") {
                        Some(Value::String(existing)) => existing.push_str(&content),
                        _ => {
                            node.insert("#text".to_string(), Value::String(content));
                        }
                    }
                }
            }
            Event::CData(cdata) => {
                let content = String::from_utf8_lossy(&cdata).to_string();
                let node = &mut stack.last_mut().expect("xml stack").1;
                node.insert("#text".to_string(), Value::String(content));
            }
            Event::End(_) => {
                let (name, node) = stack.pop().expect("xml stack");
                let parent = &mut stack.last_mut().expect("xml stack").1;
                insert_child(parent, &name, collapse(node));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let (_, root) = stack.pop().ok_or_else(|| {
        IntegrationError::Parse("XML document ended with unclosed elements".into())
    })?;
    if !stack.is_empty() {
        return Err(IntegrationError::Parse(
            "XML document ended with unclosed elements".into(),
        ));
    }
    Ok(Value::Object(root))
}

fn insert_child(parent: &mut Map<String, Value>, name: &str, child: Value) {
    match parent.get_mut(name) {
        Some(Value::Array(items)) => items.push(child),
        Some(existing) => {
            let first = existing.take();
            parent.insert(name.to_string(), Value::Array(vec![first, child]));
        }
        None => {
            parent.insert(name.to_string(), child);
        }
    }
}

fn collapse(node: Map<String, Value>) -> Value {
    if node.len() == 1 {
        if let Some(text) = node.get("#text") {
            return text.clone();
        }
    }
    Value::Object(node)
}
