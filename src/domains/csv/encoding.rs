use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;

use crate::errors::{MigrationError, MigrationResult};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Text encoding used for reading and writing CSV files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEncoding {
    encoding: &'static Encoding,
}

impl Default for TextEncoding {
    fn default() -> Self {
        Self { encoding: UTF_8 }
    }
}

impl TextEncoding {
    /// Resolve a WHATWG label (`utf-8`, `gbk`, `windows-1252`, ...). Empty means UTF-8.
    pub fn for_label(label: &str) -> MigrationResult<Self> {
        let label = label.trim();
        if label.is_empty() {
            return Ok(Self::default());
        }

        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| MigrationError::Config(format!("Unknown encoding '{}'", label)))?;

        // the csv tokenizer works on bytes, so delimiters must keep their ASCII values
        if !encoding.is_ascii_compatible() {
            return Err(MigrationError::Config(format!(
                "Encoding '{}' is not supported for CSV files",
                encoding.name()
            )));
        }

        Ok(Self { encoding })
    }

    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Strict decode: malformed input is an error, never replaced.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> MigrationResult<Cow<'a, str>> {
        self.encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .ok_or_else(|| {
                MigrationError::encoding(
                    self.name(),
                    format!("undecodable bytes in field starting {:?}", preview(bytes)),
                )
            })
    }

    /// Strict encode: characters the target encoding cannot represent are an error.
    pub fn encode<'a>(&self, text: &'a str) -> MigrationResult<Cow<'a, [u8]>> {
        let (bytes, _, had_unmappable) = self.encoding.encode(text);
        if had_unmappable {
            return Err(MigrationError::encoding(
                self.name(),
                format!("'{}' has characters that cannot be represented", text.trim_end()),
            ));
        }
        Ok(bytes)
    }

    /// Drop a leading UTF-8 byte-order mark when reading UTF-8.
    pub fn strip_bom<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        if self.encoding == UTF_8 {
            bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
        } else {
            bytes
        }
    }
}

fn preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(16)]).into_owned()
}
