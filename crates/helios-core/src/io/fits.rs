use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use memmap2::Mmap;
use ndarray::{Array2, ArrayBase, Data, Dimension};

use crate::consts::{FITS_BLOCK_SIZE, FITS_CARD_SIZE};
use crate::error::{HeliosError, Result};

/// Keywords that describe the data layout. They are written by the codec
/// itself and never copied between headers.
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SIMPLE", "XTENSION", "BITPIX", "NAXIS", "EXTEND", "PCOUNT", "GCOUNT", "BZERO", "BSCALE",
    "END",
];

/// Value of a FITS header card.
#[derive(Clone, Debug, PartialEq)]
pub enum FitsValue {
    Logical(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FitsValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Fixed-format rendering: strings left-justified from column 11,
    /// everything else right-justified to column 30.
    fn render(&self) -> String {
        match self {
            Self::Text(s) => {
                let escaped = s.replace('\'', "''");
                format!("'{escaped:<8}'")
            }
            Self::Logical(b) => format!("{:>20}", if *b { "T" } else { "F" }),
            Self::Integer(i) => format!("{i:>20}"),
            Self::Float(v) => format!("{:>20}", render_float(*v)),
        }
    }
}

fn render_float(v: f64) -> String {
    let plain = format!("{v}");
    if plain.len() > 20 {
        format!("{v:E}")
    } else if plain.contains(['.', 'e', 'E']) || !v.is_finite() {
        plain
    } else {
        format!("{v:.1}")
    }
}

/// One 80-character header record.
#[derive(Clone, Debug, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: Option<FitsValue>,
    pub comment: Option<String>,
}

impl Card {
    pub fn new(keyword: &str, value: FitsValue) -> Self {
        Self {
            keyword: keyword.to_uppercase(),
            value: Some(value),
            comment: None,
        }
    }

    pub fn commentary(keyword: &str, text: &str) -> Self {
        Self {
            keyword: keyword.to_uppercase(),
            value: None,
            comment: Some(text.to_string()),
        }
    }

    /// Parse a record in fixed format (`KEYWORD = value / comment`).
    pub fn parse(record: &str) -> Self {
        let keyword: String = record.chars().take(8).collect::<String>().trim().to_string();
        let rest: String = record.chars().skip(8).collect();
        if let Some(value_part) = rest.strip_prefix("= ") {
            let (value, comment) = parse_value(value_part);
            Self {
                keyword,
                value,
                comment,
            }
        } else {
            let text = rest.trim();
            Self {
                keyword,
                value: None,
                comment: (!text.is_empty()).then(|| text.to_string()),
            }
        }
    }

    /// Parse a `KEY=value` line as found in burst sidecars. Accepts both
    /// fixed-format cards and free-form `KEY = value` text.
    pub fn parse_lenient(line: &str) -> Option<Self> {
        let (key, value_part) = line.split_once('=')?;
        let keyword = key.trim();
        if keyword.is_empty() || keyword.len() > 8 || keyword.contains(' ') {
            return None;
        }
        let (value, comment) = parse_value(value_part);
        Some(Self {
            keyword: keyword.to_uppercase(),
            value,
            comment,
        })
    }

    pub fn is_structural(&self) -> bool {
        STRUCTURAL_KEYWORDS.contains(&self.keyword.as_str()) || self.keyword.starts_with("NAXIS")
    }

    /// Render as a record padded or truncated to 80 characters.
    pub fn to_record(&self) -> String {
        let mut record = match &self.value {
            Some(value) => {
                let mut s = format!("{:<8}= {}", self.keyword, value.render());
                if let Some(comment) = &self.comment {
                    s.push_str(" / ");
                    s.push_str(comment);
                }
                s
            }
            None => format!(
                "{:<8}{}",
                self.keyword,
                self.comment.as_deref().unwrap_or_default()
            ),
        };
        record.truncate(FITS_CARD_SIZE);
        format!("{record:<80}")
    }
}

fn parse_value(s: &str) -> (Option<FitsValue>, Option<String>) {
    let s = s.trim();
    if let Some(body) = s.strip_prefix('\'') {
        // Quoted string, '' is an escaped quote.
        let mut text = String::new();
        let mut chars = body.char_indices().peekable();
        let mut end = body.len();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    text.push('\'');
                    chars.next();
                } else {
                    end = i + 1;
                    break;
                }
            } else {
                text.push(c);
            }
        }
        let comment = body[end.min(body.len())..]
            .split_once('/')
            .map(|(_, c)| c.trim().to_string())
            .filter(|c| !c.is_empty());
        return (Some(FitsValue::Text(text.trim_end().to_string())), comment);
    }

    let (token, comment) = match s.split_once('/') {
        Some((v, c)) => (v.trim(), Some(c.trim().to_string()).filter(|c| !c.is_empty())),
        None => (s, None),
    };
    let value = match token {
        "" => None,
        "T" => Some(FitsValue::Logical(true)),
        "F" => Some(FitsValue::Logical(false)),
        _ => {
            if let Ok(i) = token.parse::<i64>() {
                Some(FitsValue::Integer(i))
            } else if let Ok(f) = token.replace(['D', 'd'], "E").parse::<f64>() {
                Some(FitsValue::Float(f))
            } else {
                Some(FitsValue::Text(token.to_string()))
            }
        }
    };
    (value, comment)
}

/// Ordered list of header cards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<Card>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn get(&self, keyword: &str) -> Option<&FitsValue> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword)
            .and_then(|c| c.value.as_ref())
    }

    pub fn get_int(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(FitsValue::as_i64)
    }

    pub fn get_float(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(FitsValue::as_f64)
    }

    /// Set a valued keyword, replacing the first existing card of that name.
    pub fn set(&mut self, keyword: &str, value: FitsValue) {
        let card = Card::new(keyword, value);
        match self.cards.iter_mut().find(|c| c.keyword == card.keyword) {
            Some(existing) => *existing = card,
            None => self.cards.push(card),
        }
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    pub fn push_comment(&mut self, text: &str) {
        self.cards.push(Card::commentary("COMMENT", text));
    }

    /// Image axis lengths in NAXIS order (NAXIS1 first).
    pub fn axes(&self) -> Result<Vec<usize>> {
        let naxis = self
            .get_int("NAXIS")
            .ok_or_else(|| HeliosError::InvalidFits("missing NAXIS".into()))?;
        (1..=naxis)
            .map(|i| {
                let key = format!("NAXIS{i}");
                self.get_int(&key)
                    .filter(|&n| n >= 0)
                    .map(|n| n as usize)
                    .ok_or_else(|| HeliosError::InvalidFits(format!("missing {key}")))
            })
            .collect()
    }

    /// Header text, one trimmed record per line.
    pub fn to_text(&self) -> String {
        self.cards
            .iter()
            .map(|c| c.to_record().trim_end().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Location of one header-data unit inside the mapped file.
#[derive(Clone, Debug)]
struct Hdu {
    header: FitsHeader,
    data_offset: usize,
    data_len: usize,
}

/// Memory-mapped FITS reader covering the primary HDU and all extensions.
pub struct FitsReader {
    mmap: Mmap,
    path: PathBuf,
    hdus: Vec<Hdu>,
}

impl FitsReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(HeliosError::InvalidFits(format!(
                "{} is empty",
                path.display()
            )));
        }
        let mmap = unsafe { Mmap::map(&file)? };

        if !mmap.starts_with(b"SIMPLE  =") {
            return Err(HeliosError::InvalidFits(format!(
                "{} does not start with SIMPLE",
                path.display()
            )));
        }

        let mut hdus = Vec::new();
        let mut offset = 0;
        while offset + FITS_BLOCK_SIZE <= mmap.len() {
            let (header, header_len) = parse_header(&mmap[offset..])?;
            let data_offset = offset + header_len;
            let data_len = data_byte_len(&header)?;
            if data_offset + data_len > mmap.len() {
                return Err(HeliosError::InvalidFits(format!(
                    "{}: HDU {} truncated: need {} data bytes, {} available",
                    path.display(),
                    hdus.len(),
                    data_len,
                    mmap.len().saturating_sub(data_offset)
                )));
            }
            hdus.push(Hdu {
                header,
                data_offset,
                data_len,
            });
            offset = data_offset + padded_len(data_len);
        }
        if hdus.is_empty() {
            return Err(HeliosError::InvalidFits(format!(
                "{} is shorter than one header block",
                path.display()
            )));
        }

        Ok(Self {
            mmap,
            path: path.to_path_buf(),
            hdus,
        })
    }

    pub fn hdu_count(&self) -> usize {
        self.hdus.len()
    }

    pub fn header(&self, index: usize) -> Result<&FitsHeader> {
        self.hdus.get(index).map(|h| &h.header).ok_or_else(|| {
            HeliosError::InvalidFits(format!(
                "{}: no HDU {index} (file has {})",
                self.path.display(),
                self.hdus.len()
            ))
        })
    }

    pub fn primary_header(&self) -> &FitsHeader {
        &self.hdus[0].header
    }

    /// Read a two-dimensional image HDU as f32 with BSCALE/BZERO applied.
    /// Returned shape is `(NAXIS2, NAXIS1)`.
    pub fn read_image(&self, index: usize) -> Result<Array2<f32>> {
        let header = self.header(index)?;
        let axes = header.axes()?;
        let (cols, rows) = match axes.as_slice() {
            [cols, rows] => (*cols, *rows),
            [cols, rows, rest @ ..] if rest.iter().all(|&n| n == 1) => (*cols, *rows),
            _ => {
                return Err(HeliosError::InvalidFits(format!(
                    "{}: HDU {index} is not a 2-D image (axes {axes:?})",
                    self.path.display()
                )))
            }
        };
        let hdu = &self.hdus[index];
        let values = decode_samples(
            &self.mmap[hdu.data_offset..hdu.data_offset + hdu.data_len],
            header,
            rows * cols,
        )?;
        Array2::from_shape_vec((rows, cols), values)
            .map_err(|e| HeliosError::InvalidFits(e.to_string()))
    }
}

/// Parse header records until END; returns the header and its padded length.
fn parse_header(buf: &[u8]) -> Result<(FitsHeader, usize)> {
    let mut header = FitsHeader::new();
    for (i, record) in buf.chunks_exact(FITS_CARD_SIZE).enumerate() {
        let text = String::from_utf8_lossy(record);
        let card = Card::parse(&text);
        if card.keyword == "END" {
            let header_len = padded_len((i + 1) * FITS_CARD_SIZE);
            return Ok((header, header_len));
        }
        if card.keyword.is_empty() && card.comment.is_none() {
            continue;
        }
        header.push(card);
    }
    Err(HeliosError::InvalidFits("header has no END card".into()))
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE
}

fn data_byte_len(header: &FitsHeader) -> Result<usize> {
    let bitpix = header
        .get_int("BITPIX")
        .ok_or_else(|| HeliosError::InvalidFits("missing BITPIX".into()))?;
    let axes = header.axes()?;
    if axes.is_empty() {
        return Ok(0);
    }
    let pcount = header.get_int("PCOUNT").unwrap_or(0) as usize;
    let gcount = header.get_int("GCOUNT").unwrap_or(1) as usize;
    let samples: usize = axes.iter().product();
    Ok((bitpix.unsigned_abs() as usize / 8) * (pcount + samples) * gcount)
}

fn decode_samples(raw: &[u8], header: &FitsHeader, count: usize) -> Result<Vec<f32>> {
    let bitpix = header.get_int("BITPIX").unwrap_or(0);
    let bscale = header.get_float("BSCALE").unwrap_or(1.0);
    let bzero = header.get_float("BZERO").unwrap_or(0.0);
    let scale = |v: f64| (v * bscale + bzero) as f32;

    let values = match bitpix {
        8 => raw[..count].iter().map(|&b| scale(b as f64)).collect(),
        16 => raw
            .chunks_exact(2)
            .take(count)
            .map(|c| scale(BigEndian::read_i16(c) as f64))
            .collect(),
        32 => raw
            .chunks_exact(4)
            .take(count)
            .map(|c| scale(BigEndian::read_i32(c) as f64))
            .collect(),
        -32 => raw
            .chunks_exact(4)
            .take(count)
            .map(|c| scale(BigEndian::read_f32(c) as f64))
            .collect(),
        -64 => raw
            .chunks_exact(8)
            .take(count)
            .map(|c| scale(BigEndian::read_f64(c)))
            .collect(),
        other => {
            return Err(HeliosError::InvalidFits(format!(
                "unsupported BITPIX {other}"
            )))
        }
    };
    Ok(values)
}

/// Sample encodings the writer can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelEncoding {
    /// BITPIX -32.
    Float32,
    /// BITPIX 16 with BZERO 32768 (unsigned 16-bit convention).
    Unsigned16,
}

/// Sequential FITS writer: a primary HDU followed by image extensions.
pub struct FitsWriter {
    writer: BufWriter<File>,
    hdus_written: usize,
}

impl FitsWriter {
    /// Create a file whose primary HDU carries no data.
    pub fn create(path: &Path, primary: &FitsHeader) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let mut cards = vec![
            Card::new("SIMPLE", FitsValue::Logical(true)),
            Card::new("BITPIX", FitsValue::Integer(8)),
            Card::new("NAXIS", FitsValue::Integer(0)),
            Card::new("EXTEND", FitsValue::Logical(true)),
        ];
        cards.extend(primary.cards().iter().filter(|c| !c.is_structural()).cloned());
        write_header_block(&mut writer, &cards)?;
        Ok(Self {
            writer,
            hdus_written: 1,
        })
    }

    /// Append one image extension.
    pub fn append_image<S, D>(
        &mut self,
        header: &FitsHeader,
        data: &ArrayBase<S, D>,
        encoding: PixelEncoding,
    ) -> Result<()>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let mut cards = vec![Card::new("XTENSION", FitsValue::Text("IMAGE".into()))];
        cards.extend(layout_cards(data.shape(), encoding));
        cards.push(Card::new("PCOUNT", FitsValue::Integer(0)));
        cards.push(Card::new("GCOUNT", FitsValue::Integer(1)));
        if encoding == PixelEncoding::Unsigned16 {
            cards.push(Card::new("BZERO", FitsValue::Integer(32768)));
        }
        cards.extend(header.cards().iter().filter(|c| !c.is_structural()).cloned());
        write_header_block(&mut self.writer, &cards)?;
        write_data_block(&mut self.writer, data, encoding)?;
        self.hdus_written += 1;
        Ok(())
    }

    pub fn hdus_written(&self) -> usize {
        self.hdus_written
    }

    /// Flush and finalize the file.
    pub fn finalize(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Write `data` as the primary image of a new file (BITPIX -32).
pub fn write_image<S, D>(path: &Path, data: &ArrayBase<S, D>, header: &FitsHeader) -> Result<()>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let mut cards = vec![Card::new("SIMPLE", FitsValue::Logical(true))];
    cards.extend(layout_cards(data.shape(), PixelEncoding::Float32));
    cards.push(Card::new("EXTEND", FitsValue::Logical(true)));
    cards.extend(header.cards().iter().filter(|c| !c.is_structural()).cloned());
    write_header_block(&mut writer, &cards)?;
    write_data_block(&mut writer, data, PixelEncoding::Float32)?;
    writer.flush()?;
    Ok(())
}

/// Read the primary image of a file written by [`write_image`].
pub fn read_primary_image(path: &Path) -> Result<Array2<f32>> {
    FitsReader::open(path)?.read_image(0)
}

fn layout_cards(shape: &[usize], encoding: PixelEncoding) -> Vec<Card> {
    let bitpix = match encoding {
        PixelEncoding::Float32 => -32,
        PixelEncoding::Unsigned16 => 16,
    };
    let mut cards = vec![
        Card::new("BITPIX", FitsValue::Integer(bitpix)),
        Card::new("NAXIS", FitsValue::Integer(shape.len() as i64)),
    ];
    // FITS axes run fastest-first, the reverse of ndarray's row-major shape.
    for (i, &n) in shape.iter().rev().enumerate() {
        cards.push(Card::new(
            &format!("NAXIS{}", i + 1),
            FitsValue::Integer(n as i64),
        ));
    }
    cards
}

fn write_header_block(w: &mut impl Write, cards: &[Card]) -> Result<()> {
    let mut written = 0;
    for card in cards {
        w.write_all(card.to_record().as_bytes())?;
        written += FITS_CARD_SIZE;
    }
    w.write_all(format!("{:<80}", "END").as_bytes())?;
    written += FITS_CARD_SIZE;
    let pad = padded_len(written) - written;
    w.write_all(&vec![b' '; pad])?;
    Ok(())
}

fn write_data_block<S, D>(
    w: &mut impl Write,
    data: &ArrayBase<S, D>,
    encoding: PixelEncoding,
) -> Result<()>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let mut written = 0;
    for &v in data.iter() {
        match encoding {
            PixelEncoding::Float32 => {
                w.write_f32::<BigEndian>(v)?;
                written += 4;
            }
            PixelEncoding::Unsigned16 => {
                let stored = (v.round().clamp(0.0, 65535.0) as i32 - 32768) as i16;
                w.write_i16::<BigEndian>(stored)?;
                written += 2;
            }
        }
    }
    let pad = padded_len(written) - written;
    w.write_all(&vec![0u8; pad])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_record_layout() {
        let card = Card::new("NAXIS1", FitsValue::Integer(512));
        let record = card.to_record();
        assert_eq!(record.len(), 80);
        assert_eq!(&record[..10], "NAXIS1  = ");
        assert_eq!(record[10..30].trim(), "512");
        assert!(record[10..30].starts_with(' '));
    }

    #[test]
    fn test_parse_string_with_comment() {
        let card = Card::parse("OBJECT  = 'Sun''s limb'         / target");
        assert_eq!(card.keyword, "OBJECT");
        assert_eq!(card.value, Some(FitsValue::Text("Sun's limb".into())));
        assert_eq!(card.comment.as_deref(), Some("target"));
    }

    #[test]
    fn test_parse_numeric_and_logical() {
        assert_eq!(
            Card::parse("BZERO   =              32768.0").value,
            Some(FitsValue::Float(32768.0))
        );
        assert_eq!(
            Card::parse("EXPTIME =               1.5D-3").value,
            Some(FitsValue::Float(1.5e-3))
        );
        assert_eq!(
            Card::parse("SIMPLE  =                    T").value,
            Some(FitsValue::Logical(true))
        );
    }

    #[test]
    fn test_float_keeps_decimal_point() {
        let record = Card::new("EXPOSURE", FitsValue::Float(3.0)).to_record();
        assert_eq!(Card::parse(&record).value, Some(FitsValue::Float(3.0)));
    }

    #[test]
    fn test_lenient_sidecar_line() {
        let card = Card::parse_lenient("DATE    ='2023-04-01T15:30:00.000'").unwrap();
        assert_eq!(card.keyword, "DATE");
        assert_eq!(
            card.value.unwrap().as_str(),
            Some("2023-04-01T15:30:00.000")
        );
        assert!(Card::parse_lenient("no equals sign here").is_none());
    }

    #[test]
    fn test_structural_keywords() {
        assert!(Card::new("NAXIS2", FitsValue::Integer(1)).is_structural());
        assert!(Card::new("BZERO", FitsValue::Integer(1)).is_structural());
        assert!(!Card::new("DATE-OBS", FitsValue::Text("x".into())).is_structural());
    }
}
