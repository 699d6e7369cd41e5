use super::{ExtractError, Extractor};
use crate::model::{FontFormat, FontMetadata};
use std::collections::BTreeSet;

const NAME_FAMILY: u16 = 1;
const NAME_SUBFAMILY: u16 = 2;
const NAME_FULL: u16 = 4;
const NAME_VERSION: u16 = 5;
const NAME_POSTSCRIPT: u16 = 6;
const NAME_TYPO_FAMILY: u16 = 16;
const NAME_TYPO_SUBFAMILY: u16 = 17;

/// Reads OpenType/TrueType metadata straight from the sfnt table directory.
///
/// Only the first face of a collection is read. WOFF containers are refused
/// since their tables are compressed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SfntExtractor;

impl Extractor for SfntExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<FontMetadata, ExtractError> {
        let (face_offset, format) = locate_face(bytes)?;
        let tables = read_table_directory(bytes, face_offset)?;

        let head = tables
            .find(b"head")
            .ok_or(ExtractError::MissingTable("head"))?;
        let revision = read_revision(table_bytes(bytes, head, "head")?)?;

        let glyph_count = match tables.find(b"maxp") {
            Some(maxp) => read_u16(table_bytes(bytes, maxp, "maxp")?, 4, "maxp.numGlyphs")? as u32,
            None => 0,
        };

        let names = match tables.find(b"name") {
            Some(name) => read_names(table_bytes(bytes, name, "name")?)?,
            None => NameSet::default(),
        };

        let mut feature_tags = BTreeSet::new();
        for layout in [b"GSUB", b"GPOS"] {
            if let Some(record) = tables.find(layout) {
                read_feature_tags(table_bytes(bytes, record, "layout")?, &mut feature_tags)?;
            }
        }

        Ok(FontMetadata {
            family: names.get(NAME_FAMILY),
            subfamily: names.get(NAME_SUBFAMILY),
            preferred_family: names.get(NAME_TYPO_FAMILY),
            preferred_subfamily: names.get(NAME_TYPO_SUBFAMILY),
            postscript_name: names.get(NAME_POSTSCRIPT),
            full_name: names.get(NAME_FULL),
            version: names.get(NAME_VERSION),
            revision,
            glyph_count,
            feature_tags,
            table_tags: tables.records.iter().map(|r| tag_string(&r.tag)).collect(),
            format: Some(format),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct TableRecord {
    tag: [u8; 4],
    offset: usize,
    length: usize,
}

struct TableDirectory {
    records: Vec<TableRecord>,
}

impl TableDirectory {
    fn find(&self, tag: &[u8; 4]) -> Option<TableRecord> {
        self.records.iter().find(|r| &r.tag == tag).copied()
    }
}

fn locate_face(bytes: &[u8]) -> Result<(usize, FontFormat), ExtractError> {
    let magic = read_slice(bytes, 0, 4, "sfnt version")?;
    match magic {
        b"ttcf" => {
            let num_fonts = read_u32(bytes, 8, "ttc numFonts")?;
            if num_fonts == 0 {
                return Err(ExtractError::Malformed("empty collection".to_string()));
            }
            let first = read_u32(bytes, 12, "ttc offset")? as usize;
            Ok((first, FontFormat::Collection))
        }
        b"wOFF" | b"wOF2" => Err(ExtractError::Unsupported("compressed WOFF".to_string())),
        b"OTTO" => Ok((0, FontFormat::OpenTypeCff)),
        &[0, 1, 0, 0] | b"true" => Ok((0, FontFormat::TrueType)),
        other => Err(ExtractError::Unsupported(format!(
            "unknown sfnt version {:02x?}",
            other
        ))),
    }
}

fn read_table_directory(bytes: &[u8], face_offset: usize) -> Result<TableDirectory, ExtractError> {
    let num_tables = read_u16(bytes, face_offset + 4, "numTables")? as usize;
    let mut records = Vec::with_capacity(num_tables);
    for i in 0..num_tables {
        let base = face_offset + 12 + i * 16;
        let tag_bytes = read_slice(bytes, base, 4, "table tag")?;
        let mut tag = [0u8; 4];
        tag.copy_from_slice(tag_bytes);
        records.push(TableRecord {
            tag,
            offset: read_u32(bytes, base + 8, "table offset")? as usize,
            length: read_u32(bytes, base + 12, "table length")? as usize,
        });
    }
    Ok(TableDirectory { records })
}

fn table_bytes<'a>(
    bytes: &'a [u8],
    record: TableRecord,
    what: &'static str,
) -> Result<&'a [u8], ExtractError> {
    read_slice(bytes, record.offset, record.length, what)
}

/// `head.fontRevision` is a 16.16 fixed value; round away float noise so that
/// 1.9 stays 1.9.
fn read_revision(head: &[u8]) -> Result<f64, ExtractError> {
    let fixed = read_u32(head, 4, "head.fontRevision")? as i32;
    let value = fixed as f64 / 65536.0;
    Ok((value * 1000.0).round() / 1000.0)
}

#[derive(Default)]
struct NameSet {
    // (name id, priority, value)
    entries: Vec<(u16, u8, String)>,
}

impl NameSet {
    fn offer(&mut self, name_id: u16, priority: u8, value: String) {
        match self.entries.iter_mut().find(|(id, _, _)| *id == name_id) {
            Some(entry) if priority < entry.1 => {
                entry.1 = priority;
                entry.2 = value;
            }
            Some(_) => {}
            None => self.entries.push((name_id, priority, value)),
        }
    }

    fn get(&self, name_id: u16) -> Option<String> {
        self.entries
            .iter()
            .find(|(id, _, _)| *id == name_id)
            .map(|(_, _, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

fn read_names(table: &[u8]) -> Result<NameSet, ExtractError> {
    let count = read_u16(table, 2, "name.count")? as usize;
    let storage = read_u16(table, 4, "name.stringOffset")? as usize;
    let mut names = NameSet::default();

    for i in 0..count {
        let base = 6 + i * 12;
        let platform = read_u16(table, base, "name.platformID")?;
        let encoding = read_u16(table, base + 2, "name.encodingID")?;
        let language = read_u16(table, base + 4, "name.languageID")?;
        let name_id = read_u16(table, base + 6, "name.nameID")?;
        let length = read_u16(table, base + 8, "name.length")? as usize;
        let offset = read_u16(table, base + 10, "name.offset")? as usize;

        if !matches!(
            name_id,
            NAME_FAMILY
                | NAME_SUBFAMILY
                | NAME_FULL
                | NAME_VERSION
                | NAME_POSTSCRIPT
                | NAME_TYPO_FAMILY
                | NAME_TYPO_SUBFAMILY
        ) {
            continue;
        }

        let priority = match (platform, encoding, language) {
            (3, 1, 0x0409) => 0,
            (3, 1, _) | (3, 10, _) => 1,
            (0, _, _) => 2,
            (1, 0, 0) => 3,
            _ => continue,
        };

        let raw = read_slice(table, storage + offset, length, "name string")?;
        let value = if platform == 1 {
            decode_mac_roman(raw)
        } else {
            decode_utf16_be(raw)
        };
        names.offer(name_id, priority, value);
    }

    Ok(names)
}

fn read_feature_tags(table: &[u8], tags: &mut BTreeSet<String>) -> Result<(), ExtractError> {
    let feature_list = read_u16(table, 6, "featureListOffset")? as usize;
    if feature_list == 0 {
        return Ok(());
    }
    let count = read_u16(table, feature_list, "featureCount")? as usize;
    for i in 0..count {
        let tag = read_slice(table, feature_list + 2 + i * 6, 4, "feature tag")?;
        tags.insert(tag_string(tag));
    }
    Ok(())
}

fn decode_utf16_be(raw: &[u8]) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Mac OS Roman, bytes 0x80..=0xFF.
const MAC_ROMAN_HIGH: [char; 128] = [
    'Ä', 'Å', 'Ç', 'É', 'Ñ', 'Ö', 'Ü', 'á', 'à', 'â', 'ä', 'ã', 'å', 'ç', 'é', 'è',
    'ê', 'ë', 'í', 'ì', 'î', 'ï', 'ñ', 'ó', 'ò', 'ô', 'ö', 'õ', 'ú', 'ù', 'û', 'ü',
    '†', '°', '¢', '£', '§', '•', '¶', 'ß', '®', '©', '™', '´', '¨', '≠', 'Æ', 'Ø',
    '∞', '±', '≤', '≥', '¥', 'µ', '∂', '∑', '∏', 'π', '∫', 'ª', 'º', 'Ω', 'æ', 'ø',
    '¿', '¡', '¬', '√', 'ƒ', '≈', '∆', '«', '»', '…', '\u{a0}', 'À', 'Ã', 'Õ', 'Œ', 'œ',
    '–', '—', '“', '”', '‘', '’', '÷', '◊', 'ÿ', 'Ÿ', '⁄', '€', '‹', '›', 'ﬁ', 'ﬂ',
    '‡', '·', '‚', '„', '‰', 'Â', 'Ê', 'Á', 'Ë', 'È', 'Í', 'Î', 'Ï', 'Ì', 'Ó', 'Ô',
    '\u{f8ff}', 'Ò', 'Ú', 'Û', 'Ù', 'ı', 'ˆ', '˜', '¯', '˘', '˙', '˚', '¸', '˝', '˛', 'ˇ',
];

fn decode_mac_roman(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| match b {
            0x00..=0x7F => b as char,
            _ => MAC_ROMAN_HIGH[(b - 0x80) as usize],
        })
        .collect()
}

fn tag_string(tag: &[u8]) -> String {
    String::from_utf8_lossy(tag).trim_end().to_string()
}

fn read_slice<'a>(
    data: &'a [u8],
    offset: usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], ExtractError> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(ExtractError::Truncated(what))
}

fn read_u16(data: &[u8], offset: usize, what: &'static str) -> Result<u16, ExtractError> {
    let b = read_slice(data, offset, 2, what)?;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], offset: usize, what: &'static str) -> Result<u32, ExtractError> {
    let b = read_slice(data, offset, 4, what)?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn be16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    fn be32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    fn sfnt(version: &[u8; 4], tables: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(version);
        be16(&mut out, tables.len() as u16);
        be16(&mut out, 0);
        be16(&mut out, 0);
        be16(&mut out, 0);

        let mut offset = 12 + tables.len() * 16;
        for (tag, data) in tables {
            out.extend_from_slice(*tag);
            be32(&mut out, 0);
            be32(&mut out, offset as u32);
            be32(&mut out, data.len() as u32);
            offset += data.len();
        }
        for (_, data) in tables {
            out.extend_from_slice(data);
        }
        out
    }

    fn head(revision_fixed: u32) -> Vec<u8> {
        let mut t = Vec::new();
        be16(&mut t, 1);
        be16(&mut t, 0);
        be32(&mut t, revision_fixed);
        t.resize(54, 0);
        t
    }

    fn maxp(glyphs: u16) -> Vec<u8> {
        let mut t = Vec::new();
        be32(&mut t, 0x0000_5000);
        be16(&mut t, glyphs);
        t
    }

    fn name_table(names: &[(u16, &str)]) -> Vec<u8> {
        let mut strings = Vec::new();
        let mut records = Vec::new();
        for (id, value) in names {
            let encoded: Vec<u8> = value.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
            be16(&mut records, 3);
            be16(&mut records, 1);
            be16(&mut records, 0x0409);
            be16(&mut records, *id);
            be16(&mut records, encoded.len() as u16);
            be16(&mut records, strings.len() as u16);
            strings.extend_from_slice(&encoded);
        }
        let mut t = Vec::new();
        be16(&mut t, 0);
        be16(&mut t, names.len() as u16);
        be16(&mut t, (6 + names.len() * 12) as u16);
        t.extend_from_slice(&records);
        t.extend_from_slice(&strings);
        t
    }

    fn gsub(features: &[&[u8; 4]]) -> Vec<u8> {
        let mut t = Vec::new();
        be16(&mut t, 1);
        be16(&mut t, 0);
        be16(&mut t, 0);
        be16(&mut t, 10);
        be16(&mut t, 0);
        be16(&mut t, features.len() as u16);
        for tag in features {
            t.extend_from_slice(*tag);
            be16(&mut t, 0);
        }
        t
    }

    #[test]
    fn test_extracts_names_revision_and_counts() {
        let font = sfnt(
            b"OTTO",
            &[
                (b"head", head(0x0001_E666)),
                (b"maxp", maxp(512)),
                (
                    b"name",
                    name_table(&[
                        (1, "Eastman Medium"),
                        (2, "Regular"),
                        (4, "Eastman Medium"),
                        (5, "Version 1.900"),
                        (6, "Eastman-Medium"),
                        (16, "Eastman"),
                        (17, "Medium"),
                    ]),
                ),
                (b"GSUB", gsub(&[b"liga", b"kern", b"liga"])),
            ],
        );

        let meta = SfntExtractor.extract(&font).unwrap();
        assert_eq!(meta.format, Some(FontFormat::OpenTypeCff));
        assert_eq!(meta.revision, 1.9);
        assert_eq!(meta.glyph_count, 512);
        assert_eq!(meta.postscript_name.as_deref(), Some("Eastman-Medium"));
        assert_eq!(meta.effective_family(), Some("Eastman"));
        assert_eq!(meta.effective_subfamily(), Some("Medium"));
        assert_eq!(meta.version.as_deref(), Some("Version 1.900"));
        assert_eq!(meta.feature_tags.len(), 2);
        assert!(meta.table_tags.contains("GSUB"));
        assert!(meta.table_tags.contains("head"));
    }

    #[test]
    fn test_mac_roman_high_bytes() {
        assert_eq!(decode_mac_roman(b"Caf\x8e"), "Café");
        assert_eq!(decode_mac_roman(b"\xa9 \xaa \xd0 \xde"), "© ™ – ﬁ");
        assert_eq!(decode_mac_roman(b"Plain"), "Plain");
    }

    #[test]
    fn test_mac_name_record_is_used_when_no_windows_record_exists() {
        let mut name = Vec::new();
        be16(&mut name, 0);
        be16(&mut name, 1);
        be16(&mut name, 18);
        for v in [1u16, 0, 0, 6, 9, 0] {
            be16(&mut name, v);
        }
        name.extend_from_slice(b"Caf\x8e-Bold");

        let font = sfnt(b"OTTO", &[(b"head", head(0x0001_0000)), (b"name", name)]);
        let meta = SfntExtractor.extract(&font).unwrap();
        assert_eq!(meta.postscript_name.as_deref(), Some("Café-Bold"));
    }

    #[test]
    fn test_missing_head_is_an_error() {
        let font = sfnt(&[0, 1, 0, 0], &[(b"maxp", maxp(3))]);
        assert_eq!(
            SfntExtractor.extract(&font),
            Err(ExtractError::MissingTable("head"))
        );
    }

    #[test]
    fn test_missing_maxp_yields_zero_glyphs() {
        let font = sfnt(b"true", &[(b"head", head(0x0002_0000))]);
        let meta = SfntExtractor.extract(&font).unwrap();
        assert_eq!(meta.glyph_count, 0);
        assert_eq!(meta.revision, 2.0);
        assert_eq!(meta.format, Some(FontFormat::TrueType));
    }

    #[test]
    fn test_rejects_woff_and_garbage() {
        assert!(matches!(
            SfntExtractor.extract(b"wOFF\0\0\0\0"),
            Err(ExtractError::Unsupported(_))
        ));
        assert_eq!(
            SfntExtractor.extract(b"OT"),
            Err(ExtractError::Truncated("sfnt version"))
        );
    }

    #[test]
    fn test_truncated_table_directory() {
        let mut font = sfnt(b"OTTO", &[(b"head", head(0x0001_0000))]);
        font.truncate(20);
        assert!(matches!(
            SfntExtractor.extract(&font),
            Err(ExtractError::Truncated(_))
        ));
    }
}
