//! Minimal Office Open XML workbook writer.
//!
//! A workbook is a zip package of XML parts. Cells are either inline strings
//! or integers, and the first row of every sheet is a bold header.

use std::fs;
use std::io::{Seek, Write};
use std::path::Path;

use anyhow::Context as _;
use chrono::Utc;
use zip::write::SimpleFileOptions;

/// Excel refuses cells longer than this many UTF-16 code units.
pub const MAX_CELL_UNITS: usize = 32_767;
const MAX_SHEET_NAME_CHARS: usize = 31;
const FORBIDDEN_SHEET_NAME_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

const HEADER_STYLE: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Int(u64),
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u64> for Cell {
    fn from(value: u64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for Cell {
    fn from(value: usize) -> Self {
        Self::Int(value as u64)
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    header: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new<I, S>(name: impl Into<String>, header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, sheet: Sheet) -> anyhow::Result<()> {
        validate_sheet_name(&sheet.name)?;
        if self
            .sheets
            .iter()
            .any(|existing| existing.name.eq_ignore_ascii_case(&sheet.name))
        {
            anyhow::bail!("duplicate sheet name: {}", sheet.name);
        }
        self.sheets.push(sheet);
        Ok(())
    }

    /// Writes the workbook to `path`, replacing any existing file.
    ///
    /// The package is assembled in a temp file next to `path` and renamed into
    /// place once complete; the temp file is removed if anything fails.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if self.sheets.is_empty() {
            anyhow::bail!("workbook has no sheets: {}", path.display());
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("create workbook output dir: {}", dir.display()))?;

        let tmp = tempfile::Builder::new()
            .prefix(".jobsheet-")
            .suffix(".xlsx.tmp")
            .tempfile_in(dir)
            .with_context(|| format!("create temp workbook in: {}", dir.display()))?;

        let mut zip = zip::ZipWriter::new(tmp);
        self.write_package(&mut zip)
            .with_context(|| format!("write workbook: {}", path.display()))?;
        let tmp = zip
            .finish()
            .with_context(|| format!("finish workbook zip: {}", path.display()))?;

        tmp.persist(path)
            .map_err(|err| err.error)
            .with_context(|| format!("move workbook into place: {}", path.display()))?;
        Ok(())
    }

    fn write_package<W: Write + Seek>(&self, zip: &mut zip::ZipWriter<W>) -> anyhow::Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);

        let created = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

        write_part(zip, options, "[Content_Types].xml", &self.render_content_types())?;
        write_part(zip, options, "_rels/.rels", &render_root_rels())?;
        write_part(zip, options, "docProps/core.xml", &render_core_props(&created))?;
        write_part(zip, options, "docProps/app.xml", &render_app_props())?;
        write_part(zip, options, "xl/workbook.xml", &self.render_workbook())?;
        write_part(
            zip,
            options,
            "xl/_rels/workbook.xml.rels",
            &self.render_workbook_rels(),
        )?;
        write_part(zip, options, "xl/styles.xml", &render_styles())?;

        for (idx, sheet) in self.sheets.iter().enumerate() {
            let part = format!("xl/worksheets/sheet{}.xml", idx + 1);
            write_part(zip, options, &part, &render_worksheet(sheet))?;
        }

        Ok(())
    }

    fn render_content_types(&self) -> String {
        let mut out = String::from(XML_DECL);
        out.push_str(
            "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
        );
        out.push_str("<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>");
        out.push_str("<Default Extension=\"xml\" ContentType=\"application/xml\"/>");
        out.push_str("<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>");
        for idx in 1..=self.sheets.len() {
            out.push_str(&format!(
                "<Override PartName=\"/xl/worksheets/sheet{idx}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>"
            ));
        }
        out.push_str("<Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>");
        out.push_str("<Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>");
        out.push_str("<Override PartName=\"/docProps/app.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.extended-properties+xml\"/>");
        out.push_str("</Types>");
        out
    }

    fn render_workbook(&self) -> String {
        let mut out = String::from(XML_DECL);
        out.push_str(&format!(
            "<workbook xmlns=\"{NS_MAIN}\" xmlns:r=\"{NS_REL}\"><sheets>"
        ));
        for (idx, sheet) in self.sheets.iter().enumerate() {
            let n = idx + 1;
            out.push_str(&format!(
                "<sheet name=\"{}\" sheetId=\"{n}\" r:id=\"rId{n}\"/>",
                xml_text(&sheet.name)
            ));
        }
        out.push_str("</sheets></workbook>");
        out
    }

    fn render_workbook_rels(&self) -> String {
        let mut out = String::from(XML_DECL);
        out.push_str(&format!("<Relationships xmlns=\"{NS_PKG_REL}\">"));
        for n in 1..=self.sheets.len() {
            out.push_str(&format!(
                "<Relationship Id=\"rId{n}\" Type=\"{NS_REL}/worksheet\" Target=\"worksheets/sheet{n}.xml\"/>"
            ));
        }
        out.push_str(&format!(
            "<Relationship Id=\"rId{}\" Type=\"{NS_REL}/styles\" Target=\"styles.xml\"/>",
            self.sheets.len() + 1
        ));
        out.push_str("</Relationships>");
        out
    }
}

fn write_part<W: Write + Seek>(
    zip: &mut zip::ZipWriter<W>,
    options: SimpleFileOptions,
    name: &str,
    contents: &str,
) -> anyhow::Result<()> {
    zip.start_file(name, options)
        .with_context(|| format!("xlsx start_file {name}"))?;
    zip.write_all(contents.as_bytes())
        .with_context(|| format!("xlsx write {name}"))?;
    Ok(())
}

fn render_root_rels() -> String {
    format!(
        "{XML_DECL}<Relationships xmlns=\"{NS_PKG_REL}\">\
<Relationship Id=\"rId1\" Type=\"{NS_REL}/officeDocument\" Target=\"xl/workbook.xml\"/>\
<Relationship Id=\"rId2\" Type=\"{NS_PKG_REL}/metadata/core-properties\" Target=\"docProps/core.xml\"/>\
<Relationship Id=\"rId3\" Type=\"{NS_REL}/extended-properties\" Target=\"docProps/app.xml\"/>\
</Relationships>"
    )
}

fn render_core_props(created: &str) -> String {
    format!(
        "{XML_DECL}<cp:coreProperties \
xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
xmlns:dc=\"http://purl.org/dc/elements/1.1/\" \
xmlns:dcterms=\"http://purl.org/dc/terms/\" \
xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
<dc:creator>jobsheet</dc:creator>\
<dcterms:created xsi:type=\"dcterms:W3CDTF\">{created}</dcterms:created>\
<dcterms:modified xsi:type=\"dcterms:W3CDTF\">{created}</dcterms:modified>\
</cp:coreProperties>"
    )
}

fn render_app_props() -> String {
    format!(
        "{XML_DECL}<Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/extended-properties\">\
<Application>jobsheet</Application></Properties>"
    )
}

fn render_styles() -> String {
    format!(
        "{XML_DECL}<styleSheet xmlns=\"{NS_MAIN}\">\
<fonts count=\"2\">\
<font><sz val=\"11\"/><name val=\"Calibri\"/></font>\
<font><b/><sz val=\"11\"/><name val=\"Calibri\"/></font>\
</fonts>\
<fills count=\"2\"><fill><patternFill patternType=\"none\"/></fill><fill><patternFill patternType=\"gray125\"/></fill></fills>\
<borders count=\"1\"><border><left/><right/><top/><bottom/><diagonal/></border></borders>\
<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>\
<cellXfs count=\"2\">\
<xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/>\
<xf numFmtId=\"0\" fontId=\"1\" fillId=\"0\" borderId=\"0\" xfId=\"0\" applyFont=\"1\"/>\
</cellXfs>\
<cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles>\
</styleSheet>"
    )
}

fn render_worksheet(sheet: &Sheet) -> String {
    let mut out = String::from(XML_DECL);
    out.push_str(&format!(
        "<worksheet xmlns=\"{NS_MAIN}\" xmlns:r=\"{NS_REL}\"><sheetData>"
    ));

    let header = sheet
        .header
        .iter()
        .map(|name| Cell::Text(name.clone()))
        .collect::<Vec<_>>();
    push_row(&mut out, 1, &header, Some(HEADER_STYLE));
    for (idx, row) in sheet.rows.iter().enumerate() {
        push_row(&mut out, idx + 2, row, None);
    }

    out.push_str("</sheetData></worksheet>");
    out
}

fn push_row(out: &mut String, row_number: usize, cells: &[Cell], style: Option<u32>) {
    out.push_str(&format!("<row r=\"{row_number}\">"));
    let style_attr = style.map(|s| format!(" s=\"{s}\"")).unwrap_or_default();
    for (col, cell) in cells.iter().enumerate() {
        let reference = format!("{}{row_number}", column_name(col));
        match cell {
            Cell::Text(text) => out.push_str(&format!(
                "<c r=\"{reference}\" t=\"inlineStr\"{style_attr}><is><t xml:space=\"preserve\">{}</t></is></c>",
                xml_text(text)
            )),
            Cell::Int(value) => out.push_str(&format!(
                "<c r=\"{reference}\"{style_attr}><v>{value}</v></c>"
            )),
        }
    }
    out.push_str("</row>");
}

/// Spreadsheet column letters for a zero-based index: 0 → `A`, 26 → `AA`.
pub fn column_name(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

pub fn validate_sheet_name(name: &str) -> anyhow::Result<()> {
    let len = name.chars().count();
    if len == 0 || len > MAX_SHEET_NAME_CHARS {
        anyhow::bail!("sheet name must be 1..={MAX_SHEET_NAME_CHARS} characters: {name:?}");
    }
    if let Some(bad) = name.chars().find(|c| FORBIDDEN_SHEET_NAME_CHARS.contains(c)) {
        anyhow::bail!("sheet name contains forbidden character {bad:?}: {name:?}");
    }
    Ok(())
}

/// Escapes text for XML, dropping characters XML 1.0 cannot carry and
/// truncating to the per-cell limit.
fn xml_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut units = 0;
    for c in input.chars().filter(|c| is_xml_char(*c)) {
        units += c.len_utf16();
        if units > MAX_CELL_UNITS {
            break;
        }
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}
