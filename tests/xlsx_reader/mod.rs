use std::fs::File;
use std::io::Read as _;
use std::path::Path;

use anyhow::Context as _;

/// Cell values of every sheet in a written workbook, header row included.
/// Numbers are returned in their textual form.
#[derive(Debug)]
pub struct WorkbookContents {
    pub sheets: Vec<(String, Vec<Vec<String>>)>,
}

#[allow(dead_code)]
impl WorkbookContents {
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn sheet(&self, name: &str) -> &[Vec<String>] {
        self.sheets
            .iter()
            .find(|(sheet, _)| sheet == name)
            .map(|(_, rows)| rows.as_slice())
            .unwrap_or_else(|| panic!("sheet {name:?} not found in {:?}", self.sheet_names()))
    }

    /// `Metric` → `Value` pairs of a two-column summary sheet.
    pub fn metric(&self, sheet: &str, metric: &str) -> String {
        self.sheet(sheet)
            .iter()
            .skip(1)
            .find(|row| row[0] == metric)
            .map(|row| row[1].clone())
            .unwrap_or_else(|| panic!("metric {metric:?} not found in sheet {sheet:?}"))
    }
}

pub fn read(path: &Path) -> anyhow::Result<WorkbookContents> {
    let file = File::open(path).with_context(|| format!("open workbook: {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("open workbook zip")?;

    let workbook_xml = read_part(&mut archive, "xl/workbook.xml")?;
    let names = attribute_values(&workbook_xml, "<sheet ", "name=\"");

    let mut sheets = Vec::new();
    for (idx, name) in names.into_iter().enumerate() {
        let xml = read_part(&mut archive, &format!("xl/worksheets/sheet{}.xml", idx + 1))?;
        sheets.push((name, parse_rows(&xml)));
    }

    Ok(WorkbookContents { sheets })
}

fn read_part(archive: &mut zip::ZipArchive<File>, name: &str) -> anyhow::Result<String> {
    let mut out = String::new();
    archive
        .by_name(name)
        .with_context(|| format!("missing part {name}"))?
        .read_to_string(&mut out)
        .with_context(|| format!("read part {name}"))?;
    Ok(out)
}

fn attribute_values(xml: &str, element: &str, attribute: &str) -> Vec<String> {
    xml.split(element)
        .skip(1)
        .filter_map(|segment| {
            let start = segment.find(attribute)? + attribute.len();
            let end = segment[start..].find('"')? + start;
            Some(unescape(&segment[start..end]))
        })
        .collect()
}

fn parse_rows(xml: &str) -> Vec<Vec<String>> {
    xml.split("<row ")
        .skip(1)
        .map(|row| {
            let row = row.split("</row>").next().unwrap_or_default();
            row.split("<c ").skip(1).map(cell_value).collect()
        })
        .collect()
}

fn cell_value(cell: &str) -> String {
    let text_open = "<t xml:space=\"preserve\">";
    if let Some(start) = cell.find(text_open) {
        let start = start + text_open.len();
        let end = cell[start..].find("</t>").map_or(cell.len(), |end| end + start);
        return unescape(&cell[start..end]);
    }
    if let Some(start) = cell.find("<v>") {
        let start = start + "<v>".len();
        let end = cell[start..].find("</v>").map_or(cell.len(), |end| end + start);
        return cell[start..end].to_owned();
    }
    String::new()
}

fn unescape(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}
