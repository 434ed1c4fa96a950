//! XLSX writer for tables

use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};

use crate::address::{CellAddress, CellRange};
use crate::error::{TableError, TableResult};
use crate::table::{Table, Value};
use crate::MAX_SHEET_NAME_LEN;

/// Anything that can persist a [`Table`] as a spreadsheet file.
pub trait SpreadsheetBuilder {
    /// Write `table` into a single worksheet named `sheet_name` at
    /// `destination`, creating or overwriting the file. The file is closed
    /// and flushed when this returns.
    fn write_table(&self, table: &Table, sheet_name: &str, destination: &Path) -> TableResult<()>;
}

/// Writes tables as Office Open XML workbooks with one worksheet.
///
/// The first row holds the column names in bold; data rows follow in table
/// order. An autofilter covers the header and data.
#[derive(Debug, Clone)]
pub struct XlsxTableWriter {
    application: String,
}

impl Default for XlsxTableWriter {
    fn default() -> Self {
        Self {
            application: "sheetlabel".to_string(),
        }
    }
}

impl SpreadsheetBuilder for XlsxTableWriter {
    fn write_table(&self, table: &Table, sheet_name: &str, destination: &Path) -> TableResult<()> {
        self.write_file(table, sheet_name, destination)
    }
}

impl XlsxTableWriter {
    /// Writer that records `application` as the producing application in
    /// the document properties
    pub fn with_application<S: Into<String>>(application: S) -> Self {
        Self {
            application: application.into(),
        }
    }

    /// Write a table to a file path
    pub fn write_file<P: AsRef<Path>>(
        &self,
        table: &Table,
        sheet_name: &str,
        path: P,
    ) -> TableResult<()> {
        let path = path.as_ref();
        validate_sheet_name(sheet_name)?;

        let file = File::create(path)?;
        let file = self.write(table, sheet_name, file)?;
        file.sync_all()?;

        log::debug!(
            "wrote {} rows to sheet '{}' in {}",
            table.len(),
            sheet_name,
            path.display()
        );
        Ok(())
    }

    /// Write a table to a writer, returning the writer once the archive is
    /// finished
    pub fn write<W: Write + Seek>(&self, table: &Table, sheet_name: &str, writer: W) -> TableResult<W> {
        validate_sheet_name(sheet_name)?;

        let mut zip = zip::ZipWriter::new(writer);

        Self::write_content_types(&mut zip)?;
        Self::write_root_rels(&mut zip)?;
        self.write_doc_props(&mut zip, sheet_name)?;
        Self::write_workbook_xml(&mut zip, sheet_name)?;
        Self::write_workbook_rels(&mut zip)?;
        Self::write_styles_xml(&mut zip)?;
        Self::write_worksheet(&mut zip, table)?;

        let mut writer = zip.finish()?;
        writer.flush()?;
        Ok(writer)
    }

    fn write_content_types<W: Write + Seek>(zip: &mut zip::ZipWriter<W>) -> TableResult<()> {
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("[Content_Types].xml", options)?;

        let content = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
    <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
    <Default Extension="xml" ContentType="application/xml"/>
    <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
    <Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
    <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
    <Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
    <Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>
</Types>"#;

        zip.write_all(content.as_bytes())?;
        Ok(())
    }

    fn write_root_rels<W: Write + Seek>(zip: &mut zip::ZipWriter<W>) -> TableResult<()> {
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("_rels/.rels", options)?;

        let content = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
    <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
    <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
    <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#;

        zip.write_all(content.as_bytes())?;
        Ok(())
    }

    fn write_doc_props<W: Write + Seek>(
        &self,
        zip: &mut zip::ZipWriter<W>,
        sheet_name: &str,
    ) -> TableResult<()> {
        let options = zip::write::SimpleFileOptions::default();
        let created = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        zip.start_file("docProps/core.xml", options)?;
        let core = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
    <dc:creator>{}</dc:creator>
    <dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created>
    <dcterms:modified xsi:type="dcterms:W3CDTF">{}</dcterms:modified>
</cp:coreProperties>"#,
            escape_xml(&self.application),
            created,
            created
        );
        zip.write_all(core.as_bytes())?;

        zip.start_file("docProps/app.xml", options)?;
        let app = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">
    <Application>{}</Application>
    <TitlesOfParts>
        <vt:vector size="1" baseType="lpstr">
            <vt:lpstr>{}</vt:lpstr>
        </vt:vector>
    </TitlesOfParts>
</Properties>"#,
            escape_xml(&self.application),
            escape_xml(sheet_name)
        );
        zip.write_all(app.as_bytes())?;
        Ok(())
    }

    fn write_workbook_xml<W: Write + Seek>(
        zip: &mut zip::ZipWriter<W>,
        sheet_name: &str,
    ) -> TableResult<()> {
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/workbook.xml", options)?;

        let content = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
    <sheets>
        <sheet name="{}" sheetId="1" r:id="rId1"/>
    </sheets>
</workbook>"#,
            escape_xml(sheet_name)
        );

        zip.write_all(content.as_bytes())?;
        Ok(())
    }

    fn write_workbook_rels<W: Write + Seek>(zip: &mut zip::ZipWriter<W>) -> TableResult<()> {
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/_rels/workbook.xml.rels", options)?;

        let content = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
    <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
    <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

        zip.write_all(content.as_bytes())?;
        Ok(())
    }

    /// Two cell formats: 0 is the default, 1 is bold (header row)
    fn write_styles_xml<W: Write + Seek>(zip: &mut zip::ZipWriter<W>) -> TableResult<()> {
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/styles.xml", options)?;

        let content = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
    <fonts count="2">
        <font><sz val="11"/><name val="Calibri"/><family val="2"/></font>
        <font><b/><sz val="11"/><name val="Calibri"/><family val="2"/></font>
    </fonts>
    <fills count="2">
        <fill><patternFill patternType="none"/></fill>
        <fill><patternFill patternType="gray125"/></fill>
    </fills>
    <borders count="1">
        <border><left/><right/><top/><bottom/><diagonal/></border>
    </borders>
    <cellStyleXfs count="1">
        <xf numFmtId="0" fontId="0" fillId="0" borderId="0"/>
    </cellStyleXfs>
    <cellXfs count="2">
        <xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
        <xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/>
    </cellXfs>
    <cellStyles count="1">
        <cellStyle name="Normal" xfId="0" builtinId="0"/>
    </cellStyles>
</styleSheet>"#;

        zip.write_all(content.as_bytes())?;
        Ok(())
    }

    fn write_worksheet<W: Write + Seek>(
        zip: &mut zip::ZipWriter<W>,
        table: &Table,
    ) -> TableResult<()> {
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/worksheets/sheet1.xml", options)?;

        let last_col = (table.schema().len() - 1) as u16;
        let last_row = table.len() as u32;
        let used = CellRange::new(CellAddress::new(0, 0), CellAddress::new(last_row, last_col));

        let mut content = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
    <dimension ref="{}"/>
    <sheetData>"#,
            used
        );

        // Header row
        content.push_str("\n        <row r=\"1\">");
        for (col, column) in table.schema().columns().iter().enumerate() {
            let cell_ref = CellAddress::new(0, col as u16).to_a1_string();
            content.push_str(&format!(
                "\n            <c r=\"{}\" s=\"1\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                cell_ref,
                escape_xml(&column.name)
            ));
        }
        content.push_str("\n        </row>");

        for (i, values) in table.rows().enumerate() {
            let row = i as u32 + 1;
            content.push_str(&format!("\n        <row r=\"{}\">", row + 1));

            for (col, value) in values.iter().enumerate() {
                let cell_ref = CellAddress::new(row, col as u16).to_a1_string();
                match value {
                    Value::Integer(n) => {
                        content.push_str(&format!(
                            "\n            <c r=\"{}\"><v>{}</v></c>",
                            cell_ref, n
                        ));
                    }
                    Value::Text(s) => {
                        content.push_str(&format!(
                            "\n            <c r=\"{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                            cell_ref,
                            escape_xml(s)
                        ));
                    }
                }
            }

            content.push_str("\n        </row>");
        }

        content.push_str("\n    </sheetData>");
        content.push_str(&format!("\n    <autoFilter ref=\"{}\"/>", used));
        content.push_str("\n</worksheet>");

        zip.write_all(content.as_bytes())?;
        Ok(())
    }
}

/// Reject names Excel will not open: empty, too long, or containing
/// `[ ] : * ? / \`
pub fn validate_sheet_name(name: &str) -> TableResult<()> {
    const FORBIDDEN: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

    if name.is_empty() || name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(TableError::InvalidSheetName(name.to_string()));
    }
    if name.contains(FORBIDDEN) {
        return Err(TableError::InvalidSheetName(name.to_string()));
    }
    Ok(())
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_name_rules() {
        assert!(validate_sheet_name("Data").is_ok());
        assert!(validate_sheet_name(&"x".repeat(31)).is_ok());
        assert!(validate_sheet_name("").is_err());
        assert!(validate_sheet_name(&"x".repeat(32)).is_err());
        assert!(validate_sheet_name("Q1/Q2").is_err());
        assert!(validate_sheet_name("[Data]").is_err());
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("R&D <x>"), "R&amp;D &lt;x&gt;");
    }
}
