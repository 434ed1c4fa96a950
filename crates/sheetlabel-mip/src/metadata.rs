//! Label metadata stored in OOXML packages.
//!
//! A label is recorded as a group of custom document properties in
//! `docProps/custom.xml`, all named `MSIP_Label_<label id>_<field>`:
//!
//! | Field | Value |
//! |-------|-------|
//! | `Enabled` | `true` |
//! | `SetDate` | UTC timestamp, `YYYY-MM-DDTHH:MM:SSZ` |
//! | `Method` | `Standard`, `Privileged` or `Auto` |
//! | `Name` | display name of the label |
//! | `SiteId` | tenant id |
//! | `ActionId` | id of the labeling action |
//! | `ContentBits` | content marking flags (`0`: none) |
//!
//! Rewriting a package copies every other part byte-for-byte and registers
//! the custom properties part in `[Content_Types].xml` and `_rels/.rels` when
//! it was not there before.

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};

use quick_xml::events::attributes::AttrError;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use thiserror::Error;
use zip::ZipArchive;

/// Prefix shared by all label properties
pub const MSIP_PREFIX: &str = "MSIP_Label_";

const CUSTOM_PART: &str = "docProps/custom.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const ROOT_RELS_PART: &str = "_rels/.rels";

/// Fixed format id every custom property uses
const FORMAT_ID: &str = "{D5CDD505-2E9C-101B-9397-08002B2CF9AE}";
const CUSTOM_PROPERTIES_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/custom-properties";
const VTYPES_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes";
const CUSTOM_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.custom-properties+xml";
const CUSTOM_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/custom-properties";

/// Errors reading or rewriting a package
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attr(#[from] AttrError),

    #[error("Invalid package: {0}")]
    Invalid(String),
}

pub type PackageResult<T> = std::result::Result<T, PackageError>;

/// One custom document property. `vt` is the variant element name
/// (`lpwstr`, `i4`, `bool`, ...); values of any type are carried through
/// a rewrite as their text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomProperty {
    pub name: String,
    pub vt: String,
    pub value: String,
}

impl CustomProperty {
    /// A string (`lpwstr`) property
    pub fn string<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            vt: "lpwstr".to_string(),
            value: value.into(),
        }
    }
}

/// Label fields as found in (or destined for) a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMetadata {
    pub label_id: String,
    pub name: String,
    pub enabled: bool,
    pub set_date: Option<String>,
    pub method: Option<String>,
    pub site_id: Option<String>,
    pub action_id: Option<String>,
    pub content_bits: u32,
}

impl LabelMetadata {
    fn key(&self, field: &str) -> String {
        format!("{}{}_{}", MSIP_PREFIX, self.label_id, field)
    }

    /// Property list in the order Office writes it
    pub fn to_properties(&self) -> Vec<CustomProperty> {
        let mut props = vec![CustomProperty::string(
            self.key("Enabled"),
            self.enabled.to_string(),
        )];
        if let Some(set_date) = &self.set_date {
            props.push(CustomProperty::string(self.key("SetDate"), set_date.clone()));
        }
        if let Some(method) = &self.method {
            props.push(CustomProperty::string(self.key("Method"), method.clone()));
        }
        props.push(CustomProperty::string(self.key("Name"), self.name.clone()));
        if let Some(site_id) = &self.site_id {
            props.push(CustomProperty::string(self.key("SiteId"), site_id.clone()));
        }
        if let Some(action_id) = &self.action_id {
            props.push(CustomProperty::string(self.key("ActionId"), action_id.clone()));
        }
        props.push(CustomProperty::string(
            self.key("ContentBits"),
            self.content_bits.to_string(),
        ));
        props
    }

    /// Collect label groups from a property list; the first enabled label
    /// wins, otherwise the first label found.
    pub fn from_properties(props: &[CustomProperty]) -> Option<Self> {
        let mut labels: Vec<LabelMetadata> = Vec::new();

        for prop in props {
            let Some(rest) = prop.name.strip_prefix(MSIP_PREFIX) else {
                continue;
            };
            let Some((label_id, field)) = rest.rsplit_once('_') else {
                continue;
            };

            let index = match labels.iter().position(|l| l.label_id == label_id) {
                Some(i) => i,
                None => {
                    labels.push(LabelMetadata {
                        label_id: label_id.to_string(),
                        name: String::new(),
                        enabled: false,
                        set_date: None,
                        method: None,
                        site_id: None,
                        action_id: None,
                        content_bits: 0,
                    });
                    labels.len() - 1
                }
            };
            let label = &mut labels[index];

            match field {
                "Enabled" => label.enabled = prop.value.eq_ignore_ascii_case("true"),
                "SetDate" => label.set_date = Some(prop.value.clone()),
                "Method" => label.method = Some(prop.value.clone()),
                "Name" => label.name = prop.value.clone(),
                "SiteId" => label.site_id = Some(prop.value.clone()),
                "ActionId" => label.action_id = Some(prop.value.clone()),
                "ContentBits" => label.content_bits = prop.value.trim().parse().unwrap_or(0),
                _ => {}
            }
        }

        match labels.iter().position(|l| l.enabled) {
            Some(i) => Some(labels.swap_remove(i)),
            None => labels.into_iter().next(),
        }
    }
}

/// Parse the content of `docProps/custom.xml`
pub fn parse_custom_xml(xml: &str) -> PackageResult<Vec<CustomProperty>> {
    // Values keep their whitespace; text outside a value element is ignored
    let mut reader = Reader::from_str(xml);

    let mut props = Vec::new();
    let mut current: Option<String> = None;
    let mut vt: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let local = e.local_name();
                if local.as_ref() == b"property" {
                    current = match e.try_get_attribute("name")? {
                        Some(attr) => Some(attr.unescape_value()?.into_owned()),
                        None => None,
                    };
                } else if current.is_some() {
                    vt = Some(String::from_utf8_lossy(local.as_ref()).into_owned());
                    text.clear();
                }
            }
            Event::Empty(e) => {
                let local = e.local_name();
                if let (Some(name), true) = (&current, local.as_ref() != b"property") {
                    props.push(CustomProperty {
                        name: name.clone(),
                        vt: String::from_utf8_lossy(local.as_ref()).into_owned(),
                        value: String::new(),
                    });
                }
            }
            Event::Text(t) => {
                if vt.is_some() {
                    text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if vt.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"property" {
                    current = None;
                } else if let (Some(name), Some(element)) = (&current, vt.take()) {
                    props.push(CustomProperty {
                        name: name.clone(),
                        vt: element,
                        value: std::mem::take(&mut text),
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(props)
}

/// Render `docProps/custom.xml`; property ids start at 2
pub fn custom_xml(props: &[CustomProperty]) -> String {
    let mut content = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="{}" xmlns:vt="{}">"#,
        CUSTOM_PROPERTIES_NS, VTYPES_NS
    );

    for (i, prop) in props.iter().enumerate() {
        content.push_str(&format!(
            "\n    <property fmtid=\"{}\" pid=\"{}\" name=\"{}\"><vt:{}>{}</vt:{}></property>",
            FORMAT_ID,
            i + 2,
            escape_xml(&prop.name),
            prop.vt,
            escape_xml(&prop.value),
            prop.vt
        ));
    }

    content.push_str("\n</Properties>");
    content
}

/// Open an OOXML package and return its custom properties
pub fn read_custom_properties<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> PackageResult<Vec<CustomProperty>> {
    if archive.by_name(CONTENT_TYPES_PART).is_err() {
        return Err(PackageError::Invalid(format!("missing {}", CONTENT_TYPES_PART)));
    }

    let xml = match archive.by_name(CUSTOM_PART) {
        Ok(mut part) => {
            let mut xml = String::new();
            part.read_to_string(&mut xml)?;
            xml
        }
        Err(zip::result::ZipError::FileNotFound) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    parse_custom_xml(&xml)
}

/// Label currently stamped on the package at `path`, if any
pub fn read_label<P: AsRef<Path>>(path: P) -> PackageResult<Option<LabelMetadata>> {
    let file = File::open(path.as_ref())?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let props = read_custom_properties(&mut archive)?;
    Ok(LabelMetadata::from_properties(&props))
}

/// Write the package at `input` to `output` with `label` (and `extra`
/// properties) replacing any label previously stamped on it.
///
/// The new package is written next to `output` and renamed over it, so
/// `input` and `output` may be the same path.
pub fn stamp_label(
    input: &Path,
    output: &Path,
    label: &LabelMetadata,
    extra: &[CustomProperty],
) -> PackageResult<()> {
    let existing = {
        let file = File::open(input)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;
        read_custom_properties(&mut archive)?
    };

    let mut props: Vec<CustomProperty> = existing
        .into_iter()
        .filter(|p| !p.name.starts_with(MSIP_PREFIX))
        .filter(|p| !extra.iter().any(|e| e.name == p.name))
        .collect();
    props.extend(label.to_properties());
    props.extend(extra.iter().cloned());

    write_package(input, output, &props)
}

fn write_package(input: &Path, output: &Path, props: &[CustomProperty]) -> PackageResult<()> {
    let tmp = temp_path(output);

    let result = copy_with_properties(input, &tmp, props);
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp, output) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn copy_with_properties(input: &Path, tmp: &Path, props: &[CustomProperty]) -> PackageResult<()> {
    let source = File::open(input)?;
    let mut archive = ZipArchive::new(BufReader::new(source))?;

    let mut zip = zip::ZipWriter::new(File::create(tmp)?);
    let options = zip::write::SimpleFileOptions::default();
    let mut saw_content_types = false;
    let mut saw_root_rels = false;

    for i in 0..archive.len() {
        let name = archive.by_index_raw(i)?.name().to_string();
        match name.as_str() {
            CUSTOM_PART => continue,
            CONTENT_TYPES_PART => {
                let xml = ensure_content_type(&read_entry(&mut archive, i)?)?;
                zip.start_file(name, options)?;
                zip.write_all(xml.as_bytes())?;
                saw_content_types = true;
            }
            ROOT_RELS_PART => {
                let xml = ensure_relationship(&read_entry(&mut archive, i)?)?;
                zip.start_file(name, options)?;
                zip.write_all(xml.as_bytes())?;
                saw_root_rels = true;
            }
            _ => {
                let entry = archive.by_index_raw(i)?;
                zip.raw_copy_file(entry)?;
            }
        }
    }

    if !saw_content_types {
        return Err(PackageError::Invalid(format!("missing {}", CONTENT_TYPES_PART)));
    }
    if !saw_root_rels {
        return Err(PackageError::Invalid(format!("missing {}", ROOT_RELS_PART)));
    }

    zip.start_file(CUSTOM_PART, options)?;
    zip.write_all(custom_xml(props).as_bytes())?;

    let file = zip.finish()?;
    file.sync_all()?;
    Ok(())
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, index: usize) -> PackageResult<String> {
    let mut entry = archive.by_index(index)?;
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    Ok(content)
}

fn ensure_content_type(xml: &str) -> PackageResult<String> {
    if xml.contains("PartName=\"/docProps/custom.xml\"") {
        return Ok(xml.to_string());
    }
    let end = xml
        .rfind("</Types>")
        .ok_or_else(|| PackageError::Invalid("malformed [Content_Types].xml".into()))?;

    let mut patched = String::with_capacity(xml.len() + 160);
    patched.push_str(&xml[..end]);
    patched.push_str(&format!(
        "<Override PartName=\"/{}\" ContentType=\"{}\"/>",
        CUSTOM_PART, CUSTOM_CONTENT_TYPE
    ));
    patched.push_str(&xml[end..]);
    Ok(patched)
}

fn ensure_relationship(xml: &str) -> PackageResult<String> {
    if xml.contains(CUSTOM_REL_TYPE) {
        return Ok(xml.to_string());
    }
    let end = xml
        .rfind("</Relationships>")
        .ok_or_else(|| PackageError::Invalid("malformed _rels/.rels".into()))?;

    let mut n = 1;
    while xml.contains(&format!("Id=\"rId{}\"", n)) {
        n += 1;
    }

    let mut patched = String::with_capacity(xml.len() + 160);
    patched.push_str(&xml[..end]);
    patched.push_str(&format!(
        "<Relationship Id=\"rId{}\" Type=\"{}\" Target=\"{}\"/>",
        n, CUSTOM_REL_TYPE, CUSTOM_PART
    ));
    patched.push_str(&xml[end..]);
    Ok(patched)
}

fn temp_path(output: &Path) -> PathBuf {
    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());
    output.with_file_name(format!(".{}.sheetlabel-tmp", file_name))
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
