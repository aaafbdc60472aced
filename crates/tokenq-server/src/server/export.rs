//! Record export.
//!
//! The service hands the ordered record set to an [`Exporter`] and streams
//! back whatever bytes it produces. [`TableExporter`] is the built-in
//! formatter: RFC 4180 CSV, a SpreadsheetML 2003 workbook for Excel, and a
//! plain single-font PDF report.

use chrono::{DateTime, Utc};
use core::{fmt::Write as _, str::FromStr};
use tokenq::ServiceRequest;

use crate::server::error::ApiError;

const TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

const COLUMNS: [&str; 9] = [
    "Token Number",
    "Name",
    "Email",
    "Contact Number",
    "Address",
    "Work Description",
    "Status",
    "Created At",
    "Updated At",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Excel,
    Csv,
    Pdf,
}

impl ExportFormat {
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Excel => "application/vnd.ms-excel",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Pdf => "application/pdf",
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            Self::Excel => "xls",
            Self::Csv => "csv",
            Self::Pdf => "pdf",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Excel => "excel",
            Self::Csv => "csv",
            Self::Pdf => "pdf",
        }
    }

    /// Download name, e.g. `service_tokens_20240131_174501.csv`.
    pub fn file_name(self, at: DateTime<Utc>) -> String {
        format!(
            "service_tokens_{}.{}",
            at.format("%Y%m%d_%H%M%S"),
            self.extension()
        )
    }
}

impl FromStr for ExportFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "excel" => Ok(Self::Excel),
            "csv" => Ok(Self::Csv),
            "pdf" => Ok(Self::Pdf),
            other => Err(ApiError::UnknownExportFormat(other.to_string())),
        }
    }
}

/// Turns a record set into a downloadable document.
pub trait Exporter: Send + Sync {
    fn render(&self, format: ExportFormat, records: &[ServiceRequest]) -> Vec<u8>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TableExporter;

impl Exporter for TableExporter {
    fn render(&self, format: ExportFormat, records: &[ServiceRequest]) -> Vec<u8> {
        match format {
            ExportFormat::Csv => csv(records).into_bytes(),
            ExportFormat::Excel => spreadsheet(records).into_bytes(),
            ExportFormat::Pdf => pdf(records, Utc::now()),
        }
    }
}

fn row(record: &ServiceRequest) -> [String; 9] {
    [
        record.token_number.to_string(),
        record.name.clone(),
        record.email.clone(),
        record.contact_number.clone(),
        record.address.clone(),
        record.work_description.clone(),
        record.status.to_string(),
        record.created_at.format(TIMESTAMP).to_string(),
        record.updated_at.format(TIMESTAMP).to_string(),
    ]
}

fn csv(records: &[ServiceRequest]) -> String {
    fn field(out: &mut String, value: &str) {
        if value.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&value.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(value);
        }
    }

    let mut out = String::new();
    let line = |out: &mut String, values: &[&str]| {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            field(out, value);
        }
        out.push_str("\r\n");
    };

    line(&mut out, &COLUMNS);
    for record in records {
        let values = row(record);
        line(&mut out, &values.each_ref().map(String::as_str));
    }
    out
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            c => out.push(c),
        }
    }
    out
}

fn spreadsheet(records: &[ServiceRequest]) -> String {
    let mut out = String::from(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<?mso-application progid=\"Excel.Sheet\"?>\n",
        "<Workbook xmlns=\"urn:schemas-microsoft-com:office:spreadsheet\" ",
        "xmlns:ss=\"urn:schemas-microsoft-com:office:spreadsheet\">\n",
        "<Worksheet ss:Name=\"Service Tokens\">\n<Table>\n",
    ));

    out.push_str("<Row>");
    for column in COLUMNS {
        let _ = write!(out, "<Cell><Data ss:Type=\"String\">{column}</Data></Cell>");
    }
    out.push_str("</Row>\n");

    for record in records {
        out.push_str("<Row>");
        for (i, value) in row(record).iter().enumerate() {
            let kind = if i == 0 { "Number" } else { "String" };
            let _ = write!(
                out,
                "<Cell><Data ss:Type=\"{kind}\">{}</Data></Cell>",
                xml_escape(value)
            );
        }
        out.push_str("</Row>\n");
    }

    out.push_str("</Table>\n</Worksheet>\n</Workbook>\n");
    out
}

const PDF_LINES_PER_PAGE: usize = 60;

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn pdf_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn pdf(records: &[ServiceRequest], generated_at: DateTime<Utc>) -> Vec<u8> {
    let mut lines = vec![
        "Service Token Report".to_string(),
        format!("Generated on: {}", generated_at.format(TIMESTAMP)),
        String::new(),
        format!(
            "{:<7} {:<20} {:<25} {:<15} {:<9}",
            "Token", "Name", "Email", "Contact", "Status"
        ),
        "-".repeat(80),
    ];
    lines.extend(records.iter().map(|r| {
        format!(
            "{:<7} {:<20} {:<25} {:<15} {:<9}",
            r.token_number,
            truncate(&r.name, 20),
            truncate(&r.email, 25),
            truncate(&r.contact_number, 15),
            r.status.as_str()
        )
    }));

    let pages: Vec<&[String]> = lines.chunks(PDF_LINES_PER_PAGE).collect();

    // Object layout: 1 catalog, 2 page tree, 3 font, then a (page, content)
    // pair per page.
    let page_id = |i: usize| 4 + 2 * i;
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            (0..pages.len())
                .map(|i| format!("{} 0 R", page_id(i)))
                .collect::<Vec<_>>()
                .join(" "),
            pages.len()
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>".to_string(),
    ];
    for (i, page) in pages.iter().enumerate() {
        let mut content = String::from("BT\n/F1 9 Tf\n11 TL\n40 800 Td\n");
        for line in page.iter() {
            let _ = writeln!(content, "({}) Tj T*", pdf_escape(line));
        }
        content.push_str("ET");

        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            page_id(i) + 1
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        let _ = write!(out, "{} 0 obj\n{body}\nendobj\n", i + 1);
    }

    let xref = out.len();
    let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(out, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
        objects.len() + 1
    );
    out.into_bytes()
}
