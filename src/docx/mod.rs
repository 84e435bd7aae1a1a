mod numbering;
mod styles;

use std::collections::HashMap;

use crate::ConvertOptions;
use crate::error::Error;
use crate::model::{
    Block, Break, CellBorder, CellBorders, CellVAlign, Document, Hyperlink, Image, Inline,
    ListItem, Paragraph, Run, Table, TableCell, TableRow, VertAlign,
};
use crate::package::Package;
use crate::uri_fix::is_valid_uri;

use numbering::{Numbering, symbol_pua_to_unicode};
use styles::{ParaProps, RunProps, StyleResolver, TableBordersDef, ThemeFonts, parse_theme};

pub(crate) const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub(crate) const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub(crate) const REL_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const WPD_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const VML_NS: &str = "urn:schemas-microsoft-com:vml";
const OFFICE_NS: &str = "urn:schemas-microsoft-com:office:office";
const MC_NS: &str = "http://schemas.openxmlformats.org/markup-compatibility/2006";

/// Primary language subtags accepted when `restrict_to_supported_languages` is set.
const SUPPORTED_LANGUAGES: &[&str] = &[
    "en", "fr", "de", "es", "it", "nl", "pt", "sv", "da", "nb", "nn", "no", "fi", "pl", "cs",
    "tr", "ru", "zh", "ja", "ko",
];

const EMU_PER_PT: f32 = 12700.0;

pub(super) fn twips_to_pts(twips: f32) -> f32 {
    twips / 20.0
}

pub(super) fn parse_hex_color(val: &str) -> Option<[u8; 3]> {
    if val == "auto" || val.len() != 6 || !val.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&val[0..2], 16).ok()?;
    let g = u8::from_str_radix(&val[2..4], 16).ok()?;
    let b = u8::from_str_radix(&val[4..6], 16).ok()?;
    Some([r, g, b])
}

pub(super) fn parse_text_color(val: &str) -> Option<[u8; 3]> {
    if val == "auto" {
        return Some([0, 0, 0]);
    }
    parse_hex_color(val)
}

pub(super) fn highlight_color(name: &str) -> Option<[u8; 3]> {
    match name {
        "yellow" => Some([255, 255, 0]),
        "green" => Some([0, 255, 0]),
        "cyan" => Some([0, 255, 255]),
        "magenta" => Some([255, 0, 255]),
        "red" => Some([255, 0, 0]),
        "blue" => Some([0, 0, 255]),
        "darkYellow" => Some([128, 128, 0]),
        "darkGreen" => Some([0, 128, 0]),
        "darkCyan" => Some([0, 128, 128]),
        "darkMagenta" => Some([128, 0, 128]),
        "darkRed" => Some([128, 0, 0]),
        "darkBlue" => Some([0, 0, 128]),
        "lightGray" => Some([192, 192, 192]),
        "darkGray" => Some([128, 128, 128]),
        "black" => Some([0, 0, 0]),
        "white" => Some([255, 255, 255]),
        _ => None,
    }
}

/// Parse a WML boolean toggle element (e.g., w:b, w:i, w:strike).
/// Present with no val or val != "0"/"false" means true.
pub(super) fn wml_bool(parent: roxmltree::Node, name: &str) -> Option<bool> {
    wml(parent, name).map(|n| {
        n.attribute((WML_NS, "val"))
            .is_none_or(|v| v != "0" && v != "false" && v != "off")
    })
}

pub(super) fn wml<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children()
        .find(|n| n.tag_name().name() == name && n.tag_name().namespace() == Some(WML_NS))
}

pub(super) fn wml_attr<'a>(node: roxmltree::Node<'a, 'a>, child: &str) -> Option<&'a str> {
    wml(node, child).and_then(|n| n.attribute((WML_NS, "val")))
}

pub(super) fn twips_attr(node: roxmltree::Node, attr: &str) -> Option<f32> {
    node.attribute((WML_NS, attr))
        .and_then(|v| v.parse::<f32>().ok())
        .map(twips_to_pts)
}

fn is_wml(node: roxmltree::Node, name: &str) -> bool {
    node.tag_name().name() == name && node.tag_name().namespace() == Some(WML_NS)
}

pub(super) fn parse_cell_border(bdr_node: roxmltree::Node, name: &str) -> CellBorder {
    let Some(n) = wml(bdr_node, name) else {
        return CellBorder::default();
    };
    let val = n.attribute((WML_NS, "val")).unwrap_or("none");
    if val == "nil" || val == "none" {
        return CellBorder::default();
    }
    let width = n
        .attribute((WML_NS, "sz"))
        .and_then(|v| v.parse::<f32>().ok())
        .map(|v| v / 8.0)
        .unwrap_or(0.5);
    let color = n.attribute((WML_NS, "color")).and_then(parse_hex_color);
    CellBorder::visible(color, width)
}

/// Anchors cannot nest: bookmarks inside a hyperlink move in front of it and
/// nested hyperlinks keep only their content.
fn hoist_anchors(children: Vec<Inline>, before: &mut Vec<Inline>) -> Vec<Inline> {
    let mut kept = Vec::with_capacity(children.len());
    for inline in children {
        match inline {
            Inline::Bookmark(_) => before.push(inline),
            Inline::Hyperlink(inner) => kept.extend(hoist_anchors(inner.children, before)),
            other => kept.push(other),
        }
    }
    kept
}

/// Flatten content-control and custom-XML wrappers into their effective children.
fn collect_block_nodes<'a>(parent: roxmltree::Node<'a, 'a>) -> Vec<roxmltree::Node<'a, 'a>> {
    let mut nodes = Vec::new();
    for child in parent.children() {
        if is_wml(child, "sdt") {
            if let Some(content) = wml(child, "sdtContent") {
                nodes.extend(collect_block_nodes(content));
            }
        } else if is_wml(child, "customXml") {
            nodes.extend(collect_block_nodes(child));
        } else {
            nodes.push(child);
        }
    }
    nodes
}

/// Complex-field state of a paragraph. Instruction text between `begin` and
/// `separate` is hidden; the cached result after `separate` is kept.
#[derive(Default)]
struct FieldState {
    stack: Vec<bool>, // true once the field reached its result part
}

impl FieldState {
    fn visible(&self) -> bool {
        self.stack.iter().all(|in_result| *in_result)
    }

    fn on_fld_char(&mut self, kind: Option<&str>) {
        match kind {
            Some("begin") => self.stack.push(false),
            Some("separate") => {
                if let Some(top) = self.stack.last_mut() {
                    *top = true;
                }
            }
            Some("end") => {
                self.stack.pop();
            }
            _ => {}
        }
    }
}

struct Builder<'p, 'a> {
    package: &'p Package<'a>,
    theme: ThemeFonts,
    styles: StyleResolver,
    numbering: Numbering,
    include_images: bool,
    restrict_languages: bool,
    image_slots: Vec<String>,
}

pub(crate) fn parse(package: &mut Package, options: &ConvertOptions) -> Result<Document, Error> {
    let theme_xml = package.related_xml("theme", "word/theme/theme1.xml");
    let theme = parse_theme(theme_xml.as_deref());
    let styles_xml = package.related_xml("styles", "word/styles.xml");
    let styles = StyleResolver::parse(styles_xml.as_deref(), &theme);
    let numbering_xml = package.related_xml("numbering", "word/numbering.xml");
    let numbering = Numbering::parse(
        numbering_xml.as_deref(),
        options.restrict_to_supported_numbering,
    );
    let title = package.core_title();

    let xml_content = package.document_xml()?;
    let xml = roxmltree::Document::parse(&xml_content)
        .map_err(|e| Error::MalformedXml(e.to_string()))?;
    let root = xml.root_element();
    if !is_wml(root, "document") {
        return Err(Error::MalformedXml(format!(
            "root element is <{}>, expected w:document",
            root.tag_name().name()
        )));
    }
    let body = wml(root, "body").ok_or_else(|| Error::MalformedXml("missing w:body".into()))?;

    let mut builder = Builder {
        package: &*package,
        theme,
        styles,
        numbering,
        include_images: options.include_images,
        restrict_languages: options.restrict_to_supported_languages,
        image_slots: Vec::new(),
    };

    if builder.restrict_languages {
        for lang in builder.styles.declared_languages() {
            check_language(lang)?;
        }
    }
    let language = builder.styles.default_language().map(String::from);

    let blocks = builder.parse_blocks(body)?;
    log::debug!(
        "Built content tree: {} top-level blocks, {} images",
        blocks.len(),
        builder.image_slots.len()
    );

    Ok(Document {
        blocks,
        image_slots: builder.image_slots,
        title,
        language,
    })
}

fn check_language(lang: &str) -> Result<(), Error> {
    let primary = lang.split(['-', '_']).next().unwrap_or("").to_ascii_lowercase();
    if SUPPORTED_LANGUAGES.contains(&primary.as_str()) {
        Ok(())
    } else {
        Err(Error::UnsupportedLanguage(lang.to_string()))
    }
}

impl Builder<'_, '_> {
    fn parse_blocks(&mut self, parent: roxmltree::Node) -> Result<Vec<Block>, Error> {
        let mut blocks = Vec::new();
        for node in collect_block_nodes(parent) {
            if node.tag_name().namespace() != Some(WML_NS) {
                continue;
            }
            match node.tag_name().name() {
                "p" => blocks.push(self.parse_paragraph(node)?),
                "tbl" => blocks.push(Block::Table(self.parse_table(node)?)),
                _ => {}
            }
        }
        Ok(blocks)
    }

    fn check_run_language(&self, props: &RunProps) -> Result<(), Error> {
        match props.lang.as_deref() {
            Some(lang) if self.restrict_languages => check_language(lang),
            _ => Ok(()),
        }
    }

    fn parse_paragraph(&mut self, node: roxmltree::Node) -> Result<Block, Error> {
        let ppr = wml(node, "pPr");
        let direct = ppr.map(ParaProps::parse).unwrap_or_default();
        let style_id = self
            .styles
            .paragraph_style_id(ppr.and_then(|ppr| wml_attr(ppr, "pStyle")));
        let style_id = style_id.as_deref();
        let props = self.styles.resolve_paragraph(style_id, &direct);

        let mark_direct = ppr
            .and_then(|ppr| wml(ppr, "rPr"))
            .map(|n| RunProps::parse(n, &self.theme))
            .unwrap_or_default();
        let mark = self.styles.resolve_run(style_id, None, &mark_direct);
        self.check_run_language(&mark)?;

        let mut fields = FieldState::default();
        let children = self.parse_inlines(node, style_id, &mut fields)?;

        let mut paragraph = Paragraph {
            format: props.to_format(),
            mark: mark.to_format(),
            children,
        };

        let marker = match props.list_ref() {
            Some((num_id, ilvl)) => self
                .numbering
                .next_marker(num_id, ilvl)
                .map_err(Error::UnsupportedNumberingFormat)?,
            None => None,
        };
        let Some(marker) = marker else {
            self.numbering.interrupt();
            return Ok(Block::Paragraph(paragraph));
        };

        // Level indentation applies unless the paragraph sets its own
        if direct.indent_left.is_none() {
            if let Some(left) = marker.indent_left {
                paragraph.format.indent_left = Some(left);
            }
            if direct.indent_first_line.is_none()
                && let Some(hanging) = marker.indent_hanging
            {
                paragraph.format.indent_first_line = Some(-hanging);
            }
        }

        Ok(Block::ListItem(ListItem {
            marker: marker.text,
            level: marker.level,
            paragraph,
        }))
    }

    fn parse_inlines(
        &mut self,
        parent: roxmltree::Node,
        para_style: Option<&str>,
        fields: &mut FieldState,
    ) -> Result<Vec<Inline>, Error> {
        let mut out = Vec::new();
        for child in parent.children() {
            if child.tag_name().namespace() != Some(WML_NS) {
                continue;
            }
            match child.tag_name().name() {
                "r" => self.parse_run(child, para_style, fields, &mut out)?,
                "hyperlink" => {
                    let target = self.hyperlink_target(child)?;
                    let children = self.parse_inlines(child, para_style, fields)?;
                    match target {
                        Some(target) => {
                            let children = hoist_anchors(children, &mut out);
                            out.push(Inline::Hyperlink(Hyperlink {
                                target,
                                tooltip: child.attribute((WML_NS, "tooltip")).map(String::from),
                                children,
                            }));
                        }
                        None => out.extend(children),
                    }
                }
                "sdt" => {
                    if let Some(content) = wml(child, "sdtContent") {
                        out.extend(self.parse_inlines(content, para_style, fields)?);
                    }
                }
                "ins" | "moveTo" | "smartTag" | "customXml" | "fldSimple" | "dir" | "bdo" => {
                    out.extend(self.parse_inlines(child, para_style, fields)?);
                }
                "bookmarkStart" => {
                    if let Some(name) = child.attribute((WML_NS, "name"))
                        && !name.starts_with('_')
                    {
                        out.push(Inline::Bookmark(name.to_string()));
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    }

    /// Resolve a w:hyperlink to its target. External targets come from the
    /// relationship table and must be valid URIs; internal ones are anchors.
    fn hyperlink_target(&self, node: roxmltree::Node) -> Result<Option<String>, Error> {
        let anchor = node.attribute((WML_NS, "anchor")).filter(|a| !a.is_empty());
        let Some(rel_id) = node.attribute((REL_NS, "id")) else {
            return Ok(anchor.map(|a| format!("#{a}")));
        };
        let rel = self
            .package
            .relationship(rel_id)
            .ok_or_else(|| Error::UnresolvedHyperlink {
                rel_id: rel_id.to_string(),
                target: None,
            })?;
        if !is_valid_uri(&rel.target) {
            return Err(Error::UnresolvedHyperlink {
                rel_id: rel_id.to_string(),
                target: Some(rel.target.clone()),
            });
        }
        Ok(Some(match anchor {
            Some(a) => format!("{}#{a}", rel.target),
            None => rel.target.clone(),
        }))
    }

    fn parse_run(
        &mut self,
        run_node: roxmltree::Node,
        para_style: Option<&str>,
        fields: &mut FieldState,
        out: &mut Vec<Inline>,
    ) -> Result<(), Error> {
        let rpr = wml(run_node, "rPr");
        let direct = rpr
            .map(|n| RunProps::parse(n, &self.theme))
            .unwrap_or_default();
        let char_style = rpr.and_then(|n| wml_attr(n, "rStyle"));
        let props = self.styles.resolve_run(para_style, char_style, &direct);
        self.check_run_language(&props)?;
        let hidden = props.is_hidden();
        let format = props.to_format();

        let mut pending_text = String::new();
        let flush = |pending: &mut String, out: &mut Vec<Inline>| {
            if !pending.is_empty() {
                out.push(Inline::Run(Run {
                    text: std::mem::take(pending),
                    format: format.clone(),
                }));
            }
        };

        for child in run_node.children() {
            if child.tag_name().namespace() == Some(MC_NS)
                && child.tag_name().name() == "AlternateContent"
            {
                if fields.visible() && !hidden && self.include_images {
                    flush(&mut pending_text, out);
                    if let Some(img) = self.parse_alternate_content(child) {
                        out.push(Inline::Image(img));
                    }
                }
                continue;
            }
            if child.tag_name().namespace() != Some(WML_NS) {
                continue;
            }
            let name = child.tag_name().name();
            if name == "fldChar" {
                flush(&mut pending_text, out);
                fields.on_fld_char(child.attribute((WML_NS, "fldCharType")));
                continue;
            }
            if hidden || !fields.visible() {
                continue;
            }
            match name {
                "t" => {
                    if let Some(t) = child.text() {
                        // Word treats newlines in w:t as whitespace; only w:br creates line breaks
                        pending_text.push_str(&t.replace('\n', " "));
                    }
                }
                "tab" | "ptab" => {
                    flush(&mut pending_text, out);
                    out.push(Inline::Tab);
                }
                "br" => {
                    flush(&mut pending_text, out);
                    out.push(Inline::Break(match child.attribute((WML_NS, "type")) {
                        Some("page") => Break::Page,
                        Some("column") => Break::Column,
                        _ => Break::Line,
                    }));
                }
                "cr" => {
                    flush(&mut pending_text, out);
                    out.push(Inline::Break(Break::Line));
                }
                "noBreakHyphen" => pending_text.push('\u{2011}'),
                "softHyphen" => pending_text.push('\u{AD}'),
                "sym" => {
                    let ch = child
                        .attribute((WML_NS, "char"))
                        .and_then(|v| u32::from_str_radix(v, 16).ok())
                        .and_then(|cp| {
                            let cp = if cp < 0x100 { cp + 0xF000 } else { cp };
                            if (0xF000..=0xF0FF).contains(&cp) {
                                symbol_pua_to_unicode(cp)
                            } else {
                                char::from_u32(cp)
                            }
                        });
                    if let Some(ch) = ch {
                        pending_text.push(ch);
                    }
                }
                "drawing" if self.include_images => {
                    flush(&mut pending_text, out);
                    if let Some(img) = self.parse_drawing(child) {
                        out.push(Inline::Image(img));
                    }
                }
                "pict" | "object" if self.include_images => {
                    flush(&mut pending_text, out);
                    if let Some(img) = self.parse_vml_image(child) {
                        out.push(Inline::Image(img));
                    }
                }
                "footnoteReference" | "endnoteReference" => {
                    flush(&mut pending_text, out);
                    if let Some(id) = child.attribute((WML_NS, "id")) {
                        let mut mark = format.clone();
                        mark.vertical_align = VertAlign::Superscript;
                        out.push(Inline::Run(Run {
                            text: id.to_string(),
                            format: mark,
                        }));
                    }
                }
                _ => {}
            }
        }
        flush(&mut pending_text, out);
        Ok(())
    }

    fn image_placeholder(&mut self, rel_id: &str, alt: Option<String>, style: Option<String>) -> Image {
        let slot = self.image_slots.len();
        self.image_slots.push(rel_id.to_string());
        Image { slot, alt, style }
    }

    fn parse_drawing(&mut self, drawing_node: roxmltree::Node) -> Option<Image> {
        for container in drawing_node.children() {
            let name = container.tag_name().name();
            if (name != "inline" && name != "anchor")
                || container.tag_name().namespace() != Some(WPD_NS)
            {
                continue;
            }

            let Some(embed_id) = find_blip_embed(container) else {
                continue;
            };

            let extent = container.children().find(|n| {
                n.tag_name().name() == "extent" && n.tag_name().namespace() == Some(WPD_NS)
            });
            let emu = |attr: &str| {
                extent
                    .and_then(|n| n.attribute(attr))
                    .and_then(|v| v.parse::<f32>().ok())
                    .unwrap_or(0.0)
            };
            let (display_w, display_h) = (emu("cx") / EMU_PER_PT, emu("cy") / EMU_PER_PT);
            let style = (display_w > 0.0 && display_h > 0.0)
                .then(|| format!("width: {}pt; height: {}pt", round2(display_w), round2(display_h)));

            let doc_pr = container.children().find(|n| {
                n.tag_name().name() == "docPr" && n.tag_name().namespace() == Some(WPD_NS)
            });
            let alt = doc_pr
                .and_then(|n| n.attribute("descr").filter(|d| !d.trim().is_empty()))
                .or_else(|| doc_pr.and_then(|n| n.attribute("title").filter(|t| !t.trim().is_empty())))
                .map(String::from);

            return Some(self.image_placeholder(embed_id, alt, style));
        }
        None
    }

    /// Legacy VML picture: the shape's style attribute is carried over as-is.
    fn parse_vml_image(&mut self, pict: roxmltree::Node) -> Option<Image> {
        let imagedata = pict.descendants().find(|n| {
            n.tag_name().name() == "imagedata" && n.tag_name().namespace() == Some(VML_NS)
        })?;
        let rel_id = imagedata.attribute((REL_NS, "id"))?;
        let shape = imagedata
            .parent_element()
            .filter(|p| p.tag_name().namespace() == Some(VML_NS));
        let style = shape.and_then(|s| s.attribute("style")).map(String::from);
        let alt = imagedata
            .attribute((OFFICE_NS, "title"))
            .or_else(|| shape.and_then(|s| s.attribute("alt")))
            .filter(|t| !t.trim().is_empty())
            .map(String::from);
        Some(self.image_placeholder(rel_id, alt, style))
    }

    fn parse_alternate_content(&mut self, node: roxmltree::Node) -> Option<Image> {
        for branch in node.children() {
            if branch.tag_name().namespace() != Some(MC_NS) {
                continue;
            }
            for child in branch.children() {
                let img = if is_wml(child, "drawing") {
                    self.parse_drawing(child)
                } else if is_wml(child, "pict") {
                    self.parse_vml_image(child)
                } else {
                    None
                };
                if img.is_some() {
                    return img;
                }
            }
        }
        None
    }

    fn parse_table(&mut self, node: roxmltree::Node) -> Result<Table, Error> {
        let col_widths: Vec<f32> = wml(node, "tblGrid")
            .into_iter()
            .flat_map(|grid| grid.children())
            .filter(|n| is_wml(*n, "gridCol"))
            .filter_map(|n| twips_attr(n, "w"))
            .collect();

        let tbl_pr = wml(node, "tblPr");
        let indent = tbl_pr
            .and_then(|pr| wml(pr, "tblInd"))
            .and_then(|ind| twips_attr(ind, "w"))
            .unwrap_or(0.0);

        let table_borders: Option<TableBordersDef> = tbl_pr
            .and_then(|pr| wml(pr, "tblBorders"))
            .map(TableBordersDef::parse)
            .or_else(|| {
                tbl_pr
                    .and_then(|pr| wml_attr(pr, "tblStyle"))
                    .and_then(|id| self.styles.table_borders(id))
            });

        let tbl_rows: Vec<_> = collect_block_nodes(node)
            .into_iter()
            .filter(|n| is_wml(*n, "tr"))
            .collect();
        let num_rows = tbl_rows.len();
        let num_cols = col_widths.len();

        let mut pending_rows: Vec<PendingRow> = Vec::with_capacity(num_rows);
        for (ri, tr) in tbl_rows.iter().enumerate() {
            let height = wml(*tr, "trPr")
                .and_then(|pr| wml(pr, "trHeight"))
                .and_then(|h| twips_attr(h, "val"));

            let mut cells = Vec::new();
            let mut grid_col = 0usize;
            for tc in collect_block_nodes(*tr)
                .into_iter()
                .filter(|n| is_wml(*n, "tc"))
            {
                let ci = grid_col;
                let tc_pr = wml(tc, "tcPr");
                let width = tc_pr
                    .and_then(|pr| wml(pr, "tcW"))
                    .filter(|w| w.attribute((WML_NS, "type")).is_none_or(|t| t == "dxa"))
                    .and_then(|w| twips_attr(w, "w"))
                    .filter(|w| *w > 0.0)
                    .or_else(|| col_widths.get(ci).copied());

                let col_span = tc_pr
                    .and_then(|pr| wml_attr(pr, "gridSpan"))
                    .and_then(|v| v.parse::<u16>().ok())
                    .unwrap_or(1)
                    .max(1);

                let v_merge = tc_pr
                    .and_then(|pr| wml(pr, "vMerge"))
                    .map(|n| match n.attribute((WML_NS, "val")) {
                        Some("restart") => VMerge::Restart,
                        _ => VMerge::Continue,
                    })
                    .unwrap_or(VMerge::None);

                let v_align = tc_pr
                    .and_then(|pr| wml_attr(pr, "vAlign"))
                    .map(|v| match v {
                        "center" => CellVAlign::Center,
                        "bottom" => CellVAlign::Bottom,
                        _ => CellVAlign::Top,
                    })
                    .unwrap_or(CellVAlign::Top);

                let span_end = ci + col_span as usize;
                let style_borders = table_borders.map(|tb| CellBorders {
                    top: if ri == 0 { tb.top } else { tb.inside_h },
                    bottom: if ri + 1 == num_rows { tb.bottom } else { tb.inside_h },
                    left: if ci == 0 { tb.left } else { tb.inside_v },
                    right: if span_end >= num_cols { tb.right } else { tb.inside_v },
                });

                let borders = tc_pr
                    .and_then(|pr| wml(pr, "tcBorders"))
                    .map(|bdr| {
                        let fallback = style_borders.unwrap_or_default();
                        let pick = |names: &[&str], fallback: CellBorder| {
                            names
                                .iter()
                                .map(|name| parse_cell_border(bdr, name))
                                .find(|b| b.present)
                                .unwrap_or(fallback)
                        };
                        CellBorders {
                            top: pick(&["top"], fallback.top),
                            bottom: pick(&["bottom"], fallback.bottom),
                            left: pick(&["left", "start"], fallback.left),
                            right: pick(&["right", "end"], fallback.right),
                        }
                    })
                    .unwrap_or_else(|| style_borders.unwrap_or_default());

                let shading = tc_pr
                    .and_then(|pr| wml(pr, "shd"))
                    .and_then(|shd| shd.attribute((WML_NS, "fill")))
                    .and_then(parse_hex_color);

                let blocks = self.parse_blocks(tc)?;

                cells.push(PendingCell {
                    grid_col: ci,
                    v_merge,
                    cell: TableCell {
                        width,
                        blocks,
                        borders,
                        shading,
                        col_span,
                        row_span: 1,
                        v_align,
                    },
                });
                grid_col += col_span as usize;
            }
            pending_rows.push(PendingRow { cells, height });
        }

        Ok(Table {
            col_widths,
            rows: apply_vertical_merges(pending_rows),
            indent,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum VMerge {
    None,
    Restart,
    Continue,
}

struct PendingCell {
    grid_col: usize,
    v_merge: VMerge,
    cell: TableCell,
}

struct PendingRow {
    cells: Vec<PendingCell>,
    height: Option<f32>,
}

/// Turn vMerge runs into rowspans: the restarting cell absorbs the
/// continuation cells below it in the same grid column, which are dropped.
/// A continuation with nothing open above it is kept as an ordinary cell.
fn apply_vertical_merges(mut rows: Vec<PendingRow>) -> Vec<TableRow> {
    let mut open: HashMap<usize, (usize, usize)> = HashMap::new();
    let mut absorbed: Vec<Vec<bool>> = rows.iter().map(|r| vec![false; r.cells.len()]).collect();

    for ri in 0..rows.len() {
        for ci in 0..rows[ri].cells.len() {
            let (grid_col, v_merge) = (rows[ri].cells[ci].grid_col, rows[ri].cells[ci].v_merge);
            match v_merge {
                VMerge::Restart => {
                    open.insert(grid_col, (ri, ci));
                }
                VMerge::Continue => match open.get(&grid_col).copied() {
                    Some((orow, ocell)) => {
                        rows[orow].cells[ocell].cell.row_span += 1;
                        absorbed[ri][ci] = true;
                    }
                    None => {
                        open.insert(grid_col, (ri, ci));
                    }
                },
                VMerge::None => {
                    open.remove(&grid_col);
                }
            }
        }
    }

    rows.into_iter()
        .zip(absorbed)
        .map(|(row, absorbed)| TableRow {
            cells: row
                .cells
                .into_iter()
                .zip(absorbed)
                .filter(|(_, gone)| !gone)
                .map(|(pending, _)| pending.cell)
                .collect(),
            height: row.height,
        })
        .collect()
}

fn find_blip_embed<'a>(container: roxmltree::Node<'a, 'a>) -> Option<&'a str> {
    container
        .descendants()
        .find(|n| n.tag_name().name() == "blip" && n.tag_name().namespace() == Some(DML_NS))
        .and_then(|n| n.attribute((REL_NS, "embed")))
}

fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}
