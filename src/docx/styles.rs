use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::model::{Alignment, CellBorder, LineSpacing, ParagraphFormat, RunFormat, VertAlign};

use super::{
    DML_NS, WML_NS, highlight_color, parse_cell_border, parse_hex_color, parse_text_color,
    twips_attr, wml, wml_attr, wml_bool,
};

fn dml<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children()
        .find(|n| n.tag_name().name() == name && n.tag_name().namespace() == Some(DML_NS))
}

fn latin_typeface<'a>(node: roxmltree::Node<'a, 'a>) -> Option<&'a str> {
    dml(node, "latin")
        .and_then(|n| n.attribute("typeface"))
        .filter(|tf| !tf.is_empty())
}

pub(super) struct ThemeFonts {
    pub(super) major: String,
    pub(super) minor: String,
}

pub(super) fn parse_theme(xml_content: Option<&str>) -> ThemeFonts {
    let mut major = String::from("Calibri Light");
    let mut minor = String::from("Calibri");

    let Some(xml_content) = xml_content else {
        return ThemeFonts { major, minor };
    };
    let Ok(xml) = roxmltree::Document::parse(xml_content) else {
        log::warn!("Theme part is not well-formed, using default theme fonts");
        return ThemeFonts { major, minor };
    };

    for node in xml.descendants() {
        if node.tag_name().namespace() != Some(DML_NS) {
            continue;
        }
        match node.tag_name().name() {
            "majorFont" => {
                if let Some(tf) = latin_typeface(node) {
                    major = tf.to_string();
                }
            }
            "minorFont" => {
                if let Some(tf) = latin_typeface(node) {
                    minor = tf.to_string();
                }
            }
            _ => {}
        }
    }

    ThemeFonts { major, minor }
}

fn resolve_font(rfonts: roxmltree::Node, theme: &ThemeFonts) -> Option<String> {
    if let Some(f) = rfonts.attribute((WML_NS, "ascii")) {
        return Some(f.to_string());
    }
    match rfonts.attribute((WML_NS, "asciiTheme")) {
        Some("majorHAnsi" | "majorAscii") => Some(theme.major.clone()),
        Some("minorHAnsi" | "minorAscii") => Some(theme.minor.clone()),
        _ => rfonts.attribute((WML_NS, "hAnsi")).map(String::from),
    }
}

pub(super) fn parse_alignment(val: &str) -> Alignment {
    match val {
        "center" => Alignment::Center,
        "right" | "end" => Alignment::Right,
        "both" | "distribute" => Alignment::Justify,
        _ => Alignment::Left,
    }
}

pub(super) fn parse_line_spacing(spacing: roxmltree::Node, line_val: f32) -> LineSpacing {
    match spacing.attribute((WML_NS, "lineRule")) {
        Some("exact") => LineSpacing::Exact(line_val / 20.0),
        Some("atLeast") => LineSpacing::AtLeast(line_val / 20.0),
        _ => LineSpacing::Auto(line_val / 240.0),
    }
}

// Copies every field `$top` sets onto `$base`.
macro_rules! overlay {
    ($base:expr, $top:expr, $($field:ident),+ $(,)?) => {
        $(
            if $top.$field.is_some() {
                $base.$field = $top.$field.clone();
            }
        )+
    };
}

/// One layer of run properties. Unset fields fall through to lower layers.
#[derive(Clone, Debug, Default, PartialEq)]
pub(super) struct RunProps {
    pub(super) font_name: Option<String>,
    pub(super) font_size: Option<f32>,
    pub(super) bold: Option<bool>,
    pub(super) italic: Option<bool>,
    pub(super) underline: Option<bool>,
    pub(super) strikethrough: Option<bool>,
    pub(super) caps: Option<bool>,
    pub(super) small_caps: Option<bool>,
    pub(super) vanish: Option<bool>,
    pub(super) color: Option<[u8; 3]>,
    pub(super) highlight: Option<[u8; 3]>,
    pub(super) vertical_align: Option<VertAlign>,
    pub(super) lang: Option<String>,
}

impl RunProps {
    pub(super) fn parse(rpr: roxmltree::Node, theme: &ThemeFonts) -> Self {
        let strike = wml_bool(rpr, "strike");
        let dstrike = wml_bool(rpr, "dstrike");
        RunProps {
            font_name: wml(rpr, "rFonts").and_then(|n| resolve_font(n, theme)),
            font_size: wml_attr(rpr, "sz")
                .and_then(|v| v.parse::<f32>().ok())
                .map(|hp| hp / 2.0),
            bold: wml_bool(rpr, "b"),
            italic: wml_bool(rpr, "i"),
            underline: wml_attr(rpr, "u").map(|v| v != "none"),
            strikethrough: match (strike, dstrike) {
                (None, None) => None,
                (s, d) => Some(s.unwrap_or(false) || d.unwrap_or(false)),
            },
            caps: wml_bool(rpr, "caps"),
            small_caps: wml_bool(rpr, "smallCaps"),
            vanish: wml_bool(rpr, "vanish"),
            color: wml_attr(rpr, "color").and_then(parse_text_color),
            highlight: wml_attr(rpr, "highlight").and_then(highlight_color).or_else(|| {
                wml(rpr, "shd")
                    .and_then(|shd| shd.attribute((WML_NS, "fill")))
                    .and_then(parse_hex_color)
            }),
            vertical_align: wml_attr(rpr, "vertAlign").map(|v| match v {
                "superscript" => VertAlign::Superscript,
                "subscript" => VertAlign::Subscript,
                _ => VertAlign::Baseline,
            }),
            lang: wml(rpr, "lang")
                .and_then(|n| n.attribute((WML_NS, "val")))
                .map(String::from),
        }
    }

    pub(super) fn overlay(&mut self, top: &RunProps) {
        overlay!(
            self,
            top,
            font_name,
            font_size,
            bold,
            italic,
            underline,
            strikethrough,
            caps,
            small_caps,
            vanish,
            color,
            highlight,
            vertical_align,
            lang,
        );
    }

    pub(super) fn is_hidden(&self) -> bool {
        self.vanish.unwrap_or(false)
    }

    pub(super) fn to_format(&self) -> RunFormat {
        RunFormat {
            font_name: self.font_name.clone(),
            font_size: self.font_size,
            bold: self.bold.unwrap_or(false),
            italic: self.italic.unwrap_or(false),
            underline: self.underline.unwrap_or(false),
            strikethrough: self.strikethrough.unwrap_or(false),
            caps: self.caps.unwrap_or(false),
            small_caps: self.small_caps.unwrap_or(false),
            color: self.color,
            highlight: self.highlight,
            vertical_align: self.vertical_align.unwrap_or_default(),
        }
    }
}

/// One layer of paragraph properties.
#[derive(Clone, Debug, Default, PartialEq)]
pub(super) struct ParaProps {
    pub(super) alignment: Option<Alignment>,
    pub(super) space_before: Option<f32>,
    pub(super) space_after: Option<f32>,
    pub(super) line_spacing: Option<LineSpacing>,
    pub(super) indent_left: Option<f32>,
    pub(super) indent_right: Option<f32>,
    pub(super) indent_first_line: Option<f32>,
    pub(super) shading: Option<[u8; 3]>,
    pub(super) page_break_before: Option<bool>,
    pub(super) num_id: Option<String>,
    pub(super) num_level: Option<u8>,
}

impl ParaProps {
    pub(super) fn parse(ppr: roxmltree::Node) -> Self {
        let spacing = wml(ppr, "spacing");
        let ind = wml(ppr, "ind");
        let num_pr = wml(ppr, "numPr");
        ParaProps {
            alignment: wml_attr(ppr, "jc").map(parse_alignment),
            space_before: spacing.and_then(|n| twips_attr(n, "before")),
            space_after: spacing.and_then(|n| twips_attr(n, "after")),
            line_spacing: spacing.and_then(|n| {
                n.attribute((WML_NS, "line"))
                    .and_then(|v| v.parse::<f32>().ok())
                    .map(|line_val| parse_line_spacing(n, line_val))
            }),
            indent_left: ind.and_then(|n| twips_attr(n, "left").or_else(|| twips_attr(n, "start"))),
            indent_right: ind.and_then(|n| twips_attr(n, "right").or_else(|| twips_attr(n, "end"))),
            indent_first_line: ind.and_then(|n| {
                twips_attr(n, "hanging")
                    .map(|h| -h)
                    .or_else(|| twips_attr(n, "firstLine"))
            }),
            shading: wml(ppr, "shd")
                .and_then(|shd| shd.attribute((WML_NS, "fill")))
                .and_then(parse_hex_color),
            page_break_before: wml_bool(ppr, "pageBreakBefore"),
            num_id: num_pr.and_then(|n| wml_attr(n, "numId")).map(String::from),
            num_level: num_pr
                .and_then(|n| wml_attr(n, "ilvl"))
                .and_then(|v| v.parse::<u8>().ok()),
        }
    }

    pub(super) fn overlay(&mut self, top: &ParaProps) {
        overlay!(
            self,
            top,
            alignment,
            space_before,
            space_after,
            line_spacing,
            indent_left,
            indent_right,
            indent_first_line,
            shading,
            page_break_before,
            num_id,
            num_level,
        );
    }

    /// The (numbering definition, level) this paragraph belongs to, if any.
    /// numId 0 explicitly removes numbering.
    pub(super) fn list_ref(&self) -> Option<(&str, u8)> {
        let num_id = self.num_id.as_deref().filter(|id| *id != "0")?;
        Some((num_id, self.num_level.unwrap_or(0)))
    }

    pub(super) fn to_format(&self) -> ParagraphFormat {
        ParagraphFormat {
            alignment: self.alignment,
            space_before: self.space_before,
            space_after: self.space_after,
            line_spacing: self.line_spacing,
            indent_left: self.indent_left,
            indent_right: self.indent_right,
            indent_first_line: self.indent_first_line,
            shading: self.shading,
            page_break_before: self.page_break_before.unwrap_or(false),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub(super) struct TableBordersDef {
    pub(super) top: CellBorder,
    pub(super) bottom: CellBorder,
    pub(super) left: CellBorder,
    pub(super) right: CellBorder,
    pub(super) inside_h: CellBorder,
    pub(super) inside_v: CellBorder,
}

impl TableBordersDef {
    pub(super) fn parse(tbl_borders: roxmltree::Node) -> Self {
        let either = |a: &str, b: &str| {
            let first = parse_cell_border(tbl_borders, a);
            if first.present {
                first
            } else {
                parse_cell_border(tbl_borders, b)
            }
        };
        TableBordersDef {
            top: parse_cell_border(tbl_borders, "top"),
            bottom: parse_cell_border(tbl_borders, "bottom"),
            left: either("left", "start"),
            right: either("right", "end"),
            inside_h: parse_cell_border(tbl_borders, "insideH"),
            inside_v: parse_cell_border(tbl_borders, "insideV"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum StyleKind {
    Paragraph,
    Character,
    Table,
    Other,
}

struct StyleDef {
    kind: StyleKind,
    based_on: Option<String>,
    ppr: ParaProps,
    rpr: RunProps,
    table_borders: Option<TableBordersDef>,
}

/// Property layers of a whole basedOn chain, merged.
#[derive(Default)]
struct MergedChain {
    ppr: ParaProps,
    rpr: RunProps,
}

/// Style sheet of one document, with the inheritance walk and per-style caches.
pub(super) struct StyleResolver {
    defaults_ppr: ParaProps,
    defaults_rpr: RunProps,
    styles: HashMap<String, StyleDef>,
    default_paragraph_style: Option<String>,
    chain_cache: HashMap<String, Rc<MergedChain>>,
    run_cache: HashMap<(Option<String>, Option<String>), Rc<RunProps>>,
}

impl StyleResolver {
    pub(super) fn parse(xml_content: Option<&str>, theme: &ThemeFonts) -> Self {
        let mut resolver = StyleResolver {
            defaults_ppr: ParaProps::default(),
            defaults_rpr: RunProps {
                font_name: Some(theme.minor.clone()),
                ..RunProps::default()
            },
            styles: HashMap::new(),
            default_paragraph_style: None,
            chain_cache: HashMap::new(),
            run_cache: HashMap::new(),
        };

        let Some(xml_content) = xml_content else {
            return resolver;
        };
        let xml = match roxmltree::Document::parse(xml_content) {
            Ok(xml) => xml,
            Err(e) => {
                log::warn!("Styles part is not well-formed ({e}), using defaults");
                return resolver;
            }
        };
        let root = xml.root_element();

        if let Some(doc_defaults) = wml(root, "docDefaults") {
            if let Some(rpr) = wml(doc_defaults, "rPrDefault").and_then(|n| wml(n, "rPr")) {
                resolver.defaults_rpr.overlay(&RunProps::parse(rpr, theme));
            }
            if let Some(ppr) = wml(doc_defaults, "pPrDefault").and_then(|n| wml(n, "pPr")) {
                resolver.defaults_ppr.overlay(&ParaProps::parse(ppr));
            }
        }

        for style_node in root.children() {
            if style_node.tag_name().name() != "style"
                || style_node.tag_name().namespace() != Some(WML_NS)
            {
                continue;
            }
            let Some(style_id) = style_node.attribute((WML_NS, "styleId")) else {
                continue;
            };
            let kind = match style_node.attribute((WML_NS, "type")) {
                Some("paragraph") => StyleKind::Paragraph,
                Some("character") => StyleKind::Character,
                Some("table") => StyleKind::Table,
                _ => StyleKind::Other,
            };
            let is_default = style_node
                .attribute((WML_NS, "default"))
                .is_some_and(|v| v == "1" || v == "true");
            if kind == StyleKind::Paragraph && is_default {
                resolver.default_paragraph_style = Some(style_id.to_string());
            }

            let based_on = wml_attr(style_node, "basedOn").map(String::from);
            let ppr = wml(style_node, "pPr").map(ParaProps::parse).unwrap_or_default();
            let rpr = wml(style_node, "rPr")
                .map(|n| RunProps::parse(n, theme))
                .unwrap_or_default();
            let table_borders = wml(style_node, "tblPr")
                .and_then(|pr| wml(pr, "tblBorders"))
                .map(TableBordersDef::parse);

            resolver.styles.insert(
                style_id.to_string(),
                StyleDef {
                    kind,
                    based_on,
                    ppr,
                    rpr,
                    table_borders,
                },
            );
        }

        log::debug!(
            "Parsed {} styles (default paragraph style: {:?})",
            resolver.styles.len(),
            resolver.default_paragraph_style
        );
        resolver
    }

    /// Style IDs from `style_id` up the basedOn chain, nearest first.
    /// A revisited ID ends the walk, so cyclic definitions terminate.
    fn chain_ids(&self, style_id: &str) -> Vec<&str> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut chain = Vec::new();
        let mut current = self.styles.get_key_value(style_id).map(|(k, _)| k.as_str());
        while let Some(id) = current {
            if !visited.insert(id) {
                log::warn!("Style inheritance cycle at {id:?}, stopping chain walk");
                break;
            }
            chain.push(id);
            current = self.styles[id]
                .based_on
                .as_deref()
                .and_then(|parent| self.styles.get_key_value(parent))
                .map(|(k, _)| k.as_str());
        }
        chain
    }

    fn merged_chain(&mut self, style_id: &str) -> Rc<MergedChain> {
        if let Some(cached) = self.chain_cache.get(style_id) {
            return Rc::clone(cached);
        }
        let mut merged = MergedChain::default();
        for id in self.chain_ids(style_id).into_iter().rev() {
            let def = &self.styles[id];
            merged.ppr.overlay(&def.ppr);
            merged.rpr.overlay(&def.rpr);
        }
        let merged = Rc::new(merged);
        self.chain_cache
            .insert(style_id.to_string(), Rc::clone(&merged));
        merged
    }

    /// The paragraph style that applies: the named one if it exists, else the
    /// document's default paragraph style.
    pub(super) fn paragraph_style_id(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .filter(|id| self.styles.contains_key(*id))
            .map(String::from)
            .or_else(|| self.default_paragraph_style.clone())
    }

    /// Effective paragraph properties: document defaults < style chain < direct.
    pub(super) fn resolve_paragraph(&mut self, style_id: Option<&str>, direct: &ParaProps) -> ParaProps {
        let mut props = self.defaults_ppr.clone();
        if let Some(id) = style_id {
            props.overlay(&self.merged_chain(id).ppr);
        }
        props.overlay(direct);
        props
    }

    /// Effective run properties: document defaults < paragraph style chain <
    /// character style chain < direct.
    pub(super) fn resolve_run(
        &mut self,
        para_style: Option<&str>,
        char_style: Option<&str>,
        direct: &RunProps,
    ) -> RunProps {
        let key = (para_style.map(String::from), char_style.map(String::from));
        let base = match self.run_cache.get(&key).cloned() {
            Some(cached) => cached,
            None => {
                let mut base = self.defaults_rpr.clone();
                if let Some(id) = para_style {
                    base.overlay(&self.merged_chain(id).rpr);
                }
                if let Some(id) = char_style
                    && self
                        .styles
                        .get(id)
                        .is_some_and(|s| s.kind == StyleKind::Character)
                {
                    base.overlay(&self.merged_chain(id).rpr);
                }
                let base = Rc::new(base);
                self.run_cache.insert(key, Rc::clone(&base));
                base
            }
        };
        let mut props = (*base).clone();
        props.overlay(direct);
        props
    }

    /// Border set of a table style, inherited along its basedOn chain.
    pub(super) fn table_borders(&self, style_id: &str) -> Option<TableBordersDef> {
        self.chain_ids(style_id)
            .into_iter()
            .filter(|id| self.styles[*id].kind == StyleKind::Table)
            .find_map(|id| self.styles[id].table_borders)
    }

    pub(super) fn default_language(&self) -> Option<&str> {
        self.defaults_rpr.lang.as_deref()
    }

    /// Languages declared by the defaults and by any style.
    pub(super) fn declared_languages(&self) -> impl Iterator<Item = &str> {
        self.defaults_rpr
            .lang
            .as_deref()
            .into_iter()
            .chain(self.styles.values().filter_map(|s| s.rpr.lang.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r#"<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:docDefaults>
    <w:rPrDefault><w:rPr><w:sz w:val="22"/></w:rPr></w:rPrDefault>
  </w:docDefaults>
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal">
    <w:pPr><w:spacing w:after="160"/></w:pPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="Heading1">
    <w:basedOn w:val="Normal"/>
    <w:pPr><w:jc w:val="center"/></w:pPr>
    <w:rPr><w:b/><w:sz w:val="32"/><w:color w:val="2F5496"/></w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="A">
    <w:basedOn w:val="B"/>
    <w:rPr><w:i/><w:sz w:val="30"/></w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="B">
    <w:basedOn w:val="A"/>
    <w:rPr><w:b/><w:sz w:val="40"/></w:rPr>
  </w:style>
  <w:style w:type="character" w:styleId="Strong">
    <w:rPr><w:b/><w:color w:val="FF0000"/></w:rPr>
  </w:style>
</w:styles>"#;

    fn resolver() -> StyleResolver {
        let theme = parse_theme(None);
        StyleResolver::parse(Some(STYLES), &theme)
    }

    #[test]
    fn inherits_from_parent_and_defaults() {
        let mut r = resolver();
        let para = r.resolve_paragraph(Some("Heading1"), &ParaProps::default());
        assert_eq!(para.alignment, Some(Alignment::Center));
        assert_eq!(para.space_after, Some(8.0));

        let run = r.resolve_run(Some("Heading1"), None, &RunProps::default());
        assert_eq!(run.font_size, Some(16.0));
        assert_eq!(run.bold, Some(true));
        assert_eq!(run.font_name.as_deref(), Some("Calibri"));
    }

    #[test]
    fn direct_properties_override_only_what_they_set() {
        let mut r = resolver();
        let direct = RunProps {
            bold: Some(false),
            ..RunProps::default()
        };
        let run = r.resolve_run(Some("Heading1"), Some("Strong"), &direct);
        assert_eq!(run.bold, Some(false));
        assert_eq!(run.color, Some([255, 0, 0]));
        assert_eq!(run.font_size, Some(16.0));
    }

    #[test]
    fn cyclic_chain_terminates_with_own_layer_winning() {
        let mut r = resolver();
        assert_eq!(r.chain_ids("A"), vec!["A", "B"]);
        assert_eq!(r.chain_ids("B"), vec!["B", "A"]);

        let a = r.resolve_run(Some("A"), None, &RunProps::default());
        assert_eq!(a.font_size, Some(15.0));
        assert_eq!(a.italic, Some(true));
        assert_eq!(a.bold, Some(true));

        let b = r.resolve_run(Some("B"), None, &RunProps::default());
        assert_eq!(b.font_size, Some(20.0));
    }

    #[test]
    fn unknown_style_falls_back_to_default_paragraph_style() {
        let r = resolver();
        assert_eq!(r.paragraph_style_id(Some("Nope")).as_deref(), Some("Normal"));
        assert_eq!(r.paragraph_style_id(Some("Heading1")).as_deref(), Some("Heading1"));
        assert_eq!(r.paragraph_style_id(None).as_deref(), Some("Normal"));
    }
}
