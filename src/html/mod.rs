mod css;
mod table;

use crate::model::{
    Alignment, Block, Break, Document, Hyperlink, Image, Inline, LineSpacing, Paragraph, Run,
    RunFormat, VertAlign,
};

use css::{Declarations, StyleSheet, hex, pt};

pub(crate) struct EmitOptions<'a> {
    pub(crate) css_class_prefix: &'a str,
    pub(crate) fabricate_css_classes: bool,
    pub(crate) additional_css: &'a str,
    pub(crate) title: &'a str,
}

pub(crate) fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

/// Run text with Word's space handling: repeated, leading and trailing
/// spaces would collapse in HTML, so they become no-break spaces.
fn escape_run_text(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' && (i == 0 || i + 1 == chars.len() || chars[i - 1] == ' ') {
            out.push_str("&#160;");
        } else {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                _ => out.push(c),
            }
        }
    }
    out
}

/// Quoted font family; characters that could end the string, the rule or
/// the style element are dropped.
fn font_family(name: &str) -> String {
    let name: String = name
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | '\\' | ';' | '{' | '}' | '<' | '>' | '&') && !c.is_control())
        .collect();
    format!("'{name}'")
}

fn line_height(spacing: LineSpacing) -> String {
    match spacing {
        LineSpacing::Auto(m) => format!("{}", (m * 100.0).round() / 100.0),
        LineSpacing::Exact(h) | LineSpacing::AtLeast(h) => pt(h),
    }
}

struct Emitter<'a> {
    sheet: StyleSheet,
    images: &'a [Option<String>],
}

/// Serialize the content tree as a standalone HTML document. Body markup is
/// produced first so the style sheet holds exactly the classes in use.
pub(crate) fn emit(doc: &Document, images: &[Option<String>], options: &EmitOptions) -> String {
    let mut emitter = Emitter {
        sheet: StyleSheet::new(options.css_class_prefix, options.fabricate_css_classes),
        images,
    };

    let mut body = String::new();
    for block in &doc.blocks {
        emitter.block(block, &mut body);
        body.push('\n');
    }
    log::debug!(
        "Emitted {} blocks with {} generated classes",
        doc.blocks.len(),
        emitter.sheet.class_count()
    );

    let mut html = String::with_capacity(body.len() + 1024);
    html.push_str("<!DOCTYPE html>\n");
    match doc.language.as_deref() {
        Some(lang) => html.push_str(&format!("<html lang=\"{}\">\n", escape_attr(lang))),
        None => html.push_str("<html>\n"),
    }
    html.push_str("<head>\n<meta charset=\"UTF-8\" />\n");
    html.push_str(&format!("<title>{}</title>\n", escape_text(options.title)));
    html.push_str("<style>\n");
    html.push_str(&emitter.sheet.render());
    if !options.additional_css.is_empty() {
        html.push_str(options.additional_css);
        html.push('\n');
    }
    html.push_str("</style>\n</head>\n<body>\n");
    html.push_str(&body);
    html.push_str("</body>\n</html>\n");
    html
}

impl Emitter<'_> {
    fn block(&mut self, block: &Block, out: &mut String) {
        match block {
            Block::Paragraph(p) => self.paragraph(p, None, out),
            Block::ListItem(item) => self.paragraph(&item.paragraph, Some(&item.marker), out),
            Block::Table(t) => self.table(t, out),
        }
    }

    fn paragraph(&mut self, para: &Paragraph, marker: Option<&str>, out: &mut String) {
        let fmt = &para.format;
        let mut decls = Declarations::default();
        decls.push("margin-top", pt(fmt.space_before.unwrap_or(0.0)));
        decls.push("margin-bottom", pt(fmt.space_after.unwrap_or(0.0)));
        if let Some(left) = fmt.indent_left {
            decls.push("margin-left", pt(left));
        }
        if let Some(right) = fmt.indent_right {
            decls.push("margin-right", pt(right));
        }
        if let Some(first) = fmt.indent_first_line {
            decls.push("text-indent", pt(first));
        }
        if let Some(alignment) = fmt.alignment {
            decls.push(
                "text-align",
                match alignment {
                    Alignment::Left => "left",
                    Alignment::Center => "center",
                    Alignment::Right => "right",
                    Alignment::Justify => "justify",
                },
            );
        }
        if let Some(spacing) = fmt.line_spacing {
            decls.push("line-height", line_height(spacing));
        }
        if let Some(shading) = fmt.shading {
            decls.push("background-color", hex(shading));
        }
        if fmt.page_break_before {
            decls.push("page-break-before", "always");
        }
        if let Some(font) = &para.mark.font_name {
            decls.push("font-family", font_family(font));
        }
        if let Some(size) = para.mark.font_size {
            decls.push("font-size", pt(size));
        }

        out.push_str("<p");
        out.push_str(&self.sheet.attr("p", &decls));
        out.push('>');

        if let Some(marker) = marker {
            let mut marker_decls = self.run_decls(&para.mark, &para.mark);
            if let Some(hanging) = fmt.indent_first_line.filter(|f| *f < 0.0) {
                marker_decls.push("display", "inline-block");
                marker_decls.push("min-width", pt(-hanging));
                marker_decls.push("text-indent", "0");
            } else {
                marker_decls.push("padding-right", "0.5em");
            }
            out.push_str("<span");
            out.push_str(&self.sheet.attr("span", &marker_decls));
            out.push('>');
            out.push_str(&escape_text(marker));
            out.push_str("</span>");
        }

        self.inlines(&para.children, &para.mark, out);

        if marker.is_none() && !has_visible_content(&para.children) {
            out.push_str("&#160;");
        }
        out.push_str("</p>");
    }

    fn inlines(&mut self, children: &[Inline], mark: &RunFormat, out: &mut String) {
        for inline in children {
            match inline {
                Inline::Run(run) => self.run(run, mark, out),
                Inline::Hyperlink(link) => self.hyperlink(link, mark, out),
                Inline::Image(img) => self.image(img, out),
                Inline::Break(kind) => self.line_break(*kind, out),
                Inline::Tab => {
                    let mut decls = Declarations::default();
                    decls.push("white-space", "pre");
                    decls.push("display", "inline-block");
                    decls.push("min-width", "36pt");
                    out.push_str("<span");
                    out.push_str(&self.sheet.attr("span", &decls));
                    out.push_str(">&#9;</span>");
                }
                Inline::Bookmark(name) => {
                    out.push_str(&format!("<a id=\"{}\"></a>", escape_attr(name)));
                }
            }
        }
    }

    /// Declarations of a run; font family and size are only repeated when
    /// they differ from the enclosing paragraph.
    fn run_decls(&self, fmt: &RunFormat, mark: &RunFormat) -> Declarations {
        let mut decls = Declarations::default();
        if let Some(font) = &fmt.font_name
            && fmt.font_name != mark.font_name
        {
            decls.push("font-family", font_family(font));
        }
        if let Some(size) = fmt.font_size
            && fmt.font_size != mark.font_size
        {
            decls.push("font-size", pt(size));
        }
        if fmt.bold {
            decls.push("font-weight", "bold");
        }
        if fmt.italic {
            decls.push("font-style", "italic");
        }
        match (fmt.underline, fmt.strikethrough) {
            (true, true) => decls.push("text-decoration", "underline line-through"),
            (true, false) => decls.push("text-decoration", "underline"),
            (false, true) => decls.push("text-decoration", "line-through"),
            (false, false) => {}
        }
        if fmt.caps {
            decls.push("text-transform", "uppercase");
        } else if fmt.small_caps {
            decls.push("font-variant", "small-caps");
        }
        if let Some(color) = fmt.color {
            decls.push("color", hex(color));
        }
        if let Some(highlight) = fmt.highlight {
            decls.push("background-color", hex(highlight));
        }
        match fmt.vertical_align {
            VertAlign::Superscript => {
                decls.push("vertical-align", "super");
                decls.push("font-size", "smaller");
            }
            VertAlign::Subscript => {
                decls.push("vertical-align", "sub");
                decls.push("font-size", "smaller");
            }
            VertAlign::Baseline => {}
        }
        decls
    }

    fn run(&mut self, run: &Run, mark: &RunFormat, out: &mut String) {
        let decls = self.run_decls(&run.format, mark);
        out.push_str("<span");
        out.push_str(&self.sheet.attr("span", &decls));
        out.push('>');
        out.push_str(&escape_run_text(&run.text));
        out.push_str("</span>");
    }

    fn hyperlink(&mut self, link: &Hyperlink, mark: &RunFormat, out: &mut String) {
        out.push_str(&format!("<a href=\"{}\"", escape_attr(&link.target)));
        if let Some(tooltip) = &link.tooltip {
            out.push_str(&format!(" title=\"{}\"", escape_attr(tooltip)));
        }
        out.push('>');
        self.inlines(&link.children, mark, out);
        out.push_str("</a>");
    }

    fn image(&mut self, img: &Image, out: &mut String) {
        out.push_str("<img");
        if let Some(Some(src)) = self.images.get(img.slot) {
            out.push_str(&format!(" src=\"{}\"", escape_attr(src)));
        }
        if let Some(alt) = &img.alt {
            out.push_str(&format!(" alt=\"{}\"", escape_attr(alt)));
        }
        if let Some(style) = &img.style {
            out.push_str(&format!(" style=\"{}\"", escape_attr(style)));
        }
        out.push_str(" />");
    }

    fn line_break(&mut self, kind: Break, out: &mut String) {
        match kind {
            Break::Page => {
                let mut decls = Declarations::default();
                decls.push("page-break-before", "always");
                out.push_str("<br");
                out.push_str(&self.sheet.attr("br", &decls));
                out.push_str(" />");
            }
            Break::Line | Break::Column => out.push_str("<br />"),
        }
    }
}

fn has_visible_content(children: &[Inline]) -> bool {
    children.iter().any(|inline| match inline {
        Inline::Run(run) => !run.text.is_empty(),
        Inline::Hyperlink(link) => has_visible_content(&link.children),
        Inline::Image(_) | Inline::Break(_) | Inline::Tab => true,
        Inline::Bookmark(_) => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_text_keeps_significant_spaces() {
        assert_eq!(escape_run_text("a  b"), "a &#160;b");
        assert_eq!(escape_run_text(" lead"), "&#160;lead");
        assert_eq!(escape_run_text("x < y & z"), "x &lt; y &amp; z");
    }

    #[test]
    fn font_names_cannot_break_out_of_the_rule() {
        assert_eq!(font_family("Times New Roman"), "'Times New Roman'");
        assert_eq!(font_family("A&B <Sans>'; }"), "'AB Sans '");
    }

    #[test]
    fn attributes_escape_quotes() {
        assert_eq!(escape_attr(r#"a"b&c"#), "a&quot;b&amp;c");
    }
}
