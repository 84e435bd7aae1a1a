#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum VertAlign {
    #[default]
    Baseline,
    Superscript,
    Subscript,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LineSpacing {
    Auto(f32),    // multiplier (e.g. 1.0 = single, 1.15 = default)
    Exact(f32),   // fixed height in points
    AtLeast(f32), // minimum height in points
}

/// Effective paragraph formatting after the style cascade.
/// `None` means "not set anywhere", which the emitter leaves to the browser.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ParagraphFormat {
    pub alignment: Option<Alignment>,
    pub space_before: Option<f32>, // points
    pub space_after: Option<f32>,  // points
    pub line_spacing: Option<LineSpacing>,
    pub indent_left: Option<f32>,
    pub indent_right: Option<f32>,
    /// Positive for a first-line indent, negative for a hanging indent.
    pub indent_first_line: Option<f32>,
    pub shading: Option<[u8; 3]>,
    pub page_break_before: bool,
}

/// Effective run formatting after the style cascade.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RunFormat {
    pub font_name: Option<String>,
    pub font_size: Option<f32>, // points
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub caps: bool,
    pub small_caps: bool,
    pub color: Option<[u8; 3]>,
    pub highlight: Option<[u8; 3]>,
    pub vertical_align: VertAlign,
}

pub struct Document {
    pub blocks: Vec<Block>,
    /// Relationship IDs of embedded images, indexed by `Image::slot`.
    pub image_slots: Vec<String>,
    pub title: Option<String>,
    pub language: Option<String>,
}

pub enum Block {
    Paragraph(Paragraph),
    ListItem(ListItem),
    Table(Table),
}

pub struct Paragraph {
    pub format: ParagraphFormat,
    /// Formatting of the paragraph mark, used for list markers and empty paragraphs.
    pub mark: RunFormat,
    pub children: Vec<Inline>,
}

pub struct ListItem {
    pub marker: String,
    pub level: u8,
    pub paragraph: Paragraph,
}

pub enum Inline {
    Run(Run),
    Hyperlink(Hyperlink),
    Image(Image),
    Break(Break),
    Tab,
    Bookmark(String),
}

pub struct Run {
    pub text: String,
    pub format: RunFormat,
}

pub struct Hyperlink {
    pub target: String,
    pub tooltip: Option<String>,
    pub children: Vec<Inline>,
}

/// Placeholder for an embedded image; `slot` indexes `Document::image_slots`
/// and the encoded sources produced by the media pass.
pub struct Image {
    pub slot: usize,
    pub alt: Option<String>,
    pub style: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Break {
    Line,
    Page,
    Column,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CellVAlign {
    Top,
    Center,
    Bottom,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellBorder {
    pub present: bool,
    pub color: Option<[u8; 3]>,
    pub width: f32,
}

impl Default for CellBorder {
    fn default() -> Self {
        Self {
            present: false,
            color: None,
            width: 0.5,
        }
    }
}

impl CellBorder {
    pub fn visible(color: Option<[u8; 3]>, width: f32) -> Self {
        Self {
            present: true,
            color,
            width,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CellBorders {
    pub top: CellBorder,
    pub bottom: CellBorder,
    pub left: CellBorder,
    pub right: CellBorder,
}

pub struct Table {
    pub col_widths: Vec<f32>, // points
    pub rows: Vec<TableRow>,
    pub indent: f32,
}

pub struct TableRow {
    pub cells: Vec<TableCell>,
    pub height: Option<f32>,
}

pub struct TableCell {
    pub width: Option<f32>, // points
    pub blocks: Vec<Block>,
    pub borders: CellBorders,
    pub shading: Option<[u8; 3]>,
    pub col_span: u16,
    pub row_span: u16,
    pub v_align: CellVAlign,
}
