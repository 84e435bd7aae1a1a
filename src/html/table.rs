use crate::model::{CellBorder, CellVAlign, Table, TableCell};

use super::Emitter;
use super::css::{Declarations, hex, pt};

fn border_value(border: &CellBorder) -> Option<String> {
    border.present.then(|| {
        format!(
            "{} solid {}",
            pt(border.width.max(0.25)),
            hex(border.color.unwrap_or([0, 0, 0]))
        )
    })
}

impl Emitter<'_> {
    pub(super) fn table(&mut self, table: &Table, out: &mut String) {
        let mut decls = Declarations::default();
        decls.push("border-collapse", "collapse");
        if table.indent != 0.0 {
            decls.push("margin-left", pt(table.indent));
        }
        let total: f32 = table.col_widths.iter().sum();
        if total > 0.0 {
            decls.push("width", pt(total));
        }

        out.push_str("<table");
        out.push_str(&self.sheet.attr("table", &decls));
        out.push('>');
        for row in &table.rows {
            let mut row_decls = Declarations::default();
            if let Some(height) = row.height {
                row_decls.push("height", pt(height));
            }
            out.push_str("<tr");
            out.push_str(&self.sheet.attr("tr", &row_decls));
            out.push('>');
            for cell in &row.cells {
                self.cell(cell, out);
            }
            out.push_str("</tr>");
        }
        out.push_str("</table>");
    }

    fn cell(&mut self, cell: &TableCell, out: &mut String) {
        let mut decls = Declarations::default();
        if let Some(width) = cell.width {
            decls.push("width", pt(width));
        }
        decls.push(
            "vertical-align",
            match cell.v_align {
                CellVAlign::Top => "top",
                CellVAlign::Center => "middle",
                CellVAlign::Bottom => "bottom",
            },
        );
        decls.push("padding", "0 5.4pt");
        for (property, border) in [
            ("border-top", &cell.borders.top),
            ("border-right", &cell.borders.right),
            ("border-bottom", &cell.borders.bottom),
            ("border-left", &cell.borders.left),
        ] {
            if let Some(value) = border_value(border) {
                decls.push(property, value);
            }
        }
        if let Some(shading) = cell.shading {
            decls.push("background-color", hex(shading));
        }

        out.push_str("<td");
        if cell.col_span > 1 {
            out.push_str(&format!(" colspan=\"{}\"", cell.col_span));
        }
        if cell.row_span > 1 {
            out.push_str(&format!(" rowspan=\"{}\"", cell.row_span));
        }
        out.push_str(&self.sheet.attr("td", &decls));
        out.push('>');
        if cell.blocks.is_empty() {
            out.push_str("&#160;");
        }
        for block in &cell.blocks {
            self.block(block, out);
        }
        out.push_str("</td>");
    }
}
