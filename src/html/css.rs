use std::collections::HashMap;

/// CSS declarations of one element, in insertion order.
#[derive(Default)]
pub(super) struct Declarations(Vec<(&'static str, String)>);

impl Declarations {
    pub(super) fn push(&mut self, property: &'static str, value: impl Into<String>) {
        self.0.push((property, value.into()));
    }

    pub(super) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn serialize(&self) -> String {
        let mut s = String::new();
        for (i, (property, value)) in self.0.iter().enumerate() {
            if i > 0 {
                s.push(' ');
            }
            s.push_str(property);
            s.push_str(": ");
            s.push_str(value);
            s.push(';');
        }
        s
    }
}

/// Format a length in points with at most two decimals, e.g. 12 → "12pt".
pub(super) fn pt(v: f32) -> String {
    let rounded = (v * 100.0).round() / 100.0;
    // avoid "-0pt"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{rounded}pt")
}

pub(super) fn hex(rgb: [u8; 3]) -> String {
    format!("#{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2])
}

/// Keep only characters that are valid in a CSS class name.
fn class_prefix(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

/// Generated style sheet. In class mode every distinct (element, declarations)
/// pair gets one class named `{prefix}{n:06}`, numbered in first-use order;
/// otherwise declarations go into `style` attributes.
pub(super) struct StyleSheet {
    prefix: String,
    fabricate_classes: bool,
    classes: HashMap<(&'static str, String), String>,
    rules: Vec<(&'static str, String, String)>,
}

impl StyleSheet {
    pub(super) fn new(prefix: &str, fabricate_classes: bool) -> Self {
        StyleSheet {
            prefix: class_prefix(prefix),
            fabricate_classes,
            classes: HashMap::new(),
            rules: Vec::new(),
        }
    }

    /// Attribute text for an element with these declarations, including the
    /// leading space, or an empty string when there is nothing to style.
    pub(super) fn attr(&mut self, element: &'static str, decls: &Declarations) -> String {
        if decls.is_empty() {
            return String::new();
        }
        let css = decls.serialize();
        if !self.fabricate_classes {
            return format!(" style=\"{}\"", super::escape_attr(&css));
        }
        let next = self.rules.len();
        let key = (element, css);
        let class = match self.classes.get(&key) {
            Some(class) => class.clone(),
            None => {
                let class = format!("{}{next:06}", self.prefix);
                self.rules.push((element, class.clone(), key.1.clone()));
                self.classes.insert(key, class.clone());
                class
            }
        };
        format!(" class=\"{}\"", super::escape_attr(&class))
    }

    pub(super) fn class_count(&self) -> usize {
        self.rules.len()
    }

    pub(super) fn render(&self) -> String {
        let mut out = String::new();
        for (element, class, css) in &self.rules {
            out.push_str(&format!("{element}.{class} {{ {css} }}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decls(pairs: &[(&'static str, &str)]) -> Declarations {
        let mut d = Declarations::default();
        for (p, v) in pairs {
            d.push(*p, *v);
        }
        d
    }

    #[test]
    fn identical_declarations_share_a_class() {
        let mut sheet = StyleSheet::new("pt-", true);
        let bold = decls(&[("font-weight", "bold")]);
        assert_eq!(sheet.attr("span", &bold), " class=\"pt-000000\"");
        assert_eq!(sheet.attr("span", &decls(&[("color", "#FF0000")])), " class=\"pt-000001\"");
        assert_eq!(sheet.attr("span", &bold), " class=\"pt-000000\"");
        // same declarations on another element are a separate rule
        assert_eq!(sheet.attr("p", &bold), " class=\"pt-000002\"");
        assert_eq!(sheet.class_count(), 3);
        assert_eq!(
            sheet.render(),
            "span.pt-000000 { font-weight: bold; }\n\
             span.pt-000001 { color: #FF0000; }\n\
             p.pt-000002 { font-weight: bold; }\n"
        );
    }

    #[test]
    fn inline_mode_and_empty_declarations() {
        let mut sheet = StyleSheet::new("pt-", false);
        let d = decls(&[("font-family", "'Times New Roman'"), ("font-size", "12pt")]);
        assert_eq!(
            sheet.attr("span", &d),
            " style=\"font-family: 'Times New Roman'; font-size: 12pt;\""
        );
        assert_eq!(sheet.attr("span", &Declarations::default()), "");
        assert_eq!(sheet.render(), "");
    }

    #[test]
    fn prefix_is_reduced_to_a_class_name() {
        let mut sheet = StyleSheet::new("x\"<&y ", true);
        let bold = decls(&[("font-weight", "bold")]);
        assert_eq!(sheet.attr("span", &bold), " class=\"x---y-000000\"");
        assert_eq!(sheet.attr("span", &bold), " class=\"x---y-000000\"");
        assert_eq!(sheet.render(), "span.x---y-000000 { font-weight: bold; }\n");
    }

    #[test]
    fn lengths_and_colors() {
        assert_eq!(pt(12.0), "12pt");
        assert_eq!(pt(10.456), "10.46pt");
        assert_eq!(pt(-0.001), "0pt");
        assert_eq!(hex([0x2F, 0x54, 0x96]), "#2F5496");
    }
}
