use std::collections::HashMap;

use super::{WML_NS, twips_attr, wml, wml_attr};

/// Formats the marker formatter understands.
pub(super) const SUPPORTED_FORMATS: &[&str] = &[
    "decimal",
    "decimalZero",
    "lowerLetter",
    "upperLetter",
    "lowerRoman",
    "upperRoman",
    "ordinal",
    "bullet",
    "none",
];

struct LevelDef {
    num_fmt: String,
    lvl_text: String,
    indent_left: Option<f32>,
    indent_hanging: Option<f32>,
    start: u32,
}

struct NumDef {
    abstract_id: String,
    start_overrides: HashMap<u8, u32>,
}

pub(super) struct ListMarker {
    pub(super) text: String,
    pub(super) level: u8,
    pub(super) indent_left: Option<f32>,
    pub(super) indent_hanging: Option<f32>,
}

/// Numbering definitions plus the running counters of one conversion.
pub(super) struct Numbering {
    abstract_nums: HashMap<String, HashMap<u8, LevelDef>>,
    nums: HashMap<String, NumDef>,
    counters: HashMap<(String, u8), u32>,
    last_seen_level: HashMap<String, u8>,
    restrict_formats: bool,
}

impl Numbering {
    pub(super) fn parse(xml_content: Option<&str>, restrict_formats: bool) -> Self {
        let mut numbering = Numbering {
            abstract_nums: HashMap::new(),
            nums: HashMap::new(),
            counters: HashMap::new(),
            last_seen_level: HashMap::new(),
            restrict_formats,
        };

        let Some(xml_content) = xml_content else {
            return numbering;
        };
        let xml = match roxmltree::Document::parse(xml_content) {
            Ok(xml) => xml,
            Err(e) => {
                log::warn!("Numbering part is not well-formed ({e}), lists lose their markers");
                return numbering;
            }
        };

        for node in xml.root_element().children() {
            if node.tag_name().namespace() != Some(WML_NS) {
                continue;
            }
            match node.tag_name().name() {
                "abstractNum" => {
                    let Some(abs_id) = node.attribute((WML_NS, "abstractNumId")) else {
                        continue;
                    };
                    let mut levels: HashMap<u8, LevelDef> = HashMap::new();
                    for lvl in node.children() {
                        if lvl.tag_name().name() != "lvl"
                            || lvl.tag_name().namespace() != Some(WML_NS)
                        {
                            continue;
                        }
                        let Some(ilvl) = lvl
                            .attribute((WML_NS, "ilvl"))
                            .and_then(|v| v.parse::<u8>().ok())
                        else {
                            continue;
                        };
                        let ind = wml(lvl, "pPr").and_then(|ppr| wml(ppr, "ind"));
                        levels.insert(
                            ilvl,
                            LevelDef {
                                num_fmt: wml_attr(lvl, "numFmt").unwrap_or("decimal").to_string(),
                                lvl_text: wml_attr(lvl, "lvlText").unwrap_or("").to_string(),
                                indent_left: ind.and_then(|n| {
                                    twips_attr(n, "left").or_else(|| twips_attr(n, "start"))
                                }),
                                indent_hanging: ind.and_then(|n| twips_attr(n, "hanging")),
                                start: wml_attr(lvl, "start")
                                    .and_then(|v| v.parse::<u32>().ok())
                                    .unwrap_or(1),
                            },
                        );
                    }
                    numbering.abstract_nums.insert(abs_id.to_string(), levels);
                }
                "num" => {
                    let Some(num_id) = node.attribute((WML_NS, "numId")) else {
                        continue;
                    };
                    let Some(abs_id) = wml_attr(node, "abstractNumId") else {
                        continue;
                    };
                    let start_overrides = node
                        .children()
                        .filter(|n| {
                            n.tag_name().name() == "lvlOverride"
                                && n.tag_name().namespace() == Some(WML_NS)
                        })
                        .filter_map(|n| {
                            let ilvl = n.attribute((WML_NS, "ilvl"))?.parse::<u8>().ok()?;
                            let start = wml_attr(n, "startOverride")?.parse::<u32>().ok()?;
                            Some((ilvl, start))
                        })
                        .collect();
                    numbering.nums.insert(
                        num_id.to_string(),
                        NumDef {
                            abstract_id: abs_id.to_string(),
                            start_overrides,
                        },
                    );
                }
                _ => {}
            }
        }

        numbering
    }

    /// A non-list paragraph ends every running list; the next list paragraph
    /// starts counting again.
    pub(super) fn interrupt(&mut self) {
        if !self.counters.is_empty() {
            self.counters.clear();
            self.last_seen_level.clear();
        }
    }

    fn level_start(&self, num: &NumDef, levels: &HashMap<u8, LevelDef>, ilvl: u8) -> u32 {
        num.start_overrides
            .get(&ilvl)
            .copied()
            .or_else(|| levels.get(&ilvl).map(|d| d.start))
            .unwrap_or(1)
    }

    /// Advance the counter of (num_id, ilvl) and produce the marker text.
    /// Returns Ok(None) when the numbering reference does not resolve.
    pub(super) fn next_marker(
        &mut self,
        num_id: &str,
        ilvl: u8,
    ) -> Result<Option<ListMarker>, String> {
        let Some(num) = self.nums.get(num_id) else {
            log::debug!("Paragraph references unknown numbering {num_id}");
            return Ok(None);
        };
        let Some(levels) = self.abstract_nums.get(&num.abstract_id) else {
            return Ok(None);
        };
        let Some(def) = levels.get(&ilvl) else {
            return Ok(None);
        };
        if self.restrict_formats && !SUPPORTED_FORMATS.contains(&def.num_fmt.as_str()) {
            return Err(def.num_fmt.clone());
        }

        // Reset deeper-level counters when returning to a higher level
        if let Some(prev) = self.last_seen_level.get(num_id).copied()
            && ilvl < prev
        {
            for deeper in (ilvl + 1)..=prev {
                self.counters.remove(&(num_id.to_string(), deeper));
            }
        }
        self.last_seen_level.insert(num_id.to_string(), ilvl);

        let start = self.level_start(num, levels, ilvl);
        let current_counter = *self
            .counters
            .entry((num_id.to_string(), ilvl))
            .and_modify(|c| *c = c.saturating_add(1))
            .or_insert(start);

        let text = if def.num_fmt == "bullet" {
            let text = normalize_bullet_text(&def.lvl_text);
            if text.is_empty() {
                "\u{2022}".to_string()
            } else {
                text
            }
        } else {
            let mut label = def.lvl_text.clone();
            for lvl_idx in 0..9u8 {
                let placeholder = format!("%{}", lvl_idx + 1);
                if !label.contains(&placeholder) {
                    continue;
                }
                let lvl_counter = if lvl_idx == ilvl {
                    current_counter
                } else {
                    self.counters
                        .get(&(num_id.to_string(), lvl_idx))
                        .copied()
                        .unwrap_or_else(|| self.level_start(num, levels, lvl_idx))
                };
                let lvl_fmt = levels
                    .get(&lvl_idx)
                    .map(|d| d.num_fmt.as_str())
                    .unwrap_or("decimal");
                label = label.replace(&placeholder, &format_number(lvl_counter, lvl_fmt));
            }
            label
        };

        Ok(Some(ListMarker {
            text,
            level: ilvl,
            indent_left: def.indent_left,
            indent_hanging: def.indent_hanging,
        }))
    }
}

fn to_roman(mut n: u32) -> String {
    const TABLE: &[(u32, &str)] = &[
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    let mut result = String::new();
    for &(value, numeral) in TABLE {
        while n >= value {
            result.push_str(numeral);
            n -= value;
        }
    }
    result
}

fn to_letters(value: u32, base: u8) -> String {
    if value == 0 {
        return String::new();
    }
    let mut n = value - 1;
    let mut result = String::new();
    loop {
        result.insert(0, (base + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

fn ordinal_suffix(value: u32) -> &'static str {
    match (value % 10, value % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

pub(super) fn format_number(value: u32, num_fmt: &str) -> String {
    match num_fmt {
        "decimal" => value.to_string(),
        "decimalZero" => format!("{value:02}"),
        "lowerLetter" => to_letters(value, b'a'),
        "upperLetter" => to_letters(value, b'A'),
        "lowerRoman" => to_roman(value),
        "upperRoman" => to_roman(value).to_uppercase(),
        "ordinal" => format!("{value}{}", ordinal_suffix(value)),
        "none" => String::new(),
        other => {
            log::warn!("Unsupported numbering format {other:?}, using decimal");
            value.to_string()
        }
    }
}

fn normalize_bullet_text(text: &str) -> String {
    text.chars()
        .map(|c| {
            let cp = c as u32;
            if (0xF000..=0xF0FF).contains(&cp) {
                symbol_pua_to_unicode(cp).unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

/// Map a Symbol/Wingdings private-use code point to a Unicode equivalent.
pub(super) fn symbol_pua_to_unicode(cp: u32) -> Option<char> {
    let sym = cp.checked_sub(0xF000)?;
    let mapped = match sym {
        0xB7 => '\u{2022}', // bullet •
        0xA7 => '\u{25A0}', // black square ■ (Wingdings §)
        0xA8 => '\u{25CB}', // white circle ○
        0xD8 => '\u{2666}', // diamond ◆
        0x76 => '\u{221A}', // check mark √
        0xFC => '\u{2713}', // check mark ✓ (Wingdings)
        _ => return char::from_u32(sym),
    };
    Some(mapped)
}
