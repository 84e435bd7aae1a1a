mod common;

use common::{DocxBuilder, convert_default, image_para, para, parse_html, png_bytes};
use docxide_html::{ConvertOptions, Error, convert, repair_hyperlink_uris};

fn linked(id: &str, text: &str) -> String {
    format!(r#"<w:p><w:hyperlink r:id="{id}"><w:r><w:t>{text}</w:t></w:r></w:hyperlink></w:p>"#)
}

fn hrefs(html: &str) -> Vec<String> {
    let doc = parse_html(html);
    doc.descendants()
        .filter(|n| n.has_tag_name("a"))
        .filter_map(|n| n.attribute("href"))
        .map(String::from)
        .collect()
}

#[test]
fn invalid_target_is_repairable() {
    let docx = DocxBuilder::new()
        .hyperlink("rIdMail", "mailto:jane doe@example.com")
        .body(&linked("rIdMail", "mail me"))
        .build();

    match convert(&docx, &ConvertOptions::default()) {
        Err(e @ Error::UnresolvedHyperlink { .. }) => {
            assert!(e.is_repairable());
            assert!(e.to_string().contains("rIdMail"));
        }
        other => panic!("expected UnresolvedHyperlink, got {other:?}"),
    }
}

#[test]
fn repair_then_convert_succeeds() {
    let docx = DocxBuilder::new()
        .hyperlink("rIdMail", "mailto:jane.doe@example.com ")
        .hyperlink("rIdWeb", "http://exa mple.com/page")
        .hyperlink("rIdOk", "https://example.org/")
        .image("rIdImg", "pic.png", png_bytes(2, 2, [5, 5, 5]))
        .body(&linked("rIdMail", "mail"))
        .body(&linked("rIdWeb", "web"))
        .body(&linked("rIdOk", "fine"))
        .body(&image_para("rIdImg", "pic"))
        .build();
    assert!(convert(&docx, &ConvertOptions::default()).is_err());

    let repaired = repair_hyperlink_uris(&docx).unwrap();
    assert_ne!(repaired, docx);
    let conversion = convert_default(&repaired);

    assert_eq!(
        hrefs(&conversion.html),
        ["jane.doe@example.com", " ", "https://example.org/"]
            .map(String::from)
    );
    // other parts survive the rebuild
    assert!(conversion.html.contains("data:image/png;base64,"));
    assert!(conversion.warnings.is_empty());
}

#[test]
fn repairing_a_valid_package_is_a_no_op() {
    let docx = DocxBuilder::new()
        .hyperlink("rIdOk", "https://example.org/a%20b")
        .body(&linked("rIdOk", "ok"))
        .body(&para("plain"))
        .build();
    let repaired = repair_hyperlink_uris(&docx).unwrap();
    assert_eq!(repaired, docx);

    let broken = DocxBuilder::new()
        .hyperlink("rIdBad", "http://bad host")
        .body(&linked("rIdBad", "bad"))
        .build();
    let once = repair_hyperlink_uris(&broken).unwrap();
    let twice = repair_hyperlink_uris(&once).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn repair_rejects_non_packages() {
    assert!(matches!(
        repair_hyperlink_uris(b"not a zip"),
        Err(Error::NotAPackage)
    ));
}
